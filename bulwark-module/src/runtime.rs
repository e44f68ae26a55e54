use memoffset::offset_of;
use std::mem::size_of;

/// The fields of an instance that generated code reads directly.
///
/// This struct occupies the last bytes of the instance page, so the `vmctx` pointer handed to
/// generated code points just past it and every field sits at a fixed negative offset from
/// `vmctx`.
#[repr(C)]
#[repr(align(8))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InstanceRuntimeData {
    /// Lowest guest stack pointer at which a hostcall may still be entered. A hostcall
    /// trampoline traps when the stack pointer is at or below this address.
    pub stack_limit: u64,
}

impl InstanceRuntimeData {
    /// Offset of `stack_limit` relative to `vmctx`.
    pub fn vmctx_offset_of_stack_limit() -> i32 {
        offset_of!(InstanceRuntimeData, stack_limit) as i32 - size_of::<InstanceRuntimeData>() as i32
    }
}
