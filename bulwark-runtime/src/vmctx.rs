//! Interfaces for guest code and hostcalls to reach the running instance.

use crate::fault;
use crate::instance::{Instance, TerminationDetails};
use crate::val::Val;
use bulwark_module::{InstanceRuntimeData, TrapCode};
use libc::c_void;
use std::any::Any;
use std::panic;

/// Bytes a frame must leave free beneath it for the return address of its next call.
const RETURN_ADDRESS_SIZE: u64 = 8;

/// A handle to a running instance's context.
///
/// Guest functions and hostcalls receive one for the duration of a call. It carries the guest's
/// simulated stack pointer, and is the only route from guest code to the instance's hostcalls.
pub struct Vmctx<'a> {
    inst: &'a mut Instance,
}

impl<'a> Vmctx<'a> {
    pub(crate) fn new(inst: &'a mut Instance) -> Self {
        Vmctx { inst }
    }

    /// Return the underlying `vmctx` pointer, one instance page into the instance's slot.
    pub fn as_raw(&self) -> *const c_void {
        self.inst.alloc().slot().vmctx()
    }

    /// The current guest stack pointer.
    pub fn stack_pointer(&self) -> u64 {
        self.inst.guest_sp
    }

    /// The instance's stack limit, read from `vmctx` at the same offset compiled trampolines
    /// use.
    pub fn stack_limit(&self) -> u64 {
        let offset = InstanceRuntimeData::vmctx_offset_of_stack_limit() as isize;
        unsafe {
            (self.as_raw() as *const u8)
                .offset(offset)
                .cast::<u64>()
                .read()
        }
    }

    /// Run `f` in a new guest stack frame of `frame_size` bytes.
    ///
    /// A frame that does not fit in the remaining stack raises `TrapCode::StackOverflow`. The
    /// stack pointer is restored when `f` returns or unwinds.
    pub fn with_frame<R, F>(&mut self, frame_size: usize, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.check_pending_trap();
        let sp = self.inst.guest_sp;
        let floor = self.inst.alloc().slot().stack as u64 + RETURN_ADDRESS_SIZE;
        let new_sp = match sp.checked_sub(frame_size as u64) {
            Some(new_sp) if new_sp >= floor => new_sp,
            _ => {
                tracing::debug!(stack_pointer = sp, frame_size, "guest stack exhausted");
                self.trap(TrapCode::StackOverflow)
            }
        };
        let mut frame = Frame {
            vmctx: self,
            saved_sp: sp,
        };
        frame.vmctx.inst.guest_sp = new_sp;
        f(&mut *frame.vmctx)
    }

    /// The index of the import `module::name`, if the instance's module has one.
    pub fn import_index(&self, module: &str, name: &str) -> Option<usize> {
        self.inst.module().import_index(module, name)
    }

    /// Call the hostcall that import `index` is linked to, through its trampoline.
    ///
    /// An index with no import raises `TrapCode::IndirectCallToNull`.
    pub fn call_import(&mut self, index: usize, args: &[Val]) -> Vec<Val> {
        self.check_pending_trap();
        let trampoline = match self.inst.module().import_trampoline(index) {
            Some(trampoline) => trampoline.clone(),
            None => self.trap(TrapCode::IndirectCallToNull),
        };
        trampoline.call(self, args)
    }

    /// Raise a trap, recording it on the instance first.
    ///
    /// The recorded trap ends the current run even if guest code catches the unwind, and every
    /// later call or frame in the same run raises it again.
    pub(crate) fn trap(&mut self, trapcode: TrapCode) -> ! {
        let trapcode = *self.inst.pending_trap.get_or_insert(trapcode);
        fault::raise(trapcode)
    }

    fn check_pending_trap(&self) {
        if let Some(trapcode) = self.inst.pending_trap {
            fault::raise(trapcode);
        }
    }

    /// Terminate this guest and return to the host context.
    ///
    /// The details are returned to the embedder as
    /// `Error::RuntimeTerminated(TerminationDetails::Provided { .. })`.
    pub fn terminate<D: Any + Send + 'static>(&mut self, details: D) -> ! {
        panic::resume_unwind(Box::new(TerminationDetails::provide(details)))
    }
}

/// A guest stack frame; dropping it pops the frame.
struct Frame<'v, 'a> {
    vmctx: &'v mut Vmctx<'a>,
    saved_sp: u64,
}

impl Drop for Frame<'_, '_> {
    fn drop(&mut self) {
        self.vmctx.inst.guest_sp = self.saved_sp;
    }
}
