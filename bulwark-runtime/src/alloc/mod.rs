use crate::error::Error;
use crate::region::RegionInternal;
use crate::sysdeps::host_page_size;
use libc::c_void;
use std::sync::{Arc, Weak};

/// Size of the page at the start of every slot that holds the instance's runtime data.
///
/// The `vmctx` pointer handed to guest code and trampolines points just past this page.
pub fn instance_page_size() -> usize {
    host_page_size()
}

/// A set of pointers into virtual memory that can be allocated into an `Alloc`.
///
/// The memory layout in a `Slot` is meant to be reused in order to reduce overhead on region
/// implementations. To back the layout with real memory, use `Region::allocate`.
#[repr(C)]
pub struct Slot {
    /// The beginning of the contiguous virtual memory chunk managed by this `Alloc`.
    ///
    /// The first page of this memory is always backed by real memory, and ends with the
    /// instance's `InstanceRuntimeData`.
    pub start: *mut c_void,

    /// The lowest address of the stack, which follows the instance page and a guard page.
    ///
    /// Because the stack grows downwards, a stack overflow runs into the guard page rather than
    /// into the instance page.
    pub stack: *mut c_void,

    /// Limits of the memory.
    ///
    /// Should not change through the lifetime of the `Alloc`.
    pub limits: Limits,

    pub region: Weak<dyn RegionInternal>,
}

// raw pointers require unsafe impl
unsafe impl Send for Slot {}
unsafe impl Sync for Slot {}

impl Slot {
    /// The highest address of the stack; a new guest stack pointer starts here.
    pub fn stack_top(&self) -> *mut c_void {
        (self.stack as usize + self.limits.stack_size) as *mut c_void
    }

    /// The `vmctx` pointer of an instance living in this slot.
    pub fn vmctx(&self) -> *mut c_void {
        (self.start as usize + instance_page_size()) as *mut c_void
    }
}

/// The structure that manages the allocations backing an `Instance`.
///
/// `Alloc`s are not to be created directly, but rather are created by `Region`s. Dropping an
/// `Alloc` returns its slot to the region.
pub struct Alloc {
    pub slot: Option<Slot>,
    pub region: Arc<dyn RegionInternal>,
}

impl Drop for Alloc {
    fn drop(&mut self) {
        self.region.clone().drop_alloc(self);
    }
}

impl Alloc {
    pub fn slot(&self) -> &Slot {
        self.slot
            .as_ref()
            .expect("alloc missing its slot before drop")
    }
}

/// Runtime limits for the memories that back a Bulwark instance.
///
/// Each value is specified in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct Limits {
    /// Size of the guest stack; must be a multiple of the host page size. (default 128K)
    pub stack_size: usize,
    /// Amount of the guest stack that must be available for hostcalls. (default 32K)
    pub hostcall_reservation: usize,
}

impl Limits {
    pub const fn default() -> Limits {
        Limits {
            stack_size: 128 * 1024,
            hostcall_reservation: 32 * 1024,
        }
    }

    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub const fn with_hostcall_reservation(mut self, hostcall_reservation: usize) -> Self {
        self.hostcall_reservation = hostcall_reservation;
        self
    }

    /// Size of the virtual memory backing one slot under these limits.
    pub fn total_memory_size(&self) -> Result<usize, Error> {
        // Memory is laid out as follows:
        // * the instance page, ending in the runtime data that `vmctx` points past
        // * one guard page (to catch stack overflow)
        // * the stack
        [instance_page_size(), host_page_size(), self.stack_size]
            .iter()
            .try_fold(0usize, |acc, &x| acc.checked_add(x))
            .ok_or(Error::InvalidArgument(
                "stack size overflows the address space",
            ))
    }

    /// Validate that the stack is page-aligned and not empty, and that the hostcall reservation
    /// fits inside it.
    pub fn validate(&self) -> Result<(), Error> {
        if self.stack_size % host_page_size() != 0 {
            return Err(Error::InvalidArgument(
                "stack size must be a multiple of host page size",
            ));
        }
        if self.stack_size == 0 {
            return Err(Error::InvalidArgument("stack size must be greater than 0"));
        }
        self.total_memory_size()?;
        validate_hostcall_reservation(self.hostcall_reservation, self.stack_size)?;
        if self.hostcall_reservation == self.stack_size {
            tracing::info!(
                "hostcall reservation of {} covers the entire stack; every hostcall will fail",
                self.hostcall_reservation
            );
        } else if self.hostcall_reservation == 0 {
            tracing::debug!("no stack is reserved for hostcalls");
        }
        Ok(())
    }
}

/// Check a hostcall reservation against the stack it is reserved from.
///
/// We allow `hostcall_reservation == stack_size`, a circumstance that guarantees any hostcalls
/// will fail with a StackOverflow.
pub fn validate_hostcall_reservation(
    hostcall_reservation: usize,
    stack_size: usize,
) -> Result<(), Error> {
    if hostcall_reservation > stack_size {
        return Err(Error::InvalidArgument(
            "hostcall reserved space must not be greater than stack size",
        ));
    }
    Ok(())
}

pub mod tests;
