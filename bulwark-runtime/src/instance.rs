use crate::alloc::Alloc;
use crate::error::Error;
use crate::fault::{self, Unwound};
use crate::hostcall::LinkedModule;
use crate::val::Val;
use crate::vmctx::Vmctx;
use bulwark_module::{hostcall_stack_limit, InstanceRuntimeData, TrapCode};
use std::any::Any;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// The execution state of an instance.
#[derive(Debug)]
pub enum State {
    /// The instance is ready to run.
    Ready,
    /// The instance is running guest code.
    Running,
    /// The instance has faulted, and must be reset before it can run again.
    Faulted { details: FaultDetails },
    /// The instance was terminated, and must be reset before it can run again.
    Terminated,
}

impl State {
    pub fn is_ready(&self) -> bool {
        matches!(self, State::Ready)
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, State::Faulted { .. })
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, State::Terminated)
    }
}

/// A linked Bulwark program, together with its dedicated memory.
///
/// `Instance`s are never created by runtime users directly, but rather are acquired from
/// [`Region`](../region/trait.Region.html)s. The instance's stack limit lives in the page at the
/// start of its slot:
///
/// ```text
/// slot.start:
///   // unused space
///   InstanceRuntimeData {
///     .stack_limit
///   } // last address *inside* `InstanceRuntimeData` is vmctx - 1
/// vmctx: // one instance page into the slot
/// ```
///
/// The limit is recomputed whenever the instance gets a slot: on creation, on
/// [`reset()`](#method.reset) and on [`reset_with_alloc()`](#method.reset_with_alloc).
pub struct Instance {
    /// The linked program that is the entrypoint for the instance.
    module: Arc<LinkedModule>,

    /// The memory backing this instance.
    alloc: Alloc,

    state: State,

    /// The simulated guest stack pointer; starts at the top of the stack for every run.
    pub(crate) guest_sp: u64,

    /// The first trap raised during the current run. Once set, the run ends in a fault no matter
    /// how the guest function returns.
    pub(crate) pending_trap: Option<TrapCode>,
}

impl Instance {
    pub(crate) fn new(alloc: Alloc, module: Arc<LinkedModule>) -> Result<Self, Error> {
        // every allocation is checked again, even though its region validated the same limits
        alloc.slot().limits.validate()?;
        let guest_sp = alloc.slot().stack_top() as u64;
        let mut inst = Instance {
            module,
            alloc,
            state: State::Ready,
            guest_sp,
            pending_trap: None,
        };
        // Ensure the hostcall limit tracked in this instance's guest-shared data is up-to-date.
        inst.set_hostcall_stack_reservation();
        Ok(inst)
    }

    /// Run a function with arguments in the guest context at the given entrypoint.
    ///
    /// ```no_run
    /// # use bulwark_runtime::Instance;
    /// # let mut instance: Instance = unimplemented!();
    /// // regular execution yields `Ok` with the function's results
    /// let results = instance.run("factorial", &[5i64.into()]).unwrap();
    /// assert_eq!(results[0].as_i64(), Some(120));
    ///
    /// // runtime faults yield `Err(Error::RuntimeFault(_))`
    /// let result = instance.run("faulting_function", &[]);
    /// assert!(result.is_err());
    /// ```
    ///
    /// The guest stack pointer starts at the top of the instance's stack. An instance that has
    /// faulted or been terminated must be [`reset()`](#method.reset) before it runs again.
    pub fn run(&mut self, entrypoint: &str, args: &[Val]) -> Result<Vec<Val>, Error> {
        match self.state {
            State::Ready => (),
            State::Running => {
                bulwark_bail!("instance is already running; this is a bug");
            }
            State::Faulted { .. } | State::Terminated => {
                return Err(Error::InvalidArgument(
                    "instance must be reset after a fault or termination",
                ));
            }
        }

        let expected = self.expected_stack_limit();
        let actual = self.stack_limit();
        bulwark_ensure!(
            actual == expected,
            "stack limit {:#x} is stale; the instance slot requires {:#x}",
            actual,
            expected
        );

        let func = self.module.get_export_func(entrypoint)?;

        self.guest_sp = self.alloc.slot().stack_top() as u64;
        self.pending_trap = None;
        self.state = State::Running;
        let res = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut vmctx = Vmctx::new(self);
            func(&mut vmctx, args)
        }));
        self.guest_sp = self.alloc.slot().stack_top() as u64;

        // a trap is terminal even when guest code caught its unwind
        if let Some(trapcode) = self.pending_trap.take() {
            let details = FaultDetails {
                fatal: false,
                trapcode: Some(trapcode),
            };
            tracing::debug!(entrypoint, %details, "guest faulted");
            self.state = State::Faulted {
                details: details.clone(),
            };
            return Err(Error::RuntimeFault(details));
        }

        match res {
            Ok(results) => {
                self.state = State::Ready;
                Ok(results)
            }
            Err(payload) => match fault::classify(payload) {
                Unwound::Fault(details) => {
                    tracing::debug!(entrypoint, %details, "guest faulted");
                    self.state = State::Faulted {
                        details: details.clone(),
                    };
                    Err(Error::RuntimeFault(details))
                }
                Unwound::Terminated(details) => {
                    tracing::debug!(entrypoint, ?details, "guest terminated");
                    self.state = State::Terminated;
                    Err(Error::RuntimeTerminated(details))
                }
            },
        }
    }

    /// Reset the instance so that it can run again, recomputing its stack limit.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.alloc.slot().limits.validate()?;
        self.guest_sp = self.alloc.slot().stack_top() as u64;
        self.pending_trap = None;
        self.state = State::Ready;
        self.set_hostcall_stack_reservation();
        Ok(())
    }

    /// Move the instance onto a new backing allocation, then [`reset()`](#method.reset) it.
    ///
    /// The previous allocation is returned to its region. The new allocation may come from a
    /// region with different limits; the stack limit follows the new slot.
    pub fn reset_with_alloc(&mut self, alloc: Alloc) -> Result<(), Error> {
        alloc.slot().limits.validate()?;
        let old = mem::replace(&mut self.alloc, alloc);
        drop(old);
        self.reset()
    }

    #[inline]
    pub fn set_hostcall_stack_reservation(&mut self) {
        let limit = self.expected_stack_limit();
        self.get_instance_implicits_mut().stack_limit = limit;
        tracing::debug!(
            stack_limit = limit,
            hostcall_reservation = self.alloc.slot().limits.hostcall_reservation,
            "set hostcall stack limit"
        );
    }

    /// The lowest guest stack pointer at which a hostcall can still be entered.
    pub fn stack_limit(&self) -> u64 {
        self.get_instance_implicits().stack_limit
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn is_faulted(&self) -> bool {
        self.state.is_faulted()
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }

    pub fn alloc(&self) -> &Alloc {
        &self.alloc
    }

    pub fn module(&self) -> &Arc<LinkedModule> {
        &self.module
    }
}

// Private API
impl Instance {
    fn expected_stack_limit(&self) -> u64 {
        let slot = self.alloc.slot();
        // The `.stack` field is the lowest address of the stack. Because the stack grows
        // downward, the limit is the reservation upwards from there.
        hostcall_stack_limit(
            slot.stack_top() as u64,
            slot.limits.stack_size as u64,
            slot.limits.hostcall_reservation as u64,
        )
    }

    // InstanceRuntimeData is placed such that it ends at the end of the instance page, which is
    // where `vmctx` points.
    #[inline]
    fn get_instance_implicits(&self) -> &InstanceRuntimeData {
        unsafe {
            let implicits_ptr = (self.alloc.slot().vmctx() as *const u8)
                .sub(mem::size_of::<InstanceRuntimeData>())
                as *const InstanceRuntimeData;
            &*implicits_ptr
        }
    }

    #[inline]
    fn get_instance_implicits_mut(&mut self) -> &mut InstanceRuntimeData {
        unsafe {
            let implicits_ptr = (self.alloc.slot().vmctx() as *mut u8)
                .sub(mem::size_of::<InstanceRuntimeData>())
                as *mut InstanceRuntimeData;
            &mut *implicits_ptr
        }
    }
}

/// Information about a runtime fault.
///
/// Runtime faults are raised by guest code that exhausts its stack, and by hostcall trampolines
/// that find too little stack to enter their hostcall. Both report `TrapCode::StackOverflow`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaultDetails {
    /// If true, the fault cannot be contained to the instance.
    pub fatal: bool,
    /// Information about the type of fault that occurred.
    pub trapcode: Option<TrapCode>,
}

impl std::fmt::Display for FaultDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.fatal {
            write!(f, "fault FATAL ")?;
        } else {
            write!(f, "fault ")?;
        }

        if let Some(trapcode) = self.trapcode {
            write!(f, "{:?} ({})", trapcode, trapcode)
        } else {
            write!(f, "TrapCode::UNKNOWN")
        }
    }
}

/// Information about a terminated guest.
pub enum TerminationDetails {
    /// Calls to `Vmctx::terminate()` provide a payload for use by the embedder.
    Provided {
        type_name: &'static str,
        provided: Box<dyn Any + Send + 'static>,
    },
    /// A panic occurred during a guest function or hostcall other than the specialized unwinding
    /// used to raise traps and terminate instances.
    ///
    /// The panic payload contained in this variant can be rethrown using
    /// [`resume_unwind`](https://doc.rust-lang.org/std/panic/fn.resume_unwind.html) once returned
    /// to the host context.
    OtherPanic(Box<dyn Any + Send + 'static>),
}

impl TerminationDetails {
    pub fn provide<A: Any + Send + 'static>(details: A) -> Self {
        TerminationDetails::Provided {
            type_name: std::any::type_name::<A>(),
            provided: Box::new(details),
        }
    }

    pub fn provided_details(&self) -> Option<&dyn Any> {
        match self {
            TerminationDetails::Provided { provided, .. } => Some(provided.as_ref()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for TerminationDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TerminationDetails::")?;
        match self {
            TerminationDetails::Provided { type_name, .. } => write!(f, "Provided({})", type_name),
            TerminationDetails::OtherPanic(_) => write!(f, "OtherPanic(Any)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::Limits;
    use crate::hostcall::Linker;
    use crate::module::MockModuleBuilder;
    use crate::region::mmap::MmapRegion;
    use crate::region::Region;
    use bulwark_module::bindings::Bindings;

    // Because of deref coercions, the code above was tricky to get right-
    // test that a string makes it through
    #[test]
    fn termination_details_any_typing() {
        let hello = "hello, world".to_owned();
        let details = TerminationDetails::provide(hello.clone());
        let provided = details.provided_details().expect("got Provided");
        assert_eq!(
            provided.downcast_ref::<String>().expect("right type"),
            &hello
        );
    }

    fn noop_instance(limits: &Limits) -> (Arc<MmapRegion>, Instance) {
        let region = MmapRegion::create(1, limits).expect("region created");
        let module = Linker::new(Bindings::empty())
            .link(
                MockModuleBuilder::new()
                    .with_export_func("noop", |_, _| vec![])
                    .build(),
            )
            .expect("module links");
        let inst = region.new_instance(module).expect("instance created");
        (region, inst)
    }

    #[test]
    fn stale_stack_limit_is_refused() {
        let (_region, mut inst) = noop_instance(&Limits::default());
        inst.run("noop", &[]).expect("fresh instance runs");

        inst.get_instance_implicits_mut().stack_limit = 0;
        match inst.run("noop", &[]) {
            Err(Error::InternalError(_)) => (),
            res => panic!("unexpected result: {:?}", res),
        }

        inst.reset().expect("reset succeeds");
        inst.run("noop", &[]).expect("reset instance runs");
    }

    #[test]
    fn limit_lives_just_below_vmctx() {
        let (_region, inst) = noop_instance(&Limits::default());
        let slot = inst.alloc().slot();
        let raw = unsafe {
            (slot.vmctx() as *const u8)
                .offset(InstanceRuntimeData::vmctx_offset_of_stack_limit() as isize)
                .cast::<u64>()
                .read()
        };
        assert_eq!(raw, inst.stack_limit());
        assert_eq!(
            inst.stack_limit(),
            slot.stack as u64 + Limits::default().hostcall_reservation as u64
        );
    }
}
