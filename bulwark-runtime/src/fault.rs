//! The path by which running guest code raises a trap.
//!
//! Traps unwind out of the guest to [`Instance::run()`](../instance/struct.Instance.html#method.run),
//! which reports them as `Error::RuntimeFault`. A guest frame that would exhaust the stack and a
//! hostcall entered without enough headroom both come through [`raise()`](fn.raise.html), so the
//! two are indistinguishable to the embedder.

use crate::instance::{FaultDetails, TerminationDetails};
use bulwark_module::TrapCode;
use std::any::Any;
use std::panic;

/// The unwind payload of a raised trap.
pub(crate) struct RaisedTrap {
    trapcode: TrapCode,
}

/// Raise a trap in the running instance.
///
/// Control never returns to the caller; frames between here and the instance's entrypoint are
/// unwound. Panic hooks are not run.
pub fn raise(trapcode: TrapCode) -> ! {
    tracing::debug!(%trapcode, "raising trap");
    panic::resume_unwind(Box::new(RaisedTrap { trapcode }))
}

/// How a guest run ended, when it did not return.
#[derive(Debug)]
pub(crate) enum Unwound {
    Fault(FaultDetails),
    Terminated(TerminationDetails),
}

/// Sort the payload of an unwind that reached the instance's entrypoint.
pub(crate) fn classify(payload: Box<dyn Any + Send + 'static>) -> Unwound {
    let payload = match payload.downcast::<RaisedTrap>() {
        Ok(trap) => {
            return Unwound::Fault(FaultDetails {
                fatal: false,
                trapcode: Some(trap.trapcode),
            })
        }
        Err(payload) => payload,
    };
    match payload.downcast::<TerminationDetails>() {
        Ok(details) => Unwound::Terminated(*details),
        Err(other) => Unwound::Terminated(TerminationDetails::OtherPanic(other)),
    }
}
