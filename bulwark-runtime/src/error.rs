use crate::instance::{FaultDetails, TerminationDetails};
use anyhow::Error as AnyError;
use thiserror::Error;

/// Bulwark runtime errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value or method argument was rejected.
    ///
    /// Invalid [`Limits`](struct.Limits.html) are reported with this variant, naming the bound
    /// that was violated.
    #[error("Invalid argument: {}", _0)]
    InvalidArgument(&'static str),

    /// A [`Region`](trait.Region.html) cannot currently accommodate additional instances.
    #[error("Region capacity reached: {} instances", _0)]
    RegionFull(usize),

    /// A module error occurred; this covers every failure to link a module against its hostcalls.
    #[error("Module error: {}", _0)]
    ModuleError(ModuleError),

    /// An attempt to look up a guest export or a host function by its symbol name failed.
    #[error("Symbol not found: {}", _0)]
    SymbolNotFound(String),

    /// An instance aborted due to a runtime fault.
    ///
    /// A hostcall entered without enough stack headroom is reported here, with the same
    /// `TrapCode::StackOverflow` as a guest that exhausts its own stack.
    #[error("Runtime fault: {}", _0)]
    RuntimeFault(FaultDetails),

    /// An instance terminated, potentially with extra information about the termination.
    ///
    /// This condition can arise from a hostcall explicitly calling
    /// [`Vmctx::terminate()`](vmctx/struct.Vmctx.html#method.terminate), or from a panic in a
    /// hostcall or guest function.
    #[error("Runtime terminated")]
    RuntimeTerminated(TerminationDetails),

    /// A catch-all for internal errors that are likely unrecoverable by the runtime user.
    #[error("Internal error: {}", _0)]
    InternalError(#[source] AnyError),
}

impl From<bulwark_module::Error> for Error {
    fn from(e: bulwark_module::Error) -> Error {
        Error::ModuleError(ModuleError::Bindings(e))
    }
}

impl From<nix::Error> for Error {
    fn from(e: nix::Error) -> Error {
        Error::InternalError(e.into())
    }
}

/// Bulwark module errors.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// A module cannot be linked as defined: an import disagrees with the hostcall it is bound
    /// to, or a hostcall cannot get a trampoline.
    #[error("Incorrect module definition: {}", _0)]
    IncorrectModule(String),

    /// An import could not be resolved through the bindings.
    #[error("Bindings error: {}", _0)]
    Bindings(#[from] bulwark_module::Error),
}

#[macro_export]
macro_rules! bulwark_bail {
    ($e:expr) => {
        return Err(bulwark_format_err!($e));
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err(bulwark_format_err!($fmt, $($arg)*));
    };
}

#[macro_export(local_inner_macros)]
macro_rules! bulwark_ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            bulwark_bail!($e);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            bulwark_bail!($fmt, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! bulwark_format_err {
    ($($arg:tt)*) => { $crate::error::Error::InternalError(anyhow::format_err!($($arg)*)) }
}

#[macro_export]
macro_rules! bulwark_incorrect_module {
    ($($arg:tt)*) => {
        $crate::error::Error::ModuleError(
            $crate::error::ModuleError::IncorrectModule(format!($($arg)*))
        )
    }
}
