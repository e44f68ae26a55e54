mod mock;

pub use crate::module::mock::MockModuleBuilder;

use crate::error::Error;
use crate::val::Val;
use crate::vmctx::Vmctx;
use bulwark_module::ImportFunction;
use std::sync::Arc;

/// A guest function, called with the instance's context and its arguments.
pub type GuestFunc = Arc<dyn Fn(&mut Vmctx<'_>, &[Val]) -> Vec<Val> + Send + Sync>;

/// Details about a program that can be linked against hostcalls and run in an instance.
///
/// The runtime does not compile guest code; a `Module` hands it callable exports together with
/// the hostcall imports those exports may reach through their `Vmctx`.
pub trait Module: Send + Sync {
    /// The functions this module imports, in import index order.
    fn imports(&self) -> &[ImportFunction];

    /// Look up an exported function by its symbol name.
    fn get_export_func(&self, sym: &str) -> Result<GuestFunc, Error>;
}
