use crate::types::Signature;
use serde::{Deserialize, Serialize};

/// A function a guest module imports from its host, by namespace and name.
///
/// Imports are resolved to host symbols through [`Bindings`](crate::bindings::Bindings); the
/// guest is then linked against the trampoline for that symbol rather than the symbol itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFunction {
    pub module: String,
    pub name: String,
    pub signature: Signature,
}

impl ImportFunction {
    pub fn new<M: Into<String>, N: Into<String>>(module: M, name: N, signature: Signature) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            signature,
        }
    }
}
