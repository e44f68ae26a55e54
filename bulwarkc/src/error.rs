use bulwark_module::{Signature, TrapCode};
use cranelift_module::ModuleError as ClifModuleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    //
    // General #[from] implementations.
    #[error("Bindings")]
    Bindings(#[from] bulwark_module::Error),
    #[error("Clif module")]
    ClifModuleError(#[from] ClifModuleError),
    #[error("I/O")]
    IOError(#[from] std::io::Error),
    #[error("Wasm validation")]
    WasmValidation(#[from] wasmparser::BinaryReaderError),
    //
    // Cannot apply #[from] or #[source] to these error types due to missing traits.
    #[error("Function definition error in {symbol}")]
    FunctionDefinition {
        symbol: String,
        #[source]
        source: ClifModuleError,
    },
    #[error("Verification of {symbol} failed: {message}")]
    Verification { symbol: String, message: String },
    #[error("Object artifact: {1}. {0:?}")]
    ObjectArtifact(object::write::Error, String),
    #[error("Output function: error writing function {1}")]
    OutputFunction(std::fmt::Error, String),
    //
    // And all the rest
    #[error("Input: {0}")]
    Input(String),
    #[error("Unresolved import {module}::{name}")]
    UnresolvedSymbol {
        module: String,
        name: String,
        #[source]
        source: bulwark_module::Error,
    },
    #[error("Unsupported signature for {symbol}: {message}")]
    UnsupportedSignature { symbol: String, message: String },
    #[error("Hostcall {symbol} is bound with signature {first} and with signature {second}")]
    SignatureMismatch {
        symbol: String,
        first: Signature,
        second: Signature,
    },
    #[error("Trap code {0:?} has no bulwark equivalent")]
    UnknownTrapCode(String),
    #[error("Trampoline {symbol} has no {expected} trap site")]
    MissingTrapSite { symbol: String, expected: TrapCode },
    #[error("Unsupported: {0}")]
    Unsupported(String),
}
