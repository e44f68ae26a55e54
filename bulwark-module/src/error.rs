use thiserror::Error;

/// Errors from loading bindings and decoding shared module data.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error")]
    IOError(#[from] std::io::Error),
    #[error("Malformed hostcall {symbol:?}: {message}")]
    MalformedHostcall { symbol: String, message: String },
    #[error("Parse error at {key}::{value:?}")]
    ParseError { key: String, value: String },
    #[error("Parse json error")]
    ParseJsonError(#[from] serde_json::error::Error),
    #[error("Top-level json must be an object")]
    ParseJsonObjError,
    #[error("Cannot re-bind {key} from {binding} to {attempt}")]
    RebindError {
        key: String,
        binding: String,
        attempt: String,
    },
    #[error("Trap table has length {0}, which is not a whole number of trap sites")]
    TrapTableLength(usize),
    #[error("Unknown trap code {0}")]
    UnknownTrapCode(u32),
    #[error("Unknown module for symbol `{module}::{symbol}`")]
    UnknownModule { module: String, symbol: String },
    #[error("Unknown symbol `{module}::{symbol}`")]
    UnknownSymbol { module: String, symbol: String },
}
