//! Unified error type for the rule-checking core.
//!
//! [`CoreError`] covers failures that abort a run outright (malformed
//! netlists are reported as [`crate::diagnostics::Diagnostics`] instead,
//! since most parse problems should not stop a check from completing).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A virtual-net chain exceeded [`crate::ids::MAX_CHAIN_LENGTH`] links.
    /// A chain this long means the equivalence structure itself is
    /// corrupt, not that the circuit is merely big.
    #[error("virtual net chain exceeded {limit} links at net {net}")]
    ChainTooLong { net: u32, limit: usize },

    /// A power/ground voltage expression referenced an undefined macro.
    #[error("undefined macro `{0}` in power expression")]
    UndefinedMacro(String),

    /// Device, net, or power-family id used before being registered.
    #[error("unknown {kind} id: {id}")]
    UnknownId { kind: &'static str, id: u32 },

    /// An id counter would exceed its 32-bit resource limit.
    #[error("{kind} count exceeds resource limit ({limit})")]
    ResourceLimit { kind: &'static str, limit: u32 },

    /// Data validation errors surfaced outside the diagnostics channel
    /// (e.g. a config value that makes the run meaningless).
    #[error("validation error: {0}")]
    Validation(String),

    /// Generic errors, for wrapping errors from outside the core crate.
    #[error("{0}")]
    Other(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Other(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(s: String) -> Self {
        CoreError::Other(s)
    }
}

impl From<&str> for CoreError {
    fn from(s: &str) -> Self {
        CoreError::Other(s.to_string())
    }
}
