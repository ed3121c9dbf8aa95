//! Unified error type for file parsing and report generation.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("core error: {0}")]
    Core(#[from] cvc_core::CoreError),

    #[error("{0}")]
    Other(String),
}

pub type IoResult<T> = Result<T, IoError>;

impl From<String> for IoError {
    fn from(s: String) -> Self {
        IoError::Other(s)
    }
}

impl From<&str> for IoError {
    fn from(s: &str) -> Self {
        IoError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_includes_line() {
        let err = IoError::Parse {
            line: 12,
            message: "unexpected token".into(),
        };
        assert!(err.to_string().contains("line 12"));
    }
}
