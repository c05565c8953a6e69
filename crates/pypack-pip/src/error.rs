use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipError {
    #[error("Python interpreter not found")]
    InterpreterNotFound,

    #[error("Command failed: {stderr}")]
    CommandFailed { stderr: String },

    #[error("Failed to parse {what}: {details}")]
    ParseError { what: &'static str, details: String },

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Timeout waiting for {command} after {seconds}s")]
    Timeout { command: &'static str, seconds: u64 },
}

impl PipError {
    pub(crate) fn parse(what: &'static str, details: impl Into<String>) -> Self {
        Self::ParseError {
            what,
            details: details.into(),
        }
    }
}

impl From<std::io::Error> for PipError {
    fn from(err: std::io::Error) -> Self {
        PipError::IoError(err.to_string())
    }
}
