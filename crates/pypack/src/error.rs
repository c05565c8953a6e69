#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppErrorDetail {
    Message(String),
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },
    Registry(pypack_core::RegistryError),
    Pip(pypack_pip::PipError),
}

impl std::fmt::Display for AppErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(message) => write!(f, "{message}"),
            Self::Io { kind, message } => write!(f, "{kind}: {message}"),
            Self::Registry(error) => write!(f, "{error}"),
            Self::Pip(error) => write!(f, "{error}"),
        }
    }
}

impl From<String> for AppErrorDetail {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for AppErrorDetail {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<std::io::Error> for AppErrorDetail {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<pypack_core::RegistryError> for AppErrorDetail {
    fn from(value: pypack_core::RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<pypack_pip::PipError> for AppErrorDetail {
    fn from(value: pypack_pip::PipError) -> Self {
        Self::Pip(value)
    }
}

impl From<pypack_core::UpdateError> for AppErrorDetail {
    fn from(value: pypack_core::UpdateError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<pypack_core::FeedError> for AppErrorDetail {
    fn from(value: pypack_core::FeedError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<pypack_platform::AppPathsError> for AppErrorDetail {
    fn from(value: pypack_platform::AppPathsError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<reqwest::Error> for AppErrorDetail {
    fn from(value: reqwest::Error) -> Self {
        Self::Message(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    Message(String),
    Timeout {
        operation: &'static str,
        seconds: u64,
    },
    OperationFailed {
        operation: &'static str,
        details: AppErrorDetail,
    },
    OperationCancelled {
        operation: &'static str,
    },
    EnvironmentUnavailable {
        reason: AppErrorDetail,
    },
    UpdateCheckFailed {
        target: &'static str,
        details: AppErrorDetail,
    },
    RuntimeUpdateFailed {
        details: AppErrorDetail,
    },
}

impl AppError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub fn timeout(operation: &'static str, seconds: u64) -> Self {
        Self::Timeout { operation, seconds }
    }

    pub fn operation_failed(operation: &'static str, details: impl Into<AppErrorDetail>) -> Self {
        Self::OperationFailed {
            operation,
            details: details.into(),
        }
    }

    pub fn operation_cancelled(operation: &'static str) -> Self {
        Self::OperationCancelled { operation }
    }

    pub fn environment_unavailable(reason: impl Into<AppErrorDetail>) -> Self {
        Self::EnvironmentUnavailable {
            reason: reason.into(),
        }
    }

    pub fn update_check_failed(target: &'static str, details: impl Into<AppErrorDetail>) -> Self {
        Self::UpdateCheckFailed {
            target,
            details: details.into(),
        }
    }

    pub fn runtime_update_failed(details: impl Into<AppErrorDetail>) -> Self {
        Self::RuntimeUpdateFailed {
            details: details.into(),
        }
    }

    /// Cancellation is reported as its own terminal event, not as an error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::OperationCancelled { .. })
    }
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for AppError {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(message) => write!(f, "{message}"),
            Self::Timeout { operation, seconds } => {
                write!(f, "{operation} timed out after {seconds}s")
            }
            Self::OperationFailed { operation, details } => {
                write!(f, "{operation} failed: {details}")
            }
            Self::OperationCancelled { operation } => write!(f, "{operation} cancelled"),
            Self::EnvironmentUnavailable { reason } => write!(f, "{reason}"),
            Self::UpdateCheckFailed { target, details } => {
                write!(f, "{target} update check failed: {details}")
            }
            Self::RuntimeUpdateFailed { details } => {
                write!(f, "Update process failed: {details}")
            }
        }
    }
}

impl std::error::Error for AppError {}
