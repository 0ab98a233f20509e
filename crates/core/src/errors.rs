use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AnalyticsError {
    #[error("data unavailable: {0}")]
    DataUnavailable(String),
    #[error("{dependency} did not respond within {timeout_ms}ms")]
    DependencyTimeout { dependency: String, timeout_ms: u64 },
    #[error("{dependency} failed: {message}")]
    DependencyError { dependency: String, message: String },
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl AnalyticsError {
    /// Stable snake_case label used as the CLI `error_class`.
    pub fn class(&self) -> &'static str {
        match self {
            Self::DataUnavailable(_) => "data_unavailable",
            Self::DependencyTimeout { .. } => "dependency_timeout",
            Self::DependencyError { .. } => "dependency_error",
            Self::InsufficientData(_) => "insufficient_data",
            Self::InvalidInput(_) => "invalid_input",
        }
    }

    pub fn is_dependency_failure(&self) -> bool {
        matches!(self, Self::DependencyTimeout { .. } | Self::DependencyError { .. })
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl From<AnalyticsError> for InterfaceError {
    fn from(value: AnalyticsError) -> Self {
        let unassigned = "unassigned".to_owned();
        match value {
            AnalyticsError::InvalidInput(message) => {
                Self::BadRequest { message, correlation_id: unassigned }
            }
            AnalyticsError::DataUnavailable(_)
            | AnalyticsError::DependencyTimeout { .. }
            | AnalyticsError::DependencyError { .. } => {
                Self::ServiceUnavailable { message: value.to_string(), correlation_id: unassigned }
            }
            AnalyticsError::InsufficientData(message) => {
                Self::Internal { message, correlation_id: unassigned }
            }
        }
    }
}
