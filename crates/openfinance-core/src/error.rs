use thiserror::Error;

/// Error kinds mirroring the platform's error taxonomy. Each variant carries a
/// stable machine-readable `error_code` alongside a human message; internal
/// diagnostic detail stays in the `message` and is never echoed verbatim to a TPP.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    #[error("security: {message}")]
    Security { error_code: &'static str, message: String },

    #[error("authorization: {message}")]
    Authorization { error_code: &'static str, message: String },

    #[error("validation: {message}")]
    Validation { error_code: &'static str, message: String },

    #[error("business rule: {message}")]
    BusinessRule { error_code: &'static str, message: String },

    #[error("idempotency conflict: {message}")]
    IdempotencyConflict { message: String },

    #[error("concurrency: {message}")]
    Concurrency { message: String },

    #[error("transient: {message}")]
    Transient { message: String },

    #[error("resource not found: {message}")]
    ResourceNotFound { message: String },

    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("fatal: {message}")]
    Fatal { message: String },
}

impl PlatformError {
    pub fn security(error_code: &'static str, message: impl Into<String>) -> Self {
        Self::Security { error_code, message: message.into() }
    }

    pub fn authorization(error_code: &'static str, message: impl Into<String>) -> Self {
        Self::Authorization { error_code, message: message.into() }
    }

    pub fn validation(error_code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { error_code, message: message.into() }
    }

    pub fn business_rule(error_code: &'static str, message: impl Into<String>) -> Self {
        Self::BusinessRule { error_code, message: message.into() }
    }

    pub fn idempotency_conflict(message: impl Into<String>) -> Self {
        Self::IdempotencyConflict { message: message.into() }
    }

    pub fn concurrency(message: impl Into<String>) -> Self {
        Self::Concurrency { message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::ResourceNotFound { message: message.into() }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable { message: message.into() }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal { message: message.into() }
    }

    /// Stable `errorCode` surfaced in user-visible error bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Security { error_code, .. } => error_code,
            Self::Authorization { error_code, .. } => error_code,
            Self::Validation { error_code, .. } => error_code,
            Self::BusinessRule { error_code, .. } => error_code,
            Self::IdempotencyConflict { .. } => "IDEMPOTENCY_CONFLICT",
            Self::Concurrency { .. } => "CONCURRENCY",
            Self::Transient { .. } => "TRANSIENT",
            Self::ResourceNotFound { .. } => "RESOURCE_NOT_FOUND",
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::Fatal { .. } => "FATAL",
        }
    }

    /// Whether the handler itself may bound-retry the failed operation.
    pub fn is_internally_retryable(&self) -> bool {
        matches!(self, Self::Concurrency { .. })
    }

    /// Whether the caller may retry the request as-is.
    pub fn is_caller_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;
