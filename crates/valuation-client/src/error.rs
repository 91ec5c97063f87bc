use thiserror::Error;
use valuation_core::ValuationError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Every transport or decoding failure is an external-call failure to the
/// engine; callers fall back rather than retry.
impl From<ClientError> for ValuationError {
    fn from(e: ClientError) -> Self {
        ValuationError::ExternalCallFailure(e.to_string())
    }
}
