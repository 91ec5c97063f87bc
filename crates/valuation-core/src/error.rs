use thiserror::Error;

/// Failure taxonomy shared by the models, the orchestrator and the data ports.
///
/// Only `CalculationError` is ever surfaced to the presentation layer as a
/// failed valuation; the other variants are recovered from with documented
/// fallbacks.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValuationError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Input out of range: {0}")]
    OutOfRangeInput(String),

    #[error("External call failed: {0}")]
    ExternalCallFailure(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("No active session")]
    NoActiveSession,
}

impl ValuationError {
    pub fn is_calculation_error(&self) -> bool {
        matches!(self, ValuationError::CalculationError(_))
    }
}
