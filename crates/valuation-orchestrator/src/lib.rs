//! Session-scoped orchestration of the valuation engine: calculation lock,
//! cost budget, debounced edits and insight forwarding.

pub mod assumptions;
pub mod config;
pub mod insights;
pub mod orchestrator;
pub mod session;

pub use assumptions::{wacc_bounds, AssumptionBuilder};
pub use config::OrchestratorConfig;
pub use insights::synthesize_offline;
pub use orchestrator::{CalculationOutcome, InsightOutcome, Trigger, ValuationOrchestrator};
pub use session::{CostBudget, Session, SessionState};
