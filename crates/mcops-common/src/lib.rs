//! # mcops Common
//!
//! Types shared by every layer of the game-server control plane: the error
//! taxonomy, health and outcome value objects, and config serde helpers.

pub mod duration_serde;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{
    Error, OperationError, OperationResult, ProcessError, ProcessResult, RconError, RconResult,
    Result, ResultExt, SchedulerError, SchedulerResult,
};
pub use types::{
    ActionOutcome, ErrorCode, HealthSignals, HealthSnapshot, ReadyChecks, RecoveryStep,
    RecoveryStepKind, RecoveryTrace, StateReason, StepStatus, StopMethod,
};
