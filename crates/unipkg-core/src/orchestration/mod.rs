pub mod aggregator;
pub mod install_queue;
pub mod installation;

pub use aggregator::{
    AdapterEntry, AggregateEvent, AggregateItem, AggregateResult, AggregateRun, Aggregator,
    ManagerStatus,
};
pub use install_queue::{InstallQueue, InstallSlot};
pub use installation::{
    InstallationCoordinator, OperationEvent, OperationHandle, OperationOutcome,
    OperationSnapshot, OperationState, classify_outcome,
};

use crate::models::CoreError;

pub type OrchestrationResult<T> = Result<T, CoreError>;
