pub mod batch;
pub mod executor;
pub mod prioritize;

pub use batch::optimize_batch;
pub use executor::{execute_optimized, CancellationToken, ExecutionResult, OperationRunner};
pub use prioritize::{prioritize_artifacts, prioritize_updates, UpdatePlan};
