/// Runtime: trigger dispatch, node execution and the per-run engine
///
/// - `dispatcher` maps domain events to trigger nodes and starts runs
/// - `engine` walks a run's graph as concurrent branch tasks
/// - `executor` implements each catalog node type
/// - `scheduler` runs log retention on a cron schedule

pub mod condition;
pub mod dispatcher;
pub mod engine;
pub mod executor;
pub mod scheduler;
pub mod template;

pub use dispatcher::{TriggerDispatcher, TriggerEvent};
pub use engine::{ExecutionEngine, RunStatus, RunSummary, StartedRun};
pub use executor::{NodeContext, NodeExecutor, NodeOutcome};
pub use scheduler::{LogRetentionScheduler, DEFAULT_RETENTION_SCHEDULE};
