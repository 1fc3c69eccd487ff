/// Flow run logs: durable store, live fan-out and retention

pub mod sink;
pub mod store;
pub mod types;

pub use sink::{LiveMessage, LogSink, LogSubscription};
pub use store::{LogStore, MemoryLogStore, SqliteLogStore};
pub use types::{group_by_run, LogEntry, LogPage, LogType, NewLogEntry, PageRequest, RunLogGroup};
