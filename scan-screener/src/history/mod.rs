//! Execution log and result archive.

mod archive;
mod execution_log;

pub use archive::{ResultArchive, SelectionStat};
pub use execution_log::{ExecutionLog, ExecutionRecord, EXECUTION_LOG_FILE, LOG_RETENTION_DAYS};
