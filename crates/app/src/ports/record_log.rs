//! Record-log port: durable sink for the correlation log.

use std::sync::{Arc, Mutex, PoisonError};

use flowhub_domain::error::FlowHubError;
use flowhub_domain::record::LogRecord;

/// Append-only sink for [`LogRecord`]s.
///
/// Implementations must not panic on I/O failure; the correlator logs the
/// returned error and carries on with its in-memory history.
pub trait RecordLog: Send {
    /// Append one record.
    ///
    /// # Errors
    ///
    /// Returns [`FlowHubError::Storage`] if the record could not be persisted.
    fn append(&mut self, record: &LogRecord) -> Result<(), FlowHubError>;
}

/// In-memory log; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordLog {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemoryRecordLog {
    /// Snapshot of everything appended so far, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RecordLog for MemoryRecordLog {
    fn append(&mut self, record: &LogRecord) -> Result<(), FlowHubError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

impl RecordLog for Box<dyn RecordLog> {
    fn append(&mut self, record: &LogRecord) -> Result<(), FlowHubError> {
        (**self).append(record)
    }
}
