//! Progress sinks: where the pipeline publishes execution records.
//!
//! The pipeline calls [`ProgressSink::publish`] once per command, in index
//! order, before moving on. A sink decides what to do with the record
//! (print it, buffer it, forward it) and must not assume it is the only
//! observer of a process-wide stream: interleaving with other runs' sinks
//! is fine, reordering within one run is not.

use std::sync::Mutex;

use crate::template::ExecutionRecord;

pub trait ProgressSink {
    /// Fire-and-forget from the pipeline's perspective. Must not panic.
    fn publish(&self, record: &ExecutionRecord);
}

/// Discards everything. For callers that only want the final report.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn publish(&self, _record: &ExecutionRecord) {}
}

/// Buffers records in memory, in publish order.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<ExecutionRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ExecutionRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProgressSink for MemorySink {
    fn publish(&self, record: &ExecutionRecord) {
        match self.records.lock() {
            Ok(mut guard) => guard.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }
    }
}

/// Streams one status line per record to stderr. The CLI's default sink.
pub struct StatusSink;

impl ProgressSink for StatusSink {
    fn publish(&self, record: &ExecutionRecord) {
        use crate::template::EXIT_NOT_EXECUTED;

        let verdict = match record.exit_code {
            0 => "ok",
            EXIT_NOT_EXECUTED => "skipped",
            _ => "failed",
        };
        log_status!(
            "run",
            "[{}] {} ({}, exit {})",
            record.index,
            verdict,
            record.execute_on,
            record.exit_code
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{ExecuteOn, EXIT_NOT_EXECUTED};

    fn record(index: usize, exit_code: i32) -> ExecutionRecord {
        ExecutionRecord {
            command: format!("cmd-{}", index),
            stderr: String::new(),
            result: None,
            exit_code,
            execute_on: ExecuteOn::Proxmox,
            index,
        }
    }

    #[test]
    fn memory_sink_preserves_publish_order() {
        let sink = MemorySink::new();
        sink.publish(&record(0, 0));
        sink.publish(&record(1, 1));
        sink.publish(&record(2, EXIT_NOT_EXECUTED));

        let records = sink.records();
        let indices: Vec<usize> = records.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(records[2].exit_code, EXIT_NOT_EXECUTED);
    }
}
