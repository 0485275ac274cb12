//! Pipeline step log
//!
//! Append-only audit log of `StepRecord`s. Step names recur when a step is
//! re-emitted with an updated status (pending, then success or error); the
//! full ordered log is kept for audit while `latest_by_name` gives the
//! deduplicated view consumers display, preferring the record with the
//! latest timestamp.

use codemend_core::{StepRecord, StepStatus};
use std::collections::HashMap;

/// Step name constants shared by both pipeline variants
pub mod step {
    pub const PARSE_REQUEST: &str = "parse_request";
    pub const RATE_LIMIT_CHECK: &str = "rate_limit_check";
    pub const VALIDATE_SIZE: &str = "validate_size";
    pub const EXECUTE_ORIGINAL: &str = "execute_original";
    pub const GENERATE_FIX: &str = "generate_fix";
    pub const EXECUTE_FIXED_CODE: &str = "execute_fixed_code";
    pub const RETRY_FIX: &str = "retry_fix";
    pub const EXECUTE_RETRY_FIXED_CODE: &str = "execute_retry_fixed_code";
    pub const GUARD_SCAN: &str = "guard_scan";
    pub const ERROR: &str = "error";
}

/// Append-only log with a latest-wins display view
#[derive(Debug, Default)]
pub struct StepLog {
    records: Vec<StepRecord>,
}

impl StepLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: StepRecord) {
        self.records.push(record);
    }

    pub fn success(&mut self, name: &str) {
        self.record(StepRecord::new(name, StepStatus::Success));
    }

    pub fn success_with(&mut self, name: &str, message: impl Into<String>) {
        self.record(StepRecord::new(name, StepStatus::Success).with_message(message));
    }

    pub fn error(&mut self, name: &str, message: impl Into<String>) {
        self.record(StepRecord::new(name, StepStatus::Error).with_message(message));
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<StepRecord> {
        self.records
    }

    /// Deduplicated view: one record per step name, latest timestamp wins.
    /// Ties fall to the later entry in the log, which is also the later
    /// emission.
    pub fn latest_by_name(&self) -> HashMap<&str, &StepRecord> {
        let mut latest: HashMap<&str, &StepRecord> = HashMap::new();
        for record in &self.records {
            match latest.get(record.name.as_str()) {
                Some(existing) if existing.timestamp_ms > record.timestamp_ms => {}
                _ => {
                    latest.insert(record.name.as_str(), record);
                }
            }
        }
        latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_append_only() {
        let mut log = StepLog::new();
        log.record(StepRecord::new(step::EXECUTE_ORIGINAL, StepStatus::Pending));
        log.success(step::EXECUTE_ORIGINAL);
        assert_eq!(log.records().len(), 2);
        assert_eq!(log.records()[0].status, StepStatus::Pending);
        assert_eq!(log.records()[1].status, StepStatus::Success);
    }

    #[test]
    fn test_latest_by_name_supersedes_earlier_records() {
        let mut log = StepLog::new();
        let mut pending = StepRecord::new(step::GENERATE_FIX, StepStatus::Pending);
        pending.timestamp_ms = 1_000;
        let mut done = StepRecord::new(step::GENERATE_FIX, StepStatus::Success);
        done.timestamp_ms = 2_000;
        log.record(pending);
        log.record(done);
        log.success(step::EXECUTE_FIXED_CODE);

        let latest = log.latest_by_name();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[step::GENERATE_FIX].status, StepStatus::Success);
        assert_eq!(latest[step::GENERATE_FIX].timestamp_ms, 2_000);
    }

    #[test]
    fn test_latest_by_name_tie_prefers_later_emission() {
        let mut log = StepLog::new();
        let mut first = StepRecord::new("step", StepStatus::Pending);
        first.timestamp_ms = 5;
        let mut second = StepRecord::new("step", StepStatus::Error);
        second.timestamp_ms = 5;
        log.record(first);
        log.record(second);
        assert_eq!(log.latest_by_name()["step"].status, StepStatus::Error);
    }
}
