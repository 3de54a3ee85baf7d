//! Per-run optimization report and its aggregated log records

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

use super::area::MemoryArea;
use super::error::OptimizeError;
use crate::platform::MemoryStatus;

/// What triggered an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OptimizationReason {
    Manual,
    Schedule,
    LowMemory,
    Hotkey,
    CommandLine,
}

impl fmt::Display for OptimizationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            OptimizationReason::Manual => "manual",
            OptimizationReason::Schedule => "schedule",
            OptimizationReason::LowMemory => "low memory",
            OptimizationReason::Hotkey => "hotkey",
            OptimizationReason::CommandLine => "command line",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One aggregated, multi-line log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

impl LogRecord {
    fn emit(&self) {
        match self.level {
            LogLevel::Info => info!("{}", self.message),
            LogLevel::Warning => warn!("{}", self.message),
            LogLevel::Error => error!("{}", self.message),
        }
    }
}

/// Outcome of one memory area.
#[derive(Debug, Clone, Serialize)]
pub struct AreaResult {
    #[serde(serialize_with = "serialize_area")]
    pub area: MemoryArea,
    pub succeeded: bool,
    pub duration: Duration,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<OptimizeError>,
}

impl AreaResult {
    pub fn new(area: MemoryArea, duration: Duration, outcome: Result<(), OptimizeError>) -> Self {
        let error = outcome.err();
        Self {
            area,
            succeeded: error.is_none(),
            duration,
            error,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn is_unsupported(&self) -> bool {
        self.error.as_ref().map_or(false, OptimizeError::is_unsupported)
    }
}

fn serialize_area<S: Serializer>(area: &MemoryArea, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(area.label())
}

fn serialize_error<S: Serializer>(
    error: &Option<OptimizeError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Everything one `optimize` call did. Discarded after the caller reads it.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub reason: OptimizationReason,
    pub started_at: DateTime<Local>,
    pub results: Vec<AreaResult>,
    pub total_duration: Duration,
    pub memory_before: Option<MemoryStatus>,
    pub memory_after: Option<MemoryStatus>,
    pub records: Vec<LogRecord>,
}

impl OptimizationReport {
    pub fn new(reason: OptimizationReason) -> Self {
        Self {
            reason,
            started_at: Local::now(),
            results: Vec::new(),
            total_duration: Duration::ZERO,
            memory_before: None,
            memory_after: None,
            records: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn push(&mut self, result: AreaResult) {
        self.results.push(result);
    }

    /// The areas that were attempted, regardless of outcome.
    pub fn attempted(&self) -> MemoryArea {
        self.results
            .iter()
            .fold(MemoryArea::empty(), |mask, r| mask | r.area)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &AreaResult> {
        self.results.iter().filter(|r| r.succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &AreaResult> {
        self.results.iter().filter(|r| !r.succeeded)
    }

    /// True when an area failed for a reason other than OS support.
    pub fn has_errors(&self) -> bool {
        self.failed().any(|r| !r.is_unsupported())
    }

    pub fn result(&self, area: MemoryArea) -> Option<&AreaResult> {
        self.results.iter().find(|r| r.area == area)
    }

    /// Physical memory released by the run, when both snapshots exist.
    pub fn freed_mb(&self) -> Option<f64> {
        match (self.memory_before, self.memory_after) {
            (Some(before), Some(after)) => {
                Some((after.available_physical_mb - before.available_physical_mb).max(0.0))
            }
            _ => None,
        }
    }

    pub fn records_at(&self, level: LogLevel) -> impl Iterator<Item = &LogRecord> {
        self.records.iter().filter(move |r| r.level == level)
    }

    /// Build the aggregated records from the results: successes (info),
    /// unsupported areas (warning), other failures (error). Empty aggregates
    /// are never produced.
    ///
    /// Success lines read `<label>: ok (<seconds>)`; failure lines read
    /// `<label>: <reason>` under a header naming the outcome.
    pub fn aggregate(&mut self) {
        let mut records = Vec::new();

        let succeeded: Vec<&AreaResult> = self.succeeded().collect();
        if !succeeded.is_empty() {
            let mut message = format!("Memory optimized ({})", self.reason);
            for r in &succeeded {
                message.push_str(&format!(
                    "\n  {}: ok ({})",
                    r.area.label(),
                    seconds(r.duration)
                ));
            }
            message.push_str(&format!("\n  Total: {}", seconds(self.total_duration)));
            records.push(LogRecord {
                level: LogLevel::Info,
                message,
            });
        }

        let (unsupported, errors): (Vec<&AreaResult>, Vec<&AreaResult>) =
            self.failed().partition(|r| r.is_unsupported());

        if !unsupported.is_empty() {
            records.push(LogRecord {
                level: LogLevel::Warning,
                message: failure_block(
                    &format!("Memory areas skipped ({})", self.reason),
                    &unsupported,
                ),
            });
        }

        if !errors.is_empty() {
            records.push(LogRecord {
                level: LogLevel::Error,
                message: failure_block(
                    &format!("Memory optimization failed ({})", self.reason),
                    &errors,
                ),
            });
        }

        self.records = records;
    }

    /// Send the aggregated records to the log.
    pub fn emit(&self) {
        for record in &self.records {
            record.emit();
        }
    }
}

fn failure_block(header: &str, results: &[&AreaResult]) -> String {
    let mut message = header.to_string();
    for r in results {
        let reason = r.error_message().unwrap_or_default();
        message.push_str(&format!("\n  {}: {}", r.area.label(), reason));
    }
    message
}

/// Seconds with one decimal, e.g. `0.3s`.
pub fn seconds(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::NativeError;

    fn report() -> OptimizationReport {
        let mut report = OptimizationReport::new(OptimizationReason::Manual);
        report.push(AreaResult::new(
            MemoryArea::WORKING_SET,
            Duration::from_millis(340),
            Ok(()),
        ));
        report.push(AreaResult::new(
            MemoryArea::MODIFIED_PAGE_LIST,
            Duration::from_millis(20),
            Err(OptimizeError::native(
                "memory list command",
                NativeError::new(1314, "A required privilege is not held by the client."),
            )),
        ));
        report.push(AreaResult::new(
            MemoryArea::COMBINED_PAGE_LIST,
            Duration::ZERO,
            Err(OptimizeError::Unsupported {
                area: MemoryArea::COMBINED_PAGE_LIST,
            }),
        ));
        report.total_duration = Duration::from_millis(360);
        report
    }

    #[test]
    fn test_aggregate_splits_by_level() {
        let mut report = report();
        report.aggregate();

        assert_eq!(report.records.len(), 3);
        assert_eq!(
            report.records[0].message,
            "Memory optimized (manual)\n  Working Set: ok (0.3s)\n  Total: 0.4s"
        );
        assert_eq!(
            report.records[1].message,
            "Memory areas skipped (manual)\n  Combined Page List: not supported on this OS version"
        );
        assert_eq!(report.records[2].level, LogLevel::Error);
        assert!(report.records[2]
            .message
            .contains("Modified Page List: memory list command failed"));
        assert!(report.has_errors());
    }

    #[test]
    fn test_aggregate_never_builds_empty_records() {
        let mut report = OptimizationReport::new(OptimizationReason::Schedule);
        report.aggregate();
        assert!(report.records.is_empty());

        report.push(AreaResult::new(MemoryArea::STANDBY_LIST, Duration::ZERO, Ok(())));
        report.aggregate();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records_at(LogLevel::Error).count(), 0);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_attempted_and_lookup() {
        let report = report();
        assert_eq!(
            report.attempted(),
            MemoryArea::WORKING_SET | MemoryArea::MODIFIED_PAGE_LIST | MemoryArea::COMBINED_PAGE_LIST
        );
        assert!(report.result(MemoryArea::WORKING_SET).unwrap().succeeded);
        assert!(report.result(MemoryArea::COMBINED_PAGE_LIST).unwrap().is_unsupported());
        assert!(report.result(MemoryArea::STANDBY_LIST).is_none());
    }

    #[test]
    fn test_freed_mb() {
        let mut report = report();
        assert_eq!(report.freed_mb(), None);
        report.memory_before = Some(MemoryStatus::from_bytes(8 << 30, 2 << 30));
        report.memory_after = Some(MemoryStatus::from_bytes(8 << 30, 3 << 30));
        assert_eq!(report.freed_mb(), Some(1024.0));
    }

    #[test]
    fn test_report_serializes_labels_and_messages() {
        let json = serde_json::to_value(report()).unwrap();
        assert_eq!(json["results"][0]["area"], "Working Set");
        assert_eq!(json["results"][0]["error"], serde_json::Value::Null);
        assert_eq!(
            json["results"][2]["error"],
            "not supported on this OS version"
        );
        assert_eq!(json["reason"], "Manual");
    }

    #[test]
    fn test_seconds_format() {
        assert_eq!(seconds(Duration::from_millis(1260)), "1.3s");
        assert_eq!(seconds(Duration::ZERO), "0.0s");
    }
}
