//! Memory optimization orchestrator
//!
//! Runs a batch of requested memory areas in a fixed order on the calling
//! thread, times each one, reports progress and produces one
//! [`OptimizationReport`]. A failing area never stops the batch.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info};

use super::area::MemoryArea;
use super::capabilities::OperatingSystemCapabilities;
use super::error::{OptimizeError, OptimizeResult};
use super::operations::NativeMemoryOperations;
use super::report::{AreaResult, OptimizationReason, OptimizationReport};
use crate::platform::{ExclusionList, MemoryBackend};

/// Label of the final progress step.
pub const DONE_LABEL: &str = "Done";

/// Input of one optimization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationRequest {
    pub reason: OptimizationReason,
    pub areas: MemoryArea,
    /// Image names skipped by the working set trim (case-insensitive, extension optional)
    pub excluded_processes: Vec<String>,
}

impl OptimizationRequest {
    pub fn new(reason: OptimizationReason, areas: MemoryArea) -> Self {
        Self {
            reason,
            areas,
            excluded_processes: Vec::new(),
        }
    }

    pub fn with_excluded_processes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_processes = names.into_iter().map(Into::into).collect();
        self
    }
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub step: u8,
    pub total: u8,
    pub label: String,
}

impl Progress {
    pub fn percentage(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.step as u32 * 100 / self.total as u32) as u8
    }

    pub fn is_done(&self) -> bool {
        self.step == self.total
    }
}

/// The memory optimization engine.
pub struct MemoryOptimizer<B> {
    operations: NativeMemoryOperations<B>,
}

impl<B: MemoryBackend> MemoryOptimizer<B> {
    /// Engine over `backend` with the capabilities of the running OS.
    pub fn new(backend: B) -> Self {
        Self::with_capabilities(backend, OperatingSystemCapabilities::detect())
    }

    pub fn with_capabilities(backend: B, capabilities: OperatingSystemCapabilities) -> Self {
        debug!(
            "Memory optimizer on {:?} (64-bit: {}), supported: {}",
            capabilities.version,
            capabilities.is_64bit,
            capabilities.supported_areas().describe()
        );
        Self {
            operations: NativeMemoryOperations::new(backend, capabilities),
        }
    }

    pub fn capabilities(&self) -> &OperatingSystemCapabilities {
        self.operations.capabilities()
    }

    pub fn backend(&self) -> &B {
        self.operations.backend()
    }

    pub fn operations(&self) -> &NativeMemoryOperations<B> {
        &self.operations
    }

    /// Run every requested area and report the outcome.
    ///
    /// `progress` is called synchronously once per area and once more with
    /// [`DONE_LABEL`]; the total is the number of areas plus one. An empty
    /// request returns an empty report without any callback.
    pub fn optimize<F>(&self, request: &OptimizationRequest, mut progress: F) -> OptimizationReport
    where
        F: FnMut(&Progress),
    {
        let mut report = OptimizationReport::new(request.reason);
        // Bits outside the known areas count as nothing requested.
        let areas: Vec<MemoryArea> = request.areas.ordered().collect();
        if areas.is_empty() {
            debug!("Nothing to optimize ({})", request.reason);
            return report;
        }

        let total = (areas.len() + 1) as u8;
        let excluded = ExclusionList::new(&request.excluded_processes);

        info!(
            "Optimizing memory ({}): {}",
            request.reason,
            request.areas.describe()
        );
        report.memory_before = self.backend().memory_status();

        let started = Instant::now();
        for (index, area) in areas.iter().enumerate() {
            progress(&Progress {
                step: index as u8 + 1,
                total,
                label: area.label().to_string(),
            });

            let area_started = Instant::now();
            let outcome = self.run_area(*area, &excluded);
            let elapsed = area_started.elapsed();
            debug!(
                "{} finished in {:?}: {}",
                area.label(),
                elapsed,
                if outcome.is_ok() { "ok" } else { "failed" }
            );
            report.push(AreaResult::new(*area, elapsed, outcome));
        }
        report.total_duration = started.elapsed();

        report.aggregate();
        report.emit();

        // Give back what this process itself allocated during the run.
        if let Err(e) = self.backend().trim_current_process() {
            debug!("Could not trim own working set: {}", e);
        }
        report.memory_after = self.backend().memory_status();

        progress(&Progress {
            step: total,
            total,
            label: DONE_LABEL.to_string(),
        });

        report
    }

    /// Run one area, converting a panic into a failure of that area only.
    fn run_area(&self, area: MemoryArea, excluded: &ExclusionList) -> OptimizeResult {
        panic::catch_unwind(AssertUnwindSafe(|| self.operations.run(area, excluded)))
            .unwrap_or_else(|payload| Err(OptimizeError::Unexpected(panic_message(payload))))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic in native call".to_string()
    }
}

/// Process-wide single in-flight guard around `optimize`.
///
/// Timer, low-memory and manual triggers share one gate; a trigger that
/// finds the gate taken is rejected rather than queued.
#[derive(Debug, Default)]
pub struct OptimizationGate {
    in_flight: AtomicBool,
}

impl OptimizationGate {
    pub const fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
        }
    }

    /// Take the gate, or `None` if a run is already in flight.
    pub fn try_acquire(&self) -> Option<OptimizationPermit<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| OptimizationPermit { gate: self })
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Releases the gate when dropped.
#[derive(Debug)]
pub struct OptimizationPermit<'a> {
    gate: &'a OptimizationGate,
}

impl Drop for OptimizationPermit<'_> {
    fn drop(&mut self) {
        self.gate.in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capabilities::OsVersion;
    use crate::core::report::LogLevel;
    use crate::platform::layout::SystemInformationClass;
    use crate::platform::testing::{Call, RecordingBackend};
    use crate::platform::MemoryStatus;
    use crate::security::privileges::Privilege;

    fn windows(major: u32, minor: u32) -> OperatingSystemCapabilities {
        OperatingSystemCapabilities::new(Some(OsVersion::new(major, minor, 0)), true)
    }

    fn run(
        optimizer: &MemoryOptimizer<RecordingBackend>,
        areas: MemoryArea,
    ) -> (OptimizationReport, Vec<Progress>) {
        let mut steps = Vec::new();
        let report = optimizer.optimize(
            &OptimizationRequest::new(OptimizationReason::Manual, areas),
            |p| steps.push(p.clone()),
        );
        (report, steps)
    }

    #[test]
    fn test_empty_request_does_nothing() {
        let optimizer = MemoryOptimizer::with_capabilities(RecordingBackend::new(), windows(10, 0));
        let (report, steps) = run(&optimizer, MemoryArea::empty());

        assert!(report.is_empty());
        assert!(report.records.is_empty());
        assert!(steps.is_empty());
        assert!(optimizer.backend().calls().is_empty());
    }

    #[test]
    fn test_unknown_bits_only_do_nothing() {
        let optimizer = MemoryOptimizer::with_capabilities(RecordingBackend::new(), windows(10, 0));
        let (report, steps) = run(&optimizer, MemoryArea::from_bits_retain(1 << 12));

        assert!(report.is_empty());
        assert!(report.records.is_empty());
        assert!(steps.is_empty());
        assert!(optimizer.backend().calls().is_empty());
    }

    #[test]
    fn test_unknown_bits_are_ignored_next_to_known_areas() {
        let optimizer = MemoryOptimizer::with_capabilities(RecordingBackend::new(), windows(10, 0));
        let (report, steps) = run(
            &optimizer,
            MemoryArea::STANDBY_LIST | MemoryArea::from_bits_retain(1 << 12),
        );

        assert_eq!(report.results.len(), 1);
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().all(|p| p.total == 2));
    }

    #[test]
    fn test_standby_and_modified_on_vista_x64() {
        let optimizer = MemoryOptimizer::with_capabilities(RecordingBackend::new(), windows(6, 0));
        let (report, steps) = run(
            &optimizer,
            MemoryArea::STANDBY_LIST | MemoryArea::MODIFIED_PAGE_LIST,
        );

        assert_eq!(report.results.len(), 2);
        assert!(report.results.iter().all(|r| r.succeeded));
        assert_eq!(report.results[0].area, MemoryArea::MODIFIED_PAGE_LIST);
        assert_eq!(report.results[1].area, MemoryArea::STANDBY_LIST);

        let labels: Vec<_> = steps.iter().map(|p| (p.step, p.label.as_str())).collect();
        assert_eq!(
            labels,
            vec![(1, "Modified Page List"), (2, "Standby List"), (3, DONE_LABEL)]
        );
        assert!(steps.iter().all(|p| p.total == 3));
        assert!(steps.last().unwrap().is_done());

        assert_eq!(report.records_at(LogLevel::Info).count(), 1);
        assert_eq!(report.records_at(LogLevel::Error).count(), 0);
        assert_eq!(report.records_at(LogLevel::Warning).count(), 0);
    }

    #[test]
    fn test_combined_page_list_on_windows_7_is_a_warning() {
        let optimizer = MemoryOptimizer::with_capabilities(RecordingBackend::new(), windows(6, 1));
        let (report, steps) = run(&optimizer, MemoryArea::COMBINED_PAGE_LIST);

        assert_eq!(report.results.len(), 1);
        let result = &report.results[0];
        assert!(!result.succeeded);
        assert_eq!(
            result.error_message().as_deref(),
            Some("not supported on this OS version")
        );

        assert_eq!(report.records_at(LogLevel::Warning).count(), 1);
        assert_eq!(report.records_at(LogLevel::Error).count(), 0);
        assert_eq!(report.records_at(LogLevel::Info).count(), 0);
        let warning = report.records_at(LogLevel::Warning).next().unwrap();
        assert!(warning.message.contains("Combined Page List"));
        assert!(warning.message.contains("not supported"));

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].label, DONE_LABEL);
        assert!(optimizer
            .backend()
            .information_calls()
            .is_empty());
    }

    #[test]
    fn test_unsupported_area_does_not_stop_others() {
        let optimizer = MemoryOptimizer::with_capabilities(RecordingBackend::new(), windows(6, 1));
        let (report, _) = run(
            &optimizer,
            MemoryArea::COMBINED_PAGE_LIST | MemoryArea::STANDBY_LIST | MemoryArea::REGISTRY_CACHE,
        );

        assert!(report.result(MemoryArea::STANDBY_LIST).unwrap().succeeded);
        assert!(report.result(MemoryArea::COMBINED_PAGE_LIST).unwrap().is_unsupported());
        assert!(report.result(MemoryArea::REGISTRY_CACHE).unwrap().is_unsupported());
        assert!(!report.has_errors());
    }

    #[test]
    fn test_failures_are_independent() {
        let backend = RecordingBackend::new()
            .deny(Privilege::IncreaseQuota)
            .fail_class(SystemInformationClass::MemoryListInformation, 1450);
        let optimizer = MemoryOptimizer::with_capabilities(backend, windows(10, 0));
        let (report, steps) = run(&optimizer, MemoryArea::all());

        assert_eq!(report.results.len(), 8);
        assert_eq!(steps.len(), 9);
        assert_eq!(steps.last().unwrap().label, DONE_LABEL);

        assert!(report.result(MemoryArea::WORKING_SET).unwrap().succeeded);
        assert!(report.result(MemoryArea::COMBINED_PAGE_LIST).unwrap().succeeded);
        assert!(!report.result(MemoryArea::SYSTEM_FILE_CACHE).unwrap().succeeded);
        assert!(!report.result(MemoryArea::MODIFIED_FILE_CACHE).unwrap().succeeded);
        assert!(!report.result(MemoryArea::STANDBY_LIST).unwrap().succeeded);

        let error = report.records_at(LogLevel::Error).next().unwrap();
        assert!(error.message.contains("System File Cache: administrator privilege required"));
        assert!(error.message.contains("Standby List (Low Priority): memory list command failed"));
        assert_eq!(report.records_at(LogLevel::Info).count(), 1);
    }

    #[test]
    fn test_panic_is_contained_to_its_area() {
        let backend = RecordingBackend::new()
            .panic_on(SystemInformationClass::MemoryListInformation);
        let optimizer = MemoryOptimizer::with_capabilities(backend, windows(10, 0));
        let (report, steps) = run(
            &optimizer,
            MemoryArea::STANDBY_LIST | MemoryArea::COMBINED_PAGE_LIST,
        );

        let standby = report.result(MemoryArea::STANDBY_LIST).unwrap();
        assert!(matches!(standby.error, Some(OptimizeError::Unexpected(_))));
        assert!(standby
            .error_message()
            .unwrap()
            .contains("simulated fault"));
        assert!(report.result(MemoryArea::COMBINED_PAGE_LIST).unwrap().succeeded);
        assert_eq!(steps.len(), 3);
    }

    #[test]
    fn test_both_standby_flags_run_distinct_commands() {
        let optimizer = MemoryOptimizer::with_capabilities(RecordingBackend::new(), windows(10, 0));
        run(
            &optimizer,
            MemoryArea::STANDBY_LIST | MemoryArea::STANDBY_LIST_LOW_PRIORITY,
        );
        let commands: Vec<_> = optimizer
            .backend()
            .information_calls()
            .into_iter()
            .map(|(_, bytes)| bytes)
            .collect();
        assert_eq!(
            commands,
            vec![4i32.to_ne_bytes().to_vec(), 5i32.to_ne_bytes().to_vec()]
        );
    }

    #[test]
    fn test_repeated_runs_have_equal_shape() {
        let optimizer = MemoryOptimizer::with_capabilities(RecordingBackend::new(), windows(10, 0));
        let areas = MemoryArea::WORKING_SET | MemoryArea::SYSTEM_FILE_CACHE | MemoryArea::STANDBY_LIST;
        let (first, _) = run(&optimizer, areas);
        let (second, _) = run(&optimizer, areas);

        assert_eq!(first.attempted(), areas);
        assert_eq!(first.attempted(), second.attempted());
        let order = |r: &OptimizationReport| r.results.iter().map(|a| a.area).collect::<Vec<_>>();
        assert_eq!(order(&first), order(&second));
    }

    #[test]
    fn test_self_trim_and_memory_snapshots() {
        let status = MemoryStatus::from_bytes(8 << 30, 2 << 30);
        let backend = RecordingBackend::new().with_status(status);
        let optimizer = MemoryOptimizer::with_capabilities(backend, windows(10, 0));
        let (report, _) = run(&optimizer, MemoryArea::MODIFIED_PAGE_LIST);

        assert_eq!(optimizer.backend().count(&Call::TrimCurrentProcess), 1);
        assert_eq!(
            optimizer.backend().calls().last(),
            Some(&Call::TrimCurrentProcess)
        );
        assert_eq!(report.memory_before, Some(status));
        assert_eq!(report.freed_mb(), Some(0.0));
    }

    #[test]
    fn test_excluded_processes_reach_the_trim() {
        let backend = RecordingBackend::new().with_processes(&[(1, "keep.exe"), (2, "trim.exe")]);
        let optimizer = MemoryOptimizer::with_capabilities(backend, windows(10, 0));
        let request = OptimizationRequest::new(OptimizationReason::Hotkey, MemoryArea::WORKING_SET)
            .with_excluded_processes(["KEEP"]);
        let report = optimizer.optimize(&request, |_| {});

        assert!(report.results[0].succeeded);
        assert_eq!(optimizer.backend().count(&Call::EmptyWorkingSet(1)), 0);
        assert_eq!(optimizer.backend().count(&Call::EmptyWorkingSet(2)), 1);
    }

    #[test]
    fn test_progress_percentage() {
        let p = Progress {
            step: 1,
            total: 3,
            label: "Working Set".into(),
        };
        assert_eq!(p.percentage(), 33);
        assert!(!p.is_done());
        let done = Progress {
            step: 3,
            total: 3,
            label: DONE_LABEL.into(),
        };
        assert_eq!(done.percentage(), 100);
        assert!(done.is_done());
    }

    #[test]
    fn test_gate_allows_one_run_at_a_time() {
        let gate = OptimizationGate::new();
        let permit = gate.try_acquire();
        assert!(permit.is_some());
        assert!(gate.is_busy());
        assert!(gate.try_acquire().is_none());
        drop(permit);
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_some());
    }
}
