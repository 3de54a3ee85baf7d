//! Automatic optimization triggers
//!
//! Decides when a scheduled or low-memory run is due. Both triggers share
//! one cooldown so a machine sitting above the threshold is not optimized
//! back to back.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::config::OptimizerConfig;
use super::optimizer::{MemoryOptimizer, OptimizationGate};
use super::report::{OptimizationReason, OptimizationReport};
use crate::platform::MemoryBackend;

const SECS_PER_HOUR: u64 = 60 * 60;

#[derive(Debug, Clone)]
pub struct AutoOptimizer {
    interval: Option<Duration>,
    memory_usage_threshold: Option<u32>,
    cooldown: Duration,
    started: Instant,
    last_run: Option<Instant>,
}

impl AutoOptimizer {
    pub fn new(config: &OptimizerConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    /// Scheduler whose first interval counts from `started`.
    pub fn starting_at(config: &OptimizerConfig, started: Instant) -> Self {
        let interval = (config.auto_optimization_interval_hours > 0).then(|| {
            Duration::from_secs(u64::from(config.auto_optimization_interval_hours) * SECS_PER_HOUR)
        });
        let memory_usage_threshold = (config.auto_optimization_memory_usage > 0)
            .then_some(config.auto_optimization_memory_usage.min(100));

        Self {
            interval,
            memory_usage_threshold,
            cooldown: Duration::from_secs(config.min_interval_secs),
            started,
            last_run: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval.is_some() || self.memory_usage_threshold.is_some()
    }

    /// Reason to run now, if any. Memory pressure wins over the schedule.
    pub fn evaluate(&self, now: Instant, memory_load_percent: u32) -> Option<OptimizationReason> {
        if let Some(last) = self.last_run {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.cooldown {
                debug!(
                    "Cooldown: {}s remaining",
                    (self.cooldown - elapsed).as_secs()
                );
                return None;
            }
        }

        if let Some(threshold) = self.memory_usage_threshold {
            if memory_load_percent >= threshold {
                debug!("Memory load {}% >= {}%", memory_load_percent, threshold);
                return Some(OptimizationReason::LowMemory);
            }
        }

        if let Some(interval) = self.interval {
            let since = self.last_run.unwrap_or(self.started);
            if now.saturating_duration_since(since) >= interval {
                return Some(OptimizationReason::Schedule);
            }
        }

        None
    }

    pub fn record_run(&mut self, at: Instant) {
        self.last_run = Some(at);
    }

    pub fn last_run(&self) -> Option<Instant> {
        self.last_run
    }

    /// Evaluate the triggers and run the configured areas when one fires.
    ///
    /// Returns `None` when nothing was due or another run held the gate.
    pub fn run_scheduled<B: MemoryBackend>(
        &mut self,
        optimizer: &MemoryOptimizer<B>,
        gate: &OptimizationGate,
        config: &OptimizerConfig,
    ) -> Option<OptimizationReport> {
        let load = optimizer
            .backend()
            .memory_status()
            .map_or(0, |status| status.memory_load_percent);

        let reason = self.evaluate(Instant::now(), load)?;

        let Some(_permit) = gate.try_acquire() else {
            debug!("Optimization already in progress, skipping {} trigger", reason);
            return None;
        };

        let report = optimizer.optimize(&config.request(reason), |progress| {
            debug!(
                "[{}/{}] {}",
                progress.step, progress.total, progress.label
            );
        });
        self.record_run(Instant::now());

        if let Some(freed) = report.freed_mb() {
            info!("Freed {:.1} MB ({})", freed, reason);
        }
        Some(report)
    }

    /// One trigger check with the batch on tokio's blocking pool.
    ///
    /// The scheduler state is moved into the blocking task and written back
    /// when it returns. A task that panics leaves the state unchanged.
    pub async fn tick<B: MemoryBackend + 'static>(
        &mut self,
        optimizer: &Arc<MemoryOptimizer<B>>,
        gate: &Arc<OptimizationGate>,
        config: &Arc<OptimizerConfig>,
    ) -> Option<OptimizationReport> {
        let mut scheduler = self.clone();
        let optimizer = Arc::clone(optimizer);
        let gate = Arc::clone(gate);
        let config = Arc::clone(config);

        let task = tokio::task::spawn_blocking(move || {
            let report = scheduler.run_scheduled(&optimizer, &gate, &config);
            (scheduler, report)
        });

        match task.await {
            Ok((scheduler, report)) => {
                *self = scheduler;
                report
            }
            Err(e) => {
                error!("Optimization task failed: {}", e);
                None
            }
        }
    }

    /// Check the triggers every `interval` until the process exits.
    pub async fn run_loop<B: MemoryBackend + 'static>(
        &mut self,
        optimizer: Arc<MemoryOptimizer<B>>,
        gate: Arc<OptimizationGate>,
        config: Arc<OptimizerConfig>,
        interval: Duration,
    ) -> ! {
        if !self.is_enabled() {
            warn!("Automatic optimization is disabled in the config; the loop will stay idle");
        }
        info!("Starting optimization loop (interval: {:?})", interval);

        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.tick(&optimizer, &gate, &config).await;
        }
    }
}
