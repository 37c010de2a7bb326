// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Poll Scheduler - Background reconciliation sweep for pending download requests
//!
//! Every tick snapshots the pending set and re-verifies each entry through the
//! lifecycle service, without an explicit sub-service so recorded provenance
//! (or blind fallback) decides the session. Entries are verified concurrently,
//! at most `max_concurrent_checks` at a time, and in isolation: a failing or
//! slow entry never affects the others, and a failed entry simply stays
//! pending until the next tick.
//!
//! An entry counts as completed only in the sweep that actually removed it
//! from the pending set.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Keeps the request registry eventually consistent when no client polls

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::download_lifecycle::DownloadLifecycleService;
use crate::application::pending_set::PendingSet;

/// Configuration for the poll scheduler
#[derive(Debug, Clone)]
pub struct PollSchedulerConfig {
    /// How often to sweep (in seconds)
    pub interval_seconds: u64,

    /// Whether the sweep runs at all
    pub enabled: bool,

    /// Upper bound on remote verifications in flight during one sweep
    pub max_concurrent_checks: usize,
}

impl Default for PollSchedulerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            enabled: true,
            max_concurrent_checks: 8,
        }
    }
}

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct PollScheduler {
    lifecycle: Arc<dyn DownloadLifecycleService>,
    pending: Arc<PendingSet>,
    config: PollSchedulerConfig,
    shutdown_token: CancellationToken,
}

impl PollScheduler {
    pub fn new(
        lifecycle: Arc<dyn DownloadLifecycleService>,
        pending: Arc<PendingSet>,
        config: PollSchedulerConfig,
    ) -> Self {
        Self {
            lifecycle,
            pending,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Start the sweep background task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Poll scheduler is disabled");
            return;
        }

        info!(
            interval_seconds = self.config.interval_seconds,
            "Starting poll scheduler background task"
        );

        let period = Duration::from_secs(self.config.interval_seconds.max(1));
        // First sweep one full period after startup
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let report = self.sweep().await;
                    if report.checked > 0 {
                        info!(
                            checked = report.checked,
                            completed = report.completed,
                            failed = report.failed,
                            remaining = self.pending.len(),
                            "Poll sweep completed"
                        );
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping poll scheduler");
                    break;
                }
            }
        }

        info!("Poll scheduler background task stopped");
    }

    /// Execute a single sweep over a snapshot of the pending set.
    pub async fn sweep(&self) -> SweepReport {
        metrics::counter!("sat_broker_sweep_ticks_total").increment(1);

        let snapshot = self.pending.snapshot();
        if snapshot.is_empty() {
            debug!("Poll sweep skipped, nothing pending");
            return SweepReport::default();
        }
        debug!(entries = snapshot.len(), "Running poll sweep");

        let checks: Vec<_> = snapshot.iter().map(|entry| async move {
            let was_pending = self.pending.contains(&entry.request_id);
            match self
                .lifecycle
                .verify(&entry.subject_id, &entry.request_id, None)
                .await
            {
                Ok(_) => Ok(was_pending && !self.pending.contains(&entry.request_id)),
                Err(e) => {
                    warn!(
                        request_id = %entry.request_id,
                        subject = %entry.subject_id,
                        error = %e,
                        "Scheduled verify failed, entry stays pending"
                    );
                    Err(())
                }
            }
        }).collect();

        let mut report = SweepReport {
            checked: snapshot.len(),
            ..Default::default()
        };
        let outcomes: Vec<Result<bool, ()>> = stream::iter(checks)
            .buffer_unordered(self.config.max_concurrent_checks.max(1))
            .collect()
            .await;
        for outcome in outcomes {
            match outcome {
                Ok(true) => report.completed += 1,
                Ok(false) => {}
                Err(()) => report.failed += 1,
            }
        }

        if report.failed > 0 {
            metrics::counter!("sat_broker_sweep_failures_total").increment(report.failed as u64);
        }
        report
    }
}
