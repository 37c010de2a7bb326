// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod session_cache;
pub mod pending_set;
pub mod download_lifecycle;
pub mod poll_scheduler;

// Re-export services for convenience
pub use download_lifecycle::{
    DownloadLifecycleService, DownloadedPackage, LoginOutcome, RequestReport, StandardDownloadLifecycleService,
};
pub use pending_set::{PendingEntry, PendingSet};
pub use poll_scheduler::{PollScheduler, PollSchedulerConfig, SweepReport};
pub use session_cache::{SessionCache, SessionPair};
