// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background job scheduler for the apiok control plane.
//!
//! Each registered job runs on its own timer loop until shutdown, can be
//! triggered by hand for exactly one iteration, and records every run in
//! the job history tables.

pub mod context;
pub mod error;
pub mod health;
pub mod job;
pub mod scheduler;
pub mod types;

pub use context::{CancellationToken, JobContext};
pub use error::{JobError, Result};
pub use health::{HealthState, JobHealthStatus, JobsHealthStatus, LastRunInfo};
pub use job::Job;
pub use scheduler::JobScheduler;
pub use types::{JobDefinition, JobOutput, JobRun, JobStatus, Schedule, TriggerSource};
