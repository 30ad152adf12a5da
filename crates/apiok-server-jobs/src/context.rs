// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{JobError, Result};
use crate::types::TriggerSource;

pub struct JobContext {
	pub run_id: String,
	pub triggered_by: TriggerSource,
	pub cancellation_token: CancellationToken,
}

impl JobContext {
	/// Bail out of a long sweep between items once the job is cancelled.
	pub fn check_cancelled(&self) -> Result<()> {
		if self.cancellation_token.is_cancelled() {
			return Err(JobError::Cancelled);
		}
		Ok(())
	}
}

/// Shared flag set by `JobScheduler::cancel_job`. Scheduled ticks are skipped
/// while it is set; `resume` clears it.
#[derive(Clone, Default)]
pub struct CancellationToken {
	cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}

	pub fn resume(&self) {
		self.cancelled.store(false, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}
}
