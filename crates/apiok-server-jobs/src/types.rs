// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use apiok_server_db::{JobDefinition, JobRun, JobStatus, TriggerSource};

/// When a periodic job runs. Without `initial_delay` the first run waits a
/// full interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
	pub interval: Duration,
	pub initial_delay: Option<Duration>,
}

impl Schedule {
	pub fn every(interval: Duration) -> Self {
		Self {
			interval,
			initial_delay: None,
		}
	}

	pub fn with_initial_delay(mut self, delay: Duration) -> Self {
		self.initial_delay = Some(delay);
		self
	}

	pub(crate) fn first_delay(&self) -> Duration {
		self.initial_delay.unwrap_or(self.interval)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutput {
	pub message: String,
	pub metadata: Option<serde_json::Value>,
}

impl JobOutput {
	pub fn message(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			metadata: None,
		}
	}

	pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
		self.metadata = Some(metadata);
		self
	}
}
