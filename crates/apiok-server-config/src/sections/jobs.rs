// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background job configuration.

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct JobsConfig {
	pub plugin_reconcile_interval_secs: u64,
	pub challenge_cleanup_interval_secs: u64,
	pub history_retention_days: u32,
}

impl Default for JobsConfig {
	fn default() -> Self {
		JobsConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobsConfigLayer {
	#[serde(default)]
	pub plugin_reconcile_interval_secs: Option<u64>,
	#[serde(default)]
	pub challenge_cleanup_interval_secs: Option<u64>,
	#[serde(default)]
	pub history_retention_days: Option<u32>,
}

impl JobsConfigLayer {
	pub fn merge(&mut self, other: JobsConfigLayer) {
		if other.plugin_reconcile_interval_secs.is_some() {
			self.plugin_reconcile_interval_secs = other.plugin_reconcile_interval_secs;
		}
		if other.challenge_cleanup_interval_secs.is_some() {
			self.challenge_cleanup_interval_secs = other.challenge_cleanup_interval_secs;
		}
		if other.history_retention_days.is_some() {
			self.history_retention_days = other.history_retention_days;
		}
	}

	pub fn finalize(self) -> JobsConfig {
		JobsConfig {
			plugin_reconcile_interval_secs: self.plugin_reconcile_interval_secs.unwrap_or(10),
			challenge_cleanup_interval_secs: self.challenge_cleanup_interval_secs.unwrap_or(3600),
			history_retention_days: self.history_retention_days.unwrap_or(30),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = JobsConfig::default();
		assert_eq!(config.plugin_reconcile_interval_secs, 10);
		assert_eq!(config.challenge_cleanup_interval_secs, 3600);
		assert_eq!(config.history_retention_days, 30);
	}

	#[test]
	fn test_merge_partial() {
		let mut base = JobsConfigLayer {
			plugin_reconcile_interval_secs: Some(5),
			history_retention_days: Some(7),
			..Default::default()
		};
		base.merge(JobsConfigLayer {
			history_retention_days: Some(90),
			..Default::default()
		});
		let config = base.finalize();
		assert_eq!(config.plugin_reconcile_interval_secs, 5);
		assert_eq!(config.history_retention_days, 90);
	}
}
