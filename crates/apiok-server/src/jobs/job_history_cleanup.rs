// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use apiok_server_db::JobRepository;
use apiok_server_jobs::{Job, JobContext, JobError, JobOutput};
use async_trait::async_trait;

pub struct JobHistoryCleanupJob {
	repository: Arc<JobRepository>,
	retention_days: u32,
}

impl JobHistoryCleanupJob {
	pub fn new(repository: Arc<JobRepository>, retention_days: u32) -> Self {
		Self {
			repository,
			retention_days,
		}
	}
}

#[async_trait]
impl Job for JobHistoryCleanupJob {
	fn id(&self) -> &str {
		"job-history-cleanup"
	}

	fn name(&self) -> &str {
		"Job History Cleanup"
	}

	fn description(&self) -> &str {
		"Removes old job run history entries"
	}

	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		ctx.check_cancelled()?;

		match self.repository.cleanup_old_runs(self.retention_days).await {
			Ok(count) => {
				tracing::info!(
					deleted = count,
					retention_days = self.retention_days,
					"Job history cleanup completed"
				);
				Ok(
					JobOutput::message(format!("Cleaned up {count} old job run records")).with_metadata(
						serde_json::json!({
							"deleted_count": count,
							"retention_days": self.retention_days
						}),
					),
				)
			}
			Err(e) => Err(JobError::retryable(format!("Job history cleanup failed: {e}"))),
		}
	}
}
