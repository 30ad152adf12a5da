// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use apiok_server_acme::AcmeService;
use apiok_server_jobs::{Job, JobContext, JobError, JobOutput};
use async_trait::async_trait;

pub struct AcmeChallengeCleanupJob {
	acme: Arc<AcmeService>,
}

impl AcmeChallengeCleanupJob {
	pub fn new(acme: Arc<AcmeService>) -> Self {
		Self { acme }
	}
}

#[async_trait]
impl Job for AcmeChallengeCleanupJob {
	fn id(&self) -> &str {
		"acme-challenge-cleanup"
	}

	fn name(&self) -> &str {
		"ACME Challenge Cleanup"
	}

	fn description(&self) -> &str {
		"Removes expired http-01 challenge tokens"
	}

	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		ctx.check_cancelled()?;

		let deleted = self
			.acme
			.cleanup_expired_challenges()
			.await
			.map_err(|e| JobError::retryable(format!("challenge cleanup failed: {e}")))?;
		if deleted > 0 {
			tracing::info!(deleted, "expired ACME challenges removed");
		}
		Ok(JobOutput::message(format!("Removed {deleted} expired challenges"))
			.with_metadata(serde_json::json!({ "deleted_count": deleted })))
	}
}
