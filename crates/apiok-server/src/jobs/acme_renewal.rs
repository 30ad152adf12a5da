// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use apiok_server_acme::AcmeService;
use apiok_server_jobs::{Job, JobContext, JobError, JobOutput};
use async_trait::async_trait;

pub struct AcmeRenewalJob {
	acme: Arc<AcmeService>,
}

impl AcmeRenewalJob {
	pub fn new(acme: Arc<AcmeService>) -> Self {
		Self { acme }
	}
}

#[async_trait]
impl Job for AcmeRenewalJob {
	fn id(&self) -> &str {
		"acme-renewal"
	}

	fn name(&self) -> &str {
		"ACME Certificate Renewal"
	}

	fn description(&self) -> &str {
		"Re-issues enabled Let's Encrypt certificates that are close to expiry"
	}

	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		ctx.check_cancelled()?;

		let report = self
			.acme
			.renew_expiring_certificates()
			.await
			.map_err(|e| JobError::retryable(format!("certificate renewal failed: {e}")))?;

		Ok(JobOutput::message(format!(
			"{} renewed, {} failed",
			report.renewed, report.failed
		))
		.with_metadata(serde_json::json!({
			"renewed_count": report.renewed,
			"failed_count": report.failed,
		})))
	}
}
