// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use apiok_server_gateway::PluginManager;
use apiok_server_jobs::{Job, JobContext, JobError, JobOutput};
use async_trait::async_trait;

/// Keeps the plugin table in line with the built-in catalog.
pub struct PluginReconcileJob {
	plugins: PluginManager,
}

impl PluginReconcileJob {
	pub fn new(plugins: PluginManager) -> Self {
		Self { plugins }
	}
}

#[async_trait]
impl Job for PluginReconcileJob {
	fn id(&self) -> &str {
		"plugin-reconcile"
	}

	fn name(&self) -> &str {
		"Plugin Catalog Reconcile"
	}

	fn description(&self) -> &str {
		"Inserts, refreshes and prunes plugin rows against the built-in catalog"
	}

	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		ctx.check_cancelled()?;

		let report = self
			.plugins
			.reconcile_catalog()
			.await
			.map_err(|e| JobError::retryable(format!("plugin reconcile failed: {e}")))?;

		if report.inserted + report.updated + report.removed > 0 {
			tracing::info!(
				inserted = report.inserted,
				updated = report.updated,
				removed = report.removed,
				"plugin catalog reconciled"
			);
		}
		Ok(JobOutput::message(format!(
			"{} inserted, {} updated, {} removed",
			report.inserted, report.updated, report.removed
		))
		.with_metadata(serde_json::to_value(report).unwrap_or_default()))
	}
}
