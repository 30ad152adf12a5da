// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use apiok_server_db::JobStore;
use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::context::{CancellationToken, JobContext};
use crate::error::{JobError, Result};
use crate::health::{determine_health_state, JobHealthStatus, JobsHealthStatus, LastRunInfo};
use crate::job::Job;
use crate::types::{JobDefinition, JobRun, JobStatus, Schedule, TriggerSource};

const BASE_RETRY_DELAY_SECS: u64 = 1;
const MAX_RETRY_DELAY_SECS: u64 = 60;
const RETRY_FACTOR: f64 = 2.0;
const MAX_RETRIES: u32 = 3;

struct RegisteredJob {
	job: Arc<dyn Job>,
	schedule: Schedule,
	cancellation_token: CancellationToken,
}

pub struct JobScheduler {
	jobs: BTreeMap<String, RegisteredJob>,
	store: Arc<dyn JobStore>,
	shutdown_tx: broadcast::Sender<()>,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobScheduler {
	pub fn new(store: Arc<dyn JobStore>) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			jobs: BTreeMap::new(),
			store,
			shutdown_tx,
			handles: Mutex::new(Vec::new()),
		}
	}

	pub fn register(&mut self, job: Arc<dyn Job>, schedule: Schedule) {
		let id = job.id().to_string();
		self.jobs.insert(
			id,
			RegisteredJob {
				job,
				schedule,
				cancellation_token: CancellationToken::new(),
			},
		);
	}

	/// Persist job definitions and spawn one loop per job.
	#[instrument(skip(self))]
	pub async fn start(&self) -> Result<()> {
		let mut handles = self.handles.lock().await;

		for (job_id, registered) in &self.jobs {
			let def = JobDefinition {
				id: job_id.clone(),
				name: registered.job.name().to_string(),
				description: registered.job.description().to_string(),
				interval_secs: Some(registered.schedule.interval.as_secs() as i64),
				enabled: true,
			};
			self.store.upsert_definition(&def).await?;

			let job = Arc::clone(&registered.job);
			let store = Arc::clone(&self.store);
			let mut shutdown_rx = self.shutdown_tx.subscribe();
			let cancellation_token = registered.cancellation_token.clone();
			let schedule = registered.schedule;
			let job_id = job_id.clone();

			let handle = tokio::spawn(async move {
				let mut delay = schedule.first_delay();
				loop {
					tokio::select! {
						_ = tokio::time::sleep(delay) => {
							if cancellation_token.is_cancelled() {
								debug!(job_id = %job_id, "Skipping cancelled job");
							} else {
								let _ = run_job_with_retry(
									&job,
									&store,
									TriggerSource::Schedule,
									&cancellation_token,
								)
								.await;
							}
						}
						_ = shutdown_rx.recv() => {
							info!(job_id = %job_id, "Shutting down periodic job");
							break;
						}
					}
					delay = schedule.interval;
				}
			});

			handles.push(handle);
		}

		info!(job_count = handles.len(), "Job scheduler started");
		Ok(())
	}

	/// Run one iteration of `job_id` now and return its run id.
	#[instrument(skip(self))]
	pub async fn trigger_job(&self, job_id: &str, triggered_by: TriggerSource) -> Result<String> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		run_job_with_retry(
			&registered.job,
			&self.store,
			triggered_by,
			&registered.cancellation_token,
		)
		.await
	}

	#[instrument(skip(self))]
	pub async fn cancel_job(&self, job_id: &str) -> Result<()> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		registered.cancellation_token.cancel();
		Ok(())
	}

	pub async fn resume_job(&self, job_id: &str) -> Result<()> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		registered.cancellation_token.resume();
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());

		let mut handles = self.handles.lock().await;
		for handle in handles.drain(..) {
			let _ = handle.await;
		}

		info!("Job scheduler shut down");
	}

	pub fn job_ids(&self) -> Vec<String> {
		self.jobs.keys().cloned().collect()
	}

	pub async fn job_status(&self, job_id: &str) -> Option<JobHealthStatus> {
		let registered = self.jobs.get(job_id)?;

		let last_run = self.store.get_last_run(job_id).await.ok().flatten();
		let consecutive_failures = self
			.store
			.count_consecutive_failures(job_id)
			.await
			.unwrap_or(0);

		Some(JobHealthStatus {
			job_id: job_id.to_string(),
			name: registered.job.name().to_string(),
			status: determine_health_state(last_run.as_ref(), consecutive_failures),
			last_run: last_run.map(LastRunInfo::from),
			consecutive_failures,
		})
	}

	pub async fn health_status(&self) -> JobsHealthStatus {
		let mut jobs = Vec::with_capacity(self.jobs.len());
		for job_id in self.jobs.keys() {
			if let Some(status) = self.job_status(job_id).await {
				jobs.push(status);
			}
		}
		JobsHealthStatus::from_jobs(jobs)
	}
}

async fn run_job_with_retry(
	job: &Arc<dyn Job>,
	store: &Arc<dyn JobStore>,
	triggered_by: TriggerSource,
	cancellation_token: &CancellationToken,
) -> Result<String> {
	let mut retry_count = 0u32;
	let run_id = uuid::Uuid::new_v4().to_string();

	loop {
		let ctx = JobContext {
			run_id: run_id.clone(),
			triggered_by: if retry_count > 0 {
				TriggerSource::Retry
			} else {
				triggered_by
			},
			cancellation_token: cancellation_token.clone(),
		};

		if retry_count == 0 {
			store
				.record_run_start(&JobRun {
					id: run_id.clone(),
					job_id: job.id().to_string(),
					status: JobStatus::Running,
					started_at: Utc::now(),
					completed_at: None,
					duration_ms: None,
					error_message: None,
					retry_count,
					triggered_by: ctx.triggered_by,
					metadata: None,
				})
				.await?;
		}

		match job.run(&ctx).await {
			Ok(output) => {
				store
					.record_run_complete(&run_id, JobStatus::Succeeded, None, output.metadata)
					.await?;
				info!(job_id = %job.id(), run_id = %run_id, message = %output.message, "Job completed successfully");
				return Ok(run_id);
			}
			Err(JobError::Cancelled) => {
				store
					.record_run_complete(&run_id, JobStatus::Cancelled, None, None)
					.await?;
				info!(job_id = %job.id(), run_id = %run_id, "Job cancelled");
				return Err(JobError::Cancelled);
			}
			Err(JobError::Failed { message, retryable }) => {
				if retryable && retry_count < MAX_RETRIES {
					retry_count += 1;
					let delay_secs = calculate_backoff_delay(retry_count);
					warn!(
						job_id = %job.id(),
						run_id = %run_id,
						retry_count,
						delay_secs,
						error = %message,
						"Job failed, retrying"
					);
					tokio::time::sleep(Duration::from_secs(delay_secs)).await;
					continue;
				}

				store
					.record_run_complete(&run_id, JobStatus::Failed, Some(message.clone()), None)
					.await?;
				warn!(job_id = %job.id(), run_id = %run_id, error = %message, "Job failed");
				return Err(JobError::Failed { message, retryable });
			}
			Err(e) => {
				let message = e.to_string();
				store
					.record_run_complete(&run_id, JobStatus::Failed, Some(message.clone()), None)
					.await?;
				warn!(job_id = %job.id(), run_id = %run_id, error = %message, "Job failed with error");
				return Err(e);
			}
		}
	}
}

pub(crate) fn calculate_backoff_delay(retry_count: u32) -> u64 {
	let delay = BASE_RETRY_DELAY_SECS as f64 * RETRY_FACTOR.powi(retry_count as i32 - 1);
	(delay as u64).min(MAX_RETRY_DELAY_SECS)
}
