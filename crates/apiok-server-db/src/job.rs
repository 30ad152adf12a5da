// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persistence for background job definitions and their run history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{DbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Running,
	Succeeded,
	Failed,
	Cancelled,
}

impl JobStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobStatus::Running => "running",
			JobStatus::Succeeded => "succeeded",
			JobStatus::Failed => "failed",
			JobStatus::Cancelled => "cancelled",
		}
	}
}

impl std::str::FromStr for JobStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"running" => Ok(JobStatus::Running),
			"succeeded" => Ok(JobStatus::Succeeded),
			"failed" => Ok(JobStatus::Failed),
			"cancelled" => Ok(JobStatus::Cancelled),
			_ => Err(format!("unknown job status: {s}")),
		}
	}
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
	Schedule,
	Manual,
	Retry,
}

impl TriggerSource {
	pub fn as_str(&self) -> &'static str {
		match self {
			TriggerSource::Schedule => "schedule",
			TriggerSource::Manual => "manual",
			TriggerSource::Retry => "retry",
		}
	}
}

impl std::str::FromStr for TriggerSource {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"schedule" => Ok(TriggerSource::Schedule),
			"manual" => Ok(TriggerSource::Manual),
			"retry" => Ok(TriggerSource::Retry),
			_ => Err(format!("unknown trigger source: {s}")),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
	pub id: String,
	pub name: String,
	pub description: String,
	pub interval_secs: Option<i64>,
	pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
	pub id: String,
	pub job_id: String,
	pub status: JobStatus,
	pub started_at: DateTime<Utc>,
	pub completed_at: Option<DateTime<Utc>>,
	pub duration_ms: Option<i64>,
	pub error_message: Option<String>,
	pub retry_count: u32,
	pub triggered_by: TriggerSource,
	pub metadata: Option<serde_json::Value>,
}

#[derive(sqlx::FromRow)]
struct DefinitionRow {
	id: String,
	name: String,
	description: Option<String>,
	interval_secs: Option<i64>,
	enabled: bool,
}

impl From<DefinitionRow> for JobDefinition {
	fn from(row: DefinitionRow) -> Self {
		JobDefinition {
			id: row.id,
			name: row.name,
			description: row.description.unwrap_or_default(),
			interval_secs: row.interval_secs,
			enabled: row.enabled,
		}
	}
}

#[derive(sqlx::FromRow)]
struct RunRow {
	id: String,
	job_id: String,
	status: String,
	started_at: DateTime<Utc>,
	completed_at: Option<DateTime<Utc>>,
	duration_ms: Option<i64>,
	error_message: Option<String>,
	retry_count: i64,
	triggered_by: String,
	metadata: Option<String>,
}

impl TryFrom<RunRow> for JobRun {
	type Error = DbError;

	fn try_from(row: RunRow) -> Result<Self> {
		Ok(JobRun {
			id: row.id,
			job_id: row.job_id,
			status: row.status.parse().map_err(DbError::Internal)?,
			started_at: row.started_at,
			completed_at: row.completed_at,
			duration_ms: row.duration_ms,
			error_message: row.error_message,
			retry_count: row.retry_count as u32,
			triggered_by: row.triggered_by.parse().map_err(DbError::Internal)?,
			metadata: row
				.metadata
				.as_deref()
				.and_then(|s| serde_json::from_str(s).ok()),
		})
	}
}

const SELECT_RUN: &str = r#"
	SELECT id, job_id, status, started_at, completed_at, duration_ms, error_message,
		retry_count, triggered_by, metadata
	FROM job_runs
"#;

#[derive(Clone)]
pub struct JobRepository {
	pool: SqlitePool,
}

impl JobRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, def), fields(job_id = %def.id))]
	pub async fn upsert_definition(&self, def: &JobDefinition) -> Result<()> {
		let now = Utc::now();
		sqlx::query(
			r#"
			INSERT INTO job_definitions (id, name, description, job_type, interval_secs, enabled, created_at, updated_at)
			VALUES (?, ?, ?, 'periodic', ?, ?, ?, ?)
			ON CONFLICT(id) DO UPDATE SET
				name = excluded.name,
				description = excluded.description,
				interval_secs = excluded.interval_secs,
				enabled = excluded.enabled,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(&def.id)
		.bind(&def.name)
		.bind(&def.description)
		.bind(def.interval_secs)
		.bind(def.enabled)
		.bind(now)
		.bind(now)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_definitions(&self) -> Result<Vec<JobDefinition>> {
		let rows = sqlx::query_as::<_, DefinitionRow>(
			"SELECT id, name, description, interval_secs, enabled FROM job_definitions ORDER BY name",
		)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.into_iter().map(Into::into).collect())
	}

	#[tracing::instrument(skip(self, run), fields(run_id = %run.id, job_id = %run.job_id))]
	pub async fn record_run_start(&self, run: &JobRun) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO job_runs (id, job_id, status, started_at, retry_count, triggered_by)
			VALUES (?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&run.id)
		.bind(&run.job_id)
		.bind(run.status.as_str())
		.bind(run.started_at)
		.bind(run.retry_count as i64)
		.bind(run.triggered_by.as_str())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self, metadata))]
	pub async fn record_run_complete(
		&self,
		run_id: &str,
		status: JobStatus,
		error: Option<String>,
		metadata: Option<serde_json::Value>,
	) -> Result<()> {
		let now = Utc::now();
		let result = sqlx::query(
			r#"
			UPDATE job_runs
			SET status = ?,
				completed_at = ?,
				duration_ms = CAST((julianday(?) - julianday(started_at)) * 86400000 AS INTEGER),
				error_message = ?,
				metadata = ?
			WHERE id = ?
			"#,
		)
		.bind(status.as_str())
		.bind(now)
		.bind(now)
		.bind(error)
		.bind(metadata.map(|m| m.to_string()))
		.bind(run_id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(run_id.to_string()));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_runs(&self, job_id: &str, limit: u32) -> Result<Vec<JobRun>> {
		let rows = sqlx::query_as::<_, RunRow>(&format!(
			"{SELECT_RUN} WHERE job_id = ? ORDER BY started_at DESC LIMIT ?"
		))
		.bind(job_id)
		.bind(limit as i64)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>> {
		Ok(self.list_runs(job_id, 1).await?.into_iter().next())
	}

	/// Failed runs since the most recent non-failed one.
	#[tracing::instrument(skip(self))]
	pub async fn count_consecutive_failures(&self, job_id: &str) -> Result<u32> {
		let (count,): (i64,) = sqlx::query_as(
			r#"
			SELECT COUNT(*) FROM job_runs
			WHERE job_id = ?1
				AND status = 'failed'
				AND started_at > COALESCE(
					(SELECT MAX(started_at) FROM job_runs WHERE job_id = ?1 AND status != 'failed'),
					''
				)
			"#,
		)
		.bind(job_id)
		.fetch_one(&self.pool)
		.await?;

		Ok(count as u32)
	}

	/// Delete completed runs older than `retention_days`.
	#[tracing::instrument(skip(self))]
	pub async fn cleanup_old_runs(&self, retention_days: u32) -> Result<u64> {
		let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
		let result = sqlx::query("DELETE FROM job_runs WHERE completed_at IS NOT NULL AND completed_at < ?")
			.bind(cutoff)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}
}

/// Storage seam used by the job scheduler.
#[async_trait]
pub trait JobStore: Send + Sync {
	async fn upsert_definition(&self, def: &JobDefinition) -> Result<()>;
	async fn list_definitions(&self) -> Result<Vec<JobDefinition>>;
	async fn record_run_start(&self, run: &JobRun) -> Result<()>;
	async fn record_run_complete(
		&self,
		run_id: &str,
		status: JobStatus,
		error: Option<String>,
		metadata: Option<serde_json::Value>,
	) -> Result<()>;
	async fn list_runs(&self, job_id: &str, limit: u32) -> Result<Vec<JobRun>>;
	async fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>>;
	async fn count_consecutive_failures(&self, job_id: &str) -> Result<u32>;
	async fn cleanup_old_runs(&self, retention_days: u32) -> Result<u64>;
}

#[async_trait]
impl JobStore for JobRepository {
	async fn upsert_definition(&self, def: &JobDefinition) -> Result<()> {
		self.upsert_definition(def).await
	}

	async fn list_definitions(&self) -> Result<Vec<JobDefinition>> {
		self.list_definitions().await
	}

	async fn record_run_start(&self, run: &JobRun) -> Result<()> {
		self.record_run_start(run).await
	}

	async fn record_run_complete(
		&self,
		run_id: &str,
		status: JobStatus,
		error: Option<String>,
		metadata: Option<serde_json::Value>,
	) -> Result<()> {
		self
			.record_run_complete(run_id, status, error, metadata)
			.await
	}

	async fn list_runs(&self, job_id: &str, limit: u32) -> Result<Vec<JobRun>> {
		self.list_runs(job_id, limit).await
	}

	async fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>> {
		self.get_last_run(job_id).await
	}

	async fn count_consecutive_failures(&self, job_id: &str) -> Result<u32> {
		self.count_consecutive_failures(job_id).await
	}

	async fn cleanup_old_runs(&self, retention_days: u32) -> Result<u64> {
		self.cleanup_old_runs(retention_days).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;
	use chrono::Duration;

	async fn repo_with_job() -> (JobRepository, SqlitePool) {
		let pool = create_test_pool().await;
		let repo = JobRepository::new(pool.clone());
		repo
			.upsert_definition(&JobDefinition {
				id: "plugin-reconcile".to_string(),
				name: "Plugin reconcile".to_string(),
				description: "Sync the built-in plugin catalog".to_string(),
				interval_secs: Some(10),
				enabled: true,
			})
			.await
			.unwrap();
		(repo, pool)
	}

	fn run(id: &str, started_at: DateTime<Utc>) -> JobRun {
		JobRun {
			id: id.to_string(),
			job_id: "plugin-reconcile".to_string(),
			status: JobStatus::Running,
			started_at,
			completed_at: None,
			duration_ms: None,
			error_message: None,
			retry_count: 0,
			triggered_by: TriggerSource::Schedule,
			metadata: None,
		}
	}

	#[tokio::test]
	async fn test_run_completion_records_metadata() {
		let (repo, _pool) = repo_with_job().await;

		repo.record_run_start(&run("run-1", Utc::now())).await.unwrap();
		repo
			.record_run_complete(
				"run-1",
				JobStatus::Succeeded,
				None,
				Some(serde_json::json!({"inserted": 13})),
			)
			.await
			.unwrap();

		let last = repo.get_last_run("plugin-reconcile").await.unwrap().unwrap();
		assert_eq!(last.status, JobStatus::Succeeded);
		assert!(last.completed_at.is_some());
		assert_eq!(last.metadata.unwrap()["inserted"], 13);
	}

	#[tokio::test]
	async fn test_complete_unknown_run_is_not_found() {
		let (repo, _pool) = repo_with_job().await;
		let result = repo
			.record_run_complete("missing", JobStatus::Failed, None, None)
			.await;
		assert!(matches!(result, Err(DbError::NotFound(_))));
	}

	#[tokio::test]
	async fn test_consecutive_failures_reset_by_success() {
		let (repo, _pool) = repo_with_job().await;
		let base = Utc::now() - Duration::minutes(10);

		let statuses = [
			JobStatus::Failed,
			JobStatus::Succeeded,
			JobStatus::Failed,
			JobStatus::Failed,
		];
		for (i, status) in statuses.iter().enumerate() {
			let id = format!("run-{i}");
			repo
				.record_run_start(&run(&id, base + Duration::minutes(i as i64)))
				.await
				.unwrap();
			repo.record_run_complete(&id, *status, None, None).await.unwrap();
		}

		assert_eq!(
			repo.count_consecutive_failures("plugin-reconcile").await.unwrap(),
			2
		);
	}

	#[tokio::test]
	async fn test_cleanup_keeps_recent_and_running() {
		let (repo, pool) = repo_with_job().await;

		repo
			.record_run_start(&run("old", Utc::now() - Duration::days(40)))
			.await
			.unwrap();
		repo
			.record_run_complete("old", JobStatus::Succeeded, None, None)
			.await
			.unwrap();
		sqlx::query("UPDATE job_runs SET completed_at = ? WHERE id = 'old'")
			.bind(Utc::now() - Duration::days(40))
			.execute(&pool)
			.await
			.unwrap();

		repo
			.record_run_start(&run("running", Utc::now() - Duration::days(40)))
			.await
			.unwrap();

		assert_eq!(repo.cleanup_old_runs(30).await.unwrap(), 1);
		let remaining = repo.list_runs("plugin-reconcile", 10).await.unwrap();
		assert_eq!(remaining.len(), 1);
		assert_eq!(remaining[0].id, "running");
	}
}
