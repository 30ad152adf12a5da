// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Health check handler.

use apiok_server_db::{SqlitePool, SyncHash};
use apiok_server_jobs::{HealthState, JobsHealthStatus};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tokio::time::Instant;

use crate::api::AppState;

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
	pub status: HealthState,
	pub latency_ms: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
	pub status: HealthState,
	pub database: ComponentHealth,
	pub snapshot: ComponentHealth,
	/// Rolling hash of the data-plane store.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sync_hash: Option<SyncHash>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub jobs: Option<JobsHealthStatus>,
	pub acme_enabled: bool,
}

async fn check_pool(pool: &SqlitePool) -> ComponentHealth {
	let start = Instant::now();
	let result = sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await;
	let latency_ms = start.elapsed().as_millis() as u64;
	match result {
		Ok(_) => ComponentHealth {
			status: HealthState::Healthy,
			latency_ms,
			error: None,
		},
		Err(e) => ComponentHealth {
			status: HealthState::Unhealthy,
			latency_ms,
			error: Some(e.to_string()),
		},
	}
}

/// GET /health
///
/// 200 while both stores answer, 503 otherwise. Failing jobs degrade the
/// status without failing the check.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
	let (database, snapshot) = tokio::join!(check_pool(&state.pool), check_pool(&state.snapshot_pool));

	let sync_hash = match state.snapshot.sync_hash().await {
		Ok(hash) => hash,
		Err(e) => {
			tracing::warn!(error = %e, "failed to read sync hash");
			None
		}
	};

	let jobs = match &state.job_scheduler {
		Some(scheduler) => Some(scheduler.health_status().await),
		None => None,
	};

	let worst_job = jobs.as_ref().map(|j| j.status).unwrap_or(HealthState::Healthy);
	let status = database
		.status
		.max(snapshot.status)
		.max(worst_job.min(HealthState::Degraded));

	let code = if status == HealthState::Unhealthy {
		StatusCode::SERVICE_UNAVAILABLE
	} else {
		StatusCode::OK
	};

	(
		code,
		Json(HealthResponse {
			status,
			database,
			snapshot,
			sync_hash,
			jobs,
			acme_enabled: state.acme.is_some(),
		}),
	)
}
