// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Batch release of services, routers or upstreams.

use apiok_server_gateway::{ReleaseIntent, ReleaseKind, ReleaseReport};
use axum::extract::State;
use serde::Deserialize;

use crate::{
	api::AppState,
	api_response::{ApiError, ApiResponse, ApiResult, Payload},
};

#[derive(Debug, Deserialize)]
pub struct ReleaseBody {
	pub kind: ReleaseKind,
	pub res_ids: Vec<String>,
	/// `push` or `delete`.
	#[serde(rename = "type")]
	pub intent: String,
}

pub async fn release(State(state): State<AppState>, Payload(body): Payload<ReleaseBody>) -> ApiResult<ReleaseReport> {
	let intent: ReleaseIntent = body.intent.parse()?;
	if body.res_ids.is_empty() {
		return Err(ApiError::params("res_ids is empty"));
	}
	if intent == ReleaseIntent::Push {
		state
			.engine
			.ensure_batch_releasable(body.kind, &body.res_ids)
			.await?;
	}
	let report = state
		.engine
		.release(body.kind, &body.res_ids, intent)
		.await?;
	Ok(ApiResponse::ok(report))
}
