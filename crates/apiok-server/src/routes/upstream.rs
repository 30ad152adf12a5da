// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Upstream handlers.

use apiok_server_gateway::{NodeDiff, UpstreamInput, UpstreamView};
use axum::extract::{Path, Query, State};

use super::{Created, EnableBody};
use crate::{
	api::AppState,
	api_response::{ApiResponse, ApiResult, Payload},
	pagination::{ListParams, Page},
};

pub async fn add(
	State(state): State<AppState>,
	Payload(input): Payload<UpstreamInput>,
) -> ApiResult<Created> {
	let res_id = state.upstreams.create(input).await?;
	Ok(ApiResponse::ok(res_id.into()))
}

pub async fn list(
	State(state): State<AppState>,
	Query(params): Query<ListParams>,
) -> ApiResult<Page<UpstreamView>> {
	let mut upstreams = state.upstreams.list().await?;
	if let Some(search) = params.search() {
		upstreams.retain(|u| u.upstream.name.contains(search));
	}
	Ok(ApiResponse::ok(params.paginate(upstreams)))
}

pub async fn info(State(state): State<AppState>, Path(res_id): Path<String>) -> ApiResult<UpstreamView> {
	Ok(ApiResponse::ok(state.upstreams.info(&res_id).await?))
}

/// Replace an upstream's settings and reconcile its nodes by `ip-port`.
pub async fn update(
	State(state): State<AppState>,
	Path(res_id): Path<String>,
	Payload(input): Payload<UpstreamInput>,
) -> ApiResult<NodeDiff> {
	Ok(ApiResponse::ok(state.upstreams.update(&res_id, input).await?))
}

pub async fn delete(State(state): State<AppState>, Path(res_id): Path<String>) -> ApiResult<()> {
	state.upstreams.delete(&res_id).await?;
	Ok(ApiResponse::empty())
}

pub async fn switch_enable(
	State(state): State<AppState>,
	Path(res_id): Path<String>,
	Payload(body): Payload<EnableBody>,
) -> ApiResult<()> {
	state.upstreams.switch_enable(&res_id, body.enable).await?;
	Ok(ApiResponse::empty())
}

pub async fn switch_release(State(state): State<AppState>, Path(res_id): Path<String>) -> ApiResult<()> {
	state.upstreams.switch_release(&res_id).await?;
	Ok(ApiResponse::empty())
}
