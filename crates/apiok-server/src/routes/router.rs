// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Router handlers.

use apiok_server_db::Router;
use apiok_server_gateway::RouterInput;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use super::{Created, EnableBody, NameBody};
use crate::{
	api::AppState,
	api_response::{ApiResponse, ApiResult, Payload},
	pagination::{ListParams, Page},
};

#[derive(Debug, Deserialize)]
pub struct ServiceFilter {
	pub service_res_id: String,
}

pub async fn add(
	State(state): State<AppState>,
	Payload(input): Payload<RouterInput>,
) -> ApiResult<Created> {
	let res_id = state.routers.create(input).await?;
	Ok(ApiResponse::ok(res_id.into()))
}

/// Routers of one service, optionally filtered by name or path.
pub async fn list(
	State(state): State<AppState>,
	Query(filter): Query<ServiceFilter>,
	Query(params): Query<ListParams>,
) -> ApiResult<Page<Router>> {
	let mut routers = state.routers.list(&filter.service_res_id).await?;
	if let Some(search) = params.search() {
		routers.retain(|r| r.router_name.contains(search) || r.router_path.contains(search));
	}
	Ok(ApiResponse::ok(params.paginate(routers)))
}

pub async fn info(State(state): State<AppState>, Path(res_id): Path<String>) -> ApiResult<Router> {
	Ok(ApiResponse::ok(state.routers.info(&res_id).await?))
}

pub async fn update(
	State(state): State<AppState>,
	Path(res_id): Path<String>,
	Payload(input): Payload<RouterInput>,
) -> ApiResult<()> {
	state.routers.update(&res_id, input).await?;
	Ok(ApiResponse::empty())
}

pub async fn update_name(
	State(state): State<AppState>,
	Path(res_id): Path<String>,
	Payload(body): Payload<NameBody>,
) -> ApiResult<()> {
	state.routers.update_name(&res_id, &body.name).await?;
	Ok(ApiResponse::empty())
}

pub async fn delete(State(state): State<AppState>, Path(res_id): Path<String>) -> ApiResult<()> {
	state.routers.delete(&res_id).await?;
	Ok(ApiResponse::empty())
}

pub async fn switch_enable(
	State(state): State<AppState>,
	Path(res_id): Path<String>,
	Payload(body): Payload<EnableBody>,
) -> ApiResult<()> {
	state.routers.switch_enable(&res_id, body.enable).await?;
	Ok(ApiResponse::empty())
}

pub async fn switch_release(State(state): State<AppState>, Path(res_id): Path<String>) -> ApiResult<()> {
	state.routers.switch_release(&res_id).await?;
	Ok(ApiResponse::empty())
}

/// Clone a router, unpublished, under a suffixed name and path.
pub async fn copy(State(state): State<AppState>, Path(res_id): Path<String>) -> ApiResult<Created> {
	let res_id = state.routers.copy(&res_id).await?;
	Ok(ApiResponse::ok(res_id.into()))
}
