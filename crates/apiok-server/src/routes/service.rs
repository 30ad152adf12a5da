// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Service handlers.

use apiok_server_gateway::{ServiceInput, ServiceView};
use axum::extract::{Path, Query, State};

use super::{Created, EnableBody, NameBody};
use crate::{
	api::AppState,
	api_response::{ApiResponse, ApiResult, Payload},
	pagination::{ListParams, Page},
};

pub async fn add(
	State(state): State<AppState>,
	Payload(input): Payload<ServiceInput>,
) -> ApiResult<Created> {
	let res_id = state.services.create(input).await?;
	Ok(ApiResponse::ok(res_id.into()))
}

/// Services filtered by name or domain.
pub async fn list(
	State(state): State<AppState>,
	Query(params): Query<ListParams>,
) -> ApiResult<Page<ServiceView>> {
	let services = state.services.list(params.search()).await?;
	Ok(ApiResponse::ok(params.paginate(services)))
}

pub async fn info(State(state): State<AppState>, Path(res_id): Path<String>) -> ApiResult<ServiceView> {
	Ok(ApiResponse::ok(state.services.info(&res_id).await?))
}

pub async fn update(
	State(state): State<AppState>,
	Path(res_id): Path<String>,
	Payload(input): Payload<ServiceInput>,
) -> ApiResult<()> {
	state.services.update(&res_id, input).await?;
	Ok(ApiResponse::empty())
}

pub async fn update_name(
	State(state): State<AppState>,
	Path(res_id): Path<String>,
	Payload(body): Payload<NameBody>,
) -> ApiResult<()> {
	state.services.update_name(&res_id, &body.name).await?;
	Ok(ApiResponse::empty())
}

pub async fn delete(State(state): State<AppState>, Path(res_id): Path<String>) -> ApiResult<()> {
	state.services.delete(&res_id).await?;
	Ok(ApiResponse::empty())
}

pub async fn switch_enable(
	State(state): State<AppState>,
	Path(res_id): Path<String>,
	Payload(body): Payload<EnableBody>,
) -> ApiResult<()> {
	state.services.switch_enable(&res_id, body.enable).await?;
	Ok(ApiResponse::empty())
}

pub async fn switch_release(State(state): State<AppState>, Path(res_id): Path<String>) -> ApiResult<()> {
	state.services.switch_release(&res_id).await?;
	Ok(ApiResponse::empty())
}
