// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Plugin config handlers, mounted once per scope.
//!
//! The scope comes from an [`Extension`] set on the nested router. Service
//! and router configs name their owner in `target_id`; global configs have
//! none. A config is only visible through the routes of its own scope.

use apiok_server_db::{PluginConfig, PluginConfigScope};
use apiok_server_gateway::{ErrorCode, PluginConfigInput, PluginConfigUpdate};
use axum::{
	extract::{Path, Query, State},
	Extension,
};
use serde::Deserialize;

use super::{Created, EnableBody};
use crate::{
	api::AppState,
	api_response::{ApiError, ApiResponse, ApiResult, Payload},
};

#[derive(Debug, Deserialize)]
pub struct AddBody {
	#[serde(default)]
	pub target_id: String,
	#[serde(flatten)]
	pub input: PluginConfigInput,
}

#[derive(Debug, Default, Deserialize)]
pub struct TargetFilter {
	#[serde(default)]
	pub target_id: String,
}

async fn scoped(state: &AppState, scope: PluginConfigScope, res_id: &str) -> Result<PluginConfig, ApiError> {
	let config = state.plugins.config_info(res_id).await?;
	if config.scope != scope {
		return Err(ApiError::new(ErrorCode::PluginConfigNull));
	}
	Ok(config)
}

pub async fn add(
	State(state): State<AppState>,
	Extension(scope): Extension<PluginConfigScope>,
	Payload(body): Payload<AddBody>,
) -> ApiResult<Created> {
	let res_id = state
		.plugins
		.config_add(scope, &body.target_id, body.input)
		.await?;
	Ok(ApiResponse::ok(res_id.into()))
}

pub async fn list(
	State(state): State<AppState>,
	Extension(scope): Extension<PluginConfigScope>,
	Query(filter): Query<TargetFilter>,
) -> ApiResult<Vec<PluginConfig>> {
	Ok(ApiResponse::ok(
		state.plugins.config_list(scope, &filter.target_id).await?,
	))
}

pub async fn info(
	State(state): State<AppState>,
	Extension(scope): Extension<PluginConfigScope>,
	Path(res_id): Path<String>,
) -> ApiResult<PluginConfig> {
	Ok(ApiResponse::ok(scoped(&state, scope, &res_id).await?))
}

pub async fn update(
	State(state): State<AppState>,
	Extension(scope): Extension<PluginConfigScope>,
	Path(res_id): Path<String>,
	Payload(input): Payload<PluginConfigUpdate>,
) -> ApiResult<()> {
	scoped(&state, scope, &res_id).await?;
	state.plugins.config_update(&res_id, input).await?;
	Ok(ApiResponse::empty())
}

pub async fn delete(
	State(state): State<AppState>,
	Extension(scope): Extension<PluginConfigScope>,
	Path(res_id): Path<String>,
) -> ApiResult<()> {
	scoped(&state, scope, &res_id).await?;
	state.plugins.config_delete(&res_id).await?;
	Ok(ApiResponse::empty())
}

pub async fn switch_enable(
	State(state): State<AppState>,
	Extension(scope): Extension<PluginConfigScope>,
	Path(res_id): Path<String>,
	Payload(body): Payload<EnableBody>,
) -> ApiResult<()> {
	scoped(&state, scope, &res_id).await?;
	state
		.plugins
		.config_switch_enable(&res_id, body.enable)
		.await?;
	Ok(ApiResponse::empty())
}
