// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Plugin catalog handlers.

use apiok_server_db::Plugin;
use apiok_server_gateway::{PluginInfo, PluginTypeView};
use axum::extract::{Path, State};

use crate::{
	api::AppState,
	api_response::{ApiResponse, ApiResult},
};

pub async fn type_list(State(state): State<AppState>) -> ApiResult<Vec<PluginTypeView>> {
	Ok(ApiResponse::ok(state.plugins.type_list()))
}

/// Plugins that can be configured.
pub async fn add_list(State(state): State<AppState>) -> ApiResult<Vec<Plugin>> {
	Ok(ApiResponse::ok(state.plugins.catalog().await?))
}

pub async fn info(State(state): State<AppState>, Path(res_id): Path<String>) -> ApiResult<PluginInfo> {
	Ok(ApiResponse::ok(state.plugins.info(&res_id).await?))
}
