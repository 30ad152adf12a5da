// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Certificate handlers. Private keys are never returned.

use apiok_server_db::Certificate;
use apiok_server_gateway::CertificateInput;
use axum::extract::{Path, Query, State};

use super::{Created, EnableBody};
use crate::{
	api::AppState,
	api_response::{ApiResponse, ApiResult, Payload},
	pagination::{ListParams, Page},
};

pub async fn list(
	State(state): State<AppState>,
	Query(params): Query<ListParams>,
) -> ApiResult<Page<Certificate>> {
	let certificates = state.certificates.list(params.search()).await?;
	Ok(ApiResponse::ok(params.paginate(certificates)))
}

pub async fn add(
	State(state): State<AppState>,
	Payload(input): Payload<CertificateInput>,
) -> ApiResult<Created> {
	let res_id = state.certificates.add(input).await?;
	Ok(ApiResponse::ok(res_id.into()))
}

pub async fn info(State(state): State<AppState>, Path(res_id): Path<String>) -> ApiResult<Certificate> {
	Ok(ApiResponse::ok(state.certificates.info(&res_id).await?))
}

pub async fn update(
	State(state): State<AppState>,
	Path(res_id): Path<String>,
	Payload(input): Payload<CertificateInput>,
) -> ApiResult<()> {
	state.certificates.update(&res_id, input).await?;
	Ok(ApiResponse::empty())
}

pub async fn delete(State(state): State<AppState>, Path(res_id): Path<String>) -> ApiResult<()> {
	state.certificates.delete(&res_id).await?;
	Ok(ApiResponse::empty())
}

pub async fn switch_enable(
	State(state): State<AppState>,
	Path(res_id): Path<String>,
	Payload(body): Payload<EnableBody>,
) -> ApiResult<()> {
	state
		.certificates
		.switch_enable(&res_id, body.enable)
		.await?;
	Ok(ApiResponse::empty())
}
