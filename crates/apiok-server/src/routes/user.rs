// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Admin account and session handlers.

use apiok_server_db::User;
use apiok_server_gateway::LoginToken;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use super::Created;
use crate::{
	api::AppState,
	api_response::{ApiResponse, ApiResult, Payload},
	auth_middleware::RequireAuth,
	pagination::{ListParams, Page},
};

#[derive(Debug, Deserialize)]
pub struct LoginBody {
	pub email: String,
	pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AddUserBody {
	pub name: String,
	pub email: String,
	pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordBody {
	pub old_password: String,
	pub new_password: String,
}

pub async fn login(State(state): State<AppState>, Payload(body): Payload<LoginBody>) -> ApiResult<LoginToken> {
	Ok(ApiResponse::ok(
		state.users.login(&body.email, &body.password).await?,
	))
}

pub async fn logout(State(state): State<AppState>, RequireAuth(current): RequireAuth) -> ApiResult<()> {
	state.users.logout(&current.token).await?;
	Ok(ApiResponse::empty())
}

/// Change the caller's own password. Every session of the caller ends,
/// including the one making this request.
pub async fn change_password(
	State(state): State<AppState>,
	RequireAuth(current): RequireAuth,
	Payload(body): Payload<ChangePasswordBody>,
) -> ApiResult<()> {
	state
		.users
		.change_password(&current.user.res_id, &body.old_password, &body.new_password)
		.await?;
	Ok(ApiResponse::empty())
}

pub async fn list(State(state): State<AppState>, Query(params): Query<ListParams>) -> ApiResult<Page<User>> {
	let mut users = state.users.list().await?;
	if let Some(search) = params.search() {
		users.retain(|u| u.name.contains(search) || u.email.contains(search));
	}
	Ok(ApiResponse::ok(params.paginate(users)))
}

pub async fn add(State(state): State<AppState>, Payload(body): Payload<AddUserBody>) -> ApiResult<Created> {
	let res_id = state
		.users
		.add(&body.name, &body.email, &body.password)
		.await?;
	Ok(ApiResponse::ok(res_id.into()))
}

pub async fn delete(State(state): State<AppState>, Path(res_id): Path<String>) -> ApiResult<()> {
	state.users.delete(&res_id).await?;
	Ok(ApiResponse::empty())
}
