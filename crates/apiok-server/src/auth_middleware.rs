// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bearer-token authentication for the admin routes.
//!
//! [`auth_layer`] resolves `Authorization: Bearer <token>` to a user and
//! stores a [`CurrentUser`] extension; requests without a valid token stop
//! there with a 401 envelope. Handlers that need the caller use the
//! [`RequireAuth`] extractor.

use apiok_server_db::User;
use axum::{
	extract::{FromRequestParts, Request, State},
	http::{header, request::Parts, HeaderMap},
	middleware::Next,
	response::{IntoResponse, Response},
};
use tracing::instrument;

use crate::{api::AppState, api_response::ApiError};

/// The authenticated caller and the token it presented.
#[derive(Debug, Clone)]
pub struct CurrentUser {
	pub user: User,
	pub token: String,
}

/// Extract the token of an `Authorization: Bearer` header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
	let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
	let (scheme, token) = value.split_once(' ')?;
	if !scheme.eq_ignore_ascii_case("bearer") {
		return None;
	}
	let token = token.trim();
	(!token.is_empty()).then_some(token)
}

#[instrument(name = "auth_layer", skip_all)]
pub async fn auth_layer(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
	let Some(token) = extract_bearer_token(request.headers()).map(str::to_string) else {
		tracing::debug!("no bearer token");
		return ApiError::unauthorized().into_response();
	};

	match state.users.authenticate(&token).await {
		Ok(user) => {
			tracing::debug!(user = %user.res_id, "authenticated");
			request.extensions_mut().insert(CurrentUser { user, token });
			next.run(request).await
		}
		Err(e) => {
			tracing::debug!(error = %e, "bearer token rejected");
			ApiError::from(e).into_response()
		}
	}
}

/// Extractor for handlers behind [`auth_layer`].
pub struct RequireAuth(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAuth
where
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		parts
			.extensions
			.get::<CurrentUser>()
			.cloned()
			.map(RequireAuth)
			.ok_or_else(ApiError::unauthorized)
	}
}
