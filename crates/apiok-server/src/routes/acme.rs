// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Let's Encrypt handlers: the public http-01 endpoint and the admin
//! issuance request.

use apiok_common_i18n::t;
use apiok_server_gateway::ErrorCode;
use axum::{
	extract::{Path, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::Created;
use crate::{
	api::AppState,
	api_response::{request_locale, ApiError, ApiResponse, ApiResult, Payload},
};

#[derive(Debug, Deserialize)]
pub struct RequestBody {
	pub domain: String,
	#[serde(default)]
	pub enable: bool,
}

/// GET /.well-known/acme-challenge/{token}
///
/// Serves the key authorization as plain text. Unknown tokens, and every
/// token while ACME is disabled, are a 404.
pub async fn challenge(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(token): Path<String>,
) -> Response {
	let not_found = || {
		let locale = request_locale(&headers, &state.default_locale);
		(
			StatusCode::NOT_FOUND,
			t(locale, &ErrorCode::AcmeChallengeNull.message_key()),
		)
			.into_response()
	};

	let Some(acme) = &state.acme else {
		return not_found();
	};
	match acme.get_challenge_token(&token).await {
		Ok(Some(key_authorization)) => (StatusCode::OK, key_authorization).into_response(),
		Ok(None) => {
			tracing::debug!(token = %token, "unknown challenge token");
			not_found()
		}
		Err(e) => {
			tracing::error!(token = %token, error = %e, "challenge lookup failed");
			StatusCode::INTERNAL_SERVER_ERROR.into_response()
		}
	}
}

/// Issue a certificate for one domain. With `enable` set it takes over the
/// domain's SNI.
pub async fn request(State(state): State<AppState>, Payload(body): Payload<RequestBody>) -> ApiResult<Created> {
	let acme = state
		.acme
		.as_ref()
		.ok_or_else(|| ApiError::new(ErrorCode::AcmeDisabled))?;
	let res_id = acme.request_certificate(&body.domain, body.enable).await?;
	Ok(ApiResponse::with_message(
		res_id.into(),
		"server.api.letsencrypt_requested",
	))
}
