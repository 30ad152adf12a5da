// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The `{code, msg, data}` response envelope.
//!
//! Handlers return [`ApiResult`]. Both arms render an English envelope and
//! attach an [`Envelope`] extension; [`localize_layer`] re-renders it in
//! the locale resolved from the request's `Accept-Language` header.

use apiok_common_i18n::{locale_from_accept_language, resolve_locale, t_fmt, DEFAULT_LOCALE};
use apiok_server_acme::AcmeError;
use apiok_server_gateway::{ErrorCode, GatewayError};
use axum::{
	body::Body,
	extract::{rejection::JsonRejection, FromRequest, Request, State},
	http::{header, HeaderMap, StatusCode},
	middleware::Next,
	response::{IntoResponse, Response},
	Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

use crate::api::AppState;

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

/// Unrendered envelope carried on the response until the locale is known.
#[derive(Debug, Clone)]
pub struct Envelope {
	pub code: ErrorCode,
	/// Overrides the code's own message key.
	pub message: Option<&'static str>,
	pub args: Vec<(&'static str, String)>,
	pub data: Value,
}

impl Envelope {
	pub fn render(&self, locale: &str) -> Value {
		let args: Vec<(&str, &str)> = self
			.args
			.iter()
			.map(|(name, value)| (*name, value.as_str()))
			.collect();
		let key = match self.message {
			Some(key) => key.to_string(),
			None => self.code.message_key(),
		};
		json!({
			"code": self.code.code(),
			"msg": t_fmt(locale, &key, &args),
			"data": self.data,
		})
	}

	fn into_response(self, status: StatusCode) -> Response {
		let body = Json(self.render(DEFAULT_LOCALE));
		let mut response = (status, body).into_response();
		response.extensions_mut().insert(self);
		response
	}
}

/// Successful envelope: code 0 plus data.
pub struct ApiResponse<T> {
	data: T,
	message: Option<&'static str>,
}

impl<T: Serialize> ApiResponse<T> {
	pub fn ok(data: T) -> Self {
		Self {
			data,
			message: None,
		}
	}

	/// Success with a message other than the generic one.
	pub fn with_message(data: T, message: &'static str) -> Self {
		Self {
			data,
			message: Some(message),
		}
	}
}

impl ApiResponse<()> {
	pub fn empty() -> Self {
		Self::ok(())
	}
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
	fn into_response(self) -> Response {
		match serde_json::to_value(&self.data) {
			Ok(data) => Envelope {
				code: ErrorCode::Success,
				message: self.message,
				args: Vec::new(),
				data,
			}
			.into_response(StatusCode::OK),
			Err(e) => {
				tracing::error!(error = %e, "failed to serialize response data");
				ApiError::new(ErrorCode::InternalError).into_response()
			}
		}
	}
}

/// Failed envelope. Domain errors use HTTP 200; only authentication
/// failures change the status.
#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	code: ErrorCode,
	args: Vec<(&'static str, String)>,
}

impl ApiError {
	pub fn new(code: ErrorCode) -> Self {
		let status = if code == ErrorCode::Unauthorized {
			StatusCode::UNAUTHORIZED
		} else {
			StatusCode::OK
		};
		Self {
			status,
			code,
			args: Vec::new(),
		}
	}

	pub fn params(detail: impl Into<String>) -> Self {
		let mut err = Self::new(ErrorCode::ParamsError);
		err.args.push(("detail", detail.into()));
		err
	}

	pub fn unauthorized() -> Self {
		Self::new(ErrorCode::Unauthorized)
	}

	pub fn code(&self) -> ErrorCode {
		self.code
	}
}

impl From<GatewayError> for ApiError {
	fn from(err: GatewayError) -> Self {
		if let GatewayError::Db(db) = &err {
			tracing::error!(error = %db, "storage failure");
		}
		let mut api = ApiError::new(err.code());
		api.args = err.args().to_vec();
		api
	}
}

impl From<AcmeError> for ApiError {
	fn from(err: AcmeError) -> Self {
		let code = err.code();
		if code == ErrorCode::InternalError {
			tracing::error!(error = %err, "ACME storage failure");
		}
		let mut api = ApiError::new(code);
		api.args = err.args();
		api
	}
}

impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		ApiError::params(rejection.body_text())
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		Envelope {
			code: self.code,
			message: None,
			args: self.args,
			data: Value::Null,
		}
		.into_response(self.status)
	}
}

/// JSON body extractor whose rejection is a `params_error` envelope.
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
	S: Send + Sync,
	T: DeserializeOwned,
{
	type Rejection = ApiError;

	async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
		let Json(value) = Json::<T>::from_request(req, state).await?;
		Ok(Payload(value))
	}
}

/// Resolve the response locale from `Accept-Language`.
pub fn request_locale(headers: &HeaderMap, server_default: &str) -> &'static str {
	let requested = headers
		.get(header::ACCEPT_LANGUAGE)
		.and_then(|v| v.to_str().ok())
		.and_then(locale_from_accept_language);
	resolve_locale(requested.as_deref(), server_default)
}

/// Re-render envelopes in the caller's locale.
pub async fn localize_layer(State(state): State<AppState>, request: Request, next: Next) -> Response {
	let locale = request_locale(request.headers(), &state.default_locale);
	let mut response = next.run(request).await;

	if locale == DEFAULT_LOCALE {
		return response;
	}
	let Some(envelope) = response.extensions_mut().remove::<Envelope>() else {
		return response;
	};

	let (mut parts, _) = response.into_parts();
	let body = envelope.render(locale).to_string();
	parts.headers.remove(header::CONTENT_LENGTH);
	parts.extensions.insert(envelope);
	Response::from_parts(parts, Body::from(body))
}
