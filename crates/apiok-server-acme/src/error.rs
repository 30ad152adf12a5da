// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use apiok_server_db::DbError;
use apiok_server_gateway::{ErrorCode, GatewayError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AcmeError>;

#[derive(Debug, Error)]
pub enum AcmeError {
	#[error("domain cannot be issued over http-01: {0}")]
	InvalidDomain(String),

	#[error("ACME protocol error: {0}")]
	Protocol(#[from] instant_acme::Error),

	#[error("no http-01 challenge found for {0}")]
	NoHttp01Challenge(String),

	#[error("ACME validation failed: {0}")]
	Validation(String),

	#[error("ACME order for {domain} timed out after {secs}s")]
	Timeout { domain: String, secs: u64 },

	#[error("key generation failed: {0}")]
	Key(#[from] rcgen::Error),

	#[error("account storage error: {0}")]
	Io(#[from] std::io::Error),

	#[error("account credentials are corrupt: {0}")]
	Credentials(#[from] serde_json::Error),

	#[error(transparent)]
	Gateway(#[from] GatewayError),

	#[error(transparent)]
	Db(#[from] DbError),
}

impl From<sqlx::Error> for AcmeError {
	fn from(err: sqlx::Error) -> Self {
		AcmeError::Db(DbError::Sqlx(err))
	}
}

impl AcmeError {
	/// Admin API code for this failure.
	pub fn code(&self) -> ErrorCode {
		match self {
			AcmeError::InvalidDomain(_) => ErrorCode::ParamsError,
			AcmeError::Gateway(e) => e.code(),
			AcmeError::Db(DbError::IdConflict { .. }) => ErrorCode::IdConflict,
			AcmeError::Db(_) | AcmeError::Io(_) | AcmeError::Credentials(_) => {
				ErrorCode::InternalError
			}
			_ => ErrorCode::AcmeRequestError,
		}
	}

	/// Named message arguments for the localized error text.
	pub fn args(&self) -> Vec<(&'static str, String)> {
		match self {
			AcmeError::Gateway(e) => e.args().to_vec(),
			AcmeError::Db(_) | AcmeError::Io(_) | AcmeError::Credentials(_) => Vec::new(),
			other => vec![("detail", other.to_string())],
		}
	}
}
