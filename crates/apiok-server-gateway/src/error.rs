// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for gateway admin operations.
//!
//! Domain failures carry a stable [`ErrorCode`] plus the named arguments its
//! localized message needs. The HTTP layer turns them into
//! `{code, msg, data}` envelopes; storage failures collapse to
//! [`ErrorCode::InternalError`] there.

use std::fmt;

use apiok_server_db::DbError;
use thiserror::Error;

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

macro_rules! error_codes {
	($($variant:ident = $code:literal => $key:literal),+ $(,)?) => {
		/// Machine-stable admin API codes.
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
		pub enum ErrorCode {
			$($variant),+
		}

		impl ErrorCode {
			pub const ALL: &'static [ErrorCode] = &[$(ErrorCode::$variant),+];

			/// Numeric code exposed in the response envelope.
			pub fn code(self) -> i32 {
				match self {
					$(ErrorCode::$variant => $code),+
				}
			}

			pub fn as_str(self) -> &'static str {
				match self {
					$(ErrorCode::$variant => $key),+
				}
			}
		}
	};
}

error_codes! {
	Success = 0 => "success",
	ParamsError = 10001 => "params_error",
	InternalError = 10002 => "internal_error",
	Unauthorized = 10003 => "unauthorized",
	IdConflict = 10004 => "id_conflict",
	ReleaseTypeError = 10005 => "release_type_error",
	SwitchPublished = 10006 => "switch_published",
	SwitchNoChange = 10007 => "switch_no_change",
	SizeFormatError = 10008 => "size_format_error",
	ServiceNull = 11001 => "service_null",
	ServiceDomainExist = 11002 => "service_domain_exist",
	ServiceDomainFormatError = 11003 => "service_domain_format_error",
	ServiceDomainSslNull = 11004 => "service_domain_ssl_null",
	ServiceBindingRouter = 11005 => "service_binding_router",
	RouterNull = 12001 => "router_null",
	RouterPathExist = 12002 => "router_path_exist",
	RouterDefaultPathNoPermission = 12003 => "router_default_path_no_permission",
	RouterDefaultPathForbiddenPrefix = 12004 => "router_default_path_forbidden_prefix",
	RouterServiceUnpublished = 12005 => "router_service_unpublished",
	RouterMethodError = 12006 => "router_method_error",
	UpstreamNull = 13001 => "upstream_null",
	UpstreamNameExist = 13002 => "upstream_name_exist",
	UpstreamRouterExist = 13003 => "upstream_router_exist",
	UpstreamNodeError = 13004 => "upstream_node_error",
	PluginNull = 14001 => "plugin_null",
	PluginConfigNull = 14002 => "plugin_config_null",
	PluginConfigExist = 14003 => "plugin_config_exist",
	PluginConfigFormatError = 14004 => "plugin_config_format_error",
	CertificateNull = 15001 => "certificate_null",
	CertificateFormatError = 15002 => "certificate_format_error",
	CertificateParseError = 15003 => "certificate_parse_error",
	CertificateSyncError = 15004 => "certificate_sync_error",
	CertificateInconsistent = 15005 => "certificate_inconsistent",
	UserLoginError = 16001 => "user_login_error",
	UserNull = 16002 => "user_null",
	UserEmailExist = 16003 => "user_email_exist",
	AcmeDisabled = 17001 => "acme_disabled",
	AcmeRequestError = 17002 => "acme_request_error",
	AcmeChallengeNull = 17003 => "acme_challenge_null",
}

impl ErrorCode {
	/// i18n key of the localized message, e.g. `server.api.router_null`.
	pub fn message_key(self) -> String {
		format!("server.api.{}", self.as_str())
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A domain error: the code plus named message arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainError {
	pub code: ErrorCode,
	pub args: Vec<(&'static str, String)>,
}

impl fmt::Display for DomainError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.code)?;
		for (name, value) in &self.args {
			write!(f, " {name}={value}")?;
		}
		Ok(())
	}
}

#[derive(Debug, Error)]
pub enum GatewayError {
	#[error("{0}")]
	Domain(DomainError),

	#[error("database error: {0}")]
	Db(#[from] DbError),
}

impl GatewayError {
	pub fn new(code: ErrorCode) -> Self {
		GatewayError::Domain(DomainError {
			code,
			args: Vec::new(),
		})
	}

	/// Domain error with one named message argument.
	pub fn with(code: ErrorCode, name: &'static str, value: impl Into<String>) -> Self {
		GatewayError::Domain(DomainError {
			code,
			args: vec![(name, value.into())],
		})
	}

	/// Domain error whose argument is a comma-joined list, e.g. colliding domains.
	pub fn listing(code: ErrorCode, name: &'static str, values: &[String]) -> Self {
		Self::with(code, name, values.join(","))
	}

	pub fn params(detail: impl Into<String>) -> Self {
		Self::with(ErrorCode::ParamsError, "detail", detail)
	}

	pub fn code(&self) -> ErrorCode {
		match self {
			GatewayError::Domain(e) => e.code,
			GatewayError::Db(DbError::IdConflict { .. }) => ErrorCode::IdConflict,
			GatewayError::Db(_) => ErrorCode::InternalError,
		}
	}

	pub fn args(&self) -> &[(&'static str, String)] {
		match self {
			GatewayError::Domain(e) => &e.args,
			GatewayError::Db(_) => &[],
		}
	}

	pub fn is_code(&self, code: ErrorCode) -> bool {
		self.code() == code
	}
}

impl From<sqlx::Error> for GatewayError {
	fn from(err: sqlx::Error) -> Self {
		GatewayError::Db(DbError::Sqlx(err))
	}
}

impl From<serde_json::Error> for GatewayError {
	fn from(err: serde_json::Error) -> Self {
		GatewayError::Db(DbError::Serialization(err))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;

	#[test]
	fn test_codes_are_unique() {
		let codes: HashSet<_> = ErrorCode::ALL.iter().map(|c| c.code()).collect();
		assert_eq!(codes.len(), ErrorCode::ALL.len());
		let keys: HashSet<_> = ErrorCode::ALL.iter().map(|c| c.as_str()).collect();
		assert_eq!(keys.len(), ErrorCode::ALL.len());
	}

	#[test]
	fn test_storage_errors_map_to_internal() {
		let err = GatewayError::from(DbError::Internal("boom".to_string()));
		assert_eq!(err.code(), ErrorCode::InternalError);
		assert!(err.args().is_empty());

		let err = GatewayError::from(DbError::IdConflict {
			prefix: "rt",
			attempts: 5,
		});
		assert_eq!(err.code(), ErrorCode::IdConflict);
	}

	#[test]
	fn test_listing_joins_values() {
		let err = GatewayError::listing(
			ErrorCode::ServiceDomainExist,
			"domains",
			&["a.example.com".to_string(), "b.example.com".to_string()],
		);
		assert_eq!(err.args(), &[("domains", "a.example.com,b.example.com".to_string())]);
		assert_eq!(
			err.to_string(),
			"service_domain_exist domains=a.example.com,b.example.com"
		);
	}

	#[test]
	fn test_message_key() {
		assert_eq!(ErrorCode::RouterNull.message_key(), "server.api.router_null");
	}
}
