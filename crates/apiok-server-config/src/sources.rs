// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	AcmeConfigLayer, AuthConfigLayer, DatabaseConfigLayer, HttpConfigLayer, JobsConfigLayer,
	LoggingConfigLayer, SnapshotConfigLayer,
};

/// Default location of the system config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/apiok/server.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// `APIOK_SERVER_CONFIG` if set, otherwise [`SYSTEM_CONFIG_PATH`].
	pub fn system() -> Self {
		Self::new(env_var("APIOK_SERVER_CONFIG").unwrap_or_else(|| SYSTEM_CONFIG_PATH.to_string()))
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: APIOK_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			http: Some(load_http_from_env()?),
			database: Some(load_database_from_env()?),
			snapshot: Some(load_snapshot_from_env()?),
			logging: Some(load_logging_from_env()?),
			auth: Some(load_auth_from_env()?),
			jobs: Some(load_jobs_from_env()?),
			acme: Some(load_acme_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_parse<T: std::str::FromStr>(name: &str, kind: &str) -> Result<Option<T>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid {kind} value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u16(name: &str) -> Result<Option<u16>, ConfigError> {
	env_parse(name, "u16")
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
	env_parse(name, "u32")
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	env_parse(name, "u64")
}

/// Read a secret from `NAME`, or from the file named by `NAME_FILE`.
fn load_secret_env(name: &str) -> Result<Option<String>, ConfigError> {
	if let Some(value) = env_var(name) {
		return Ok(Some(value));
	}

	let file_var = format!("{name}_FILE");
	match env_var(&file_var) {
		Some(path) => std::fs::read_to_string(&path)
			.map(|s| Some(s.trim_end().to_string()))
			.map_err(|e| ConfigError::Secret(format!("{file_var}={path}: {e}"))),
		None => Ok(None),
	}
}

fn load_http_from_env() -> Result<HttpConfigLayer, ConfigError> {
	Ok(HttpConfigLayer {
		host: env_var("APIOK_SERVER_HOST"),
		port: env_u16("APIOK_SERVER_PORT")?,
	})
}

fn load_database_from_env() -> Result<DatabaseConfigLayer, ConfigError> {
	Ok(DatabaseConfigLayer {
		url: env_var("APIOK_SERVER_DATABASE_URL"),
	})
}

fn load_snapshot_from_env() -> Result<SnapshotConfigLayer, ConfigError> {
	Ok(SnapshotConfigLayer {
		url: env_var("APIOK_SERVER_SNAPSHOT_URL"),
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	Ok(LoggingConfigLayer {
		level: env_var("APIOK_SERVER_LOG_LEVEL"),
		locale: env_var("APIOK_SERVER_DEFAULT_LOCALE"),
	})
}

fn load_auth_from_env() -> Result<AuthConfigLayer, ConfigError> {
	Ok(AuthConfigLayer {
		token_ttl_hours: env_u32("APIOK_SERVER_AUTH_TOKEN_TTL_HOURS")?,
		admin_email: env_var("APIOK_SERVER_ADMIN_EMAIL"),
		admin_password: load_secret_env("APIOK_SERVER_ADMIN_PASSWORD")?,
	})
}

fn load_jobs_from_env() -> Result<JobsConfigLayer, ConfigError> {
	Ok(JobsConfigLayer {
		plugin_reconcile_interval_secs: env_u64("APIOK_SERVER_PLUGIN_RECONCILE_INTERVAL_SECS")?,
		challenge_cleanup_interval_secs: env_u64("APIOK_SERVER_CHALLENGE_CLEANUP_INTERVAL_SECS")?,
		history_retention_days: env_u32("APIOK_SERVER_JOB_HISTORY_RETENTION_DAYS")?,
	})
}

fn load_acme_from_env() -> Result<AcmeConfigLayer, ConfigError> {
	Ok(AcmeConfigLayer {
		enabled: env_bool("APIOK_SERVER_ACME_ENABLED"),
		email: env_var("APIOK_SERVER_ACME_EMAIL"),
		use_staging: env_bool("APIOK_SERVER_ACME_USE_STAGING"),
		cert_dir: env_var("APIOK_SERVER_ACME_CERT_DIR"),
		renew_before_days: env_u32("APIOK_SERVER_ACME_RENEW_BEFORE_DAYS")?,
		renew_interval_secs: env_u64("APIOK_SERVER_ACME_RENEW_INTERVAL_SECS")?,
		renew_initial_delay_secs: env_u64("APIOK_SERVER_ACME_RENEW_INITIAL_DELAY_SECS")?,
		order_timeout_secs: env_u64("APIOK_SERVER_ACME_ORDER_TIMEOUT_SECS")?,
	})
}
