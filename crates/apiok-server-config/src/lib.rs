// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the apiok admin server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`APIOK_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use apiok_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Server listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub snapshot: SnapshotConfig,
	pub logging: LoggingConfig,
	pub auth: AuthConfig,
	pub jobs: JobsConfig,
	/// Present only when ACME issuance is enabled and fully configured.
	pub acme: Option<AcmeConfig>,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`APIOK_SERVER_*`)
/// 2. Config file (`APIOK_SERVER_CONFIG` or `/etc/apiok/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<ServerConfig, ConfigError> {
	let mut merged = ServerConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		http: layer.http.unwrap_or_default().finalize(),
		database: layer.database.unwrap_or_default().finalize(),
		snapshot: layer.snapshot.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
		auth: layer.auth.unwrap_or_default().finalize(),
		jobs: layer.jobs.unwrap_or_default().finalize(),
		acme: layer.acme.and_then(|l| l.finalize()),
	};

	validate_config(&config)?;

	info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		snapshot = %config.snapshot.url,
		acme_enabled = config.acme.is_some(),
		bootstrap_admin = config.auth.bootstrap_admin.is_some(),
		"Server configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	if config.database.url.trim().is_empty() {
		return Err(ConfigError::Validation(
			"database url must not be empty".to_string(),
		));
	}

	if config.database.url == config.snapshot.url {
		return Err(ConfigError::Validation(format!(
			"snapshot url must differ from the database url ({})",
			config.database.url
		)));
	}

	if let Some(acme) = &config.acme {
		if acme.renew_before_days == 0 {
			return Err(ConfigError::Validation(
				"acme.renew_before_days must be at least 1".to_string(),
			));
		}
	}

	Ok(())
}
