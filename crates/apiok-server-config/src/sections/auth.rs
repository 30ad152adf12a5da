// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Admin login configuration.

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct AuthConfig {
	pub token_ttl_hours: u32,
	/// Account created on startup when the user table is empty.
	pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Clone)]
pub struct BootstrapAdmin {
	pub email: String,
	pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BootstrapAdmin")
			.field("email", &self.email)
			.field("password", &"[REDACTED]")
			.finish()
	}
}

impl Default for AuthConfig {
	fn default() -> Self {
		AuthConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfigLayer {
	#[serde(default)]
	pub token_ttl_hours: Option<u32>,
	#[serde(default)]
	pub admin_email: Option<String>,
	#[serde(default)]
	pub admin_password: Option<String>,
}

impl AuthConfigLayer {
	pub fn merge(&mut self, other: AuthConfigLayer) {
		if other.token_ttl_hours.is_some() {
			self.token_ttl_hours = other.token_ttl_hours;
		}
		if other.admin_email.is_some() {
			self.admin_email = other.admin_email;
		}
		if other.admin_password.is_some() {
			self.admin_password = other.admin_password;
		}
	}

	pub fn finalize(self) -> AuthConfig {
		let bootstrap_admin = match (self.admin_email, self.admin_password) {
			(Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
			_ => None,
		};

		AuthConfig {
			token_ttl_hours: self.token_ttl_hours.unwrap_or(24),
			bootstrap_admin,
		}
	}
}
