// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! ACME (Let's Encrypt) configuration section.
//!
//! The section is optional: it only resolves to an [`AcmeConfig`] when
//! `enabled = true` and a contact email is set.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AcmeConfigLayer {
	#[serde(default)]
	pub enabled: Option<bool>,
	#[serde(default)]
	pub email: Option<String>,
	#[serde(default)]
	pub use_staging: Option<bool>,
	#[serde(default)]
	pub cert_dir: Option<String>,
	#[serde(default)]
	pub renew_before_days: Option<u32>,
	#[serde(default)]
	pub renew_interval_secs: Option<u64>,
	#[serde(default)]
	pub renew_initial_delay_secs: Option<u64>,
	#[serde(default)]
	pub order_timeout_secs: Option<u64>,
}

impl AcmeConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.email.is_some() {
			self.email = other.email;
		}
		if other.use_staging.is_some() {
			self.use_staging = other.use_staging;
		}
		if other.cert_dir.is_some() {
			self.cert_dir = other.cert_dir;
		}
		if other.renew_before_days.is_some() {
			self.renew_before_days = other.renew_before_days;
		}
		if other.renew_interval_secs.is_some() {
			self.renew_interval_secs = other.renew_interval_secs;
		}
		if other.renew_initial_delay_secs.is_some() {
			self.renew_initial_delay_secs = other.renew_initial_delay_secs;
		}
		if other.order_timeout_secs.is_some() {
			self.order_timeout_secs = other.order_timeout_secs;
		}
	}

	pub fn finalize(self) -> Option<AcmeConfig> {
		if !self.enabled.unwrap_or(false) {
			return None;
		}
		let email = self.email.filter(|e| !e.trim().is_empty())?;

		Some(AcmeConfig {
			email,
			use_staging: self.use_staging.unwrap_or(false),
			cert_dir: PathBuf::from(self.cert_dir.unwrap_or_else(|| "./certs".to_string())),
			renew_before_days: self.renew_before_days.unwrap_or(30),
			renew_interval: Duration::from_secs(self.renew_interval_secs.unwrap_or(86_400)),
			renew_initial_delay: Duration::from_secs(self.renew_initial_delay_secs.unwrap_or(60)),
			order_timeout: Duration::from_secs(self.order_timeout_secs.unwrap_or(120)),
		})
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcmeConfig {
	pub email: String,
	pub use_staging: bool,
	/// Holds the persisted ACME account credentials.
	pub cert_dir: PathBuf,
	pub renew_before_days: u32,
	pub renew_interval: Duration,
	pub renew_initial_delay: Duration,
	/// Deadline for the network part of one issuance attempt.
	pub order_timeout: Duration,
}
