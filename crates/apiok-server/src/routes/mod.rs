// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP route handlers.

pub mod acme;
pub mod certificate;
pub mod health;
pub mod plugin;
pub mod plugin_config;
pub mod release;
pub mod router;
pub mod service;
pub mod upstream;
pub mod user;

use apiok_server_db::Enable;
use serde::{Deserialize, Serialize};

/// Response data of every create handler.
#[derive(Debug, Serialize)]
pub struct Created {
	pub res_id: String,
}

impl From<String> for Created {
	fn from(res_id: String) -> Self {
		Self { res_id }
	}
}

#[derive(Debug, Deserialize)]
pub struct NameBody {
	pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct EnableBody {
	pub enable: Enable,
}
