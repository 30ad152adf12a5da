// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::types::{decode_flag, encode_flag};

/// Optional proxy tuning shared by services and routers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyOptions {
	/// Size string such as `"10m"`; parsed when the document is built.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_max_body_size: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub chunked_transfer_encoding: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub proxy_buffering: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub proxy_cache: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub proxy_set_header: Option<BTreeMap<String, String>>,
}

pub(crate) struct ProxyColumns {
	pub client_max_body_size: Option<String>,
	pub chunked_transfer_encoding: Option<i64>,
	pub proxy_buffering: Option<i64>,
	pub proxy_cache: Option<String>,
	pub proxy_set_header: Option<String>,
}

impl ProxyOptions {
	pub(crate) fn to_columns(&self) -> Result<ProxyColumns> {
		Ok(ProxyColumns {
			client_max_body_size: self
				.client_max_body_size
				.as_ref()
				.map(|s| s.trim().to_string())
				.filter(|s| !s.is_empty()),
			chunked_transfer_encoding: encode_flag(self.chunked_transfer_encoding),
			proxy_buffering: encode_flag(self.proxy_buffering),
			proxy_cache: self
				.proxy_cache
				.as_ref()
				.map(serde_json::to_string)
				.transpose()?,
			proxy_set_header: self
				.proxy_set_header
				.as_ref()
				.map(serde_json::to_string)
				.transpose()?,
		})
	}

	pub(crate) fn from_columns(columns: ProxyColumns) -> Result<Self> {
		Ok(Self {
			client_max_body_size: columns.client_max_body_size,
			chunked_transfer_encoding: decode_flag(columns.chunked_transfer_encoding)?,
			proxy_buffering: decode_flag(columns.proxy_buffering)?,
			proxy_cache: columns
				.proxy_cache
				.as_deref()
				.map(serde_json::from_str)
				.transpose()?,
			proxy_set_header: columns
				.proxy_set_header
				.as_deref()
				.map(serde_json::from_str)
				.transpose()?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_blank_body_size_is_dropped() {
		let options = ProxyOptions {
			client_max_body_size: Some("  ".to_string()),
			..Default::default()
		};
		assert!(options.to_columns().unwrap().client_max_body_size.is_none());
	}

	#[test]
	fn test_columns_preserve_values() {
		let options = ProxyOptions {
			client_max_body_size: Some("10m".to_string()),
			chunked_transfer_encoding: Some(false),
			proxy_buffering: Some(true),
			proxy_cache: Some(json!({"key": "$uri", "valid": 60})),
			proxy_set_header: Some(BTreeMap::from([(
				"X-Env".to_string(),
				"prod".to_string(),
			)])),
		};
		let decoded = ProxyOptions::from_columns(options.to_columns().unwrap()).unwrap();
		assert_eq!(decoded, options);
	}
}
