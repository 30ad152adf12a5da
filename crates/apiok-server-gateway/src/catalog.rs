// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Built-in plugin catalog.

use apiok_server_db::PluginType;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
	pub key: &'static str,
	pub icon: &'static str,
	pub plugin_type: PluginType,
	pub description: &'static str,
}

macro_rules! catalog {
	($($key:literal, $type:ident, $desc:literal;)+) => {
		pub const CATALOG: &[CatalogEntry] = &[
			$(CatalogEntry {
				key: $key,
				icon: concat!("icon-", $key),
				plugin_type: PluginType::$type,
				description: $desc,
			}),+
		];
	};
}

catalog! {
	"cors", Safety, "Cross-origin resource sharing headers";
	"mock", Other, "Return a fixed response without proxying";
	"key-auth", Auth, "Authenticate requests with an API key";
	"jwt-auth", Auth, "Authenticate requests with a signed JWT";
	"limit-req", Limit, "Request rate limiting with a leaky bucket";
	"limit-conn", Limit, "Concurrent connection limiting";
	"limit-count", Limit, "Fixed-window request count limiting";
	"waf", Safety, "Allow or deny requests by rule";
	"log-kafka", Other, "Ship access logs to Kafka";
	"log-mysql", Other, "Ship access logs to MySQL";
	"traffic-tag", FlowControl, "Tag traffic for canary routing";
	"request-rewrite", FlowControl, "Rewrite upstream request headers and path";
	"response-rewrite", FlowControl, "Rewrite response status, headers and body";
}

pub fn entry(key: &str) -> Option<&'static CatalogEntry> {
	CATALOG.iter().find(|e| e.key == key)
}

/// Starting configuration offered when a plugin is attached.
pub fn default_config(key: &str) -> Option<Value> {
	let config = match key {
		"cors" => json!({
			"allow_origins": "*",
			"allow_methods": "*",
			"allow_headers": "*",
			"expose_headers": "",
			"max_age": 5,
			"allow_credentials": false,
		}),
		"mock" => json!({
			"status": 200,
			"content_type": "application/json",
			"response_data": "",
			"response_headers": {},
		}),
		"key-auth" => json!({ "secret": "" }),
		"jwt-auth" => json!({ "secret": "" }),
		"limit-req" => json!({ "rate": 1, "burst": 1 }),
		"limit-conn" => json!({ "rate": 1, "burst": 1, "default_conn_delay": 1 }),
		"limit-count" => json!({ "time_window": 60, "count": 5000 }),
		"waf" => json!({
			"enabled": true,
			"ip_whitelist": { "enabled": true, "ip_list": [] },
			"ip_blacklist": { "enabled": true, "ip_list": [] },
			"rules": { "rule_list": [] },
		}),
		"log-kafka" => json!({
			"enabled": true,
			"brokers": [],
			"topic": "",
			"timeout": 5000,
			"keepalive_timeout": 60000,
			"include_request_body": false,
			"include_response_body": false,
			"include_headers": [],
			"exclude_headers": [],
			"log_format": "json",
		}),
		"log-mysql" => json!({
			"enabled": true,
			"host": "127.0.0.1",
			"port": 3306,
			"database": "",
			"user": "",
			"password": "",
			"table_name": "apiok_access_log",
			"timeout": 5000,
			"pool_size": 100,
			"include_request_body": false,
			"include_response_body": false,
			"include_headers": [],
			"exclude_headers": [],
			"batch_size": 100,
			"batch_timeout": 5000,
		}),
		"traffic-tag" => json!({
			"match_rules": { "path": "", "method": null, "headers": {} },
			"tags": {},
		}),
		"request-rewrite" => json!({
			"enabled": true,
			"uri_rewrite": null,
			"headers": {},
			"query_args": {},
		}),
		"response-rewrite" => json!({
			"enabled": true,
			"headers": {},
			"status_code": null,
			"body_rewrite": null,
		}),
		_ => return None,
	};
	Some(config)
}
