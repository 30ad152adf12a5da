// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-plugin configuration checks.
//!
//! Every config must be a JSON object. Plugins with a known shape are parsed
//! into a typed struct and checked field by field; the first failure names
//! the offending field (`config.rules.rule_list[0].name`) and what was
//! expected there. Plugins without a shape here accept any object.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{DomainError, ErrorCode, GatewayError, Result};

const WAF_MATCH_TYPES: &[&str] = &["uri", "args", "header", "body", "all", "method", "request_size"];
const WAF_OPERATORS: &[&str] = &["match", "not_match"];
const WAF_ACTIONS: &[&str] = &["block", "log"];
const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS", "HEAD", "TRACE"];
const LOG_FORMATS: &[&str] = &["json", "text"];
const REWRITE_TYPES: &[&str] = &["regex", "replace", "prefix", "suffix"];

/// Check `config` against the shape of `plugin_key`.
pub fn check_plugin_config(plugin_key: &str, config: &Value) -> Result<()> {
	if !config.is_object() {
		return Err(invalid("config", "object"));
	}
	match plugin_key {
		"waf" => parse::<Waf>(config)?.check(),
		"traffic-tag" => parse::<TrafficTag>(config)?.check(),
		"log-kafka" => parse::<LogKafka>(config)?.check(),
		"log-mysql" => parse::<LogMysql>(config)?.check(),
		"request-rewrite" => parse::<RequestRewrite>(config)?.check(),
		"response-rewrite" => parse::<ResponseRewrite>(config)?.check(),
		_ => Ok(()),
	}
}

fn invalid(field: impl Into<String>, expected: impl Into<String>) -> GatewayError {
	GatewayError::Domain(DomainError {
		code: ErrorCode::PluginConfigFormatError,
		args: vec![("field", field.into()), ("expected", expected.into())],
	})
}

fn parse<T: DeserializeOwned>(config: &Value) -> Result<T> {
	T::deserialize(config).map_err(|e| invalid("config", e.to_string()))
}

fn required_str(field: &str, value: &str) -> Result<()> {
	if value.trim().is_empty() {
		return Err(invalid(field, "string"));
	}
	Ok(())
}

fn required_list<T>(field: &str, value: &[T]) -> Result<()> {
	if value.is_empty() {
		return Err(invalid(field, "array"));
	}
	Ok(())
}

fn within(field: &str, value: i64, min: i64, max: i64) -> Result<()> {
	if value < min || value > max {
		return Err(invalid(field, format!("[{min}, {max}]")));
	}
	Ok(())
}

fn one_of(field: &str, value: &str, allowed: &[&str]) -> Result<()> {
	if !allowed.contains(&value) {
		return Err(invalid(field, allowed.join("|")));
	}
	Ok(())
}

fn default_true() -> bool {
	true
}

#[derive(Debug, Deserialize)]
struct IpList {
	#[serde(default = "default_true")]
	enabled: bool,
	#[serde(default)]
	ip_list: Vec<String>,
}

impl Default for IpList {
	fn default() -> Self {
		Self {
			enabled: true,
			ip_list: Vec::new(),
		}
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WafCondition {
	patterns: Vec<String>,
	match_type: String,
	operator: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WafRule {
	name: String,
	conditions: Vec<WafCondition>,
	action: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WafRules {
	rule_list: Vec<WafRule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Waf {
	ip_whitelist: IpList,
	ip_blacklist: IpList,
	rules: WafRules,
}

impl Waf {
	fn check(&self) -> Result<()> {
		if self.ip_whitelist.enabled {
			required_list("config.ip_whitelist.ip_list", &self.ip_whitelist.ip_list)?;
		}
		if self.ip_blacklist.enabled {
			required_list("config.ip_blacklist.ip_list", &self.ip_blacklist.ip_list)?;
		}
		for (i, rule) in self.rules.rule_list.iter().enumerate() {
			let at = format!("config.rules.rule_list[{i}]");
			required_str(&format!("{at}.name"), &rule.name)?;
			required_list(&format!("{at}.conditions"), &rule.conditions)?;
			if !rule.action.is_empty() {
				one_of(&format!("{at}.action"), &rule.action, WAF_ACTIONS)?;
			}
			for (j, condition) in rule.conditions.iter().enumerate() {
				let at = format!("{at}.conditions[{j}]");
				required_str(&format!("{at}.match_type"), &condition.match_type)?;
				one_of(&format!("{at}.match_type"), &condition.match_type, WAF_MATCH_TYPES)?;
				required_list(&format!("{at}.patterns"), &condition.patterns)?;
				if !condition.operator.is_empty() {
					one_of(&format!("{at}.operator"), &condition.operator, WAF_OPERATORS)?;
				}
			}
		}
		Ok(())
	}
}

/// `method` is either one method or a list; non-string list items are ignored.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MethodMatch {
	One(String),
	Many(Vec<Value>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MatchRules {
	method: Option<MethodMatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TrafficTag {
	match_rules: MatchRules,
	tags: BTreeMap<String, String>,
}

impl TrafficTag {
	fn check(&self) -> Result<()> {
		if self.tags.is_empty() {
			return Err(invalid("config.tags", "object"));
		}
		let methods: Vec<&str> = match &self.match_rules.method {
			None => Vec::new(),
			Some(MethodMatch::One(method)) => vec![method.as_str()],
			Some(MethodMatch::Many(items)) => items.iter().filter_map(Value::as_str).collect(),
		};
		for method in methods {
			one_of("config.match_rules.method", method, HTTP_METHODS)?;
		}
		Ok(())
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct LogKafka {
	brokers: Vec<String>,
	topic: String,
	timeout: i64,
	keepalive_timeout: i64,
	log_format: String,
}

impl Default for LogKafka {
	fn default() -> Self {
		Self {
			brokers: Vec::new(),
			topic: String::new(),
			timeout: 5000,
			keepalive_timeout: 60000,
			log_format: "json".to_string(),
		}
	}
}

impl LogKafka {
	fn check(&self) -> Result<()> {
		required_list("config.brokers", &self.brokers)?;
		required_str("config.topic", &self.topic)?;
		within("config.timeout", self.timeout, 1000, 60000)?;
		within("config.keepalive_timeout", self.keepalive_timeout, 1000, 600000)?;
		if !self.log_format.is_empty() {
			one_of("config.log_format", &self.log_format, LOG_FORMATS)?;
		}
		Ok(())
	}
}

/// Empty strings and zero numbers fall back to the defaults before checking.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct LogMysql {
	host: String,
	port: i64,
	database: String,
	user: String,
	table_name: String,
	timeout: i64,
	pool_size: i64,
	batch_size: i64,
	batch_timeout: i64,
}

impl Default for LogMysql {
	fn default() -> Self {
		Self {
			host: "127.0.0.1".to_string(),
			port: 3306,
			database: String::new(),
			user: String::new(),
			table_name: "apiok_access_log".to_string(),
			timeout: 5000,
			pool_size: 100,
			batch_size: 100,
			batch_timeout: 5000,
		}
	}
}

impl LogMysql {
	fn with_fallbacks(mut self) -> Self {
		let fallback = Self::default();
		if self.host.is_empty() {
			self.host = fallback.host;
		}
		if self.table_name.is_empty() {
			self.table_name = fallback.table_name;
		}
		for (value, default) in [
			(&mut self.port, fallback.port),
			(&mut self.timeout, fallback.timeout),
			(&mut self.pool_size, fallback.pool_size),
			(&mut self.batch_size, fallback.batch_size),
			(&mut self.batch_timeout, fallback.batch_timeout),
		] {
			if *value == 0 {
				*value = default;
			}
		}
		self
	}

	fn check(self) -> Result<()> {
		let config = self.with_fallbacks();
		required_str("config.host", &config.host)?;
		within("config.port", config.port, 1, 65535)?;
		required_str("config.database", &config.database)?;
		required_str("config.user", &config.user)?;
		required_str("config.table_name", &config.table_name)?;
		within("config.timeout", config.timeout, 1000, 60000)?;
		within("config.pool_size", config.pool_size, 1, 1000)?;
		within("config.batch_size", config.batch_size, 1, 1000)?;
		within("config.batch_timeout", config.batch_timeout, 1000, 60000)?;
		Ok(())
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RewriteValue {
	pattern: String,
	from: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Rewrite {
	#[serde(rename = "type")]
	kind: String,
	value: RewriteValue,
}

impl Rewrite {
	fn check(&self, at: &str) -> Result<()> {
		one_of(&format!("{at}.type"), &self.kind, REWRITE_TYPES)?;
		match self.kind.as_str() {
			"regex" => required_str(&format!("{at}.value.pattern"), &self.value.pattern),
			"replace" => required_str(&format!("{at}.value.from"), &self.value.from),
			_ => Ok(()),
		}
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RequestRewrite {
	uri_rewrite: Option<Rewrite>,
}

impl RequestRewrite {
	fn check(&self) -> Result<()> {
		match &self.uri_rewrite {
			Some(rewrite) => rewrite.check("config.uri_rewrite"),
			None => Ok(()),
		}
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponseRewrite {
	status_code: Option<i64>,
	body_rewrite: Option<Rewrite>,
}

impl ResponseRewrite {
	fn check(&self) -> Result<()> {
		if let Some(status) = self.status_code {
			within("config.status_code", status, 100, 599)?;
		}
		match &self.body_rewrite {
			Some(rewrite) => rewrite.check("config.body_rewrite"),
			None => Ok(()),
		}
	}
}
