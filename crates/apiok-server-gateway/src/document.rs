// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Data-plane document shapes.
//!
//! Every document's `name` is the owning entity's `res_id`; cross references
//! (`service`, `upstream`, `plugins`, `nodes`) use the same ids.

use std::collections::BTreeMap;

use apiok_server_db::{
	Certificate, PluginConfig, ProxyOptions, Router, Service, Upstream, UpstreamNode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, GatewayError, Result};
use crate::size::parse_size_to_bytes;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRef {
	pub name: String,
}

impl NameRef {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into() }
	}
}

/// Optional proxy settings, absent fields omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyDocument {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub client_max_body_size: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub chunked_transfer_encoding: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub proxy_buffering: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub proxy_cache: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub proxy_set_header: Option<BTreeMap<String, String>>,
}

impl ProxyDocument {
	pub fn from_options(options: &ProxyOptions) -> Result<Self> {
		let client_max_body_size = match options.client_max_body_size.as_deref() {
			Some(raw) => parse_size_to_bytes(raw)
				.map_err(|e| GatewayError::with(ErrorCode::SizeFormatError, "detail", e.0))?,
			None => None,
		};

		Ok(Self {
			client_max_body_size,
			chunked_transfer_encoding: options.chunked_transfer_encoding,
			proxy_buffering: options.proxy_buffering,
			proxy_cache: options.proxy_cache.clone().filter(|v| !is_empty_object(v)),
			proxy_set_header: options.proxy_set_header.clone().filter(|h| !h.is_empty()),
		})
	}
}

fn is_empty_object(value: &Value) -> bool {
	value.as_object().is_some_and(|m| m.is_empty()) || value.is_null()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDocument {
	pub name: String,
	pub display_name: String,
	pub protocols: Vec<String>,
	pub ports: Vec<u16>,
	pub hosts: Vec<String>,
	pub plugins: Vec<NameRef>,
	pub enabled: bool,
	#[serde(flatten)]
	pub proxy: ProxyDocument,
}

impl ServiceDocument {
	pub fn build(service: &Service, domains: &[String], plugins: &[PluginConfig]) -> Result<Self> {
		Ok(Self {
			name: service.res_id.clone(),
			display_name: service.name.clone(),
			protocols: service
				.protocol
				.schemes()
				.into_iter()
				.map(str::to_string)
				.collect(),
			ports: service.protocol.ports(),
			hosts: domains.to_vec(),
			plugins: plugin_refs(plugins),
			enabled: service.enable.is_on(),
			proxy: ProxyDocument::from_options(&service.options)?,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterDocument {
	pub name: String,
	pub display_name: String,
	pub methods: Vec<String>,
	pub paths: Vec<String>,
	pub headers: BTreeMap<String, String>,
	pub service: NameRef,
	pub upstream: NameRef,
	pub plugins: Vec<NameRef>,
	pub enabled: bool,
	#[serde(flatten)]
	pub proxy: ProxyDocument,
}

impl RouterDocument {
	pub fn build(router: &Router, plugins: &[PluginConfig]) -> Result<Self> {
		Ok(Self {
			name: router.res_id.clone(),
			display_name: router.router_name.clone(),
			methods: router.methods(),
			paths: vec![router.router_path.clone()],
			headers: BTreeMap::new(),
			service: NameRef::new(&router.service_res_id),
			upstream: NameRef::new(router.upstream_res_id.clone().unwrap_or_default()),
			plugins: plugin_refs(plugins),
			enabled: router.enable.is_on(),
			proxy: ProxyDocument::from_options(&router.options)?,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamDocument {
	pub name: String,
	pub display_name: String,
	pub algorithm: String,
	pub connect_timeout: i64,
	pub write_timeout: i64,
	pub read_timeout: i64,
	pub nodes: Vec<NameRef>,
	pub enabled: bool,
}

impl UpstreamDocument {
	pub fn build(upstream: &Upstream, nodes: &[UpstreamNode]) -> Self {
		Self {
			name: upstream.res_id.clone(),
			display_name: upstream.name.clone(),
			algorithm: upstream.algorithm.as_str().to_string(),
			connect_timeout: upstream.connect_timeout,
			write_timeout: upstream.write_timeout,
			read_timeout: upstream.read_timeout,
			nodes: nodes.iter().map(|n| NameRef::new(&n.res_id)).collect(),
			enabled: upstream.enable.is_on(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCheckDocument {
	pub enabled: bool,
	pub tcp: bool,
	pub method: String,
	pub host: String,
	pub uri: String,
	pub interval: i64,
	pub timeout: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamNodeDocument {
	pub name: String,
	pub address: String,
	pub port: i64,
	pub weight: i64,
	pub health: String,
	pub tags: BTreeMap<String, String>,
	pub check: NodeCheckDocument,
}

impl UpstreamNodeDocument {
	/// Node document; health-check settings come from the owning upstream.
	pub fn build(node: &UpstreamNode, upstream: &Upstream) -> Self {
		let check = &upstream.check;
		Self {
			name: node.res_id.clone(),
			address: node.node_ip.clone(),
			port: node.node_port,
			weight: node.node_weight,
			health: node.health.as_str().to_string(),
			tags: node.tags.clone(),
			check: NodeCheckDocument {
				enabled: check.enabled,
				tcp: check.tcp,
				method: check.method.clone(),
				host: check.host.clone(),
				uri: if check.uri.is_empty() {
					"/".to_string()
				} else {
					check.uri.clone()
				},
				interval: check.interval.max(1),
				timeout: check.timeout.max(1),
			},
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateDocument {
	pub name: String,
	pub snis: Vec<String>,
	pub cert: String,
	pub key: String,
}

impl CertificateDocument {
	pub fn build(certificate: &Certificate) -> Self {
		Self {
			name: certificate.res_id.clone(),
			snis: vec![certificate.sni.clone()],
			cert: certificate.certificate.clone(),
			key: certificate.private_key.clone(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDocument {
	pub name: String,
	pub key: String,
	pub scope: String,
	pub config: Value,
}

impl PluginDocument {
	pub fn build(config: &PluginConfig) -> Self {
		Self {
			name: config.res_id.clone(),
			key: config.plugin_key.clone(),
			scope: config.scope.as_str().to_string(),
			config: config.config.clone(),
		}
	}
}

fn plugin_refs(plugins: &[PluginConfig]) -> Vec<NameRef> {
	plugins
		.iter()
		.filter(|p| p.enable.is_on())
		.map(|p| NameRef::new(&p.res_id))
		.collect()
}

/// Serialize a document for the snapshot store.
pub fn to_value<T: Serialize>(document: &T) -> Result<Value> {
	Ok(serde_json::to_value(document)?)
}
