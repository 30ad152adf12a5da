// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Integer-coded enumerations stored in the control-plane tables.
//!
//! Every enum is persisted (and exchanged over the admin API) as its numeric
//! code, e.g. `ReleaseStatus::Published` is `3`.

use serde::{Deserialize, Serialize};

use crate::error::DbError;

macro_rules! int_coded {
	(
		$(#[$meta:meta])*
		$name:ident { $($variant:ident = $code:literal),+ $(,)? }
	) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
		#[serde(into = "i64", try_from = "i64")]
		pub enum $name {
			$($variant = $code),+
		}

		impl $name {
			pub fn code(self) -> i64 {
				self as i64
			}
		}

		impl From<$name> for i64 {
			fn from(value: $name) -> i64 {
				value.code()
			}
		}

		impl TryFrom<i64> for $name {
			type Error = String;

			fn try_from(code: i64) -> std::result::Result<Self, Self::Error> {
				match code {
					$($code => Ok($name::$variant),)+
					_ => Err(format!("unknown {} code: {code}", stringify!($name))),
				}
			}
		}
	};
}

int_coded! {
	/// Publish lifecycle of services, routers and upstreams.
	ReleaseStatus { Unpublished = 1, ToBePublished = 2, Published = 3 }
}

int_coded! {
	Enable { On = 1, Off = 2 }
}

int_coded! {
	Protocol { Http = 1, Https = 2, HttpAndHttps = 3 }
}

int_coded! {
	PluginConfigScope { Global = 1, Service = 2, Router = 3 }
}

int_coded! {
	Algorithm { RoundRobin = 1, ConsistentHash = 2 }
}

int_coded! {
	IpType { Ipv4 = 1, Ipv6 = 2 }
}

int_coded! {
	NodeHealth { Healthy = 1, Unhealthy = 2 }
}

int_coded! {
	PluginType { Auth = 1, Limit = 2, Safety = 3, FlowControl = 4, Other = 5 }
}

impl ReleaseStatus {
	/// Whether a live data-plane document exists (or existed) for the entity.
	pub fn has_live_document(self) -> bool {
		self != ReleaseStatus::Unpublished
	}

	/// Status after an admin edit: published entities become dirty.
	pub fn after_edit(self) -> ReleaseStatus {
		match self {
			ReleaseStatus::Published => ReleaseStatus::ToBePublished,
			other => other,
		}
	}
}

impl Enable {
	pub fn is_on(self) -> bool {
		self == Enable::On
	}

	pub fn from_bool(on: bool) -> Self {
		if on {
			Enable::On
		} else {
			Enable::Off
		}
	}
}

impl Protocol {
	pub fn needs_certificate(self) -> bool {
		matches!(self, Protocol::Https | Protocol::HttpAndHttps)
	}

	pub fn schemes(self) -> Vec<&'static str> {
		match self {
			Protocol::Http => vec!["http"],
			Protocol::Https => vec!["https"],
			Protocol::HttpAndHttps => vec!["http", "https"],
		}
	}

	pub fn ports(self) -> Vec<u16> {
		match self {
			Protocol::Http => vec![80],
			Protocol::Https => vec![443],
			Protocol::HttpAndHttps => vec![80, 443],
		}
	}
}

impl PluginConfigScope {
	pub fn as_str(self) -> &'static str {
		match self {
			PluginConfigScope::Global => "global",
			PluginConfigScope::Service => "service",
			PluginConfigScope::Router => "router",
		}
	}
}

impl Algorithm {
	pub fn as_str(self) -> &'static str {
		match self {
			Algorithm::RoundRobin => "roundrobin",
			Algorithm::ConsistentHash => "chash",
		}
	}
}

impl NodeHealth {
	pub fn as_str(self) -> &'static str {
		match self {
			NodeHealth::Healthy => "HEALTH",
			NodeHealth::Unhealthy => "UNHEALTH",
		}
	}
}

impl PluginType {
	pub const ALL: [PluginType; 5] = [
		PluginType::Auth,
		PluginType::Limit,
		PluginType::Safety,
		PluginType::FlowControl,
		PluginType::Other,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			PluginType::Auth => "auth",
			PluginType::Limit => "limit",
			PluginType::Safety => "safety",
			PluginType::FlowControl => "flow_control",
			PluginType::Other => "other",
		}
	}
}

/// `ca_provider` value for uploaded certificates.
pub const CA_PROVIDER_MANUAL: &str = "manual";
/// `ca_provider` value for certificates issued through ACME.
pub const CA_PROVIDER_LETSENCRYPT: &str = "letsencrypt";

/// Decode a stored integer column into its enum.
pub(crate) fn decode<T: TryFrom<i64, Error = String>>(code: i64) -> Result<T, DbError> {
	T::try_from(code).map_err(DbError::Internal)
}

/// Decode a nullable 1/2 flag column into a bool.
pub(crate) fn decode_flag(code: Option<i64>) -> Result<Option<bool>, DbError> {
	code.map(|c| decode::<Enable>(c).map(Enable::is_on)).transpose()
}

pub(crate) fn encode_flag(flag: Option<bool>) -> Option<i64> {
	flag.map(|f| Enable::from_bool(f).code())
}
