// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Data-plane snapshot store location.

use serde::Deserialize;

const DEFAULT_URL: &str = "sqlite:./apiok-data.db";

#[derive(Debug, Clone)]
pub struct SnapshotConfig {
	pub url: String,
}

impl Default for SnapshotConfig {
	fn default() -> Self {
		Self {
			url: DEFAULT_URL.to_string(),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotConfigLayer {
	#[serde(default)]
	pub url: Option<String>,
}

impl SnapshotConfigLayer {
	pub fn merge(&mut self, other: SnapshotConfigLayer) {
		if other.url.is_some() {
			self.url = other.url;
		}
	}

	pub fn finalize(self) -> SnapshotConfig {
		SnapshotConfig {
			url: self.url.unwrap_or_else(|| DEFAULT_URL.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_url() {
		assert_eq!(
			SnapshotConfigLayer::default().finalize().url,
			"sqlite:./apiok-data.db"
		);
	}

	#[test]
	fn test_merge_overrides() {
		let mut base = SnapshotConfigLayer {
			url: Some("sqlite:a.db".to_string()),
		};
		base.merge(SnapshotConfigLayer {
			url: Some("sqlite:b.db".to_string()),
		});
		assert_eq!(base.url.as_deref(), Some("sqlite:b.db"));
	}
}
