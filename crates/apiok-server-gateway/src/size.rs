// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Size strings such as `client_max_body_size = "10m"`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid size: {0:?}")]
pub struct SizeParseError(pub String);

/// Parse a size with an optional binary `k`/`m`/`g` suffix into bytes.
///
/// Empty and zero sizes mean "no limit" and yield `None`.
pub fn parse_size_to_bytes(input: &str) -> Result<Option<u64>, SizeParseError> {
	let normalized = input.trim().to_ascii_lowercase();
	if normalized.is_empty() || normalized == "0" {
		return Ok(None);
	}

	let (number, multiplier) = match normalized.as_bytes()[normalized.len() - 1] {
		b'k' => (&normalized[..normalized.len() - 1], 1024u64),
		b'm' => (&normalized[..normalized.len() - 1], 1024 * 1024),
		b'g' => (&normalized[..normalized.len() - 1], 1024 * 1024 * 1024),
		_ => (normalized.as_str(), 1),
	};

	let value: f64 = number
		.trim()
		.parse()
		.map_err(|_| SizeParseError(input.to_string()))?;
	if !value.is_finite() || value < 0.0 {
		return Err(SizeParseError(input.to_string()));
	}

	let bytes = (value * multiplier as f64) as u64;
	Ok((bytes > 0).then_some(bytes))
}
