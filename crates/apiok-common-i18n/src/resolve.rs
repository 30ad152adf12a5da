// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Locale resolution logic.

use crate::locale::{locale_info, DEFAULT_LOCALE};

/// Resolve the effective locale from a request preference and the server default.
///
/// Resolution order:
/// 1. The caller's preference (if supported)
/// 2. The server default (if supported)
/// 3. English
///
/// ```
/// use apiok_common_i18n::resolve_locale;
///
/// assert_eq!(resolve_locale(Some("zh"), "en"), "zh");
/// assert_eq!(resolve_locale(None, "zh"), "zh");
/// assert_eq!(resolve_locale(Some("invalid"), "also_invalid"), "en");
/// ```
pub fn resolve_locale(user_locale: Option<&str>, server_default: &str) -> &'static str {
	if let Some(info) = user_locale.and_then(locale_info) {
		return info.code;
	}

	if let Some(info) = locale_info(server_default) {
		return info.code;
	}

	DEFAULT_LOCALE
}

/// Extract the primary language tag of an `Accept-Language` header value.
///
/// `"zh-CN,zh;q=0.9,en;q=0.8"` yields `Some("zh")`. Quality weights are not
/// compared; the first listed language wins.
pub fn locale_from_accept_language(header: &str) -> Option<String> {
	let first = header.split(',').next()?.split(';').next()?.trim();
	let primary = first.split(['-', '_']).next()?.trim().to_ascii_lowercase();
	if primary.is_empty() || primary == "*" {
		return None;
	}
	Some(primary)
}
