// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

/// Fallback locale for unknown or missing preferences.
pub const DEFAULT_LOCALE: &str = "en";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocaleInfo {
	pub code: &'static str,
	pub name: &'static str,
	pub native_name: &'static str,
}

pub const LOCALES: &[LocaleInfo] = &[
	LocaleInfo {
		code: "en",
		name: "English",
		native_name: "English",
	},
	LocaleInfo {
		code: "zh",
		name: "Chinese",
		native_name: "中文",
	},
];

pub fn is_supported(locale: &str) -> bool {
	LOCALES.iter().any(|l| l.code == locale)
}

pub fn locale_info(locale: &str) -> Option<&'static LocaleInfo> {
	LOCALES.iter().find(|l| l.code == locale)
}

pub fn available_locales() -> impl Iterator<Item = &'static str> {
	LOCALES.iter().map(|l| l.code)
}
