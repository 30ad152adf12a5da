// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::locale::DEFAULT_LOCALE;
use crate::messages;

type Catalog = HashMap<&'static str, &'static str>;

static CATALOGS: Lazy<HashMap<&'static str, Catalog>> = Lazy::new(|| {
	let mut catalogs = HashMap::new();
	catalogs.insert("en", messages::en::MESSAGES.iter().copied().collect());
	catalogs.insert("zh", messages::zh::MESSAGES.iter().copied().collect());
	catalogs
});

/// Translate `key` into `locale`.
///
/// Missing translations fall back to English, then to the key itself.
pub fn t(locale: &str, key: &str) -> String {
	lookup(locale, key)
		.or_else(|| lookup(DEFAULT_LOCALE, key))
		.map(str::to_string)
		.unwrap_or_else(|| {
			tracing::debug!(locale, key, "missing translation");
			key.to_string()
		})
}

/// Translate `key` and substitute `{name}` placeholders.
pub fn t_fmt(locale: &str, key: &str, args: &[(&str, &str)]) -> String {
	let mut message = t(locale, key);
	for (name, value) in args {
		message = message.replace(&format!("{{{name}}}"), value);
	}
	message
}

fn lookup(locale: &str, key: &str) -> Option<&'static str> {
	CATALOGS.get(locale).and_then(|c| c.get(key)).copied()
}
