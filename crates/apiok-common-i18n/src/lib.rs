// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Internationalization support for the apiok admin API.
//!
//! Messages are addressed with dot-notation keys. Every admin API result code
//! has a key of the form `server.api.<code>`, for example
//! `server.api.service_domain_exist`.
//!
//! Placeholders are written as `{name}` and filled by [`t_fmt`].
//!
//! # Example
//!
//! ```
//! use apiok_common_i18n::{t, t_fmt, resolve_locale};
//!
//! let locale = resolve_locale(Some("zh"), "en");
//! let msg = t(locale, "server.api.success");
//! let conflict = t_fmt("en", "server.api.service_domain_exist", &[("domains", "a.com")]);
//! assert!(conflict.contains("a.com"));
//! # let _ = msg;
//! ```

mod catalog;
mod locale;
mod messages;
mod resolve;

pub use catalog::{t, t_fmt};
pub use locale::{available_locales, is_supported, locale_info, LocaleInfo};
pub use resolve::{locale_from_accept_language, resolve_locale};

pub use locale::{DEFAULT_LOCALE, LOCALES};
