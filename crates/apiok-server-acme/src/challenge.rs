// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-process cache of http-01 key authorizations.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::trace;

/// Path prefix the ACME server requests during http-01 validation.
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Token -> key authorization and its expiry. Reads come from the validation
/// endpoint, writes only from issuance, read-through and cleanup.
#[derive(Debug, Default)]
pub struct ChallengeCache {
	tokens: RwLock<HashMap<String, (String, DateTime<Utc>)>>,
}

impl ChallengeCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, token: &str, key_authorization: &str, expired_at: DateTime<Utc>) {
		self.tokens
			.write()
			.insert(token.to_string(), (key_authorization.to_string(), expired_at));
	}

	/// Key authorization for `token`. An expired entry is a miss and is evicted.
	pub fn get(&self, token: &str) -> Option<String> {
		let now = Utc::now();
		let entry = self.tokens.read().get(token).cloned();
		let hit = match entry {
			Some((key, expired_at)) if expired_at > now => Some(key),
			Some(_) => {
				let mut tokens = self.tokens.write();
				if tokens.get(token).is_some_and(|(_, at)| *at <= now) {
					tokens.remove(token);
				}
				None
			}
			None => None,
		};
		trace!(token = %token, hit = hit.is_some(), "challenge cache lookup");
		hit
	}

	pub fn remove(&self, token: &str) -> bool {
		self.tokens.write().remove(token).is_some()
	}

	pub fn len(&self) -> usize {
		self.tokens.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
