// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Password hashing and session token digests.
//!
//! Release builds use `Argon2::default()` (Argon2id, 19 MiB, 2 iterations).
//! Tests use a 1 MiB single-pass instance and MUST NOT leak into production.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
#[cfg(test)]
use argon2::{Algorithm, Params, Version};
use sha2::{Digest, Sha256};

use crate::error::{ErrorCode, GatewayError, Result};

#[inline]
pub(crate) fn argon2_instance() -> Argon2<'static> {
	#[cfg(test)]
	{
		let params = Params::new(1024, 1, 1, None).expect("valid Argon2 params for tests");
		Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
	}

	#[cfg(not(test))]
	{
		Argon2::default()
	}
}

pub fn hash_password(password: &str) -> Result<String> {
	let salt = SaltString::generate(&mut OsRng);
	argon2_instance()
		.hash_password(password.as_bytes(), &salt)
		.map(|hash| hash.to_string())
		.map_err(|e| GatewayError::with(ErrorCode::InternalError, "detail", e.to_string()))
}

/// A malformed stored hash verifies as false.
pub fn verify_password(password: &str, hash: &str) -> bool {
	match PasswordHash::new(hash) {
		Ok(parsed) => argon2_instance()
			.verify_password(password.as_bytes(), &parsed)
			.is_ok(),
		Err(e) => {
			tracing::warn!(error = %e, "stored password hash is malformed");
			false
		}
	}
}

/// Fresh bearer token: 32 random bytes, hex encoded.
pub fn generate_token() -> String {
	hex::encode(rand::random::<[u8; 32]>())
}

/// SHA-256 hex digest stored in place of a bearer token.
pub fn token_digest(token: &str) -> String {
	hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_hash_and_verify() {
		let hash = hash_password("correct horse").unwrap();
		assert!(hash.starts_with("$argon2id$"));
		assert!(verify_password("correct horse", &hash));
		assert!(!verify_password("battery staple", &hash));
		assert!(!verify_password("correct horse", "not-a-hash"));
	}

	#[test]
	fn test_tokens() {
		let token = generate_token();
		assert_eq!(token.len(), 64);
		assert_ne!(token, generate_token());
		assert_eq!(token_digest("abc").len(), 64);
		assert_eq!(
			token_digest("abc"),
			"ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
		);
	}
}
