// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Collision-checked `res_id` allocation.
//!
//! A resource id is `<prefix>-<token>` where the token is
//! [`ID_TOKEN_LENGTH`] random lowercase alphanumerics. Allocation checks the
//! owning table and retries with a fresh token up to
//! [`MAX_GENERATE_ATTEMPTS`] times before failing with
//! [`DbError::IdConflict`].

use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::SqliteConnection;

use crate::error::{DbError, Result};

pub const ID_TOKEN_LENGTH: usize = 15;
pub const MAX_GENERATE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdPrefix {
	User,
	UserToken,
	Service,
	ServiceDomain,
	Router,
	Plugin,
	PluginConfig,
	Certificate,
	Upstream,
	UpstreamNode,
	AcmeChallenge,
}

impl IdPrefix {
	pub const ALL: [IdPrefix; 11] = [
		IdPrefix::User,
		IdPrefix::UserToken,
		IdPrefix::Service,
		IdPrefix::ServiceDomain,
		IdPrefix::Router,
		IdPrefix::Plugin,
		IdPrefix::PluginConfig,
		IdPrefix::Certificate,
		IdPrefix::Upstream,
		IdPrefix::UpstreamNode,
		IdPrefix::AcmeChallenge,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			IdPrefix::User => "us",
			IdPrefix::UserToken => "ut",
			IdPrefix::Service => "sv",
			IdPrefix::ServiceDomain => "sd",
			IdPrefix::Router => "rt",
			IdPrefix::Plugin => "pl",
			IdPrefix::PluginConfig => "pc",
			IdPrefix::Certificate => "ce",
			IdPrefix::Upstream => "up",
			IdPrefix::UpstreamNode => "un",
			IdPrefix::AcmeChallenge => "ac",
		}
	}

	/// Table the id must be unique in.
	pub fn table(self) -> &'static str {
		match self {
			IdPrefix::User => "users",
			IdPrefix::UserToken => "user_tokens",
			IdPrefix::Service => "services",
			IdPrefix::ServiceDomain => "service_domains",
			IdPrefix::Router => "routers",
			IdPrefix::Plugin => "plugins",
			IdPrefix::PluginConfig => "plugin_configs",
			IdPrefix::Certificate => "certificates",
			IdPrefix::Upstream => "upstreams",
			IdPrefix::UpstreamNode => "upstream_nodes",
			IdPrefix::AcmeChallenge => "acme_challenges",
		}
	}
}

/// Random lowercase alphanumeric string of `len` characters.
pub fn random_token(len: usize) -> String {
	rand::thread_rng()
		.sample_iter(&Alphanumeric)
		.take(len)
		.map(|b| (b as char).to_ascii_lowercase())
		.collect()
}

pub struct ResIdGenerator;

impl ResIdGenerator {
	/// Allocate an id that is not yet present in the prefix's table.
	pub async fn allocate(conn: &mut SqliteConnection, prefix: IdPrefix) -> Result<String> {
		Self::allocate_with(conn, prefix, || random_token(ID_TOKEN_LENGTH)).await
	}

	/// Same as [`allocate`](Self::allocate) with a caller-supplied token source.
	#[tracing::instrument(skip(conn, next_token), fields(prefix = prefix.as_str()))]
	pub async fn allocate_with(
		conn: &mut SqliteConnection,
		prefix: IdPrefix,
		mut next_token: impl FnMut() -> String,
	) -> Result<String> {
		let lookup = format!("SELECT 1 FROM {} WHERE res_id = ? LIMIT 1", prefix.table());

		for attempt in 1..=MAX_GENERATE_ATTEMPTS {
			let candidate = format!("{}-{}", prefix.as_str(), next_token());
			let taken = sqlx::query(&lookup)
				.bind(&candidate)
				.fetch_optional(&mut *conn)
				.await?
				.is_some();

			if !taken {
				return Ok(candidate);
			}
			tracing::debug!(attempt, candidate = %candidate, "res_id collision, retrying");
		}

		tracing::warn!("res_id allocation exhausted");
		Err(DbError::IdConflict {
			prefix: prefix.as_str(),
			attempts: MAX_GENERATE_ATTEMPTS,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;
	use std::collections::HashSet;

	async fn insert_user(conn: &mut SqliteConnection, res_id: &str) {
		sqlx::query(
			"INSERT INTO users (res_id, name, email, password_hash, created_at, updated_at) VALUES (?, 'n', ?, 'x', 'now', 'now')",
		)
		.bind(res_id)
		.bind(format!("{res_id}@example.com"))
		.execute(&mut *conn)
		.await
		.unwrap();
	}

	#[tokio::test]
	async fn test_format() {
		let pool = create_test_pool().await;
		let mut conn = pool.acquire().await.unwrap();
		let id = ResIdGenerator::allocate(&mut conn, IdPrefix::Router)
			.await
			.unwrap();
		assert!(id.starts_with("rt-"));
		assert_eq!(id.len(), 3 + ID_TOKEN_LENGTH);
		assert!(id[3..]
			.chars()
			.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
	}

	#[tokio::test]
	async fn test_retries_past_collision() {
		let pool = create_test_pool().await;
		let mut conn = pool.acquire().await.unwrap();
		insert_user(&mut conn, "us-taken").await;

		let mut tokens = vec!["fresh", "taken"];
		let id = ResIdGenerator::allocate_with(&mut conn, IdPrefix::User, || {
			tokens.pop().unwrap().to_string()
		})
		.await
		.unwrap();
		assert_eq!(id, "us-fresh");
	}

	#[tokio::test]
	async fn test_exhaustion_is_id_conflict() {
		let pool = create_test_pool().await;
		let mut conn = pool.acquire().await.unwrap();
		insert_user(&mut conn, "us-same").await;

		let mut calls = 0;
		let err = ResIdGenerator::allocate_with(&mut conn, IdPrefix::User, || {
			calls += 1;
			"same".to_string()
		})
		.await
		.unwrap_err();

		assert!(matches!(
			err,
			DbError::IdConflict {
				prefix: "us",
				attempts: MAX_GENERATE_ATTEMPTS
			}
		));
		assert_eq!(calls, MAX_GENERATE_ATTEMPTS);
	}

	#[tokio::test]
	async fn test_ten_thousand_stored_allocations_are_unique() {
		let pool = create_test_pool().await;
		let mut conn = pool.acquire().await.unwrap();
		let mut seen = HashSet::new();
		for _ in 0..10_000 {
			let id = ResIdGenerator::allocate(&mut conn, IdPrefix::User)
				.await
				.unwrap();
			insert_user(&mut conn, &id).await;
			assert!(seen.insert(id));
		}
		let stored: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT res_id) FROM users")
			.fetch_one(&mut *conn)
			.await
			.unwrap();
		assert_eq!(stored, 10_000);
	}

	#[tokio::test]
	async fn test_every_prefix_allocates_against_its_table() {
		let pool = create_test_pool().await;
		let mut conn = pool.acquire().await.unwrap();
		let mut seen = HashSet::new();
		let mut tags = HashSet::new();
		for prefix in IdPrefix::ALL {
			assert!(tags.insert(prefix.as_str()));
			for _ in 0..500 {
				let id = ResIdGenerator::allocate(&mut conn, prefix).await.unwrap();
				assert!(id.starts_with(&format!("{}-", prefix.as_str())));
				assert!(seen.insert(id));
			}
		}
		assert_eq!(seen.len(), IdPrefix::ALL.len() * 500);
	}
}
