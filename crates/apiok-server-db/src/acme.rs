// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable HTTP-01 challenge tokens.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::error::Result;
use crate::id::{IdPrefix, ResIdGenerator};

pub struct AcmeChallengeRepository;

impl AcmeChallengeRepository {
	/// Store a challenge token, replacing the key authorization if the token
	/// was already issued.
	#[tracing::instrument(skip(conn, key_authorization))]
	pub async fn insert(
		conn: &mut SqliteConnection,
		token: &str,
		key_authorization: &str,
		expired_at: DateTime<Utc>,
	) -> Result<()> {
		let res_id = ResIdGenerator::allocate(conn, IdPrefix::AcmeChallenge).await?;
		sqlx::query(
			r#"
			INSERT INTO acme_challenges (res_id, token, key_authorization, expired_at, created_at)
			VALUES (?, ?, ?, ?, ?)
			ON CONFLICT(token) DO UPDATE SET
				key_authorization = excluded.key_authorization,
				expired_at = excluded.expired_at
			"#,
		)
		.bind(&res_id)
		.bind(token)
		.bind(key_authorization)
		.bind(expired_at.timestamp())
		.bind(Utc::now())
		.execute(&mut *conn)
		.await?;

		Ok(())
	}

	/// Key authorization of an unexpired token.
	pub async fn find_valid(conn: &mut SqliteConnection, token: &str) -> Result<Option<String>> {
		Ok(Self::find_valid_until(conn, token).await?.map(|(key, _)| key))
	}

	/// Key authorization of an unexpired token together with its expiry.
	#[tracing::instrument(skip(conn))]
	pub async fn find_valid_until(
		conn: &mut SqliteConnection,
		token: &str,
	) -> Result<Option<(String, DateTime<Utc>)>> {
		let row = sqlx::query_as::<_, (String, i64)>(
			"SELECT key_authorization, expired_at FROM acme_challenges WHERE token = ? AND expired_at > ?",
		)
		.bind(token)
		.bind(Utc::now().timestamp())
		.fetch_optional(&mut *conn)
		.await?;

		Ok(row.and_then(|(key, expired_at)| {
			DateTime::from_timestamp(expired_at, 0).map(|at| (key, at))
		}))
	}

	#[tracing::instrument(skip(conn, tokens), fields(count = tokens.len()))]
	pub async fn delete_by_tokens(conn: &mut SqliteConnection, tokens: &[String]) -> Result<u64> {
		let mut removed = 0;
		for token in tokens {
			removed += sqlx::query("DELETE FROM acme_challenges WHERE token = ?")
				.bind(token)
				.execute(&mut *conn)
				.await?
				.rows_affected();
		}
		Ok(removed)
	}

	/// Delete expired tokens and return them.
	#[tracing::instrument(skip(conn))]
	pub async fn delete_expired(conn: &mut SqliteConnection) -> Result<Vec<String>> {
		let now = Utc::now().timestamp();
		let rows = sqlx::query_as::<_, (String,)>(
			"SELECT token FROM acme_challenges WHERE expired_at <= ?",
		)
		.bind(now)
		.fetch_all(&mut *conn)
		.await?;

		sqlx::query("DELETE FROM acme_challenges WHERE expired_at <= ?")
			.bind(now)
			.execute(&mut *conn)
			.await?;

		Ok(rows.into_iter().map(|(t,)| t).collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;
	use chrono::Duration;

	#[tokio::test]
	async fn test_expired_tokens_are_invisible() {
		let pool = create_test_pool().await;
		let mut conn = pool.acquire().await.unwrap();

		AcmeChallengeRepository::insert(&mut conn, "fresh", "fresh.key", Utc::now() + Duration::hours(1))
			.await
			.unwrap();
		AcmeChallengeRepository::insert(&mut conn, "stale", "stale.key", Utc::now() - Duration::minutes(1))
			.await
			.unwrap();

		assert_eq!(
			AcmeChallengeRepository::find_valid(&mut conn, "fresh")
				.await
				.unwrap()
				.as_deref(),
			Some("fresh.key")
		);
		assert!(AcmeChallengeRepository::find_valid(&mut conn, "stale")
			.await
			.unwrap()
			.is_none());

		let swept = AcmeChallengeRepository::delete_expired(&mut conn).await.unwrap();
		assert_eq!(swept, vec!["stale".to_string()]);
	}

	#[tokio::test]
	async fn test_reissued_token_replaces_key() {
		let pool = create_test_pool().await;
		let mut conn = pool.acquire().await.unwrap();
		let expiry = Utc::now() + Duration::hours(1);

		AcmeChallengeRepository::insert(&mut conn, "t1", "old", expiry).await.unwrap();
		AcmeChallengeRepository::insert(&mut conn, "t1", "new", expiry).await.unwrap();
		assert_eq!(
			AcmeChallengeRepository::find_valid(&mut conn, "t1")
				.await
				.unwrap()
				.as_deref(),
			Some("new")
		);
		let (key, until) = AcmeChallengeRepository::find_valid_until(&mut conn, "t1")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(key, "new");
		assert_eq!(until.timestamp(), expiry.timestamp());

		let removed = AcmeChallengeRepository::delete_by_tokens(
			&mut conn,
			&["t1".to_string(), "missing".to_string()],
		)
		.await
		.unwrap();
		assert_eq!(removed, 1);
	}
}
