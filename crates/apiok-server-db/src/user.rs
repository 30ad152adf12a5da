// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Admin users and their bearer tokens.
//!
//! Only the SHA-256 of a token is stored; the plaintext never reaches the
//! database.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::error::Result;
use crate::id::{IdPrefix, ResIdGenerator};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
	pub res_id: String,
	pub name: String,
	pub email: String,
	#[serde(skip_serializing)]
	pub password_hash: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

const SELECT_USER: &str =
	"SELECT res_id, name, email, password_hash, created_at, updated_at FROM users";

pub struct UserRepository;

impl UserRepository {
	#[tracing::instrument(skip(conn, password_hash))]
	pub async fn insert(
		conn: &mut SqliteConnection,
		res_id: &str,
		name: &str,
		email: &str,
		password_hash: &str,
	) -> Result<()> {
		let now = Utc::now();
		sqlx::query(
			r#"
			INSERT INTO users (res_id, name, email, password_hash, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(res_id)
		.bind(name)
		.bind(email)
		.bind(password_hash)
		.bind(now)
		.bind(now)
		.execute(&mut *conn)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(conn))]
	pub async fn get(conn: &mut SqliteConnection, res_id: &str) -> Result<Option<User>> {
		let user = sqlx::query_as::<_, User>(&format!("{SELECT_USER} WHERE res_id = ?"))
			.bind(res_id)
			.fetch_optional(&mut *conn)
			.await?;

		Ok(user)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn get_by_email(conn: &mut SqliteConnection, email: &str) -> Result<Option<User>> {
		let user = sqlx::query_as::<_, User>(&format!("{SELECT_USER} WHERE email = ?"))
			.bind(email)
			.fetch_optional(&mut *conn)
			.await?;

		Ok(user)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<User>> {
		let users = sqlx::query_as::<_, User>(&format!("{SELECT_USER} ORDER BY id"))
			.fetch_all(&mut *conn)
			.await?;

		Ok(users)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn count(conn: &mut SqliteConnection) -> Result<i64> {
		let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
			.fetch_one(&mut *conn)
			.await?;
		Ok(count)
	}

	#[tracing::instrument(skip(conn, password_hash))]
	pub async fn update_password(
		conn: &mut SqliteConnection,
		res_id: &str,
		password_hash: &str,
	) -> Result<bool> {
		let result =
			sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE res_id = ?")
				.bind(password_hash)
				.bind(Utc::now())
				.bind(res_id)
				.execute(&mut *conn)
				.await?;

		Ok(result.rows_affected() > 0)
	}

	/// Delete a user along with every token issued to them.
	#[tracing::instrument(skip(conn))]
	pub async fn delete(conn: &mut SqliteConnection, res_id: &str) -> Result<bool> {
		Self::delete_tokens_for_user(conn, res_id).await?;

		let result = sqlx::query("DELETE FROM users WHERE res_id = ?")
			.bind(res_id)
			.execute(&mut *conn)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(conn, token_hash))]
	pub async fn insert_token(
		conn: &mut SqliteConnection,
		user_res_id: &str,
		token_hash: &str,
		expired_at: DateTime<Utc>,
	) -> Result<String> {
		let res_id = ResIdGenerator::allocate(conn, IdPrefix::UserToken).await?;
		sqlx::query(
			r#"
			INSERT INTO user_tokens (res_id, user_res_id, token_hash, expired_at, created_at)
			VALUES (?, ?, ?, ?, ?)
			"#,
		)
		.bind(&res_id)
		.bind(user_res_id)
		.bind(token_hash)
		.bind(expired_at.timestamp())
		.bind(Utc::now())
		.execute(&mut *conn)
		.await?;

		Ok(res_id)
	}

	/// The user owning an unexpired token hash.
	#[tracing::instrument(skip(conn, token_hash))]
	pub async fn find_by_token(conn: &mut SqliteConnection, token_hash: &str) -> Result<Option<User>> {
		let user = sqlx::query_as::<_, User>(
			r#"
			SELECT u.res_id, u.name, u.email, u.password_hash, u.created_at, u.updated_at
			FROM user_tokens t
			JOIN users u ON u.res_id = t.user_res_id
			WHERE t.token_hash = ? AND t.expired_at > ?
			"#,
		)
		.bind(token_hash)
		.bind(Utc::now().timestamp())
		.fetch_optional(&mut *conn)
		.await?;

		Ok(user)
	}

	#[tracing::instrument(skip(conn, token_hash))]
	pub async fn delete_token(conn: &mut SqliteConnection, token_hash: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM user_tokens WHERE token_hash = ?")
			.bind(token_hash)
			.execute(&mut *conn)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn delete_tokens_for_user(conn: &mut SqliteConnection, user_res_id: &str) -> Result<u64> {
		let result = sqlx::query("DELETE FROM user_tokens WHERE user_res_id = ?")
			.bind(user_res_id)
			.execute(&mut *conn)
			.await?;

		Ok(result.rows_affected())
	}
}
