// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Admin accounts and bearer sessions.

use apiok_server_db::{IdPrefix, ResIdGenerator, SqlitePool, User, UserRepository};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{ErrorCode, GatewayError, Result};
use crate::password::{generate_token, hash_password, token_digest, verify_password};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize)]
pub struct LoginToken {
	pub token: String,
	pub expired_at: DateTime<Utc>,
	pub user: User,
}

#[derive(Clone)]
pub struct UserManager {
	pool: SqlitePool,
	token_ttl: Duration,
}

fn check_password(password: &str) -> Result<()> {
	if password.chars().count() < MIN_PASSWORD_LEN {
		return Err(GatewayError::params(format!(
			"password must be at least {MIN_PASSWORD_LEN} characters"
		)));
	}
	Ok(())
}

impl UserManager {
	pub fn new(pool: SqlitePool, token_ttl_hours: u32) -> Self {
		Self {
			pool,
			token_ttl: Duration::hours(i64::from(token_ttl_hours.max(1))),
		}
	}

	#[tracing::instrument(skip(self, password))]
	pub async fn login(&self, email: &str, password: &str) -> Result<LoginToken> {
		let mut conn = self.pool.acquire().await?;
		let user = UserRepository::get_by_email(&mut conn, &email.trim().to_ascii_lowercase())
			.await?
			.filter(|u| verify_password(password, &u.password_hash))
			.ok_or_else(|| GatewayError::new(ErrorCode::UserLoginError))?;

		let token = generate_token();
		let expired_at = Utc::now() + self.token_ttl;
		UserRepository::insert_token(&mut conn, &user.res_id, &token_digest(&token), expired_at)
			.await?;

		tracing::info!(user = %user.res_id, "user logged in");
		Ok(LoginToken {
			token,
			expired_at,
			user,
		})
	}

	/// Resolve a bearer token to its user.
	pub async fn authenticate(&self, token: &str) -> Result<User> {
		let mut conn = self.pool.acquire().await?;
		UserRepository::find_by_token(&mut conn, &token_digest(token))
			.await?
			.ok_or_else(|| GatewayError::new(ErrorCode::Unauthorized))
	}

	pub async fn logout(&self, token: &str) -> Result<()> {
		let mut conn = self.pool.acquire().await?;
		UserRepository::delete_token(&mut conn, &token_digest(token)).await?;
		Ok(())
	}

	#[tracing::instrument(skip(self, password))]
	pub async fn add(&self, name: &str, email: &str, password: &str) -> Result<String> {
		check_password(password)?;
		let email = email.trim().to_ascii_lowercase();
		if !email.contains('@') {
			return Err(GatewayError::params("email is malformed"));
		}
		let password_hash = hash_password(password)?;

		let mut tx = self.pool.begin().await?;
		if UserRepository::get_by_email(&mut tx, &email).await?.is_some() {
			return Err(GatewayError::with(ErrorCode::UserEmailExist, "email", email));
		}
		let res_id = ResIdGenerator::allocate(&mut tx, IdPrefix::User).await?;
		UserRepository::insert(&mut tx, &res_id, name.trim(), &email, &password_hash).await?;
		tx.commit().await?;

		tracing::info!(res_id = %res_id, "user added");
		Ok(res_id)
	}

	pub async fn delete(&self, res_id: &str) -> Result<()> {
		let mut conn = self.pool.acquire().await?;
		if !UserRepository::delete(&mut conn, res_id).await? {
			return Err(GatewayError::with(ErrorCode::UserNull, "res_id", res_id));
		}
		Ok(())
	}

	pub async fn list(&self) -> Result<Vec<User>> {
		let mut conn = self.pool.acquire().await?;
		Ok(UserRepository::list(&mut conn).await?)
	}

	/// Change a password and end every session of the user.
	#[tracing::instrument(skip(self, old_password, new_password))]
	pub async fn change_password(
		&self,
		res_id: &str,
		old_password: &str,
		new_password: &str,
	) -> Result<()> {
		check_password(new_password)?;
		let mut tx = self.pool.begin().await?;
		let user = UserRepository::get(&mut tx, res_id)
			.await?
			.ok_or_else(|| GatewayError::with(ErrorCode::UserNull, "res_id", res_id))?;
		if !verify_password(old_password, &user.password_hash) {
			return Err(GatewayError::new(ErrorCode::UserLoginError));
		}
		UserRepository::update_password(&mut tx, res_id, &hash_password(new_password)?).await?;
		UserRepository::delete_tokens_for_user(&mut tx, res_id).await?;
		tx.commit().await?;
		Ok(())
	}

	/// Create the first account. Does nothing once any user exists.
	pub async fn ensure_bootstrap_admin(&self, email: &str, password: &str) -> Result<Option<String>> {
		{
			let mut conn = self.pool.acquire().await?;
			if UserRepository::count(&mut conn).await? > 0 {
				return Ok(None);
			}
		}
		let res_id = self.add("admin", email, password).await?;
		tracing::info!(res_id = %res_id, email = %email, "bootstrap admin created");
		Ok(Some(res_id))
	}
}
