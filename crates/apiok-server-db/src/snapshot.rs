// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Config snapshot store read by the data plane.
//!
//! Documents are keyed by `(type, name)`. Every mutation recomputes a SHA-256
//! content hash over all documents and records it in the sentinel row
//! `("sync", "update")` as `{"old": <previous new>, "new": <fresh hash>}`, so
//! a poller can tell "unchanged" from "one generation behind" without diffing.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::Result;

pub const SYNC_TYPE: &str = "sync";
pub const SYNC_NAME: &str = "update";

/// Document namespaces written by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotType {
	Services,
	Routers,
	Upstreams,
	UpstreamNodes,
	Certificates,
	Plugins,
}

impl SnapshotType {
	pub fn as_str(self) -> &'static str {
		match self {
			SnapshotType::Services => "services",
			SnapshotType::Routers => "routers",
			SnapshotType::Upstreams => "upstreams",
			SnapshotType::UpstreamNodes => "upstream_nodes",
			SnapshotType::Certificates => "certificates",
			SnapshotType::Plugins => "plugins",
		}
	}
}

impl std::fmt::Display for SnapshotType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncHash {
	pub old: String,
	pub new: String,
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
	async fn upsert(&self, kind: SnapshotType, name: &str, data: &Value) -> Result<()>;
	/// Deleting an absent key succeeds.
	async fn delete(&self, kind: SnapshotType, name: &str) -> Result<()>;
	async fn delete_by_type(&self, kind: SnapshotType) -> Result<()>;
	async fn get(&self, kind: SnapshotType, name: &str) -> Result<Option<Value>>;
	async fn list(&self, kind: SnapshotType) -> Result<Vec<(String, Value)>>;
	async fn sync_hash(&self) -> Result<Option<SyncHash>>;
}

#[derive(Clone)]
pub struct SnapshotRepository {
	pool: SqlitePool,
}

impl SnapshotRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, data), fields(kind = %kind, name))]
	pub async fn upsert(&self, kind: SnapshotType, name: &str, data: &Value) -> Result<()> {
		let now = Utc::now();
		let mut tx = self.pool.begin().await?;

		sqlx::query(
			r#"
			INSERT INTO apiok_data (type, name, data, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?)
			ON CONFLICT(type, name) DO UPDATE SET
				data = excluded.data,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(kind.as_str())
		.bind(name)
		.bind(serde_json::to_string(data)?)
		.bind(now)
		.bind(now)
		.execute(&mut *tx)
		.await?;

		roll_hash(&mut tx).await?;
		tx.commit().await?;
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(kind = %kind))]
	pub async fn delete(&self, kind: SnapshotType, name: &str) -> Result<()> {
		let mut tx = self.pool.begin().await?;

		let result = sqlx::query("DELETE FROM apiok_data WHERE type = ? AND name = ?")
			.bind(kind.as_str())
			.bind(name)
			.execute(&mut *tx)
			.await?;

		roll_hash(&mut tx).await?;
		tx.commit().await?;

		tracing::debug!(removed = result.rows_affected(), "snapshot document deleted");
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(kind = %kind))]
	pub async fn delete_by_type(&self, kind: SnapshotType) -> Result<()> {
		let mut tx = self.pool.begin().await?;

		let result = sqlx::query("DELETE FROM apiok_data WHERE type = ?")
			.bind(kind.as_str())
			.execute(&mut *tx)
			.await?;

		roll_hash(&mut tx).await?;
		tx.commit().await?;

		tracing::info!(removed = result.rows_affected(), "snapshot namespace cleared");
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(kind = %kind))]
	pub async fn get(&self, kind: SnapshotType, name: &str) -> Result<Option<Value>> {
		let row = sqlx::query_as::<_, (String,)>(
			"SELECT data FROM apiok_data WHERE type = ? AND name = ?",
		)
		.bind(kind.as_str())
		.bind(name)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|(data,)| serde_json::from_str(&data).map_err(Into::into))
			.transpose()
	}

	#[tracing::instrument(skip(self), fields(kind = %kind))]
	pub async fn list(&self, kind: SnapshotType) -> Result<Vec<(String, Value)>> {
		let rows = sqlx::query_as::<_, (String, String)>(
			"SELECT name, data FROM apiok_data WHERE type = ? ORDER BY name",
		)
		.bind(kind.as_str())
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter()
			.map(|(name, data)| Ok((name, serde_json::from_str(&data)?)))
			.collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn sync_hash(&self) -> Result<Option<SyncHash>> {
		let row = sqlx::query_as::<_, (String,)>(
			"SELECT data FROM apiok_data WHERE type = ? AND name = ?",
		)
		.bind(SYNC_TYPE)
		.bind(SYNC_NAME)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|(data,)| serde_json::from_str(&data).map_err(Into::into))
			.transpose()
	}

	/// Hash of the current table contents, excluding the sentinel row.
	pub async fn content_hash(&self) -> Result<String> {
		let mut conn = self.pool.acquire().await?;
		content_hash(&mut conn).await
	}
}

/// SHA-256 hex over every document ordered by `(type, name)`.
pub async fn content_hash(conn: &mut SqliteConnection) -> Result<String> {
	let rows = sqlx::query_as::<_, (String, String, String)>(
		"SELECT type, name, data FROM apiok_data WHERE NOT (type = ? AND name = ?) ORDER BY type, name",
	)
	.bind(SYNC_TYPE)
	.bind(SYNC_NAME)
	.fetch_all(&mut *conn)
	.await?;

	let mut hasher = Sha256::new();
	for (kind, name, data) in rows {
		hasher.update(kind.as_bytes());
		hasher.update(b"\n");
		hasher.update(name.as_bytes());
		hasher.update(b"\n");
		hasher.update(data.as_bytes());
		hasher.update(b"\n");
	}
	Ok(hex::encode(hasher.finalize()))
}

async fn roll_hash(conn: &mut SqliteConnection) -> Result<()> {
	let previous = sqlx::query_as::<_, (String,)>(
		"SELECT data FROM apiok_data WHERE type = ? AND name = ?",
	)
	.bind(SYNC_TYPE)
	.bind(SYNC_NAME)
	.fetch_optional(&mut *conn)
	.await?
	.map(|(data,)| serde_json::from_str::<SyncHash>(&data))
	.transpose()?;

	let fresh = content_hash(conn).await?;
	let hash = SyncHash {
		old: previous.map(|h| h.new).unwrap_or_default(),
		new: fresh,
	};

	let now = Utc::now();
	sqlx::query(
		r#"
		INSERT INTO apiok_data (type, name, data, created_at, updated_at)
		VALUES (?, ?, ?, ?, ?)
		ON CONFLICT(type, name) DO UPDATE SET
			data = excluded.data,
			updated_at = excluded.updated_at
		"#,
	)
	.bind(SYNC_TYPE)
	.bind(SYNC_NAME)
	.bind(serde_json::to_string(&hash)?)
	.bind(now)
	.bind(now)
	.execute(&mut *conn)
	.await?;

	tracing::trace!(new = %hash.new, "sync hash rolled");
	Ok(())
}

#[async_trait]
impl SnapshotStore for SnapshotRepository {
	async fn upsert(&self, kind: SnapshotType, name: &str, data: &Value) -> Result<()> {
		self.upsert(kind, name, data).await
	}

	async fn delete(&self, kind: SnapshotType, name: &str) -> Result<()> {
		self.delete(kind, name).await
	}

	async fn delete_by_type(&self, kind: SnapshotType) -> Result<()> {
		self.delete_by_type(kind).await
	}

	async fn get(&self, kind: SnapshotType, name: &str) -> Result<Option<Value>> {
		self.get(kind, name).await
	}

	async fn list(&self, kind: SnapshotType) -> Result<Vec<(String, Value)>> {
		self.list(kind).await
	}

	async fn sync_hash(&self) -> Result<Option<SyncHash>> {
		self.sync_hash().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_snapshot_test_pool;
	use serde_json::json;

	async fn make_repo() -> SnapshotRepository {
		SnapshotRepository::new(create_snapshot_test_pool().await)
	}

	#[tokio::test]
	async fn test_upsert_replaces_document() {
		let repo = make_repo().await;
		repo.upsert(SnapshotType::Services, "sv-1", &json!({"name": "a"}))
			.await
			.unwrap();
		repo.upsert(SnapshotType::Services, "sv-1", &json!({"name": "b"}))
			.await
			.unwrap();

		let docs = repo.list(SnapshotType::Services).await.unwrap();
		assert_eq!(docs, vec![("sv-1".to_string(), json!({"name": "b"}))]);
	}

	#[tokio::test]
	async fn test_delete_missing_is_ok() {
		let repo = make_repo().await;
		repo.delete(SnapshotType::Routers, "rt-missing").await.unwrap();
		assert!(repo.get(SnapshotType::Routers, "rt-missing").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_delete_by_type_leaves_other_namespaces() {
		let repo = make_repo().await;
		repo.upsert(SnapshotType::Upstreams, "up-1", &json!({}))
			.await
			.unwrap();
		repo.upsert(SnapshotType::UpstreamNodes, "un-1", &json!({}))
			.await
			.unwrap();
		repo.upsert(SnapshotType::UpstreamNodes, "un-2", &json!({}))
			.await
			.unwrap();

		repo.delete_by_type(SnapshotType::UpstreamNodes).await.unwrap();

		assert!(repo.list(SnapshotType::UpstreamNodes).await.unwrap().is_empty());
		assert_eq!(repo.list(SnapshotType::Upstreams).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_sentinel_is_not_listed() {
		let repo = make_repo().await;
		repo.upsert(SnapshotType::Plugins, "pc-1", &json!({"key": "cors"}))
			.await
			.unwrap();
		assert!(repo.sync_hash().await.unwrap().is_some());
		for kind in [SnapshotType::Plugins, SnapshotType::Services] {
			for (name, _) in repo.list(kind).await.unwrap() {
				assert_ne!(name, SYNC_NAME);
			}
		}
	}

	#[tokio::test]
	async fn test_rolling_hash_generations() {
		let repo = make_repo().await;
		let mut previous_new: Option<String> = None;

		for i in 0..6 {
			let name = format!("rt-{}", i % 3);
			if i == 4 {
				repo.delete(SnapshotType::Routers, &name).await.unwrap();
			} else {
				repo.upsert(SnapshotType::Routers, &name, &json!({ "gen": i }))
					.await
					.unwrap();
			}

			let hash = repo.sync_hash().await.unwrap().unwrap();
			assert_eq!(hash.new, repo.content_hash().await.unwrap());
			if let Some(prev) = &previous_new {
				assert_eq!(&hash.old, prev);
			} else {
				assert_eq!(hash.old, "");
			}
			previous_new = Some(hash.new);
		}
	}

	#[tokio::test]
	async fn test_identical_contents_hash_identically() {
		let a = make_repo().await;
		let b = make_repo().await;

		a.upsert(SnapshotType::Services, "sv-1", &json!({"x": 1}))
			.await
			.unwrap();
		a.upsert(SnapshotType::Routers, "rt-1", &json!({"y": 2}))
			.await
			.unwrap();

		b.upsert(SnapshotType::Routers, "rt-1", &json!({"y": 2}))
			.await
			.unwrap();
		b.upsert(SnapshotType::Services, "sv-1", &json!({"x": 1}))
			.await
			.unwrap();

		assert_eq!(
			a.content_hash().await.unwrap(),
			b.content_hash().await.unwrap()
		);
	}

	#[tokio::test]
	async fn test_no_change_upsert_keeps_new_but_shifts_old() {
		let repo = make_repo().await;
		let doc = json!({"name": "same"});
		repo.upsert(SnapshotType::Services, "sv-1", &doc).await.unwrap();
		repo.upsert(SnapshotType::Services, "sv-1", &doc).await.unwrap();

		let hash = repo.sync_hash().await.unwrap().unwrap();
		assert_eq!(hash.old, hash.new);
	}
}
