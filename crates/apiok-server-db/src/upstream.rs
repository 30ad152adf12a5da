// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use crate::error::Result;
use crate::types::{decode, Algorithm, Enable, IpType, NodeHealth, ReleaseStatus};

/// Active health check settings of an upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default)]
	pub tcp: bool,
	#[serde(default = "default_check_method")]
	pub method: String,
	#[serde(default)]
	pub host: String,
	#[serde(default = "default_check_uri")]
	pub uri: String,
	#[serde(default = "default_check_secs")]
	pub interval: i64,
	#[serde(default = "default_check_secs")]
	pub timeout: i64,
}

fn default_check_method() -> String {
	"GET".to_string()
}

fn default_check_uri() -> String {
	"/".to_string()
}

fn default_check_secs() -> i64 {
	1
}

impl Default for HealthCheck {
	fn default() -> Self {
		Self {
			enabled: false,
			tcp: false,
			method: default_check_method(),
			host: String::new(),
			uri: default_check_uri(),
			interval: default_check_secs(),
			timeout: default_check_secs(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upstream {
	pub res_id: String,
	pub name: String,
	pub algorithm: Algorithm,
	pub connect_timeout: i64,
	pub write_timeout: i64,
	pub read_timeout: i64,
	pub enable: Enable,
	pub release: ReleaseStatus,
	pub check: HealthCheck,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamFields {
	pub name: String,
	pub algorithm: Algorithm,
	pub connect_timeout: i64,
	pub write_timeout: i64,
	pub read_timeout: i64,
	pub enable: Enable,
	#[serde(default)]
	pub check: HealthCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamNode {
	pub res_id: String,
	pub upstream_res_id: String,
	pub node_ip: String,
	pub ip_type: IpType,
	pub node_port: i64,
	pub node_weight: i64,
	pub health: NodeHealth,
	pub tags: BTreeMap<String, String>,
}

impl UpstreamNode {
	/// Identity used to diff node sets: `ip-port`.
	pub fn diff_key(&self) -> String {
		format!("{}-{}", self.node_ip, self.node_port)
	}
}

#[derive(sqlx::FromRow)]
struct UpstreamRow {
	res_id: String,
	name: String,
	algorithm: i64,
	connect_timeout: i64,
	write_timeout: i64,
	read_timeout: i64,
	enable: i64,
	release: i64,
	check_enabled: bool,
	check_tcp: bool,
	check_method: String,
	check_host: String,
	check_uri: String,
	check_interval: i64,
	check_timeout: i64,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
}

impl TryFrom<UpstreamRow> for Upstream {
	type Error = crate::error::DbError;

	fn try_from(row: UpstreamRow) -> Result<Self> {
		Ok(Upstream {
			res_id: row.res_id,
			name: row.name,
			algorithm: decode(row.algorithm)?,
			connect_timeout: row.connect_timeout,
			write_timeout: row.write_timeout,
			read_timeout: row.read_timeout,
			enable: decode(row.enable)?,
			release: decode(row.release)?,
			check: HealthCheck {
				enabled: row.check_enabled,
				tcp: row.check_tcp,
				method: row.check_method,
				host: row.check_host,
				uri: row.check_uri,
				interval: row.check_interval,
				timeout: row.check_timeout,
			},
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

#[derive(sqlx::FromRow)]
struct NodeRow {
	res_id: String,
	upstream_res_id: String,
	node_ip: String,
	ip_type: i64,
	node_port: i64,
	node_weight: i64,
	health: i64,
	tags: String,
}

impl TryFrom<NodeRow> for UpstreamNode {
	type Error = crate::error::DbError;

	fn try_from(row: NodeRow) -> Result<Self> {
		Ok(UpstreamNode {
			res_id: row.res_id,
			upstream_res_id: row.upstream_res_id,
			node_ip: row.node_ip,
			ip_type: decode(row.ip_type)?,
			node_port: row.node_port,
			node_weight: row.node_weight,
			health: decode(row.health)?,
			tags: serde_json::from_str(&row.tags)?,
		})
	}
}

const SELECT_UPSTREAM: &str = r#"
	SELECT res_id, name, algorithm, connect_timeout, write_timeout, read_timeout, enable, release,
		check_enabled, check_tcp, check_method, check_host, check_uri, check_interval, check_timeout,
		created_at, updated_at
	FROM upstreams
"#;

const SELECT_NODE: &str = r#"
	SELECT res_id, upstream_res_id, node_ip, ip_type, node_port, node_weight, health, tags
	FROM upstream_nodes
"#;

pub struct UpstreamRepository;

impl UpstreamRepository {
	#[tracing::instrument(skip(conn, fields), fields(name = %fields.name))]
	pub async fn insert(
		conn: &mut SqliteConnection,
		res_id: &str,
		fields: &UpstreamFields,
	) -> Result<()> {
		let now = Utc::now();
		sqlx::query(
			r#"
			INSERT INTO upstreams (
				res_id, name, algorithm, connect_timeout, write_timeout, read_timeout, enable, release,
				check_enabled, check_tcp, check_method, check_host, check_uri, check_interval, check_timeout,
				created_at, updated_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(res_id)
		.bind(&fields.name)
		.bind(fields.algorithm.code())
		.bind(fields.connect_timeout)
		.bind(fields.write_timeout)
		.bind(fields.read_timeout)
		.bind(fields.enable.code())
		.bind(ReleaseStatus::Unpublished.code())
		.bind(fields.check.enabled)
		.bind(fields.check.tcp)
		.bind(&fields.check.method)
		.bind(&fields.check.host)
		.bind(&fields.check.uri)
		.bind(fields.check.interval)
		.bind(fields.check.timeout)
		.bind(now)
		.bind(now)
		.execute(&mut *conn)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(conn, fields))]
	pub async fn update(
		conn: &mut SqliteConnection,
		res_id: &str,
		fields: &UpstreamFields,
		release: ReleaseStatus,
	) -> Result<bool> {
		let result = sqlx::query(
			r#"
			UPDATE upstreams SET
				name = ?, algorithm = ?, connect_timeout = ?, write_timeout = ?, read_timeout = ?,
				enable = ?, release = ?, check_enabled = ?, check_tcp = ?, check_method = ?,
				check_host = ?, check_uri = ?, check_interval = ?, check_timeout = ?, updated_at = ?
			WHERE res_id = ?
			"#,
		)
		.bind(&fields.name)
		.bind(fields.algorithm.code())
		.bind(fields.connect_timeout)
		.bind(fields.write_timeout)
		.bind(fields.read_timeout)
		.bind(fields.enable.code())
		.bind(release.code())
		.bind(fields.check.enabled)
		.bind(fields.check.tcp)
		.bind(&fields.check.method)
		.bind(&fields.check.host)
		.bind(&fields.check.uri)
		.bind(fields.check.interval)
		.bind(fields.check.timeout)
		.bind(Utc::now())
		.bind(res_id)
		.execute(&mut *conn)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn update_name(
		conn: &mut SqliteConnection,
		res_id: &str,
		name: &str,
		release: ReleaseStatus,
	) -> Result<bool> {
		let result =
			sqlx::query("UPDATE upstreams SET name = ?, release = ?, updated_at = ? WHERE res_id = ?")
				.bind(name)
				.bind(release.code())
				.bind(Utc::now())
				.bind(res_id)
				.execute(&mut *conn)
				.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn set_enable(
		conn: &mut SqliteConnection,
		res_id: &str,
		enable: Enable,
		release: ReleaseStatus,
	) -> Result<bool> {
		let result = sqlx::query(
			"UPDATE upstreams SET enable = ?, release = ?, updated_at = ? WHERE res_id = ?",
		)
		.bind(enable.code())
		.bind(release.code())
		.bind(Utc::now())
		.bind(res_id)
		.execute(&mut *conn)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn set_release(
		conn: &mut SqliteConnection,
		res_id: &str,
		release: ReleaseStatus,
	) -> Result<bool> {
		let result =
			sqlx::query("UPDATE upstreams SET release = ?, updated_at = ? WHERE res_id = ?")
				.bind(release.code())
				.bind(Utc::now())
				.bind(res_id)
				.execute(&mut *conn)
				.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn get(conn: &mut SqliteConnection, res_id: &str) -> Result<Option<Upstream>> {
		let row = sqlx::query_as::<_, UpstreamRow>(&format!("{SELECT_UPSTREAM} WHERE res_id = ?"))
			.bind(res_id)
			.fetch_optional(&mut *conn)
			.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[tracing::instrument(skip(conn))]
	pub async fn find_by_name(conn: &mut SqliteConnection, name: &str) -> Result<Option<Upstream>> {
		let row = sqlx::query_as::<_, UpstreamRow>(&format!("{SELECT_UPSTREAM} WHERE name = ?"))
			.bind(name)
			.fetch_optional(&mut *conn)
			.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[tracing::instrument(skip(conn))]
	pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Upstream>> {
		let rows = sqlx::query_as::<_, UpstreamRow>(&format!("{SELECT_UPSTREAM} ORDER BY id DESC"))
			.fetch_all(&mut *conn)
			.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}

	#[tracing::instrument(skip(conn))]
	pub async fn delete(conn: &mut SqliteConnection, res_id: &str) -> Result<bool> {
		sqlx::query("DELETE FROM upstream_nodes WHERE upstream_res_id = ?")
			.bind(res_id)
			.execute(&mut *conn)
			.await?;

		let result = sqlx::query("DELETE FROM upstreams WHERE res_id = ?")
			.bind(res_id)
			.execute(&mut *conn)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn nodes(conn: &mut SqliteConnection, upstream_res_id: &str) -> Result<Vec<UpstreamNode>> {
		let rows = sqlx::query_as::<_, NodeRow>(&format!(
			"{SELECT_NODE} WHERE upstream_res_id = ? ORDER BY id"
		))
		.bind(upstream_res_id)
		.fetch_all(&mut *conn)
		.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}

	#[tracing::instrument(skip(conn, node), fields(node = %node.diff_key()))]
	pub async fn insert_node(conn: &mut SqliteConnection, node: &UpstreamNode) -> Result<()> {
		let now = Utc::now();
		sqlx::query(
			r#"
			INSERT INTO upstream_nodes (
				res_id, upstream_res_id, node_ip, ip_type, node_port, node_weight, health, tags,
				created_at, updated_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&node.res_id)
		.bind(&node.upstream_res_id)
		.bind(&node.node_ip)
		.bind(node.ip_type.code())
		.bind(node.node_port)
		.bind(node.node_weight)
		.bind(node.health.code())
		.bind(serde_json::to_string(&node.tags)?)
		.bind(now)
		.bind(now)
		.execute(&mut *conn)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(conn, node), fields(node = %node.res_id))]
	pub async fn update_node(conn: &mut SqliteConnection, node: &UpstreamNode) -> Result<bool> {
		let result = sqlx::query(
			r#"
			UPDATE upstream_nodes SET
				node_ip = ?, ip_type = ?, node_port = ?, node_weight = ?, health = ?, tags = ?,
				updated_at = ?
			WHERE res_id = ?
			"#,
		)
		.bind(&node.node_ip)
		.bind(node.ip_type.code())
		.bind(node.node_port)
		.bind(node.node_weight)
		.bind(node.health.code())
		.bind(serde_json::to_string(&node.tags)?)
		.bind(Utc::now())
		.bind(&node.res_id)
		.execute(&mut *conn)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn delete_node(conn: &mut SqliteConnection, res_id: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM upstream_nodes WHERE res_id = ?")
			.bind(res_id)
			.execute(&mut *conn)
			.await?;

		Ok(result.rows_affected() > 0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;

	fn make_fields(name: &str) -> UpstreamFields {
		UpstreamFields {
			name: name.to_string(),
			algorithm: Algorithm::RoundRobin,
			connect_timeout: 1000,
			write_timeout: 1000,
			read_timeout: 1000,
			enable: Enable::On,
			check: HealthCheck::default(),
		}
	}

	fn make_node(res_id: &str, ip: &str, port: i64) -> UpstreamNode {
		UpstreamNode {
			res_id: res_id.to_string(),
			upstream_res_id: "up-1".to_string(),
			node_ip: ip.to_string(),
			ip_type: IpType::Ipv4,
			node_port: port,
			node_weight: 10,
			health: NodeHealth::Healthy,
			tags: BTreeMap::new(),
		}
	}

	#[tokio::test]
	async fn test_health_check_defaults_persist() {
		let pool = create_test_pool().await;
		let mut conn = pool.acquire().await.unwrap();

		UpstreamRepository::insert(&mut conn, "up-1", &make_fields("backend"))
			.await
			.unwrap();
		let upstream = UpstreamRepository::find_by_name(&mut conn, "backend")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(upstream.check.uri, "/");
		assert_eq!(upstream.check.interval, 1);
		assert_eq!(upstream.release, ReleaseStatus::Unpublished);
	}

	#[tokio::test]
	async fn test_node_lifecycle() {
		let pool = create_test_pool().await;
		let mut conn = pool.acquire().await.unwrap();

		UpstreamRepository::insert(&mut conn, "up-1", &make_fields("backend"))
			.await
			.unwrap();
		UpstreamRepository::insert_node(&mut conn, &make_node("un-1", "10.0.0.1", 80))
			.await
			.unwrap();
		let mut second = make_node("un-2", "10.0.0.2", 80);
		second.tags.insert("zone".to_string(), "a".to_string());
		UpstreamRepository::insert_node(&mut conn, &second).await.unwrap();

		second.node_weight = 50;
		assert!(UpstreamRepository::update_node(&mut conn, &second)
			.await
			.unwrap());
		assert!(UpstreamRepository::delete_node(&mut conn, "un-1")
			.await
			.unwrap());

		let nodes = UpstreamRepository::nodes(&mut conn, "up-1").await.unwrap();
		assert_eq!(nodes, vec![second]);
	}

	#[tokio::test]
	async fn test_delete_cascades_nodes() {
		let pool = create_test_pool().await;
		let mut conn = pool.acquire().await.unwrap();

		UpstreamRepository::insert(&mut conn, "up-1", &make_fields("backend"))
			.await
			.unwrap();
		UpstreamRepository::insert_node(&mut conn, &make_node("un-1", "10.0.0.1", 80))
			.await
			.unwrap();

		assert!(UpstreamRepository::delete(&mut conn, "up-1").await.unwrap());
		assert!(UpstreamRepository::nodes(&mut conn, "up-1")
			.await
			.unwrap()
			.is_empty());
	}
}
