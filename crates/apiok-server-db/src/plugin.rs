// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Plugin catalog rows and the plugin configs attached to global, service and
//! router scopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqliteConnection;

use crate::error::Result;
use crate::types::{decode, Enable, PluginConfigScope, PluginType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
	pub res_id: String,
	pub plugin_key: String,
	pub icon: String,
	#[serde(rename = "type")]
	pub plugin_type: PluginType,
	pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
	pub res_id: String,
	pub name: String,
	#[serde(rename = "type")]
	pub scope: PluginConfigScope,
	pub target_id: String,
	pub plugin_res_id: String,
	pub plugin_key: String,
	pub config: Value,
	pub enable: Enable,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PluginRow {
	res_id: String,
	plugin_key: String,
	icon: String,
	#[sqlx(rename = "type")]
	plugin_type: i64,
	description: String,
}

impl TryFrom<PluginRow> for Plugin {
	type Error = crate::error::DbError;

	fn try_from(row: PluginRow) -> Result<Self> {
		Ok(Plugin {
			res_id: row.res_id,
			plugin_key: row.plugin_key,
			icon: row.icon,
			plugin_type: decode(row.plugin_type)?,
			description: row.description,
		})
	}
}

#[derive(sqlx::FromRow)]
struct PluginConfigRow {
	res_id: String,
	name: String,
	#[sqlx(rename = "type")]
	scope: i64,
	target_id: String,
	plugin_res_id: String,
	plugin_key: String,
	config: String,
	enable: i64,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
}

impl TryFrom<PluginConfigRow> for PluginConfig {
	type Error = crate::error::DbError;

	fn try_from(row: PluginConfigRow) -> Result<Self> {
		Ok(PluginConfig {
			res_id: row.res_id,
			name: row.name,
			scope: decode(row.scope)?,
			target_id: row.target_id,
			plugin_res_id: row.plugin_res_id,
			plugin_key: row.plugin_key,
			config: serde_json::from_str(&row.config)?,
			enable: decode(row.enable)?,
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

const SELECT_PLUGIN: &str = "SELECT res_id, plugin_key, icon, type, description FROM plugins";

const SELECT_CONFIG: &str = r#"
	SELECT res_id, name, type, target_id, plugin_res_id, plugin_key, config, enable, created_at, updated_at
	FROM plugin_configs
"#;

pub struct PluginRepository;

impl PluginRepository {
	#[tracing::instrument(skip(conn, plugin), fields(key = %plugin.plugin_key))]
	pub async fn insert(conn: &mut SqliteConnection, plugin: &Plugin) -> Result<()> {
		let now = Utc::now();
		sqlx::query(
			r#"
			INSERT INTO plugins (res_id, plugin_key, icon, type, description, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&plugin.res_id)
		.bind(&plugin.plugin_key)
		.bind(&plugin.icon)
		.bind(plugin.plugin_type.code())
		.bind(&plugin.description)
		.bind(now)
		.bind(now)
		.execute(&mut *conn)
		.await?;

		Ok(())
	}

	/// Refresh the catalog metadata of an existing row, matched by key.
	#[tracing::instrument(skip(conn, plugin), fields(key = %plugin.plugin_key))]
	pub async fn update_metadata(conn: &mut SqliteConnection, plugin: &Plugin) -> Result<bool> {
		let result = sqlx::query(
			"UPDATE plugins SET icon = ?, type = ?, description = ?, updated_at = ? WHERE plugin_key = ?",
		)
		.bind(&plugin.icon)
		.bind(plugin.plugin_type.code())
		.bind(&plugin.description)
		.bind(Utc::now())
		.bind(&plugin.plugin_key)
		.execute(&mut *conn)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn get(conn: &mut SqliteConnection, res_id: &str) -> Result<Option<Plugin>> {
		let row = sqlx::query_as::<_, PluginRow>(&format!("{SELECT_PLUGIN} WHERE res_id = ?"))
			.bind(res_id)
			.fetch_optional(&mut *conn)
			.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[tracing::instrument(skip(conn))]
	pub async fn get_by_key(conn: &mut SqliteConnection, plugin_key: &str) -> Result<Option<Plugin>> {
		let row = sqlx::query_as::<_, PluginRow>(&format!("{SELECT_PLUGIN} WHERE plugin_key = ?"))
			.bind(plugin_key)
			.fetch_optional(&mut *conn)
			.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[tracing::instrument(skip(conn))]
	pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Plugin>> {
		let rows = sqlx::query_as::<_, PluginRow>(&format!("{SELECT_PLUGIN} ORDER BY type, plugin_key"))
			.fetch_all(&mut *conn)
			.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}

	#[tracing::instrument(skip(conn))]
	pub async fn delete(conn: &mut SqliteConnection, res_id: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM plugins WHERE res_id = ?")
			.bind(res_id)
			.execute(&mut *conn)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	/// Whether any plugin config still points at the catalog row.
	#[tracing::instrument(skip(conn))]
	pub async fn is_referenced(conn: &mut SqliteConnection, plugin_res_id: &str) -> Result<bool> {
		let row = sqlx::query("SELECT 1 FROM plugin_configs WHERE plugin_res_id = ? LIMIT 1")
			.bind(plugin_res_id)
			.fetch_optional(&mut *conn)
			.await?;

		Ok(row.is_some())
	}
}

pub struct PluginConfigRepository;

impl PluginConfigRepository {
	#[tracing::instrument(skip(conn, config), fields(key = %config.plugin_key, scope = config.scope.as_str()))]
	pub async fn insert(conn: &mut SqliteConnection, config: &PluginConfig) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO plugin_configs (
				res_id, name, type, target_id, plugin_res_id, plugin_key, config, enable,
				created_at, updated_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&config.res_id)
		.bind(&config.name)
		.bind(config.scope.code())
		.bind(&config.target_id)
		.bind(&config.plugin_res_id)
		.bind(&config.plugin_key)
		.bind(serde_json::to_string(&config.config)?)
		.bind(config.enable.code())
		.bind(config.created_at)
		.bind(config.updated_at)
		.execute(&mut *conn)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(conn, config))]
	pub async fn update(
		conn: &mut SqliteConnection,
		res_id: &str,
		name: &str,
		config: &Value,
		enable: Enable,
	) -> Result<bool> {
		let result = sqlx::query(
			"UPDATE plugin_configs SET name = ?, config = ?, enable = ?, updated_at = ? WHERE res_id = ?",
		)
		.bind(name)
		.bind(serde_json::to_string(config)?)
		.bind(enable.code())
		.bind(Utc::now())
		.bind(res_id)
		.execute(&mut *conn)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn set_enable(conn: &mut SqliteConnection, res_id: &str, enable: Enable) -> Result<bool> {
		let result =
			sqlx::query("UPDATE plugin_configs SET enable = ?, updated_at = ? WHERE res_id = ?")
				.bind(enable.code())
				.bind(Utc::now())
				.bind(res_id)
				.execute(&mut *conn)
				.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn get(conn: &mut SqliteConnection, res_id: &str) -> Result<Option<PluginConfig>> {
		let row = sqlx::query_as::<_, PluginConfigRow>(&format!("{SELECT_CONFIG} WHERE res_id = ?"))
			.bind(res_id)
			.fetch_optional(&mut *conn)
			.await?;

		row.map(TryInto::try_into).transpose()
	}

	/// Every config attached to `target_id` in `scope`. Global configs use an
	/// empty target.
	#[tracing::instrument(skip(conn))]
	pub async fn list_for_target(
		conn: &mut SqliteConnection,
		scope: PluginConfigScope,
		target_id: &str,
	) -> Result<Vec<PluginConfig>> {
		let rows = sqlx::query_as::<_, PluginConfigRow>(&format!(
			"{SELECT_CONFIG} WHERE type = ? AND target_id = ? ORDER BY id"
		))
		.bind(scope.code())
		.bind(target_id)
		.fetch_all(&mut *conn)
		.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}

	#[tracing::instrument(skip(conn))]
	pub async fn exists(
		conn: &mut SqliteConnection,
		scope: PluginConfigScope,
		target_id: &str,
		plugin_key: &str,
	) -> Result<bool> {
		let row = sqlx::query(
			"SELECT 1 FROM plugin_configs WHERE type = ? AND target_id = ? AND plugin_key = ? LIMIT 1",
		)
		.bind(scope.code())
		.bind(target_id)
		.bind(plugin_key)
		.fetch_optional(&mut *conn)
		.await?;

		Ok(row.is_some())
	}

	#[tracing::instrument(skip(conn))]
	pub async fn delete(conn: &mut SqliteConnection, res_id: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM plugin_configs WHERE res_id = ?")
			.bind(res_id)
			.execute(&mut *conn)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn delete_for_target(
		conn: &mut SqliteConnection,
		scope: PluginConfigScope,
		target_id: &str,
	) -> Result<u64> {
		let result = sqlx::query("DELETE FROM plugin_configs WHERE type = ? AND target_id = ?")
			.bind(scope.code())
			.bind(target_id)
			.execute(&mut *conn)
			.await?;

		Ok(result.rows_affected())
	}
}
