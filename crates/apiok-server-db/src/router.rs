// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use crate::error::Result;
use crate::options::{ProxyColumns, ProxyOptions};
use crate::types::{decode, Enable, ReleaseStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Router {
	pub res_id: String,
	pub service_res_id: String,
	pub upstream_res_id: Option<String>,
	pub router_name: String,
	/// Comma separated, e.g. `GET,POST`.
	pub request_methods: String,
	pub router_path: String,
	pub enable: Enable,
	pub release: ReleaseStatus,
	#[serde(flatten)]
	pub options: ProxyOptions,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Router {
	pub fn methods(&self) -> Vec<String> {
		self.request_methods
			.split(',')
			.map(str::trim)
			.filter(|m| !m.is_empty())
			.map(str::to_string)
			.collect()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterFields {
	pub service_res_id: String,
	pub upstream_res_id: Option<String>,
	pub router_name: String,
	pub request_methods: String,
	pub router_path: String,
	pub enable: Enable,
	#[serde(flatten)]
	pub options: ProxyOptions,
}

#[derive(sqlx::FromRow)]
struct RouterRow {
	res_id: String,
	service_res_id: String,
	upstream_res_id: Option<String>,
	router_name: String,
	request_methods: String,
	router_path: String,
	enable: i64,
	release: i64,
	client_max_body_size: Option<String>,
	chunked_transfer_encoding: Option<i64>,
	proxy_buffering: Option<i64>,
	proxy_cache: Option<String>,
	proxy_set_header: Option<String>,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
}

impl TryFrom<RouterRow> for Router {
	type Error = crate::error::DbError;

	fn try_from(row: RouterRow) -> Result<Self> {
		Ok(Router {
			res_id: row.res_id,
			service_res_id: row.service_res_id,
			upstream_res_id: row.upstream_res_id.filter(|u| !u.is_empty()),
			router_name: row.router_name,
			request_methods: row.request_methods,
			router_path: row.router_path,
			enable: decode(row.enable)?,
			release: decode(row.release)?,
			options: ProxyOptions::from_columns(ProxyColumns {
				client_max_body_size: row.client_max_body_size,
				chunked_transfer_encoding: row.chunked_transfer_encoding,
				proxy_buffering: row.proxy_buffering,
				proxy_cache: row.proxy_cache,
				proxy_set_header: row.proxy_set_header,
			})?,
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

const SELECT_ROUTER: &str = r#"
	SELECT res_id, service_res_id, upstream_res_id, router_name, request_methods, router_path,
		enable, release, client_max_body_size, chunked_transfer_encoding, proxy_buffering,
		proxy_cache, proxy_set_header, created_at, updated_at
	FROM routers
"#;

pub struct RouterRepository;

impl RouterRepository {
	#[tracing::instrument(skip(conn, fields), fields(service = %fields.service_res_id, path = %fields.router_path))]
	pub async fn insert(
		conn: &mut SqliteConnection,
		res_id: &str,
		fields: &RouterFields,
	) -> Result<()> {
		let now = Utc::now();
		let columns = fields.options.to_columns()?;

		sqlx::query(
			r#"
			INSERT INTO routers (
				res_id, service_res_id, upstream_res_id, router_name, request_methods, router_path,
				enable, release, client_max_body_size, chunked_transfer_encoding, proxy_buffering,
				proxy_cache, proxy_set_header, created_at, updated_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(res_id)
		.bind(&fields.service_res_id)
		.bind(&fields.upstream_res_id)
		.bind(&fields.router_name)
		.bind(&fields.request_methods)
		.bind(&fields.router_path)
		.bind(fields.enable.code())
		.bind(ReleaseStatus::Unpublished.code())
		.bind(columns.client_max_body_size)
		.bind(columns.chunked_transfer_encoding)
		.bind(columns.proxy_buffering)
		.bind(columns.proxy_cache)
		.bind(columns.proxy_set_header)
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
		fields: &RouterFields,
		release: ReleaseStatus,
	) -> Result<bool> {
		let columns = fields.options.to_columns()?;

		let result = sqlx::query(
			r#"
			UPDATE routers SET
				upstream_res_id = ?, router_name = ?, request_methods = ?, router_path = ?,
				enable = ?, release = ?, client_max_body_size = ?, chunked_transfer_encoding = ?,
				proxy_buffering = ?, proxy_cache = ?, proxy_set_header = ?, updated_at = ?
			WHERE res_id = ?
			"#,
		)
		.bind(&fields.upstream_res_id)
		.bind(&fields.router_name)
		.bind(&fields.request_methods)
		.bind(&fields.router_path)
		.bind(fields.enable.code())
		.bind(release.code())
		.bind(columns.client_max_body_size)
		.bind(columns.chunked_transfer_encoding)
		.bind(columns.proxy_buffering)
		.bind(columns.proxy_cache)
		.bind(columns.proxy_set_header)
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
		let result = sqlx::query(
			"UPDATE routers SET router_name = ?, release = ?, updated_at = ? WHERE res_id = ?",
		)
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
		let result =
			sqlx::query("UPDATE routers SET enable = ?, release = ?, updated_at = ? WHERE res_id = ?")
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
		let result = sqlx::query("UPDATE routers SET release = ?, updated_at = ? WHERE res_id = ?")
			.bind(release.code())
			.bind(Utc::now())
			.bind(res_id)
			.execute(&mut *conn)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn get(conn: &mut SqliteConnection, res_id: &str) -> Result<Option<Router>> {
		let row = sqlx::query_as::<_, RouterRow>(&format!("{SELECT_ROUTER} WHERE res_id = ?"))
			.bind(res_id)
			.fetch_optional(&mut *conn)
			.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[tracing::instrument(skip(conn))]
	pub async fn list_by_service(
		conn: &mut SqliteConnection,
		service_res_id: &str,
	) -> Result<Vec<Router>> {
		let rows = sqlx::query_as::<_, RouterRow>(&format!(
			"{SELECT_ROUTER} WHERE service_res_id = ? ORDER BY id DESC"
		))
		.bind(service_res_id)
		.fetch_all(&mut *conn)
		.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}

	#[tracing::instrument(skip(conn))]
	pub async fn list_by_upstream(
		conn: &mut SqliteConnection,
		upstream_res_id: &str,
	) -> Result<Vec<Router>> {
		let rows = sqlx::query_as::<_, RouterRow>(&format!(
			"{SELECT_ROUTER} WHERE upstream_res_id = ? ORDER BY id"
		))
		.bind(upstream_res_id)
		.fetch_all(&mut *conn)
		.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}

	#[tracing::instrument(skip(conn))]
	pub async fn count_by_service(conn: &mut SqliteConnection, service_res_id: &str) -> Result<i64> {
		let (count,) =
			sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM routers WHERE service_res_id = ?")
				.bind(service_res_id)
				.fetch_one(&mut *conn)
				.await?;
		Ok(count)
	}

	/// Paths from `paths` already used by another router of the service.
	#[tracing::instrument(skip(conn, paths))]
	pub async fn paths_taken(
		conn: &mut SqliteConnection,
		service_res_id: &str,
		paths: &[String],
		exclude_router: Option<&str>,
	) -> Result<Vec<String>> {
		let mut taken = Vec::new();
		for path in paths {
			let row = sqlx::query_as::<_, (String,)>(
				"SELECT res_id FROM routers WHERE service_res_id = ? AND router_path = ?",
			)
			.bind(service_res_id)
			.bind(path)
			.fetch_optional(&mut *conn)
			.await?;

			if let Some((owner,)) = row {
				if Some(owner.as_str()) != exclude_router {
					taken.push(path.clone());
				}
			}
		}
		Ok(taken)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn delete(conn: &mut SqliteConnection, res_id: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM routers WHERE res_id = ?")
			.bind(res_id)
			.execute(&mut *conn)
			.await?;

		Ok(result.rows_affected() > 0)
	}
}
