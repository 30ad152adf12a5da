// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use crate::error::Result;
use crate::id::{IdPrefix, ResIdGenerator};
use crate::options::{ProxyColumns, ProxyOptions};
use crate::types::{decode, Enable, Protocol, ReleaseStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
	pub res_id: String,
	pub name: String,
	pub protocol: Protocol,
	pub enable: Enable,
	pub release: ReleaseStatus,
	#[serde(flatten)]
	pub options: ProxyOptions,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Writable service fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceFields {
	pub name: String,
	pub protocol: Protocol,
	pub enable: Enable,
	#[serde(flatten)]
	pub options: ProxyOptions,
}

#[derive(sqlx::FromRow)]
struct ServiceRow {
	res_id: String,
	name: String,
	protocol: i64,
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

impl TryFrom<ServiceRow> for Service {
	type Error = crate::error::DbError;

	fn try_from(row: ServiceRow) -> Result<Self> {
		Ok(Service {
			res_id: row.res_id,
			name: row.name,
			protocol: decode(row.protocol)?,
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

const SELECT_SERVICE: &str = r#"
	SELECT res_id, name, protocol, enable, release,
		client_max_body_size, chunked_transfer_encoding, proxy_buffering,
		proxy_cache, proxy_set_header, created_at, updated_at
	FROM services
"#;

/// Services and their domains.
///
/// Every method takes the connection it runs on, so callers can compose them
/// inside one transaction.
pub struct ServiceRepository;

impl ServiceRepository {
	#[tracing::instrument(skip(conn, fields), fields(name = %fields.name))]
	pub async fn insert(
		conn: &mut SqliteConnection,
		res_id: &str,
		fields: &ServiceFields,
	) -> Result<()> {
		let now = Utc::now();
		let columns = fields.options.to_columns()?;

		sqlx::query(
			r#"
			INSERT INTO services (
				res_id, name, protocol, enable, release,
				client_max_body_size, chunked_transfer_encoding, proxy_buffering,
				proxy_cache, proxy_set_header, created_at, updated_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(res_id)
		.bind(&fields.name)
		.bind(fields.protocol.code())
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
		fields: &ServiceFields,
		release: ReleaseStatus,
	) -> Result<bool> {
		let columns = fields.options.to_columns()?;

		let result = sqlx::query(
			r#"
			UPDATE services SET
				name = ?, protocol = ?, enable = ?, release = ?,
				client_max_body_size = ?, chunked_transfer_encoding = ?, proxy_buffering = ?,
				proxy_cache = ?, proxy_set_header = ?, updated_at = ?
			WHERE res_id = ?
			"#,
		)
		.bind(&fields.name)
		.bind(fields.protocol.code())
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
		let result =
			sqlx::query("UPDATE services SET name = ?, release = ?, updated_at = ? WHERE res_id = ?")
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
			sqlx::query("UPDATE services SET enable = ?, release = ?, updated_at = ? WHERE res_id = ?")
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
		let result = sqlx::query("UPDATE services SET release = ?, updated_at = ? WHERE res_id = ?")
			.bind(release.code())
			.bind(Utc::now())
			.bind(res_id)
			.execute(&mut *conn)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(conn))]
	pub async fn get(conn: &mut SqliteConnection, res_id: &str) -> Result<Option<Service>> {
		let row = sqlx::query_as::<_, ServiceRow>(&format!("{SELECT_SERVICE} WHERE res_id = ?"))
			.bind(res_id)
			.fetch_optional(&mut *conn)
			.await?;

		row.map(TryInto::try_into).transpose()
	}

	/// List services, optionally filtered by a substring of the name or a domain.
	#[tracing::instrument(skip(conn))]
	pub async fn list(conn: &mut SqliteConnection, search: Option<&str>) -> Result<Vec<Service>> {
		let rows = match search.map(str::trim).filter(|s| !s.is_empty()) {
			Some(term) => {
				let pattern = format!("%{term}%");
				sqlx::query_as::<_, ServiceRow>(&format!(
					"{SELECT_SERVICE} WHERE name LIKE ? OR res_id IN \
					 (SELECT service_res_id FROM service_domains WHERE domain LIKE ?) ORDER BY id DESC"
				))
				.bind(&pattern)
				.bind(&pattern)
				.fetch_all(&mut *conn)
				.await?
			}
			None => {
				sqlx::query_as::<_, ServiceRow>(&format!("{SELECT_SERVICE} ORDER BY id DESC"))
					.fetch_all(&mut *conn)
					.await?
			}
		};

		rows.into_iter().map(TryInto::try_into).collect()
	}

	#[tracing::instrument(skip(conn))]
	pub async fn delete(conn: &mut SqliteConnection, res_id: &str) -> Result<bool> {
		sqlx::query("DELETE FROM service_domains WHERE service_res_id = ?")
			.bind(res_id)
			.execute(&mut *conn)
			.await?;

		let result = sqlx::query("DELETE FROM services WHERE res_id = ?")
			.bind(res_id)
			.execute(&mut *conn)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	/// Replace the domain set of a service.
	#[tracing::instrument(skip(conn, domains), fields(count = domains.len()))]
	pub async fn replace_domains(
		conn: &mut SqliteConnection,
		service_res_id: &str,
		domains: &[String],
	) -> Result<()> {
		sqlx::query("DELETE FROM service_domains WHERE service_res_id = ?")
			.bind(service_res_id)
			.execute(&mut *conn)
			.await?;

		let now = Utc::now();
		for domain in domains {
			let res_id = ResIdGenerator::allocate(conn, IdPrefix::ServiceDomain).await?;
			sqlx::query(
				"INSERT INTO service_domains (res_id, service_res_id, domain, created_at) VALUES (?, ?, ?, ?)",
			)
			.bind(&res_id)
			.bind(service_res_id)
			.bind(domain)
			.bind(now)
			.execute(&mut *conn)
			.await?;
		}

		Ok(())
	}

	#[tracing::instrument(skip(conn))]
	pub async fn domains(conn: &mut SqliteConnection, service_res_id: &str) -> Result<Vec<String>> {
		let rows = sqlx::query_as::<_, (String,)>(
			"SELECT domain FROM service_domains WHERE service_res_id = ? ORDER BY id",
		)
		.bind(service_res_id)
		.fetch_all(&mut *conn)
		.await?;

		Ok(rows.into_iter().map(|(d,)| d).collect())
	}

	/// Domains from `domains` already bound to a service other than `exclude`.
	#[tracing::instrument(skip(conn, domains))]
	pub async fn domains_taken(
		conn: &mut SqliteConnection,
		domains: &[String],
		exclude_service: Option<&str>,
	) -> Result<Vec<String>> {
		let mut taken = Vec::new();
		for domain in domains {
			let row = sqlx::query_as::<_, (String,)>(
				"SELECT service_res_id FROM service_domains WHERE domain = ?",
			)
			.bind(domain)
			.fetch_optional(&mut *conn)
			.await?;

			if let Some((owner,)) = row {
				if Some(owner.as_str()) != exclude_service {
					taken.push(domain.clone());
				}
			}
		}
		Ok(taken)
	}
}
