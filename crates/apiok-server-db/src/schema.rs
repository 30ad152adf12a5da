// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Idempotent schema bootstrap for the control-plane and snapshot stores.

use sqlx::SqlitePool;

use crate::error::Result;

const CONTROL_PLANE: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS services (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		res_id TEXT NOT NULL UNIQUE,
		name TEXT NOT NULL,
		protocol INTEGER NOT NULL,
		enable INTEGER NOT NULL,
		release INTEGER NOT NULL,
		client_max_body_size TEXT,
		chunked_transfer_encoding INTEGER,
		proxy_buffering INTEGER,
		proxy_cache TEXT,
		proxy_set_header TEXT,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS service_domains (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		res_id TEXT NOT NULL UNIQUE,
		service_res_id TEXT NOT NULL,
		domain TEXT NOT NULL UNIQUE,
		created_at TEXT NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_service_domains_service ON service_domains(service_res_id)",
	r#"
	CREATE TABLE IF NOT EXISTS routers (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		res_id TEXT NOT NULL UNIQUE,
		service_res_id TEXT NOT NULL,
		upstream_res_id TEXT,
		router_name TEXT NOT NULL,
		request_methods TEXT NOT NULL,
		router_path TEXT NOT NULL,
		enable INTEGER NOT NULL,
		release INTEGER NOT NULL,
		client_max_body_size TEXT,
		chunked_transfer_encoding INTEGER,
		proxy_buffering INTEGER,
		proxy_cache TEXT,
		proxy_set_header TEXT,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL,
		UNIQUE(service_res_id, router_path)
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_routers_upstream ON routers(upstream_res_id)",
	r#"
	CREATE TABLE IF NOT EXISTS upstreams (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		res_id TEXT NOT NULL UNIQUE,
		name TEXT NOT NULL UNIQUE,
		algorithm INTEGER NOT NULL,
		connect_timeout INTEGER NOT NULL,
		write_timeout INTEGER NOT NULL,
		read_timeout INTEGER NOT NULL,
		enable INTEGER NOT NULL,
		release INTEGER NOT NULL,
		check_enabled INTEGER NOT NULL DEFAULT 0,
		check_tcp INTEGER NOT NULL DEFAULT 0,
		check_method TEXT NOT NULL DEFAULT 'GET',
		check_host TEXT NOT NULL DEFAULT '',
		check_uri TEXT NOT NULL DEFAULT '/',
		check_interval INTEGER NOT NULL DEFAULT 1,
		check_timeout INTEGER NOT NULL DEFAULT 1,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS upstream_nodes (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		res_id TEXT NOT NULL UNIQUE,
		upstream_res_id TEXT NOT NULL,
		node_ip TEXT NOT NULL,
		ip_type INTEGER NOT NULL,
		node_port INTEGER NOT NULL,
		node_weight INTEGER NOT NULL,
		health INTEGER NOT NULL,
		tags TEXT NOT NULL DEFAULT '{}',
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL,
		UNIQUE(upstream_res_id, node_ip, node_port)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS plugins (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		res_id TEXT NOT NULL UNIQUE,
		plugin_key TEXT NOT NULL UNIQUE,
		icon TEXT NOT NULL,
		type INTEGER NOT NULL,
		description TEXT NOT NULL,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS plugin_configs (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		res_id TEXT NOT NULL UNIQUE,
		name TEXT NOT NULL,
		type INTEGER NOT NULL,
		target_id TEXT NOT NULL,
		plugin_res_id TEXT NOT NULL,
		plugin_key TEXT NOT NULL,
		config TEXT NOT NULL,
		enable INTEGER NOT NULL,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL,
		UNIQUE(type, target_id, plugin_key)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS certificates (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		res_id TEXT NOT NULL UNIQUE,
		sni TEXT NOT NULL,
		certificate TEXT NOT NULL,
		private_key TEXT NOT NULL,
		expired_at INTEGER NOT NULL,
		enable INTEGER NOT NULL,
		ca_provider TEXT NOT NULL,
		key_algorithm TEXT NOT NULL,
		issuer TEXT NOT NULL,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_certificates_sni ON certificates(sni, enable)",
	r#"
	CREATE TABLE IF NOT EXISTS acme_challenges (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		res_id TEXT NOT NULL UNIQUE,
		token TEXT NOT NULL UNIQUE,
		key_authorization TEXT NOT NULL,
		expired_at INTEGER NOT NULL,
		created_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS users (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		res_id TEXT NOT NULL UNIQUE,
		name TEXT NOT NULL,
		email TEXT NOT NULL UNIQUE,
		password_hash TEXT NOT NULL,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS user_tokens (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		res_id TEXT NOT NULL UNIQUE,
		user_res_id TEXT NOT NULL,
		token_hash TEXT NOT NULL UNIQUE,
		expired_at INTEGER NOT NULL,
		created_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS job_definitions (
		id TEXT PRIMARY KEY,
		name TEXT NOT NULL,
		description TEXT,
		job_type TEXT NOT NULL,
		interval_secs INTEGER,
		enabled INTEGER NOT NULL DEFAULT 1,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS job_runs (
		id TEXT PRIMARY KEY,
		job_id TEXT NOT NULL REFERENCES job_definitions(id),
		status TEXT NOT NULL,
		started_at TEXT NOT NULL,
		completed_at TEXT,
		duration_ms INTEGER,
		error_message TEXT,
		retry_count INTEGER NOT NULL DEFAULT 0,
		triggered_by TEXT NOT NULL,
		metadata TEXT
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_job_runs_job ON job_runs(job_id, started_at)",
];

const SNAPSHOT: &[&str] = &[r#"
	CREATE TABLE IF NOT EXISTS apiok_data (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		type TEXT NOT NULL,
		name TEXT NOT NULL,
		data TEXT NOT NULL,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL,
		UNIQUE(type, name)
	)
	"#];

/// Create every control-plane table and index that does not exist yet.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	apply(pool, CONTROL_PLANE).await?;
	tracing::info!(statements = CONTROL_PLANE.len(), "control-plane schema ready");
	Ok(())
}

/// Create the data-plane snapshot table.
#[tracing::instrument(skip(pool))]
pub async fn run_snapshot_migrations(pool: &SqlitePool) -> Result<()> {
	apply(pool, SNAPSHOT).await?;
	tracing::info!("snapshot schema ready");
	Ok(())
}

async fn apply(pool: &SqlitePool, statements: &[&str]) -> Result<()> {
	let mut tx = pool.begin().await?;
	for statement in statements {
		sqlx::query(statement).execute(&mut *tx).await?;
	}
	tx.commit().await?;
	Ok(())
}
