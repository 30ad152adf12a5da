// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Router admin operations.

use apiok_server_db::{
	random_token, Enable, IdPrefix, PluginConfig, PluginConfigRepository, PluginConfigScope,
	ProxyOptions, ResIdGenerator, Router, RouterFields, RouterRepository, ServiceRepository,
	SqliteConnection, UpstreamRepository,
};
use chrono::Utc;
use serde::Deserialize;

use crate::engine::{ensure_releasable, ReleaseEngine, ReleaseIntent, ReleaseKind};
use crate::error::{ErrorCode, GatewayError, Result};
use crate::service::default_enable;

pub const DEFAULT_PATH: &str = "/*";
pub const METHOD_ALL: &str = "ALL";
pub const METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "HEAD"];

#[derive(Debug, Clone, Deserialize)]
pub struct RouterInput {
	pub service_res_id: String,
	#[serde(default)]
	pub upstream_res_id: Option<String>,
	pub router_name: String,
	pub request_methods: Vec<String>,
	pub router_path: String,
	#[serde(default = "default_enable")]
	pub enable: Enable,
	#[serde(flatten)]
	pub options: ProxyOptions,
}

/// Uppercase and validate methods into their stored comma form. `ALL`
/// absorbs everything else.
pub fn normalize_methods(methods: &[String]) -> Result<String> {
	let mut out: Vec<String> = Vec::new();
	for method in methods {
		let method = method.trim().to_ascii_uppercase();
		if method == METHOD_ALL {
			return Ok(METHOD_ALL.to_string());
		}
		if !METHODS.contains(&method.as_str()) {
			return Err(GatewayError::with(ErrorCode::RouterMethodError, "method", method));
		}
		if !out.contains(&method) {
			out.push(method);
		}
	}
	if out.is_empty() {
		return Err(GatewayError::with(ErrorCode::RouterMethodError, "method", ""));
	}
	Ok(out.join(","))
}

pub fn check_path(path: &str) -> Result<()> {
	if path == DEFAULT_PATH {
		return Err(GatewayError::new(ErrorCode::RouterDefaultPathNoPermission));
	}
	if path.starts_with(DEFAULT_PATH) {
		return Err(GatewayError::with(
			ErrorCode::RouterDefaultPathForbiddenPrefix,
			"path",
			path,
		));
	}
	if !path.starts_with('/') {
		return Err(GatewayError::params("router_path must start with /"));
	}
	Ok(())
}

#[derive(Clone)]
pub struct RouterManager {
	engine: ReleaseEngine,
}

impl RouterManager {
	pub fn new(engine: ReleaseEngine) -> Self {
		Self { engine }
	}

	async fn require(conn: &mut SqliteConnection, res_id: &str) -> Result<Router> {
		RouterRepository::get(conn, res_id)
			.await?
			.ok_or_else(|| GatewayError::with(ErrorCode::RouterNull, "res_id", res_id))
	}

	async fn check_references(conn: &mut SqliteConnection, fields: &RouterFields) -> Result<()> {
		if ServiceRepository::get(conn, &fields.service_res_id).await?.is_none() {
			return Err(GatewayError::with(
				ErrorCode::ServiceNull,
				"res_id",
				&fields.service_res_id,
			));
		}
		if let Some(upstream) = &fields.upstream_res_id {
			if UpstreamRepository::get(conn, upstream).await?.is_none() {
				return Err(GatewayError::with(ErrorCode::UpstreamNull, "res_id", upstream));
			}
		}
		Ok(())
	}

	async fn check_path_free(
		conn: &mut SqliteConnection,
		service_res_id: &str,
		path: &str,
		exclude: Option<&str>,
	) -> Result<()> {
		let taken =
			RouterRepository::paths_taken(conn, service_res_id, &[path.to_string()], exclude).await?;
		if !taken.is_empty() {
			return Err(GatewayError::listing(ErrorCode::RouterPathExist, "path", &taken));
		}
		Ok(())
	}

	fn fields(input: RouterInput) -> Result<RouterFields> {
		let router_path = input.router_path.trim().to_string();
		check_path(&router_path)?;
		Ok(RouterFields {
			service_res_id: input.service_res_id,
			upstream_res_id: input.upstream_res_id.filter(|u| !u.trim().is_empty()),
			router_name: input.router_name.trim().to_string(),
			request_methods: normalize_methods(&input.request_methods)?,
			router_path,
			enable: input.enable,
			options: input.options,
		})
	}

	#[tracing::instrument(skip(self, input), fields(service = %input.service_res_id, path = %input.router_path))]
	pub async fn create(&self, input: RouterInput) -> Result<String> {
		let fields = Self::fields(input)?;

		let mut tx = self.engine.pool().begin().await?;
		Self::check_references(&mut tx, &fields).await?;
		Self::check_path_free(&mut tx, &fields.service_res_id, &fields.router_path, None).await?;
		let res_id = ResIdGenerator::allocate(&mut tx, IdPrefix::Router).await?;
		RouterRepository::insert(&mut tx, &res_id, &fields).await?;
		tx.commit().await?;

		tracing::info!(res_id = %res_id, "router created");
		Ok(res_id)
	}

	/// Routers stay attached to their original service.
	#[tracing::instrument(skip(self, input))]
	pub async fn update(&self, res_id: &str, input: RouterInput) -> Result<()> {
		let mut fields = Self::fields(input)?;

		let mut tx = self.engine.pool().begin().await?;
		let router = Self::require(&mut tx, res_id).await?;
		fields.service_res_id = router.service_res_id.clone();
		Self::check_references(&mut tx, &fields).await?;
		Self::check_path_free(&mut tx, &router.service_res_id, &fields.router_path, Some(res_id))
			.await?;
		RouterRepository::update(&mut tx, res_id, &fields, router.release.after_edit()).await?;
		tx.commit().await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn update_name(&self, res_id: &str, name: &str) -> Result<()> {
		let mut conn = self.engine.pool().acquire().await?;
		let router = Self::require(&mut conn, res_id).await?;
		RouterRepository::update_name(&mut conn, res_id, name.trim(), router.release.after_edit())
			.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn switch_enable(&self, res_id: &str, enable: Enable) -> Result<()> {
		let mut conn = self.engine.pool().acquire().await?;
		let router = Self::require(&mut conn, res_id).await?;
		if router.enable == enable {
			return Err(GatewayError::new(ErrorCode::SwitchNoChange));
		}
		RouterRepository::set_enable(&mut conn, res_id, enable, router.release.after_edit())
			.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn switch_release(&self, res_id: &str) -> Result<()> {
		let router = {
			let mut conn = self.engine.pool().acquire().await?;
			Self::require(&mut conn, res_id).await?
		};
		ensure_releasable(res_id, router.release)?;

		let report = self
			.engine
			.release(ReleaseKind::Routers, &[res_id.to_string()], ReleaseIntent::Push)
			.await?;
		if report.released.is_empty() {
			return Err(GatewayError::with(
				ErrorCode::RouterServiceUnpublished,
				"service",
				router.service_res_id,
			));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete(&self, res_id: &str) -> Result<()> {
		let mut tx = self.engine.pool().begin().await?;
		let router = Self::require(&mut tx, res_id).await?;
		let plugin_ids: Vec<String> =
			PluginConfigRepository::list_for_target(&mut tx, PluginConfigScope::Router, res_id)
				.await?
				.into_iter()
				.map(|c| c.res_id)
				.collect();
		PluginConfigRepository::delete_for_target(&mut tx, PluginConfigScope::Router, res_id)
			.await?;
		RouterRepository::delete(&mut tx, res_id).await?;
		tx.commit().await?;

		if router.release.has_live_document() {
			self.engine.retract_router(res_id, &plugin_ids).await?;
		}
		tracing::info!(res_id = %res_id, "router deleted");
		Ok(())
	}

	/// Duplicate a router and its plugin configs as a new unpublished router.
	#[tracing::instrument(skip(self))]
	pub async fn copy(&self, res_id: &str) -> Result<String> {
		let mut tx = self.engine.pool().begin().await?;
		let router = Self::require(&mut tx, res_id).await?;

		let suffix = format!("-copy-{}", random_token(4));
		let fields = RouterFields {
			service_res_id: router.service_res_id.clone(),
			upstream_res_id: router.upstream_res_id.clone(),
			router_name: format!("{}{suffix}", router.router_name),
			request_methods: router.request_methods.clone(),
			router_path: format!("{}{suffix}", router.router_path),
			enable: router.enable,
			options: router.options.clone(),
		};
		Self::check_path_free(&mut tx, &fields.service_res_id, &fields.router_path, None).await?;
		let copy_id = ResIdGenerator::allocate(&mut tx, IdPrefix::Router).await?;
		RouterRepository::insert(&mut tx, &copy_id, &fields).await?;

		let configs =
			PluginConfigRepository::list_for_target(&mut tx, PluginConfigScope::Router, res_id)
				.await?;
		let now = Utc::now();
		for config in configs {
			let clone = PluginConfig {
				res_id: ResIdGenerator::allocate(&mut tx, IdPrefix::PluginConfig).await?,
				target_id: copy_id.clone(),
				created_at: now,
				updated_at: now,
				..config
			};
			PluginConfigRepository::insert(&mut tx, &clone).await?;
		}
		tx.commit().await?;

		tracing::info!(source = %res_id, res_id = %copy_id, "router copied");
		Ok(copy_id)
	}

	pub async fn info(&self, res_id: &str) -> Result<Router> {
		let mut conn = self.engine.pool().acquire().await?;
		Self::require(&mut conn, res_id).await
	}

	pub async fn list(&self, service_res_id: &str) -> Result<Vec<Router>> {
		let mut conn = self.engine.pool().acquire().await?;
		Ok(RouterRepository::list_by_service(&mut conn, service_res_id).await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{harness, insert_plugin_config, insert_service};
	use apiok_server_db::{ReleaseStatus, SnapshotStore, SnapshotType};

	fn input(service: &str, path: &str) -> RouterInput {
		RouterInput {
			service_res_id: service.to_string(),
			upstream_res_id: None,
			router_name: "orders".to_string(),
			request_methods: vec!["get".to_string(), "POST".to_string()],
			router_path: path.to_string(),
			enable: Enable::On,
			options: ProxyOptions::default(),
		}
	}

	#[test]
	fn test_methods() {
		assert_eq!(
			normalize_methods(&["get".to_string(), "GET".to_string(), "put".to_string()]).unwrap(),
			"GET,PUT"
		);
		assert_eq!(
			normalize_methods(&["GET".to_string(), "all".to_string()]).unwrap(),
			"ALL"
		);
		assert_eq!(
			normalize_methods(&["FETCH".to_string()]).unwrap_err().code(),
			ErrorCode::RouterMethodError
		);
		assert!(normalize_methods(&[]).is_err());
	}

	#[test]
	fn test_default_path_rules() {
		assert_eq!(
			check_path("/*").unwrap_err().code(),
			ErrorCode::RouterDefaultPathNoPermission
		);
		assert_eq!(
			check_path("/*/api").unwrap_err().code(),
			ErrorCode::RouterDefaultPathForbiddenPrefix
		);
		assert!(check_path("/api/*").is_ok());
		assert_eq!(check_path("api").unwrap_err().code(), ErrorCode::ParamsError);
	}

	#[tokio::test]
	async fn test_create_checks_service_and_path() {
		let h = harness().await;
		let manager = RouterManager::new(h.engine.clone());
		assert_eq!(
			manager.create(input("sv-missing", "/api")).await.unwrap_err().code(),
			ErrorCode::ServiceNull
		);

		let mut conn = h.pool.acquire().await.unwrap();
		insert_service(&mut conn, "sv-1", &["a.example.com"]).await;
		drop(conn);

		let res_id = manager.create(input("sv-1", "/api")).await.unwrap();
		let router = manager.info(&res_id).await.unwrap();
		assert_eq!(router.methods(), vec!["GET", "POST"]);

		let err = manager.create(input("sv-1", "/api")).await.unwrap_err();
		assert_eq!(err.code(), ErrorCode::RouterPathExist);
		assert_eq!(err.args(), &[("path", "/api".to_string())]);

		let mut with_upstream = input("sv-1", "/other");
		with_upstream.upstream_res_id = Some("up-missing".to_string());
		assert_eq!(
			manager.create(with_upstream).await.unwrap_err().code(),
			ErrorCode::UpstreamNull
		);
	}

	#[tokio::test]
	async fn test_release_requires_published_service() {
		let h = harness().await;
		let mut conn = h.pool.acquire().await.unwrap();
		insert_service(&mut conn, "sv-1", &["a.example.com"]).await;
		drop(conn);
		let manager = RouterManager::new(h.engine.clone());
		let res_id = manager.create(input("sv-1", "/api")).await.unwrap();

		let err = manager.switch_release(&res_id).await.unwrap_err();
		assert_eq!(err.code(), ErrorCode::RouterServiceUnpublished);

		h.engine
			.release(ReleaseKind::Services, &["sv-1".to_string()], ReleaseIntent::Push)
			.await
			.unwrap();
		manager.switch_release(&res_id).await.unwrap();
		let doc = h.store.get(SnapshotType::Routers, &res_id).await.unwrap().unwrap();
		assert_eq!(doc["service"], serde_json::json!({"name": "sv-1"}));
		assert_eq!(doc["paths"], serde_json::json!(["/api"]));

		manager.switch_enable(&res_id, Enable::Off).await.unwrap();
		assert_eq!(manager.info(&res_id).await.unwrap().release, ReleaseStatus::ToBePublished);

		manager.delete(&res_id).await.unwrap();
		assert!(h.store.get(SnapshotType::Routers, &res_id).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_copy_clones_plugins() {
		let h = harness().await;
		let mut conn = h.pool.acquire().await.unwrap();
		insert_service(&mut conn, "sv-1", &["a.example.com"]).await;
		drop(conn);
		let manager = RouterManager::new(h.engine.clone());
		let res_id = manager.create(input("sv-1", "/api")).await.unwrap();

		let mut conn = h.pool.acquire().await.unwrap();
		insert_plugin_config(&mut conn, "pc-1", PluginConfigScope::Router, &res_id, "cors", Enable::On).await;
		drop(conn);

		let copy_id = manager.copy(&res_id).await.unwrap();
		assert_ne!(copy_id, res_id);
		let copy = manager.info(&copy_id).await.unwrap();
		assert!(copy.router_path.starts_with("/api-copy-"));
		assert!(copy.router_name.starts_with("orders-copy-"));
		assert_eq!(copy.release, ReleaseStatus::Unpublished);

		let mut conn = h.pool.acquire().await.unwrap();
		let cloned =
			PluginConfigRepository::list_for_target(&mut conn, PluginConfigScope::Router, &copy_id)
				.await
				.unwrap();
		assert_eq!(cloned.len(), 1);
		assert_eq!(cloned[0].plugin_key, "cors");
		assert_ne!(cloned[0].res_id, "pc-1");
	}
}
