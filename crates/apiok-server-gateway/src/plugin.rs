// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Plugin catalog and plugin config operations.
//!
//! Service and router configs only reach the data plane when their owner is
//! released. Global configs have no owner and are synced on every change.

use apiok_server_db::{
	Enable, IdPrefix, Plugin, PluginConfig, PluginConfigRepository, PluginConfigScope,
	PluginRepository, PluginType, ReleaseStatus, ResIdGenerator, RouterRepository,
	ServiceRepository, SqliteConnection,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{self, CATALOG};
use crate::engine::ReleaseEngine;
use crate::plugin_check::check_plugin_config;
use crate::error::{ErrorCode, GatewayError, Result};
use crate::service::default_enable;

#[derive(Debug, Clone, Serialize)]
pub struct PluginTypeView {
	pub id: i64,
	pub name: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
	#[serde(flatten)]
	pub plugin: Plugin,
	pub config: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfigInput {
	pub plugin_res_id: String,
	pub name: String,
	pub config: Value,
	#[serde(default = "default_enable")]
	pub enable: Enable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfigUpdate {
	pub name: String,
	pub config: Value,
	#[serde(default = "default_enable")]
	pub enable: Enable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogReport {
	pub inserted: usize,
	pub updated: usize,
	pub removed: usize,
}

fn target_of(scope: PluginConfigScope, target_id: &str) -> String {
	match scope {
		PluginConfigScope::Global => String::new(),
		_ => target_id.to_string(),
	}
}

#[derive(Clone)]
pub struct PluginManager {
	engine: ReleaseEngine,
}

impl PluginManager {
	pub fn new(engine: ReleaseEngine) -> Self {
		Self { engine }
	}

	pub fn type_list(&self) -> Vec<PluginTypeView> {
		PluginType::ALL
			.iter()
			.map(|t| PluginTypeView {
				id: t.code(),
				name: t.as_str(),
			})
			.collect()
	}

	pub async fn catalog(&self) -> Result<Vec<Plugin>> {
		let mut conn = self.engine.pool().acquire().await?;
		Ok(PluginRepository::list(&mut conn).await?)
	}

	pub async fn info(&self, plugin_res_id: &str) -> Result<PluginInfo> {
		let mut conn = self.engine.pool().acquire().await?;
		let plugin = PluginRepository::get(&mut conn, plugin_res_id)
			.await?
			.ok_or_else(|| GatewayError::with(ErrorCode::PluginNull, "res_id", plugin_res_id))?;
		let config = catalog::default_config(&plugin.plugin_key)
			.unwrap_or_else(|| Value::Object(Default::default()));
		Ok(PluginInfo { plugin, config })
	}

	async fn check_target(
		conn: &mut SqliteConnection,
		scope: PluginConfigScope,
		target_id: &str,
	) -> Result<()> {
		match scope {
			PluginConfigScope::Global => Ok(()),
			PluginConfigScope::Service => match ServiceRepository::get(conn, target_id).await? {
				Some(_) => Ok(()),
				None => Err(GatewayError::with(ErrorCode::ServiceNull, "res_id", target_id)),
			},
			PluginConfigScope::Router => match RouterRepository::get(conn, target_id).await? {
				Some(_) => Ok(()),
				None => Err(GatewayError::with(ErrorCode::RouterNull, "res_id", target_id)),
			},
		}
	}

	/// Move a Published owner to ToBePublished.
	async fn dirty_owner(
		conn: &mut SqliteConnection,
		scope: PluginConfigScope,
		target_id: &str,
	) -> Result<()> {
		match scope {
			PluginConfigScope::Global => {}
			PluginConfigScope::Service => {
				if let Some(service) = ServiceRepository::get(conn, target_id).await? {
					if service.release == ReleaseStatus::Published {
						ServiceRepository::set_release(conn, target_id, ReleaseStatus::ToBePublished)
							.await?;
					}
				}
			}
			PluginConfigScope::Router => {
				if let Some(router) = RouterRepository::get(conn, target_id).await? {
					if router.release == ReleaseStatus::Published {
						RouterRepository::set_release(conn, target_id, ReleaseStatus::ToBePublished)
							.await?;
					}
				}
			}
		}
		Ok(())
	}

	async fn require_config(conn: &mut SqliteConnection, res_id: &str) -> Result<PluginConfig> {
		PluginConfigRepository::get(conn, res_id)
			.await?
			.ok_or_else(|| GatewayError::with(ErrorCode::PluginConfigNull, "res_id", res_id))
	}

	async fn after_change(&self, config: &PluginConfig) -> Result<()> {
		if config.scope == PluginConfigScope::Global {
			self.engine.sync_global_plugin(config).await?;
		}
		Ok(())
	}

	#[tracing::instrument(skip(self, input), fields(plugin = %input.plugin_res_id))]
	pub async fn config_add(
		&self,
		scope: PluginConfigScope,
		target_id: &str,
		input: PluginConfigInput,
	) -> Result<String> {
		let target_id = target_of(scope, target_id);

		let mut tx = self.engine.pool().begin().await?;
		let plugin = PluginRepository::get(&mut tx, &input.plugin_res_id)
			.await?
			.ok_or_else(|| GatewayError::with(ErrorCode::PluginNull, "res_id", &input.plugin_res_id))?;
		check_plugin_config(&plugin.plugin_key, &input.config)?;
		Self::check_target(&mut tx, scope, &target_id).await?;
		if PluginConfigRepository::exists(&mut tx, scope, &target_id, &plugin.plugin_key).await? {
			return Err(GatewayError::with(
				ErrorCode::PluginConfigExist,
				"plugin",
				plugin.plugin_key,
			));
		}

		let now = Utc::now();
		let config = PluginConfig {
			res_id: ResIdGenerator::allocate(&mut tx, IdPrefix::PluginConfig).await?,
			name: input.name.trim().to_string(),
			scope,
			target_id: target_id.clone(),
			plugin_res_id: plugin.res_id,
			plugin_key: plugin.plugin_key,
			config: input.config,
			enable: input.enable,
			created_at: now,
			updated_at: now,
		};
		PluginConfigRepository::insert(&mut tx, &config).await?;
		Self::dirty_owner(&mut tx, scope, &target_id).await?;
		tx.commit().await?;

		self.after_change(&config).await?;
		tracing::info!(res_id = %config.res_id, scope = scope.as_str(), "plugin config added");
		Ok(config.res_id)
	}

	#[tracing::instrument(skip(self, input))]
	pub async fn config_update(&self, res_id: &str, input: PluginConfigUpdate) -> Result<()> {
		let mut tx = self.engine.pool().begin().await?;
		let current = Self::require_config(&mut tx, res_id).await?;
		check_plugin_config(&current.plugin_key, &input.config)?;
		PluginConfigRepository::update(&mut tx, res_id, input.name.trim(), &input.config, input.enable)
			.await?;
		Self::dirty_owner(&mut tx, current.scope, &current.target_id).await?;
		let updated = Self::require_config(&mut tx, res_id).await?;
		tx.commit().await?;

		self.after_change(&updated).await
	}

	#[tracing::instrument(skip(self))]
	pub async fn config_switch_enable(&self, res_id: &str, enable: Enable) -> Result<()> {
		let mut tx = self.engine.pool().begin().await?;
		let mut config = Self::require_config(&mut tx, res_id).await?;
		if config.enable == enable {
			return Err(GatewayError::new(ErrorCode::SwitchNoChange));
		}
		PluginConfigRepository::set_enable(&mut tx, res_id, enable).await?;
		Self::dirty_owner(&mut tx, config.scope, &config.target_id).await?;
		tx.commit().await?;

		config.enable = enable;
		self.after_change(&config).await
	}

	/// Delete a config. A global config's document goes at once; a scoped
	/// one stays live until its owner is released again.
	#[tracing::instrument(skip(self))]
	pub async fn config_delete(&self, res_id: &str) -> Result<()> {
		let mut tx = self.engine.pool().begin().await?;
		let mut config = Self::require_config(&mut tx, res_id).await?;
		PluginConfigRepository::delete(&mut tx, res_id).await?;
		Self::dirty_owner(&mut tx, config.scope, &config.target_id).await?;
		tx.commit().await?;

		config.enable = Enable::Off;
		self.after_change(&config).await
	}

	pub async fn config_list(
		&self,
		scope: PluginConfigScope,
		target_id: &str,
	) -> Result<Vec<PluginConfig>> {
		let mut conn = self.engine.pool().acquire().await?;
		Ok(PluginConfigRepository::list_for_target(&mut conn, scope, &target_of(scope, target_id)).await?)
	}

	pub async fn config_info(&self, res_id: &str) -> Result<PluginConfig> {
		let mut conn = self.engine.pool().acquire().await?;
		Self::require_config(&mut conn, res_id).await
	}

	/// Bring the `plugins` table in line with the built-in catalog.
	#[tracing::instrument(skip(self))]
	pub async fn reconcile_catalog(&self) -> Result<CatalogReport> {
		let mut report = CatalogReport::default();
		let mut tx = self.engine.pool().begin().await?;

		for entry in CATALOG {
			let wanted = |res_id: String| Plugin {
				res_id,
				plugin_key: entry.key.to_string(),
				icon: entry.icon.to_string(),
				plugin_type: entry.plugin_type,
				description: entry.description.to_string(),
			};
			match PluginRepository::get_by_key(&mut tx, entry.key).await? {
				None => {
					let res_id = ResIdGenerator::allocate(&mut tx, IdPrefix::Plugin).await?;
					PluginRepository::insert(&mut tx, &wanted(res_id)).await?;
					report.inserted += 1;
				}
				Some(existing) => {
					let plugin = wanted(existing.res_id.clone());
					if plugin != existing {
						PluginRepository::update_metadata(&mut tx, &plugin).await?;
						report.updated += 1;
					}
				}
			}
		}

		for plugin in PluginRepository::list(&mut tx).await? {
			if catalog::entry(&plugin.plugin_key).is_some() {
				continue;
			}
			if PluginRepository::is_referenced(&mut tx, &plugin.res_id).await? {
				tracing::warn!(plugin = %plugin.plugin_key, "unknown plugin still referenced, keeping");
				continue;
			}
			PluginRepository::delete(&mut tx, &plugin.res_id).await?;
			report.removed += 1;
		}
		tx.commit().await?;

		if report != CatalogReport::default() {
			tracing::info!(
				inserted = report.inserted,
				updated = report.updated,
				removed = report.removed,
				"plugin catalog reconciled"
			);
		}
		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::{ReleaseIntent, ReleaseKind};
	use crate::test_support::{harness, insert_plugin_config, insert_service};
	use apiok_server_db::{SnapshotStore, SnapshotType};
	use serde_json::json;

	async fn seeded() -> (crate::test_support::Harness, PluginManager) {
		let h = harness().await;
		let manager = PluginManager::new(h.engine.clone());
		manager.reconcile_catalog().await.unwrap();
		(h, manager)
	}

	async fn plugin_id(manager: &PluginManager, key: &str) -> String {
		manager
			.catalog()
			.await
			.unwrap()
			.into_iter()
			.find(|p| p.plugin_key == key)
			.unwrap()
			.res_id
	}

	fn config_input(plugin_res_id: &str, config: Value) -> PluginConfigInput {
		PluginConfigInput {
			plugin_res_id: plugin_res_id.to_string(),
			name: "cfg".to_string(),
			config,
			enable: Enable::On,
		}
	}

	#[tokio::test]
	async fn test_reconcile_is_idempotent_and_prunes_unreferenced() {
		let h = harness().await;
		let manager = PluginManager::new(h.engine.clone());
		let first = manager.reconcile_catalog().await.unwrap();
		assert_eq!(first.inserted, CATALOG.len());
		assert_eq!(manager.reconcile_catalog().await.unwrap(), CatalogReport::default());

		let mut conn = h.pool.acquire().await.unwrap();
		let stale = Plugin {
			res_id: "pl-stale".to_string(),
			plugin_key: "gzip".to_string(),
			icon: "icon-gzip".to_string(),
			plugin_type: PluginType::Other,
			description: "old".to_string(),
		};
		PluginRepository::insert(&mut conn, &stale).await.unwrap();
		let mut cors = PluginRepository::get_by_key(&mut conn, "cors").await.unwrap().unwrap();
		cors.description = "outdated".to_string();
		PluginRepository::update_metadata(&mut conn, &cors).await.unwrap();
		drop(conn);

		let report = manager.reconcile_catalog().await.unwrap();
		assert_eq!(
			report,
			CatalogReport {
				inserted: 0,
				updated: 1,
				removed: 1
			}
		);
	}

	#[tokio::test]
	async fn test_referenced_unknown_plugin_is_kept() {
		let (h, manager) = seeded().await;
		let mut conn = h.pool.acquire().await.unwrap();
		let stale = Plugin {
			res_id: "pl-gzip".to_string(),
			plugin_key: "gzip".to_string(),
			icon: "icon-gzip".to_string(),
			plugin_type: PluginType::Other,
			description: "old".to_string(),
		};
		PluginRepository::insert(&mut conn, &stale).await.unwrap();
		insert_plugin_config(&mut conn, "pc-1", PluginConfigScope::Global, "", "gzip", Enable::On).await;
		drop(conn);

		assert_eq!(manager.reconcile_catalog().await.unwrap().removed, 0);
	}

	#[tokio::test]
	async fn test_global_config_syncs_immediately() {
		let (h, manager) = seeded().await;
		let cors = plugin_id(&manager, "cors").await;

		let res_id = manager
			.config_add(PluginConfigScope::Global, "ignored", config_input(&cors, json!({"max_age": 5})))
			.await
			.unwrap();
		let doc = h.store.get(SnapshotType::Plugins, &res_id).await.unwrap().unwrap();
		assert_eq!(doc["key"], json!("cors"));
		assert_eq!(doc["scope"], json!("global"));
		assert_eq!(manager.config_info(&res_id).await.unwrap().target_id, "");

		manager.config_switch_enable(&res_id, Enable::Off).await.unwrap();
		assert!(h.store.get(SnapshotType::Plugins, &res_id).await.unwrap().is_none());

		manager.config_switch_enable(&res_id, Enable::On).await.unwrap();
		manager.config_delete(&res_id).await.unwrap();
		assert!(h.store.get(SnapshotType::Plugins, &res_id).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_service_config_dirties_owner() {
		let (h, manager) = seeded().await;
		let mut conn = h.pool.acquire().await.unwrap();
		insert_service(&mut conn, "sv-1", &["a.example.com"]).await;
		ServiceRepository::set_release(&mut conn, "sv-1", ReleaseStatus::Published)
			.await
			.unwrap();
		drop(conn);
		let limit = plugin_id(&manager, "limit-req").await;

		let res_id = manager
			.config_add(PluginConfigScope::Service, "sv-1", config_input(&limit, json!({"rate": 5})))
			.await
			.unwrap();
		assert!(h.store.get(SnapshotType::Plugins, &res_id).await.unwrap().is_none());

		let mut conn = h.pool.acquire().await.unwrap();
		let service = ServiceRepository::get(&mut conn, "sv-1").await.unwrap().unwrap();
		assert_eq!(service.release, ReleaseStatus::ToBePublished);
		drop(conn);

		let err = manager
			.config_add(PluginConfigScope::Service, "sv-1", config_input(&limit, json!({})))
			.await
			.unwrap_err();
		assert_eq!(err.code(), ErrorCode::PluginConfigExist);
	}

	#[tokio::test]
	async fn test_deleted_service_config_stays_live_until_owner_release() {
		let (h, manager) = seeded().await;
		let mut conn = h.pool.acquire().await.unwrap();
		insert_service(&mut conn, "sv-1", &["a.example.com"]).await;
		drop(conn);
		let limit = plugin_id(&manager, "limit-req").await;
		let res_id = manager
			.config_add(PluginConfigScope::Service, "sv-1", config_input(&limit, json!({"rate": 5})))
			.await
			.unwrap();
		let services = vec!["sv-1".to_string()];
		h.engine
			.release(ReleaseKind::Services, &services, ReleaseIntent::Push)
			.await
			.unwrap();
		assert!(h.store.get(SnapshotType::Plugins, &res_id).await.unwrap().is_some());

		manager.config_delete(&res_id).await.unwrap();
		let live = h.store.get(SnapshotType::Services, "sv-1").await.unwrap().unwrap();
		assert_eq!(live["plugins"], json!([{"name": res_id}]));
		assert!(h.store.get(SnapshotType::Plugins, &res_id).await.unwrap().is_some());
		let mut conn = h.pool.acquire().await.unwrap();
		let service = ServiceRepository::get(&mut conn, "sv-1").await.unwrap().unwrap();
		assert_eq!(service.release, ReleaseStatus::ToBePublished);
		drop(conn);

		h.engine
			.release(ReleaseKind::Services, &services, ReleaseIntent::Push)
			.await
			.unwrap();
		let live = h.store.get(SnapshotType::Services, "sv-1").await.unwrap().unwrap();
		assert_eq!(live["plugins"], json!([]));
		assert!(h.store.get(SnapshotType::Plugins, &res_id).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_config_validation() {
		let (_h, manager) = seeded().await;
		let cors = plugin_id(&manager, "cors").await;
		assert_eq!(
			manager
				.config_add(PluginConfigScope::Global, "", config_input(&cors, json!([1, 2])))
				.await
				.unwrap_err()
				.code(),
			ErrorCode::PluginConfigFormatError
		);
		assert_eq!(
			manager
				.config_add(PluginConfigScope::Router, "rt-missing", config_input(&cors, json!({})))
				.await
				.unwrap_err()
				.code(),
			ErrorCode::RouterNull
		);
		assert_eq!(
			manager
				.config_add(PluginConfigScope::Global, "", config_input("pl-missing", json!({})))
				.await
				.unwrap_err()
				.code(),
			ErrorCode::PluginNull
		);
	}

	#[tokio::test]
	async fn test_typed_plugin_configs_are_checked() {
		let (h, manager) = seeded().await;
		let waf = plugin_id(&manager, "waf").await;
		let bad_rule = json!({
			"ip_whitelist": {"enabled": false},
			"ip_blacklist": {"enabled": false},
			"rules": {"rule_list": [{"name": "r1", "conditions": []}]},
		});
		let err = manager
			.config_add(PluginConfigScope::Global, "", config_input(&waf, bad_rule))
			.await
			.unwrap_err();
		assert_eq!(err.code(), ErrorCode::PluginConfigFormatError);
		assert_eq!(err.args()[0], ("field", "config.rules.rule_list[0].conditions".to_string()));
		assert!(h.store.list(SnapshotType::Plugins).await.unwrap().is_empty());

		let kafka = plugin_id(&manager, "log-kafka").await;
		let res_id = manager
			.config_add(
				PluginConfigScope::Global,
				"",
				config_input(&kafka, json!({"brokers": ["kafka:9092"], "topic": "access"})),
			)
			.await
			.unwrap();
		let err = manager
			.config_update(
				&res_id,
				PluginConfigUpdate {
					name: "cfg".to_string(),
					config: json!({"brokers": ["kafka:9092"], "topic": ""}),
					enable: Enable::On,
				},
			)
			.await
			.unwrap_err();
		assert_eq!(err.args()[0], ("field", "config.topic".to_string()));
		assert_eq!(manager.config_info(&res_id).await.unwrap().config["topic"], json!("access"));
	}

	#[tokio::test]
	async fn test_info_returns_default_config() {
		let (_h, manager) = seeded().await;
		let cors = plugin_id(&manager, "cors").await;
		let info = manager.info(&cors).await.unwrap();
		assert_eq!(info.config["allow_origins"], json!("*"));
		assert_eq!(manager.type_list().len(), 5);
	}
}
