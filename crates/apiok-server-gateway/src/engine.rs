// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Release/sync engine.
//!
//! The engine is the only writer of `services`, `routers`, `upstreams`,
//! `upstream_nodes` and scoped `plugins` documents. A push batch is
//! all-or-nothing across both stores: status flips run in one control-plane
//! transaction and every snapshot write goes through a [`SnapshotJournal`]
//! that is rolled back if anything in the batch fails.

use std::str::FromStr;
use std::sync::Arc;

use apiok_server_db::{
	PluginConfig, PluginConfigRepository, PluginConfigScope, ReleaseStatus, RouterRepository,
	ServiceRepository, SnapshotStore, SnapshotType, SqliteConnection, SqlitePool,
	UpstreamRepository,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{
	to_value, PluginDocument, RouterDocument, ServiceDocument, UpstreamDocument,
	UpstreamNodeDocument,
};
use crate::error::{ErrorCode, GatewayError, Result};
use crate::journal::SnapshotJournal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseIntent {
	Push,
	Delete,
}

impl FromStr for ReleaseIntent {
	type Err = GatewayError;

	fn from_str(s: &str) -> Result<Self> {
		match s.trim().to_ascii_lowercase().as_str() {
			"push" => Ok(ReleaseIntent::Push),
			"delete" => Ok(ReleaseIntent::Delete),
			_ => Err(GatewayError::with(ErrorCode::ReleaseTypeError, "detail", s)),
		}
	}
}

/// Publishable resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseKind {
	#[serde(alias = "service")]
	Services,
	#[serde(alias = "router")]
	Routers,
	#[serde(alias = "upstream")]
	Upstreams,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReport {
	/// Resources whose documents were written (push) or retracted (delete).
	pub released: Vec<String>,
	/// Resources left untouched: missing, unpublished parent, or nothing live.
	pub skipped: Vec<String>,
}

/// Reject a push of an entity that is already live and unchanged.
pub fn ensure_releasable(res_id: &str, status: ReleaseStatus) -> Result<()> {
	if status == ReleaseStatus::Published {
		return Err(GatewayError::with(ErrorCode::SwitchPublished, "res_ids", res_id));
	}
	Ok(())
}

/// `name` of every entry in a reference list (`plugins`, `nodes`) of a document.
fn reference_names(doc: Option<&Value>, field: &str) -> Vec<String> {
	doc.and_then(|d| d.get(field))
		.and_then(Value::as_array)
		.map(|items| {
			items
				.iter()
				.filter_map(|item| item.get("name").and_then(Value::as_str))
				.map(str::to_string)
				.collect()
		})
		.unwrap_or_default()
}

#[derive(Clone)]
pub struct ReleaseEngine {
	pool: SqlitePool,
	snapshot: Arc<dyn SnapshotStore>,
}

impl ReleaseEngine {
	pub fn new(pool: SqlitePool, snapshot: Arc<dyn SnapshotStore>) -> Self {
		Self { pool, snapshot }
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	pub fn snapshot(&self) -> &dyn SnapshotStore {
		self.snapshot.as_ref()
	}

	#[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
	pub async fn release(
		&self,
		kind: ReleaseKind,
		ids: &[String],
		intent: ReleaseIntent,
	) -> Result<ReleaseReport> {
		let report = match intent {
			ReleaseIntent::Push => self.push(kind, ids).await?,
			ReleaseIntent::Delete => self.unpublish(kind, ids).await?,
		};
		tracing::info!(
			released = report.released.len(),
			skipped = report.skipped.len(),
			"release finished"
		);
		Ok(report)
	}

	/// Apply the no-op guard to a whole batch before a push. Every id that is
	/// already Published is named in the error.
	#[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
	pub async fn ensure_batch_releasable(&self, kind: ReleaseKind, ids: &[String]) -> Result<()> {
		let mut conn = self.pool.acquire().await?;
		let mut published = Vec::new();
		for id in ids {
			let status = match kind {
				ReleaseKind::Services => ServiceRepository::get(&mut conn, id).await?.map(|s| s.release),
				ReleaseKind::Routers => RouterRepository::get(&mut conn, id).await?.map(|r| r.release),
				ReleaseKind::Upstreams => UpstreamRepository::get(&mut conn, id).await?.map(|u| u.release),
			};
			if status == Some(ReleaseStatus::Published) {
				published.push(id.clone());
			}
		}
		if !published.is_empty() {
			return Err(GatewayError::listing(ErrorCode::SwitchPublished, "res_ids", &published));
		}
		Ok(())
	}

	async fn push(&self, kind: ReleaseKind, ids: &[String]) -> Result<ReleaseReport> {
		let mut tx = self.pool.begin().await?;
		let mut journal = SnapshotJournal::new(self.snapshot.as_ref());

		let outcome = match self.push_batch(&mut tx, &mut journal, kind, ids).await {
			Ok(report) => tx.commit().await.map(|_| report).map_err(GatewayError::from),
			Err(e) => {
				drop(tx);
				Err(e)
			}
		};

		if let Err(e) = &outcome {
			tracing::warn!(error = %e, touched = journal.touched(), "release batch failed, restoring snapshot");
			if let Err(restore) = journal.rollback().await {
				tracing::error!(error = %restore, fatal_inconsistency = true, "snapshot restore failed");
			}
		}
		outcome
	}

	async fn push_batch(
		&self,
		conn: &mut SqliteConnection,
		journal: &mut SnapshotJournal<'_>,
		kind: ReleaseKind,
		ids: &[String],
	) -> Result<ReleaseReport> {
		let mut report = ReleaseReport::default();
		for id in ids {
			let released = match kind {
				ReleaseKind::Services => push_service(conn, journal, id).await?,
				ReleaseKind::Routers => push_router(conn, journal, id).await?,
				ReleaseKind::Upstreams => push_upstream(conn, journal, id).await?,
			};
			if released {
				report.released.push(id.clone());
			} else {
				report.skipped.push(id.clone());
			}
		}
		Ok(report)
	}

	/// Retract the live documents of existing rows and mark them unpublished.
	async fn unpublish(&self, kind: ReleaseKind, ids: &[String]) -> Result<ReleaseReport> {
		let mut report = ReleaseReport::default();
		let mut conn = self.pool.acquire().await?;

		for id in ids {
			let live = match kind {
				ReleaseKind::Services => ServiceRepository::get(&mut conn, id)
					.await?
					.map(|s| s.release.has_live_document()),
				ReleaseKind::Routers => RouterRepository::get(&mut conn, id)
					.await?
					.map(|r| r.release.has_live_document()),
				ReleaseKind::Upstreams => UpstreamRepository::get(&mut conn, id)
					.await?
					.map(|u| u.release.has_live_document()),
			};
			if live != Some(true) {
				report.skipped.push(id.clone());
				continue;
			}

			match kind {
				ReleaseKind::Services => {
					let plugins = plugin_ids(&mut conn, PluginConfigScope::Service, id).await?;
					self.retract_service(id, &plugins).await?;
					ServiceRepository::set_release(&mut conn, id, ReleaseStatus::Unpublished).await?;
				}
				ReleaseKind::Routers => {
					let plugins = plugin_ids(&mut conn, PluginConfigScope::Router, id).await?;
					self.retract_router(id, &plugins).await?;
					RouterRepository::set_release(&mut conn, id, ReleaseStatus::Unpublished).await?;
				}
				ReleaseKind::Upstreams => {
					let nodes: Vec<String> = UpstreamRepository::nodes(&mut conn, id)
						.await?
						.into_iter()
						.map(|n| n.res_id)
						.collect();
					self.retract_upstream(id, &nodes).await?;
					UpstreamRepository::set_release(&mut conn, id, ReleaseStatus::Unpublished).await?;
				}
			}
			report.released.push(id.clone());
		}
		Ok(report)
	}

	/// Current rows plus whatever the live owner document still references.
	async fn with_live_references(
		&self,
		kind: SnapshotType,
		res_id: &str,
		field: &str,
		ids: &[String],
	) -> Result<Vec<String>> {
		let live = self.snapshot.get(kind, res_id).await?;
		let mut all = ids.to_vec();
		for name in reference_names(live.as_ref(), field) {
			if !all.contains(&name) {
				all.push(name);
			}
		}
		Ok(all)
	}

	/// Delete a service document and its plugin documents. Missing keys are ignored.
	#[tracing::instrument(skip(self, plugin_ids))]
	pub async fn retract_service(&self, res_id: &str, plugin_ids: &[String]) -> Result<()> {
		let plugins = self
			.with_live_references(SnapshotType::Services, res_id, "plugins", plugin_ids)
			.await?;
		self.snapshot.delete(SnapshotType::Services, res_id).await?;
		self.retract_plugins(&plugins).await
	}

	#[tracing::instrument(skip(self, plugin_ids))]
	pub async fn retract_router(&self, res_id: &str, plugin_ids: &[String]) -> Result<()> {
		let plugins = self
			.with_live_references(SnapshotType::Routers, res_id, "plugins", plugin_ids)
			.await?;
		self.snapshot.delete(SnapshotType::Routers, res_id).await?;
		self.retract_plugins(&plugins).await
	}

	#[tracing::instrument(skip(self, node_ids))]
	pub async fn retract_upstream(&self, res_id: &str, node_ids: &[String]) -> Result<()> {
		let nodes = self
			.with_live_references(SnapshotType::Upstreams, res_id, "nodes", node_ids)
			.await?;
		self.retract_nodes(&nodes).await?;
		self.snapshot.delete(SnapshotType::Upstreams, res_id).await?;
		Ok(())
	}

	async fn retract_nodes(&self, node_ids: &[String]) -> Result<()> {
		for id in node_ids {
			self.snapshot.delete(SnapshotType::UpstreamNodes, id).await?;
		}
		Ok(())
	}

	async fn retract_plugins(&self, plugin_ids: &[String]) -> Result<()> {
		for id in plugin_ids {
			self.snapshot.delete(SnapshotType::Plugins, id).await?;
		}
		Ok(())
	}

	/// Write or retract a global plugin config's document right away.
	#[tracing::instrument(skip(self, config), fields(res_id = %config.res_id))]
	pub async fn sync_global_plugin(&self, config: &PluginConfig) -> Result<()> {
		if config.enable.is_on() {
			let doc = to_value(&PluginDocument::build(config))?;
			self.snapshot
				.upsert(SnapshotType::Plugins, &config.res_id, &doc)
				.await?;
		} else {
			self.snapshot
				.delete(SnapshotType::Plugins, &config.res_id)
				.await?;
		}
		Ok(())
	}
}

async fn plugin_ids(
	conn: &mut SqliteConnection,
	scope: PluginConfigScope,
	target: &str,
) -> Result<Vec<String>> {
	Ok(PluginConfigRepository::list_for_target(conn, scope, target)
		.await?
		.into_iter()
		.map(|c| c.res_id)
		.collect())
}

/// Upsert enabled plugin documents of an owner and delete disabled ones.
/// Plugins the owner's live document still names but which no longer exist
/// are deleted too.
async fn sync_plugins(
	conn: &mut SqliteConnection,
	journal: &mut SnapshotJournal<'_>,
	owner: SnapshotType,
	scope: PluginConfigScope,
	target: &str,
) -> Result<Vec<PluginConfig>> {
	let configs = PluginConfigRepository::list_for_target(conn, scope, target).await?;
	let live = journal.get(owner, target).await?;
	for stale in reference_names(live.as_ref(), "plugins") {
		if !configs.iter().any(|c| c.res_id == stale) {
			journal.delete(SnapshotType::Plugins, &stale).await?;
		}
	}
	for config in &configs {
		if config.enable.is_on() {
			let doc = to_value(&PluginDocument::build(config))?;
			journal
				.upsert(SnapshotType::Plugins, &config.res_id, &doc)
				.await?;
		} else {
			journal.delete(SnapshotType::Plugins, &config.res_id).await?;
		}
	}
	Ok(configs)
}

async fn push_service(
	conn: &mut SqliteConnection,
	journal: &mut SnapshotJournal<'_>,
	res_id: &str,
) -> Result<bool> {
	let Some(service) = ServiceRepository::get(conn, res_id).await? else {
		return Ok(false);
	};

	let plugins =
		sync_plugins(conn, journal, SnapshotType::Services, PluginConfigScope::Service, res_id).await?;
	let domains = ServiceRepository::domains(conn, res_id).await?;
	let doc = to_value(&ServiceDocument::build(&service, &domains, &plugins)?)?;

	ServiceRepository::set_release(conn, res_id, ReleaseStatus::Published).await?;
	journal.upsert(SnapshotType::Services, res_id, &doc).await?;
	Ok(true)
}

async fn push_router(
	conn: &mut SqliteConnection,
	journal: &mut SnapshotJournal<'_>,
	res_id: &str,
) -> Result<bool> {
	let Some(router) = RouterRepository::get(conn, res_id).await? else {
		return Ok(false);
	};

	let parent_live = ServiceRepository::get(conn, &router.service_res_id)
		.await?
		.is_some_and(|s| s.release.has_live_document());
	if !parent_live {
		tracing::debug!(router = %res_id, service = %router.service_res_id, "service unpublished, skipping router");
		return Ok(false);
	}

	let plugins =
		sync_plugins(conn, journal, SnapshotType::Routers, PluginConfigScope::Router, res_id).await?;
	let doc = to_value(&RouterDocument::build(&router, &plugins)?)?;

	RouterRepository::set_release(conn, res_id, ReleaseStatus::Published).await?;
	journal.upsert(SnapshotType::Routers, res_id, &doc).await?;
	Ok(true)
}

async fn push_upstream(
	conn: &mut SqliteConnection,
	journal: &mut SnapshotJournal<'_>,
	res_id: &str,
) -> Result<bool> {
	let Some(upstream) = UpstreamRepository::get(conn, res_id).await? else {
		return Ok(false);
	};

	let nodes = UpstreamRepository::nodes(conn, res_id).await?;
	let doc = to_value(&UpstreamDocument::build(&upstream, &nodes))?;

	let live = journal.get(SnapshotType::Upstreams, res_id).await?;
	for stale in reference_names(live.as_ref(), "nodes") {
		if !nodes.iter().any(|n| n.res_id == stale) {
			journal.delete(SnapshotType::UpstreamNodes, &stale).await?;
		}
	}

	UpstreamRepository::set_release(conn, res_id, ReleaseStatus::Published).await?;
	journal.upsert(SnapshotType::Upstreams, res_id, &doc).await?;
	for node in &nodes {
		let node_doc = to_value(&UpstreamNodeDocument::build(node, &upstream))?;
		journal
			.upsert(SnapshotType::UpstreamNodes, &node.res_id, &node_doc)
			.await?;
	}
	Ok(true)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{harness, insert_router, insert_service, insert_upstream_with_node};
	use apiok_server_db::{Enable, PluginConfigRepository};

	#[test]
	fn test_intent_parsing() {
		assert_eq!("PUSH".parse::<ReleaseIntent>().unwrap(), ReleaseIntent::Push);
		assert_eq!(" delete ".parse::<ReleaseIntent>().unwrap(), ReleaseIntent::Delete);
		let err = "publish".parse::<ReleaseIntent>().unwrap_err();
		assert_eq!(err.code(), ErrorCode::ReleaseTypeError);
	}

	#[test]
	fn test_guard_rejects_published() {
		assert!(ensure_releasable("sv-1", ReleaseStatus::ToBePublished).is_ok());
		let err = ensure_releasable("sv-1", ReleaseStatus::Published).unwrap_err();
		assert_eq!(err.code(), ErrorCode::SwitchPublished);
		assert_eq!(err.args(), &[("res_ids", "sv-1".to_string())]);
	}

	#[tokio::test]
	async fn test_router_with_unpublished_service_is_skipped() {
		let h = harness().await;
		let mut conn = h.pool.acquire().await.unwrap();
		insert_service(&mut conn, "sv-1", &[]).await;
		insert_router(&mut conn, "rt-1", "sv-1", "/api").await;
		drop(conn);

		let report = h
			.engine
			.release(ReleaseKind::Routers, &["rt-1".to_string()], ReleaseIntent::Push)
			.await
			.unwrap();
		assert!(report.released.is_empty());
		assert_eq!(report.skipped, vec!["rt-1".to_string()]);
		assert!(h
			.store
			.get(SnapshotType::Routers, "rt-1")
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn test_push_writes_plugins_before_owner() {
		let h = harness().await;
		let mut conn = h.pool.acquire().await.unwrap();
		insert_service(&mut conn, "sv-1", &["shop.example.com"]).await;
		crate::test_support::insert_plugin_config(&mut conn, "pc-on", PluginConfigScope::Service, "sv-1", "cors", Enable::On).await;
		crate::test_support::insert_plugin_config(&mut conn, "pc-off", PluginConfigScope::Service, "sv-1", "mock", Enable::Off).await;
		drop(conn);

		h.engine
			.release(ReleaseKind::Services, &["sv-1".to_string()], ReleaseIntent::Push)
			.await
			.unwrap();

		let doc = h.store.get(SnapshotType::Services, "sv-1").await.unwrap().unwrap();
		assert_eq!(doc["plugins"], serde_json::json!([{"name": "pc-on"}]));
		assert_eq!(doc["hosts"], serde_json::json!(["shop.example.com"]));
		assert!(h.store.get(SnapshotType::Plugins, "pc-on").await.unwrap().is_some());
		assert!(h.store.get(SnapshotType::Plugins, "pc-off").await.unwrap().is_none());

		let mut conn = h.pool.acquire().await.unwrap();
		let service = ServiceRepository::get(&mut conn, "sv-1").await.unwrap().unwrap();
		assert_eq!(service.release, ReleaseStatus::Published);
	}

	#[tokio::test]
	async fn test_failed_batch_is_all_or_nothing() {
		let h = harness().await;
		let mut conn = h.pool.acquire().await.unwrap();
		insert_service(&mut conn, "sv-1", &[]).await;
		insert_service(&mut conn, "sv-2", &[]).await;
		drop(conn);
		h.store.fail_upserts_for(SnapshotType::Services, "sv-2");

		let err = h
			.engine
			.release(
				ReleaseKind::Services,
				&["sv-1".to_string(), "sv-2".to_string()],
				ReleaseIntent::Push,
			)
			.await
			.unwrap_err();
		assert_eq!(err.code(), ErrorCode::InternalError);

		assert!(h.store.get(SnapshotType::Services, "sv-1").await.unwrap().is_none());
		let mut conn = h.pool.acquire().await.unwrap();
		for id in ["sv-1", "sv-2"] {
			let service = ServiceRepository::get(&mut conn, id).await.unwrap().unwrap();
			assert_eq!(service.release, ReleaseStatus::Unpublished);
		}
	}

	#[tokio::test]
	async fn test_upstream_push_and_delete() {
		let h = harness().await;
		let mut conn = h.pool.acquire().await.unwrap();
		insert_upstream_with_node(&mut conn, "up-1", "un-1").await;
		drop(conn);

		let ids = ["up-1".to_string()];
		h.engine
			.release(ReleaseKind::Upstreams, &ids, ReleaseIntent::Push)
			.await
			.unwrap();
		assert!(h.store.get(SnapshotType::UpstreamNodes, "un-1").await.unwrap().is_some());

		let report = h
			.engine
			.release(ReleaseKind::Upstreams, &ids, ReleaseIntent::Delete)
			.await
			.unwrap();
		assert_eq!(report.released, ids.to_vec());
		assert!(h.store.get(SnapshotType::Upstreams, "up-1").await.unwrap().is_none());
		assert!(h.store.get(SnapshotType::UpstreamNodes, "un-1").await.unwrap().is_none());

		let mut conn = h.pool.acquire().await.unwrap();
		let upstream = UpstreamRepository::get(&mut conn, "up-1").await.unwrap().unwrap();
		assert_eq!(upstream.release, ReleaseStatus::Unpublished);
	}

	#[tokio::test]
	async fn test_stale_node_removed_on_push_and_restored_on_failure() {
		let h = harness().await;
		let mut conn = h.pool.acquire().await.unwrap();
		insert_upstream_with_node(&mut conn, "up-1", "un-1").await;
		drop(conn);
		let ids = ["up-1".to_string()];
		h.engine
			.release(ReleaseKind::Upstreams, &ids, ReleaseIntent::Push)
			.await
			.unwrap();

		let mut conn = h.pool.acquire().await.unwrap();
		UpstreamRepository::delete_node(&mut conn, "un-1").await.unwrap();
		drop(conn);

		h.store.fail_upserts_for(SnapshotType::Upstreams, "up-1");
		h.engine
			.release(ReleaseKind::Upstreams, &ids, ReleaseIntent::Push)
			.await
			.unwrap_err();
		assert!(h.store.get(SnapshotType::UpstreamNodes, "un-1").await.unwrap().is_some());

		h.store.heal();
		h.engine
			.release(ReleaseKind::Upstreams, &ids, ReleaseIntent::Push)
			.await
			.unwrap();
		assert!(h.store.get(SnapshotType::UpstreamNodes, "un-1").await.unwrap().is_none());
		let doc = h.store.get(SnapshotType::Upstreams, "up-1").await.unwrap().unwrap();
		assert_eq!(doc["nodes"], serde_json::json!([]));
	}

	#[tokio::test]
	async fn test_batch_guard_names_published_ids() {
		let h = harness().await;
		let mut conn = h.pool.acquire().await.unwrap();
		insert_service(&mut conn, "sv-1", &[]).await;
		insert_service(&mut conn, "sv-2", &[]).await;
		insert_service(&mut conn, "sv-3", &[]).await;
		drop(conn);
		let all = ["sv-1".to_string(), "sv-2".to_string(), "sv-3".to_string()];
		h.engine.ensure_batch_releasable(ReleaseKind::Services, &all).await.unwrap();

		h.engine
			.release(ReleaseKind::Services, &all[..2], ReleaseIntent::Push)
			.await
			.unwrap();
		let err = h
			.engine
			.ensure_batch_releasable(ReleaseKind::Services, &all)
			.await
			.unwrap_err();
		assert_eq!(err.code(), ErrorCode::SwitchPublished);
		assert_eq!(err.args(), &[("res_ids", "sv-1,sv-2".to_string())]);
		h.engine
			.ensure_batch_releasable(ReleaseKind::Services, &all[2..])
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn test_document_is_stable_across_pushes() {
		let h = harness().await;
		let mut conn = h.pool.acquire().await.unwrap();
		insert_service(&mut conn, "sv-1", &["a.example.com"]).await;
		drop(conn);

		let ids = ["sv-1".to_string()];
		h.engine.release(ReleaseKind::Services, &ids, ReleaseIntent::Push).await.unwrap();
		let first = h.store.get(SnapshotType::Services, "sv-1").await.unwrap();
		h.engine.release(ReleaseKind::Services, &ids, ReleaseIntent::Push).await.unwrap();
		let second = h.store.get(SnapshotType::Services, "sv-1").await.unwrap();
		assert_eq!(first, second);

		let mut conn = h.pool.acquire().await.unwrap();
		assert!(PluginConfigRepository::list_for_target(&mut conn, PluginConfigScope::Service, "sv-1")
			.await
			.unwrap()
			.is_empty());
	}
}
