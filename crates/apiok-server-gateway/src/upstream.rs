// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Upstream admin operations.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;

use apiok_server_db::{
	Algorithm, Enable, HealthCheck, IdPrefix, IpType, NodeHealth, ResIdGenerator,
	RouterRepository, SqliteConnection, Upstream, UpstreamFields, UpstreamNode,
	UpstreamRepository,
};
use serde::{Deserialize, Serialize};

use crate::engine::{ensure_releasable, ReleaseEngine, ReleaseIntent, ReleaseKind};
use crate::error::{ErrorCode, GatewayError, Result};
use crate::service::default_enable;

fn default_timeout() -> i64 {
	5
}

fn default_weight() -> i64 {
	1
}

fn default_health() -> NodeHealth {
	NodeHealth::Healthy
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamInput {
	pub name: String,
	pub algorithm: Algorithm,
	#[serde(default = "default_timeout")]
	pub connect_timeout: i64,
	#[serde(default = "default_timeout")]
	pub write_timeout: i64,
	#[serde(default = "default_timeout")]
	pub read_timeout: i64,
	#[serde(default = "default_enable")]
	pub enable: Enable,
	#[serde(default)]
	pub check: HealthCheck,
	#[serde(default)]
	pub nodes: Vec<NodeInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeInput {
	pub node_ip: String,
	pub node_port: i64,
	#[serde(default = "default_weight")]
	pub node_weight: i64,
	#[serde(default = "default_health")]
	pub health: NodeHealth,
	#[serde(default)]
	pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamView {
	#[serde(flatten)]
	pub upstream: Upstream,
	pub nodes: Vec<UpstreamNode>,
}

/// Validate a node and resolve its IP family. The returned node has no ids.
pub fn validate_node(input: &NodeInput) -> Result<UpstreamNode> {
	let ip: IpAddr = input.node_ip.trim().parse().map_err(|_| {
		GatewayError::with(ErrorCode::UpstreamNodeError, "detail", format!("invalid ip {}", input.node_ip))
	})?;
	if !(1..=65535).contains(&input.node_port) {
		return Err(GatewayError::with(
			ErrorCode::UpstreamNodeError,
			"detail",
			format!("port {} out of range", input.node_port),
		));
	}
	if !(1..=100).contains(&input.node_weight) {
		return Err(GatewayError::with(
			ErrorCode::UpstreamNodeError,
			"detail",
			format!("weight {} out of range", input.node_weight),
		));
	}

	Ok(UpstreamNode {
		res_id: String::new(),
		upstream_res_id: String::new(),
		node_ip: ip.to_string(),
		ip_type: if ip.is_ipv4() { IpType::Ipv4 } else { IpType::Ipv6 },
		node_port: input.node_port,
		node_weight: input.node_weight,
		health: input.health,
		tags: input.tags.clone(),
	})
}

fn validate_nodes(inputs: &[NodeInput]) -> Result<Vec<UpstreamNode>> {
	let mut seen = HashSet::new();
	let mut nodes = Vec::with_capacity(inputs.len());
	for input in inputs {
		let node = validate_node(input)?;
		if !seen.insert(node.diff_key()) {
			return Err(GatewayError::with(
				ErrorCode::UpstreamNodeError,
				"detail",
				format!("duplicate node {}", node.diff_key()),
			));
		}
		nodes.push(node);
	}
	Ok(nodes)
}

/// Result of applying a node diff.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct NodeDiff {
	pub added: Vec<String>,
	pub updated: Vec<String>,
	pub removed: Vec<String>,
}

#[derive(Clone)]
pub struct UpstreamManager {
	engine: ReleaseEngine,
}

impl UpstreamManager {
	pub fn new(engine: ReleaseEngine) -> Self {
		Self { engine }
	}

	async fn require(conn: &mut SqliteConnection, res_id: &str) -> Result<Upstream> {
		UpstreamRepository::get(conn, res_id)
			.await?
			.ok_or_else(|| GatewayError::with(ErrorCode::UpstreamNull, "res_id", res_id))
	}

	async fn check_name(conn: &mut SqliteConnection, name: &str, exclude: Option<&str>) -> Result<()> {
		if let Some(existing) = UpstreamRepository::find_by_name(conn, name).await? {
			if Some(existing.res_id.as_str()) != exclude {
				return Err(GatewayError::with(ErrorCode::UpstreamNameExist, "name", name));
			}
		}
		Ok(())
	}

	fn fields(input: &UpstreamInput) -> Result<UpstreamFields> {
		let name = input.name.trim().to_string();
		if name.is_empty() {
			return Err(GatewayError::params("name must not be empty"));
		}
		Ok(UpstreamFields {
			name,
			algorithm: input.algorithm,
			connect_timeout: input.connect_timeout.max(1),
			write_timeout: input.write_timeout.max(1),
			read_timeout: input.read_timeout.max(1),
			enable: input.enable,
			check: input.check.clone(),
		})
	}

	async fn apply_nodes(
		conn: &mut SqliteConnection,
		upstream_res_id: &str,
		wanted: Vec<UpstreamNode>,
	) -> Result<NodeDiff> {
		let mut existing: HashMap<String, UpstreamNode> =
			UpstreamRepository::nodes(conn, upstream_res_id)
				.await?
				.into_iter()
				.map(|n| (n.diff_key(), n))
				.collect();

		let mut diff = NodeDiff::default();
		for mut node in wanted {
			node.upstream_res_id = upstream_res_id.to_string();
			match existing.remove(&node.diff_key()) {
				Some(current) => {
					node.res_id = current.res_id.clone();
					if node != current {
						UpstreamRepository::update_node(conn, &node).await?;
						diff.updated.push(node.res_id);
					}
				}
				None => {
					node.res_id = ResIdGenerator::allocate(conn, IdPrefix::UpstreamNode).await?;
					UpstreamRepository::insert_node(conn, &node).await?;
					diff.added.push(node.res_id);
				}
			}
		}

		for (_, stale) in existing {
			UpstreamRepository::delete_node(conn, &stale.res_id).await?;
			diff.removed.push(stale.res_id);
		}
		diff.removed.sort();
		Ok(diff)
	}

	#[tracing::instrument(skip(self, input), fields(name = %input.name))]
	pub async fn create(&self, input: UpstreamInput) -> Result<String> {
		let fields = Self::fields(&input)?;
		let nodes = validate_nodes(&input.nodes)?;

		let mut tx = self.engine.pool().begin().await?;
		Self::check_name(&mut tx, &fields.name, None).await?;
		let res_id = ResIdGenerator::allocate(&mut tx, IdPrefix::Upstream).await?;
		UpstreamRepository::insert(&mut tx, &res_id, &fields).await?;
		Self::apply_nodes(&mut tx, &res_id, nodes).await?;
		tx.commit().await?;

		tracing::info!(res_id = %res_id, "upstream created");
		Ok(res_id)
	}

	#[tracing::instrument(skip(self, input))]
	pub async fn update(&self, res_id: &str, input: UpstreamInput) -> Result<NodeDiff> {
		let fields = Self::fields(&input)?;
		let nodes = validate_nodes(&input.nodes)?;

		let mut tx = self.engine.pool().begin().await?;
		let upstream = Self::require(&mut tx, res_id).await?;
		Self::check_name(&mut tx, &fields.name, Some(res_id)).await?;
		UpstreamRepository::update(&mut tx, res_id, &fields, upstream.release.after_edit()).await?;
		let diff = Self::apply_nodes(&mut tx, res_id, nodes).await?;
		tx.commit().await?;

		tracing::info!(
			added = diff.added.len(),
			updated = diff.updated.len(),
			removed = diff.removed.len(),
			"upstream nodes applied"
		);
		Ok(diff)
	}

	#[tracing::instrument(skip(self))]
	pub async fn switch_enable(&self, res_id: &str, enable: Enable) -> Result<()> {
		let mut conn = self.engine.pool().acquire().await?;
		let upstream = Self::require(&mut conn, res_id).await?;
		if upstream.enable == enable {
			return Err(GatewayError::new(ErrorCode::SwitchNoChange));
		}
		UpstreamRepository::set_enable(&mut conn, res_id, enable, upstream.release.after_edit())
			.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn switch_release(&self, res_id: &str) -> Result<()> {
		let upstream = {
			let mut conn = self.engine.pool().acquire().await?;
			Self::require(&mut conn, res_id).await?
		};
		ensure_releasable(res_id, upstream.release)?;
		self.engine
			.release(ReleaseKind::Upstreams, &[res_id.to_string()], ReleaseIntent::Push)
			.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete(&self, res_id: &str) -> Result<()> {
		let mut tx = self.engine.pool().begin().await?;
		let upstream = Self::require(&mut tx, res_id).await?;
		let routers = RouterRepository::list_by_upstream(&mut tx, res_id).await?;
		if !routers.is_empty() {
			let ids: Vec<String> = routers.into_iter().map(|r| r.res_id).collect();
			return Err(GatewayError::listing(ErrorCode::UpstreamRouterExist, "routers", &ids));
		}

		let node_ids: Vec<String> = UpstreamRepository::nodes(&mut tx, res_id)
			.await?
			.into_iter()
			.map(|n| n.res_id)
			.collect();
		UpstreamRepository::delete(&mut tx, res_id).await?;
		tx.commit().await?;

		if upstream.release.has_live_document() {
			self.engine.retract_upstream(res_id, &node_ids).await?;
		}
		tracing::info!(res_id = %res_id, "upstream deleted");
		Ok(())
	}

	pub async fn info(&self, res_id: &str) -> Result<UpstreamView> {
		let mut conn = self.engine.pool().acquire().await?;
		let upstream = Self::require(&mut conn, res_id).await?;
		let nodes = UpstreamRepository::nodes(&mut conn, res_id).await?;
		Ok(UpstreamView { upstream, nodes })
	}

	pub async fn list(&self) -> Result<Vec<UpstreamView>> {
		let mut conn = self.engine.pool().acquire().await?;
		let upstreams = UpstreamRepository::list(&mut conn).await?;
		let mut views = Vec::with_capacity(upstreams.len());
		for upstream in upstreams {
			let nodes = UpstreamRepository::nodes(&mut conn, &upstream.res_id).await?;
			views.push(UpstreamView { upstream, nodes });
		}
		Ok(views)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{harness, insert_router, insert_service};
	use apiok_server_db::{ReleaseStatus, RouterFields, SnapshotStore, SnapshotType};
	use serde_json::json;

	fn node(ip: &str, port: i64, weight: i64) -> NodeInput {
		NodeInput {
			node_ip: ip.to_string(),
			node_port: port,
			node_weight: weight,
			health: NodeHealth::Healthy,
			tags: BTreeMap::new(),
		}
	}

	fn input(name: &str, nodes: Vec<NodeInput>) -> UpstreamInput {
		UpstreamInput {
			name: name.to_string(),
			algorithm: Algorithm::RoundRobin,
			connect_timeout: 5,
			write_timeout: 5,
			read_timeout: 5,
			enable: Enable::On,
			check: HealthCheck::default(),
			nodes,
		}
	}

	#[test]
	fn test_node_validation() {
		assert_eq!(validate_node(&node("::1", 80, 1)).unwrap().ip_type, IpType::Ipv6);
		assert_eq!(validate_node(&node("10.0.0.1", 80, 1)).unwrap().ip_type, IpType::Ipv4);
		for bad in [node("10.0.0", 80, 1), node("10.0.0.1", 0, 1), node("10.0.0.1", 80, 101)] {
			assert_eq!(validate_node(&bad).unwrap_err().code(), ErrorCode::UpstreamNodeError);
		}
		let err = validate_nodes(&[node("10.0.0.1", 80, 1), node("10.0.0.1", 80, 5)]).unwrap_err();
		assert_eq!(err.code(), ErrorCode::UpstreamNodeError);
	}

	#[tokio::test]
	async fn test_name_unique() {
		let h = harness().await;
		let manager = UpstreamManager::new(h.engine.clone());
		manager.create(input("backend", vec![])).await.unwrap();
		assert_eq!(
			manager.create(input("backend", vec![])).await.unwrap_err().code(),
			ErrorCode::UpstreamNameExist
		);
	}

	#[tokio::test]
	async fn test_removed_node_stays_live_until_release() {
		let h = harness().await;
		let manager = UpstreamManager::new(h.engine.clone());
		let res_id = manager
			.create(input("backend", vec![node("10.0.0.1", 80, 1), node("10.0.0.2", 80, 1)]))
			.await
			.unwrap();
		manager.switch_release(&res_id).await.unwrap();
		let before = manager.info(&res_id).await.unwrap();
		let kept = before.nodes.iter().find(|n| n.node_ip == "10.0.0.1").unwrap().res_id.clone();
		let dropped = before.nodes.iter().find(|n| n.node_ip == "10.0.0.2").unwrap().res_id.clone();
		assert!(h.store.get(SnapshotType::UpstreamNodes, &dropped).await.unwrap().is_some());

		let diff = manager
			.update(&res_id, input("backend", vec![node("10.0.0.1", 80, 7), node("10.0.0.3", 81, 1)]))
			.await
			.unwrap();
		assert_eq!(diff.updated, vec![kept.clone()]);
		assert_eq!(diff.removed, vec![dropped.clone()]);
		assert_eq!(diff.added.len(), 1);

		let after = manager.info(&res_id).await.unwrap();
		assert_eq!(after.upstream.release, ReleaseStatus::ToBePublished);
		let kept_node = after.nodes.iter().find(|n| n.res_id == kept).unwrap();
		assert_eq!(kept_node.node_weight, 7);

		// The live upstream document still names the dropped node.
		let live = h.store.get(SnapshotType::Upstreams, &res_id).await.unwrap().unwrap();
		assert!(live["nodes"].as_array().unwrap().contains(&json!({"name": dropped})));
		assert!(h.store.get(SnapshotType::UpstreamNodes, &dropped).await.unwrap().is_some());

		manager.switch_release(&res_id).await.unwrap();
		let live = h.store.get(SnapshotType::Upstreams, &res_id).await.unwrap().unwrap();
		let names: Vec<&str> = live["nodes"]
			.as_array()
			.unwrap()
			.iter()
			.map(|n| n["name"].as_str().unwrap())
			.collect();
		assert_eq!(names.len(), 2);
		assert!(!names.contains(&dropped.as_str()));
		for name in names {
			assert!(h.store.get(SnapshotType::UpstreamNodes, name).await.unwrap().is_some());
		}
		assert!(h.store.get(SnapshotType::UpstreamNodes, &dropped).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_delete_after_unreleased_edit_retracts_every_live_node() {
		let h = harness().await;
		let manager = UpstreamManager::new(h.engine.clone());
		let res_id = manager
			.create(input("backend", vec![node("10.0.0.1", 80, 1), node("10.0.0.2", 80, 1)]))
			.await
			.unwrap();
		manager.switch_release(&res_id).await.unwrap();
		let dropped = manager
			.info(&res_id)
			.await
			.unwrap()
			.nodes
			.into_iter()
			.find(|n| n.node_ip == "10.0.0.2")
			.unwrap()
			.res_id;

		manager
			.update(&res_id, input("backend", vec![node("10.0.0.1", 80, 1)]))
			.await
			.unwrap();
		manager.delete(&res_id).await.unwrap();

		assert!(h.store.get(SnapshotType::Upstreams, &res_id).await.unwrap().is_none());
		assert!(h.store.get(SnapshotType::UpstreamNodes, &dropped).await.unwrap().is_none());
		assert!(h.store.list(SnapshotType::UpstreamNodes).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_unchanged_node_is_not_rewritten() {
		let h = harness().await;
		let manager = UpstreamManager::new(h.engine.clone());
		let res_id = manager
			.create(input("backend", vec![node("10.0.0.1", 80, 1)]))
			.await
			.unwrap();
		let diff = manager
			.update(&res_id, input("backend", vec![node("10.0.0.1", 80, 1)]))
			.await
			.unwrap();
		assert_eq!(diff, NodeDiff::default());
	}

	#[tokio::test]
	async fn test_delete_refused_while_referenced() {
		let h = harness().await;
		let manager = UpstreamManager::new(h.engine.clone());
		let res_id = manager
			.create(input("backend", vec![node("10.0.0.1", 80, 1)]))
			.await
			.unwrap();
		manager.switch_release(&res_id).await.unwrap();

		let mut conn = h.pool.acquire().await.unwrap();
		insert_service(&mut conn, "sv-1", &["a.example.com"]).await;
		insert_router(&mut conn, "rt-1", "sv-1", "/api").await;
		let router = RouterRepository::get(&mut conn, "rt-1").await.unwrap().unwrap();
		let fields = RouterFields {
			service_res_id: router.service_res_id,
			upstream_res_id: Some(res_id.clone()),
			router_name: router.router_name,
			request_methods: router.request_methods,
			router_path: router.router_path,
			enable: router.enable,
			options: router.options,
		};
		RouterRepository::update(&mut conn, "rt-1", &fields, router.release).await.unwrap();
		drop(conn);

		let err = manager.delete(&res_id).await.unwrap_err();
		assert_eq!(err.code(), ErrorCode::UpstreamRouterExist);

		let mut conn = h.pool.acquire().await.unwrap();
		RouterRepository::delete(&mut conn, "rt-1").await.unwrap();
		drop(conn);
		manager.delete(&res_id).await.unwrap();
		assert!(h.store.get(SnapshotType::Upstreams, &res_id).await.unwrap().is_none());
		assert!(h.store.list(SnapshotType::UpstreamNodes).await.unwrap().is_empty());
	}
}
