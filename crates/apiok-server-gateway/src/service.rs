// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Service admin operations.

use apiok_server_db::{
	CertificateRepository, Enable, IdPrefix, PluginConfigRepository, PluginConfigScope, Protocol,
	ProxyOptions, ResIdGenerator, RouterRepository, Service, ServiceFields, ServiceRepository,
	SqliteConnection,
};
use serde::{Deserialize, Serialize};

use crate::engine::{ensure_releasable, ReleaseEngine, ReleaseIntent, ReleaseKind};
use crate::error::{ErrorCode, GatewayError, Result};

pub(crate) fn default_enable() -> Enable {
	Enable::On
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInput {
	pub name: String,
	pub protocol: Protocol,
	#[serde(default = "default_enable")]
	pub enable: Enable,
	pub domains: Vec<String>,
	#[serde(flatten)]
	pub options: ProxyOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceView {
	#[serde(flatten)]
	pub service: Service,
	pub domains: Vec<String>,
}

/// Trim, lowercase and dedupe domains, keeping first-seen order.
pub fn normalize_domains(domains: &[String]) -> Vec<String> {
	let mut out: Vec<String> = Vec::with_capacity(domains.len());
	for domain in domains {
		let domain = domain.trim().to_ascii_lowercase();
		if !domain.is_empty() && !out.contains(&domain) {
			out.push(domain);
		}
	}
	out
}

/// At least two non-empty labels; only the leftmost may be `*`.
pub fn is_valid_domain(domain: &str) -> bool {
	let labels: Vec<&str> = domain.split('.').collect();
	labels.len() >= 2
		&& labels.iter().enumerate().all(|(i, label)| {
			(i == 0 && *label == "*")
				|| (!label.is_empty()
					&& label
						.chars()
						.all(|c| c.is_ascii_alphanumeric() || c == '-'))
		})
}

#[derive(Clone)]
pub struct ServiceManager {
	engine: ReleaseEngine,
}

impl ServiceManager {
	pub fn new(engine: ReleaseEngine) -> Self {
		Self { engine }
	}

	async fn check_domains(
		conn: &mut SqliteConnection,
		protocol: Protocol,
		domains: &[String],
		exclude: Option<&str>,
	) -> Result<()> {
		if domains.is_empty() {
			return Err(GatewayError::params("domains must not be empty"));
		}
		let malformed: Vec<String> = domains
			.iter()
			.filter(|d| !is_valid_domain(d))
			.cloned()
			.collect();
		if !malformed.is_empty() {
			return Err(GatewayError::listing(
				ErrorCode::ServiceDomainFormatError,
				"domains",
				&malformed,
			));
		}

		let taken = ServiceRepository::domains_taken(conn, domains, exclude).await?;
		if !taken.is_empty() {
			return Err(GatewayError::listing(ErrorCode::ServiceDomainExist, "domains", &taken));
		}

		if protocol.needs_certificate() {
			let uncovered = CertificateRepository::uncovered(conn, domains).await?;
			if !uncovered.is_empty() {
				return Err(GatewayError::listing(
					ErrorCode::ServiceDomainSslNull,
					"domains",
					&uncovered,
				));
			}
		}
		Ok(())
	}

	async fn require(conn: &mut SqliteConnection, res_id: &str) -> Result<Service> {
		ServiceRepository::get(conn, res_id)
			.await?
			.ok_or_else(|| GatewayError::with(ErrorCode::ServiceNull, "res_id", res_id))
	}

	#[tracing::instrument(skip(self, input), fields(name = %input.name))]
	pub async fn create(&self, input: ServiceInput) -> Result<String> {
		let domains = normalize_domains(&input.domains);
		let fields = ServiceFields {
			name: input.name.trim().to_string(),
			protocol: input.protocol,
			enable: input.enable,
			options: input.options,
		};

		let mut tx = self.engine.pool().begin().await?;
		Self::check_domains(&mut tx, fields.protocol, &domains, None).await?;
		let res_id = ResIdGenerator::allocate(&mut tx, IdPrefix::Service).await?;
		ServiceRepository::insert(&mut tx, &res_id, &fields).await?;
		ServiceRepository::replace_domains(&mut tx, &res_id, &domains).await?;
		tx.commit().await?;

		tracing::info!(res_id = %res_id, "service created");
		Ok(res_id)
	}

	#[tracing::instrument(skip(self, input))]
	pub async fn update(&self, res_id: &str, input: ServiceInput) -> Result<()> {
		let domains = normalize_domains(&input.domains);
		let fields = ServiceFields {
			name: input.name.trim().to_string(),
			protocol: input.protocol,
			enable: input.enable,
			options: input.options,
		};

		let mut tx = self.engine.pool().begin().await?;
		let service = Self::require(&mut tx, res_id).await?;
		Self::check_domains(&mut tx, fields.protocol, &domains, Some(res_id)).await?;
		ServiceRepository::update(&mut tx, res_id, &fields, service.release.after_edit()).await?;
		ServiceRepository::replace_domains(&mut tx, res_id, &domains).await?;
		tx.commit().await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn update_name(&self, res_id: &str, name: &str) -> Result<()> {
		let mut conn = self.engine.pool().acquire().await?;
		let service = Self::require(&mut conn, res_id).await?;
		ServiceRepository::update_name(&mut conn, res_id, name.trim(), service.release.after_edit())
			.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn switch_enable(&self, res_id: &str, enable: Enable) -> Result<()> {
		let mut conn = self.engine.pool().acquire().await?;
		let service = Self::require(&mut conn, res_id).await?;
		if service.enable == enable {
			return Err(GatewayError::new(ErrorCode::SwitchNoChange));
		}
		ServiceRepository::set_enable(&mut conn, res_id, enable, service.release.after_edit())
			.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn switch_release(&self, res_id: &str) -> Result<()> {
		let service = {
			let mut conn = self.engine.pool().acquire().await?;
			Self::require(&mut conn, res_id).await?
		};
		ensure_releasable(res_id, service.release)?;
		self.engine
			.release(ReleaseKind::Services, &[res_id.to_string()], ReleaseIntent::Push)
			.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete(&self, res_id: &str) -> Result<()> {
		let mut tx = self.engine.pool().begin().await?;
		let service = Self::require(&mut tx, res_id).await?;
		if RouterRepository::count_by_service(&mut tx, res_id).await? > 0 {
			return Err(GatewayError::with(ErrorCode::ServiceBindingRouter, "res_id", res_id));
		}

		let plugin_ids: Vec<String> =
			PluginConfigRepository::list_for_target(&mut tx, PluginConfigScope::Service, res_id)
				.await?
				.into_iter()
				.map(|c| c.res_id)
				.collect();
		PluginConfigRepository::delete_for_target(&mut tx, PluginConfigScope::Service, res_id)
			.await?;
		ServiceRepository::delete(&mut tx, res_id).await?;
		tx.commit().await?;

		if service.release.has_live_document() {
			self.engine.retract_service(res_id, &plugin_ids).await?;
		}
		tracing::info!(res_id = %res_id, "service deleted");
		Ok(())
	}

	pub async fn info(&self, res_id: &str) -> Result<ServiceView> {
		let mut conn = self.engine.pool().acquire().await?;
		let service = Self::require(&mut conn, res_id).await?;
		let domains = ServiceRepository::domains(&mut conn, res_id).await?;
		Ok(ServiceView { service, domains })
	}

	pub async fn list(&self, search: Option<&str>) -> Result<Vec<ServiceView>> {
		let mut conn = self.engine.pool().acquire().await?;
		let services = ServiceRepository::list(&mut conn, search).await?;
		let mut views = Vec::with_capacity(services.len());
		for service in services {
			let domains = ServiceRepository::domains(&mut conn, &service.res_id).await?;
			views.push(ServiceView { service, domains });
		}
		Ok(views)
	}
}
