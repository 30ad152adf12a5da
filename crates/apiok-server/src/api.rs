// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application state and the route table.

use std::sync::Arc;

use apiok_server_acme::{AcmeDirectory, AcmeService, LetsEncryptDirectory};
use apiok_server_config::{AcmeConfig, ServerConfig};
use apiok_server_db::{PluginConfigScope, SnapshotRepository, SnapshotStore, SqlitePool};
use apiok_server_gateway::{
	CertificateManager, PluginManager, ReleaseEngine, RouterManager, ServiceManager,
	UpstreamManager, UserManager,
};
use apiok_server_jobs::JobScheduler;
use axum::{
	middleware::from_fn_with_state,
	routing::{delete, get, post, put},
	Extension, Router,
};

use crate::{api_response::localize_layer, auth_middleware::auth_layer, routes};

#[derive(Clone)]
pub struct AppState {
	pub pool: SqlitePool,
	pub snapshot_pool: SqlitePool,
	pub snapshot: Arc<dyn SnapshotStore>,
	pub engine: ReleaseEngine,
	pub services: ServiceManager,
	pub routers: RouterManager,
	pub upstreams: UpstreamManager,
	pub plugins: PluginManager,
	pub certificates: CertificateManager,
	pub users: UserManager,
	/// Present only when ACME issuance is configured.
	pub acme: Option<Arc<AcmeService>>,
	pub job_scheduler: Option<Arc<JobScheduler>>,
	pub default_locale: String,
}

impl AppState {
	/// Attach an ACME service issuing through `directory`.
	pub fn with_acme(mut self, directory: Arc<dyn AcmeDirectory>, config: &AcmeConfig) -> Self {
		self.acme = Some(Arc::new(AcmeService::new(
			self.pool.clone(),
			Arc::clone(&self.snapshot),
			directory,
			config,
		)));
		self
	}
}

/// Build the shared state. The ACME service is wired to Let's Encrypt when
/// the `acme` section is configured.
pub fn create_app_state(pool: SqlitePool, snapshot_pool: SqlitePool, config: &ServerConfig) -> AppState {
	let snapshot: Arc<dyn SnapshotStore> = Arc::new(SnapshotRepository::new(snapshot_pool.clone()));
	let engine = ReleaseEngine::new(pool.clone(), Arc::clone(&snapshot));

	let state = AppState {
		services: ServiceManager::new(engine.clone()),
		routers: RouterManager::new(engine.clone()),
		upstreams: UpstreamManager::new(engine.clone()),
		plugins: PluginManager::new(engine.clone()),
		certificates: CertificateManager::new(engine.clone()),
		users: UserManager::new(pool.clone(), config.auth.token_ttl_hours),
		engine,
		pool,
		snapshot_pool,
		snapshot,
		acme: None,
		job_scheduler: None,
		default_locale: config.logging.locale.clone(),
	};

	match &config.acme {
		Some(acme) => {
			tracing::info!(
				email = %acme.email,
				staging = acme.use_staging,
				cert_dir = %acme.cert_dir.display(),
				"ACME issuance enabled"
			);
			state.with_acme(Arc::new(LetsEncryptDirectory::new(acme)), acme)
		}
		None => state,
	}
}

fn user_routes() -> Router<AppState> {
	Router::new()
		.route("/logout", post(routes::user::logout))
		.route("/change-password", put(routes::user::change_password))
		.route("/list", get(routes::user::list))
		.route("/add", post(routes::user::add))
		.route("/delete/{res_id}", delete(routes::user::delete))
}

fn plugin_config_routes(scope: PluginConfigScope) -> Router<AppState> {
	Router::new()
		.route("/add", post(routes::plugin_config::add))
		.route("/list", get(routes::plugin_config::list))
		.route("/info/{res_id}", get(routes::plugin_config::info))
		.route("/update/{res_id}", put(routes::plugin_config::update))
		.route("/delete/{res_id}", delete(routes::plugin_config::delete))
		.route(
			"/switch/enable/{res_id}",
			put(routes::plugin_config::switch_enable),
		)
		.layer(Extension(scope))
}

fn service_routes() -> Router<AppState> {
	Router::new()
		.route("/add", post(routes::service::add))
		.route("/list", get(routes::service::list))
		.route("/info/{res_id}", get(routes::service::info))
		.route("/update/{res_id}", put(routes::service::update))
		.route("/update/name/{res_id}", put(routes::service::update_name))
		.route("/delete/{res_id}", delete(routes::service::delete))
		.route("/switch/enable/{res_id}", put(routes::service::switch_enable))
		.route("/switch/release/{res_id}", put(routes::service::switch_release))
		.nest("/plugin/config", plugin_config_routes(PluginConfigScope::Service))
}

fn router_routes() -> Router<AppState> {
	Router::new()
		.route("/add", post(routes::router::add))
		.route("/list", get(routes::router::list))
		.route("/info/{res_id}", get(routes::router::info))
		.route("/update/{res_id}", put(routes::router::update))
		.route("/update/name/{res_id}", put(routes::router::update_name))
		.route("/delete/{res_id}", delete(routes::router::delete))
		.route("/switch/enable/{res_id}", put(routes::router::switch_enable))
		.route("/switch/release/{res_id}", put(routes::router::switch_release))
		.route("/copy/{res_id}", post(routes::router::copy))
		.nest("/plugin/config", plugin_config_routes(PluginConfigScope::Router))
}

fn upstream_routes() -> Router<AppState> {
	Router::new()
		.route("/add", post(routes::upstream::add))
		.route("/list", get(routes::upstream::list))
		.route("/info/{res_id}", get(routes::upstream::info))
		.route("/update/{res_id}", put(routes::upstream::update))
		.route("/delete/{res_id}", delete(routes::upstream::delete))
		.route("/switch/enable/{res_id}", put(routes::upstream::switch_enable))
		.route("/switch/release/{res_id}", put(routes::upstream::switch_release))
}

fn certificate_routes() -> Router<AppState> {
	Router::new()
		.route("/list", get(routes::certificate::list))
		.route("/add", post(routes::certificate::add))
		.route("/info/{res_id}", get(routes::certificate::info))
		.route("/update/{res_id}", put(routes::certificate::update))
		.route("/delete/{res_id}", delete(routes::certificate::delete))
		.route(
			"/switch/enable/{res_id}",
			put(routes::certificate::switch_enable),
		)
}

fn admin_routes(state: AppState) -> Router<AppState> {
	Router::new()
		.nest("/admin/user", user_routes())
		.nest("/admin/service", service_routes())
		.nest("/admin/router", router_routes())
		.nest("/admin/upstream", upstream_routes())
		.route("/admin/plugin/type-list", get(routes::plugin::type_list))
		.route("/admin/plugin/add-list", get(routes::plugin::add_list))
		.route("/admin/plugin/info/{res_id}", get(routes::plugin::info))
		.nest(
			"/admin/global/plugin/config",
			plugin_config_routes(PluginConfigScope::Global),
		)
		.nest("/admin/certificate", certificate_routes())
		.route("/admin/letsencrypt/request", post(routes::acme::request))
		.route("/admin/release", post(routes::release::release))
		.route_layer(from_fn_with_state(state, auth_layer))
}

/// Create the API router with all routes.
pub fn create_router(state: AppState) -> Router {
	// Public routes - no authentication required
	let public = Router::new()
		.route(
			"/.well-known/acme-challenge/{token}",
			get(routes::acme::challenge),
		)
		.route("/health", get(routes::health::health_check))
		.route("/admin/user/login", post(routes::user::login));

	Router::new()
		.merge(public)
		.merge(admin_routes(state.clone()))
		.layer(from_fn_with_state(state.clone(), localize_layer))
		.with_state(state)
}
