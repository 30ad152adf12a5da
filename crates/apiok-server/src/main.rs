// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! apiok admin server binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use apiok_server::{
	create_app_state, create_router,
	jobs::{AcmeChallengeCleanupJob, AcmeRenewalJob, JobHistoryCleanupJob, PluginReconcileJob},
};
use apiok_server_db::{
	create_pool, run_migrations, run_snapshot_migrations, JobRepository, JobStore,
};
use apiok_server_jobs::{JobScheduler, Schedule};
use clap::{Parser, Subcommand};
use tower_http::{
	cors::{Any, CorsLayer},
	trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod version;

/// apiok-server - admin API for the apiok gateway.
#[derive(Parser, Debug)]
#[command(name = "apiok-server", about = "apiok gateway control plane", version)]
struct Args {
	/// Config file path (overrides APIOK_SERVER_CONFIG)
	#[arg(long, env = "APIOK_SERVER_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => apiok_server_config::load_config_with_file(path.clone())?,
		None => apiok_server_config::load_config()?,
	};

	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| config.logging.level.clone().into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		snapshot = %config.snapshot.url,
		"starting apiok-server"
	);

	let pool = create_pool(&config.database.url).await?;
	run_migrations(&pool).await?;
	let snapshot_pool = create_pool(&config.snapshot.url).await?;
	run_snapshot_migrations(&snapshot_pool).await?;

	let mut state = create_app_state(pool.clone(), snapshot_pool, &config);

	if let Some(admin) = &config.auth.bootstrap_admin {
		if let Err(e) = state
			.users
			.ensure_bootstrap_admin(&admin.email, &admin.password)
			.await
		{
			tracing::error!(error = %e, "failed to create bootstrap admin");
		}
	}

	let job_repo = Arc::new(JobRepository::new(pool.clone()));
	let job_store: Arc<dyn JobStore> = job_repo.clone();
	let mut scheduler = JobScheduler::new(job_store);

	// Plugin catalog reconcile, first pass at startup
	scheduler.register(
		Arc::new(PluginReconcileJob::new(state.plugins.clone())),
		Schedule::every(Duration::from_secs(
			config.jobs.plugin_reconcile_interval_secs,
		))
		.with_initial_delay(Duration::ZERO),
	);

	if let (Some(acme), Some(acme_config)) = (&state.acme, &config.acme) {
		scheduler.register(
			Arc::new(AcmeRenewalJob::new(Arc::clone(acme))),
			Schedule::every(acme_config.renew_interval)
				.with_initial_delay(acme_config.renew_initial_delay),
		);
		scheduler.register(
			Arc::new(AcmeChallengeCleanupJob::new(Arc::clone(acme))),
			Schedule::every(Duration::from_secs(
				config.jobs.challenge_cleanup_interval_secs,
			)),
		);
		tracing::info!("Registered ACME background jobs");
	}

	scheduler.register(
		Arc::new(JobHistoryCleanupJob::new(
			Arc::clone(&job_repo),
			config.jobs.history_retention_days,
		)),
		Schedule::every(Duration::from_secs(24 * 60 * 60)),
	);

	let scheduler = Arc::new(scheduler);
	state.job_scheduler = Some(Arc::clone(&scheduler));

	if let Err(e) = scheduler.start().await {
		tracing::error!(error = %e, "Failed to start job scheduler");
	}

	let app = create_router(state)
		.layer(TraceLayer::new_for_http())
		.layer(
			CorsLayer::new()
				.allow_origin(Any)
				.allow_methods(Any)
				.allow_headers(Any),
		);

	let addr = config.socket_addr();
	tracing::info!("listening on {}", addr);
	let listener = tokio::net::TcpListener::bind(&addr).await?;

	tokio::select! {
		result = axum::serve(listener, app) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "Server error");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("Received shutdown signal");
			scheduler.shutdown().await;
		}
	}

	tracing::info!("Server shutdown complete");
	Ok(())
}
