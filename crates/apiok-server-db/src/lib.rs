// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Storage for the apiok control plane.
//!
//! Two SQLite databases are involved:
//!
//! - the control-plane store holding services, routers, upstreams, plugins,
//!   certificates, users and job history, accessed through the
//!   `*Repository` types in this crate;
//! - the data-plane snapshot store (`apiok_data`), written only through
//!   [`SnapshotStore`] and read by the gateway nodes.
//!
//! Control-plane repositories are unit structs whose functions take a
//! `&mut SqliteConnection`, so a caller can run several of them inside one
//! transaction:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! ServiceRepository::set_release(&mut tx, "sv-abc", ReleaseStatus::Published).await?;
//! RouterRepository::set_release(&mut tx, "rt-def", ReleaseStatus::Published).await?;
//! tx.commit().await?;
//! ```

pub mod acme;
pub mod certificate;
pub mod error;
pub mod id;
pub mod job;
pub mod options;
pub mod plugin;
pub mod pool;
pub mod router;
pub mod schema;
pub mod service;
pub mod snapshot;
pub mod testing;
pub mod types;
pub mod upstream;
pub mod user;

pub use acme::AcmeChallengeRepository;
pub use certificate::{wildcard_of, Certificate, CertificateFields, CertificateRepository};
pub use error::{DbError, Result};
pub use id::{random_token, IdPrefix, ResIdGenerator, ID_TOKEN_LENGTH, MAX_GENERATE_ATTEMPTS};
pub use job::{JobDefinition, JobRepository, JobRun, JobStatus, JobStore, TriggerSource};
pub use options::ProxyOptions;
pub use plugin::{Plugin, PluginConfig, PluginConfigRepository, PluginRepository};
pub use pool::create_pool;
pub use router::{Router, RouterFields, RouterRepository};
pub use schema::{run_migrations, run_snapshot_migrations};
pub use service::{Service, ServiceFields, ServiceRepository};
pub use snapshot::{
	SnapshotRepository, SnapshotStore, SnapshotType, SyncHash, SYNC_NAME, SYNC_TYPE,
};
pub use types::{
	Algorithm, Enable, IpType, NodeHealth, PluginConfigScope, PluginType, Protocol, ReleaseStatus,
	CA_PROVIDER_LETSENCRYPT, CA_PROVIDER_MANUAL,
};
pub use upstream::{HealthCheck, Upstream, UpstreamFields, UpstreamNode, UpstreamRepository};
pub use user::{User, UserRepository};

pub use sqlx::{SqliteConnection, SqlitePool};
