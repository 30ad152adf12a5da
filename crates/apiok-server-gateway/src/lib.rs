// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Admin operations for the apiok control plane.
//!
//! Every mutation lands in the control-plane database first. Publishing
//! copies the affected rows into the snapshot store through the
//! [`ReleaseEngine`], which keeps both stores consistent: a failed batch
//! rolls the database transaction back and replays the snapshot journal.
//!
//! Certificates are the exception. Enabling one goes through
//! [`sync_certificate`], which guarantees at most one enabled certificate
//! per SNI and compensates the snapshot store when a write fails half way.

pub mod catalog;
pub mod certificate;
pub mod discern;
pub mod document;
pub mod engine;
pub mod error;
pub mod journal;
pub mod password;
pub mod plugin;
pub mod plugin_check;
pub mod resolver;
pub mod router;
pub mod service;
pub mod size;
pub mod upstream;
pub mod user;

#[cfg(test)]
mod test_support;

pub use catalog::{CatalogEntry, CATALOG};
pub use certificate::{CertificateInput, CertificateManager};
pub use discern::{discern, issuer_organization, CertificateInfo};
pub use engine::{ensure_releasable, ReleaseEngine, ReleaseIntent, ReleaseKind, ReleaseReport};
pub use error::{ErrorCode, GatewayError, Result};
pub use journal::SnapshotJournal;
pub use plugin::{
	CatalogReport, PluginConfigInput, PluginConfigUpdate, PluginInfo, PluginManager, PluginTypeView,
};
pub use plugin_check::check_plugin_config;
pub use resolver::{sync_certificate, SyncOutcome};
pub use router::{RouterInput, RouterManager};
pub use service::{ServiceInput, ServiceManager, ServiceView};
pub use size::{parse_size_to_bytes, SizeParseError};
pub use upstream::{NodeDiff, NodeInput, UpstreamInput, UpstreamManager, UpstreamView};
pub use user::{LoginToken, UserManager, MIN_PASSWORD_LEN};
