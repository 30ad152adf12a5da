// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod acme;
mod auth;
mod database;
mod http;
mod jobs;
mod logging;
mod snapshot;

pub use acme::{AcmeConfig, AcmeConfigLayer};
pub use auth::{AuthConfig, AuthConfigLayer, BootstrapAdmin};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use jobs::{JobsConfig, JobsConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use snapshot::{SnapshotConfig, SnapshotConfigLayer};
