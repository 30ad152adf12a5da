// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background jobs registered with the scheduler.

mod acme_challenge_cleanup;
mod acme_renewal;
mod job_history_cleanup;
mod plugin_reconcile;

pub use acme_challenge_cleanup::AcmeChallengeCleanupJob;
pub use acme_renewal::AcmeRenewalJob;
pub use job_history_cleanup::JobHistoryCleanupJob;
pub use plugin_reconcile::PluginReconcileJob;
