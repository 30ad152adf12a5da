// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Certificate/SNI conflict resolver.
//!
//! Activating a certificate displaces whichever enabled certificate already
//! serves the same SNI. The relational flip runs on the caller's
//! transaction; the snapshot swap is compensated by hand when the new
//! document cannot be written.
//!
//! ```text
//! 1. find enabled cert for sni (excluding `exclude`)
//! 2. disable it + delete its document          <- swap
//! 3. upsert the new document
//! 4. on 3 failing after a swap: restore the displaced document
//! ```

use apiok_server_db::{
	Certificate, CertificateRepository, DbError, Enable, SnapshotStore, SnapshotType,
	SqliteConnection,
};

use crate::document::{to_value, CertificateDocument};
use crate::error::{ErrorCode, GatewayError, Result};

#[derive(Debug)]
pub enum SyncOutcome {
	/// The new document is live. `displaced` is the certificate that was
	/// switched off to make room.
	Activated { displaced: Option<String> },
	/// Nothing reached the data plane. `compensated` reports whether a
	/// displaced document had to be restored.
	Failed { error: DbError, compensated: bool },
	/// The displaced document could not be restored.
	FatalInconsistency {
		error: DbError,
		compensation_error: DbError,
	},
}

impl SyncOutcome {
	/// Turn a non-activation into an error so the caller's transaction rolls back.
	pub fn into_result(self) -> Result<Option<String>> {
		match self {
			SyncOutcome::Activated { displaced } => Ok(displaced),
			SyncOutcome::Failed { error, .. } => Err(GatewayError::with(
				ErrorCode::CertificateSyncError,
				"detail",
				error.to_string(),
			)),
			SyncOutcome::FatalInconsistency {
				error,
				compensation_error,
			} => Err(GatewayError::with(
				ErrorCode::CertificateInconsistent,
				"detail",
				format!("{error}; restore failed: {compensation_error}"),
			)),
		}
	}
}

/// Make `certificate` the live certificate for its SNI.
///
/// Relational errors propagate as `Err`; snapshot failures are reported in
/// the returned [`SyncOutcome`].
#[tracing::instrument(skip(conn, snapshot, certificate), fields(res_id = %certificate.res_id, sni = %certificate.sni))]
pub async fn sync_certificate(
	conn: &mut SqliteConnection,
	snapshot: &dyn SnapshotStore,
	certificate: &Certificate,
	exclude: Option<&str>,
) -> Result<SyncOutcome> {
	let exclude = exclude.unwrap_or(certificate.res_id.as_str());
	let current = CertificateRepository::enabled_by_sni(conn, &certificate.sni, Some(exclude))
		.await?
		.filter(|c| c.res_id != certificate.res_id);

	let mut displaced = None;
	if let Some(old) = current {
		let prior = match snapshot.get(SnapshotType::Certificates, &old.res_id).await {
			Ok(prior) => prior,
			Err(error) => {
				return Ok(SyncOutcome::Failed {
					error,
					compensated: false,
				})
			}
		};

		CertificateRepository::set_enable(conn, &old.res_id, Enable::Off).await?;
		if let Err(error) = snapshot.delete(SnapshotType::Certificates, &old.res_id).await {
			return Ok(SyncOutcome::Failed {
				error,
				compensated: false,
			});
		}
		tracing::info!(displaced = %old.res_id, "certificate displaced");
		displaced = Some((old.res_id, prior));
	}

	let document = to_value(&CertificateDocument::build(certificate))?;
	let Err(error) = snapshot
		.upsert(SnapshotType::Certificates, &certificate.res_id, &document)
		.await
	else {
		return Ok(SyncOutcome::Activated {
			displaced: displaced.map(|(res_id, _)| res_id),
		});
	};

	tracing::warn!(error = %error, "certificate document upsert failed");
	let Some((old_res_id, Some(prior))) = displaced else {
		return Ok(SyncOutcome::Failed {
			error,
			compensated: false,
		});
	};

	match snapshot
		.upsert(SnapshotType::Certificates, &old_res_id, &prior)
		.await
	{
		Ok(()) => {
			tracing::info!(restored = %old_res_id, "displaced certificate document restored");
			Ok(SyncOutcome::Failed {
				error,
				compensated: true,
			})
		}
		Err(compensation_error) => {
			tracing::error!(
				restored = %old_res_id,
				error = %error,
				compensation_error = %compensation_error,
				fatal_inconsistency = true,
				"failed to restore displaced certificate document, operator action required"
			);
			Ok(SyncOutcome::FatalInconsistency {
				error,
				compensation_error,
			})
		}
	}
}
