// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Certificate issuance and renewal over http-01.
//!
//! One attempt walks order -> challenges persisted -> challenges accepted ->
//! order ready -> finalized -> stored -> challenges cleaned. Every network
//! step runs under the configured order timeout and outside any database
//! transaction; the certificate row is written only once the chain is in
//! hand.

use std::sync::Arc;
use std::time::Duration;

use apiok_server_config::AcmeConfig;
use apiok_server_db::{
	AcmeChallengeRepository, Certificate, CertificateFields, CertificateRepository, Enable,
	IdPrefix, ResIdGenerator, SnapshotStore, SnapshotType, SqliteConnection, SqlitePool,
	CA_PROVIDER_LETSENCRYPT,
};
use apiok_server_gateway::service::is_valid_domain;
use apiok_server_gateway::{discern, issuer_organization, sync_certificate};
use chrono::Utc;
use rcgen::{CertificateParams, KeyPair, RsaKeySize, PKCS_RSA_SHA256};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::challenge::ChallengeCache;
use crate::directory::AcmeDirectory;
use crate::error::{AcmeError, Result};

pub const ISSUED_KEY_ALGORITHM: &str = "rsa2048";

/// Lifetime of a persisted challenge token.
const CHALLENGE_TTL_HOURS: i64 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenewalReport {
	pub renewed: usize,
	pub failed: usize,
}

struct IssuedCertificate {
	chain_pem: String,
	key_pem: String,
}

pub struct AcmeService {
	pool: SqlitePool,
	snapshot: Arc<dyn SnapshotStore>,
	directory: Arc<dyn AcmeDirectory>,
	challenges: ChallengeCache,
	renew_before: chrono::Duration,
	order_timeout: Duration,
}

fn normalize_domain(domain: &str) -> Result<String> {
	let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
	if domain.starts_with("*.") || !is_valid_domain(&domain) {
		return Err(AcmeError::InvalidDomain(domain));
	}
	Ok(domain)
}

impl AcmeService {
	pub fn new(
		pool: SqlitePool,
		snapshot: Arc<dyn SnapshotStore>,
		directory: Arc<dyn AcmeDirectory>,
		config: &AcmeConfig,
	) -> Self {
		Self {
			pool,
			snapshot,
			directory,
			challenges: ChallengeCache::new(),
			renew_before: chrono::Duration::days(i64::from(config.renew_before_days)),
			order_timeout: config.order_timeout,
		}
	}

	/// Issue a certificate for `domain` and store it. With `enable` set the
	/// new certificate takes over the SNI through the conflict resolver.
	#[tracing::instrument(skip(self))]
	pub async fn request_certificate(&self, domain: &str, enable: bool) -> Result<String> {
		let domain = normalize_domain(domain)?;
		let mut tokens = Vec::new();
		let result = self.request(&domain, enable, &mut tokens).await;
		self.cleanup_challenges(&tokens).await;

		match &result {
			Ok(res_id) => info!(res_id = %res_id, domain = %domain, enable, "certificate issued"),
			Err(e) => warn!(domain = %domain, error = %e, "certificate request failed"),
		}
		result
	}

	async fn request(&self, domain: &str, enable: bool, tokens: &mut Vec<String>) -> Result<String> {
		let issued = self.issue(domain, tokens).await?;

		let mut tx = self.pool.begin().await?;
		let certificate = Self::store(&mut tx, domain, &issued).await?;
		if enable {
			sync_certificate(&mut tx, self.snapshot.as_ref(), &certificate, None)
				.await?
				.into_result()?;
			CertificateRepository::set_enable(&mut tx, &certificate.res_id, Enable::On).await?;
		}
		tx.commit().await?;
		Ok(certificate.res_id)
	}

	async fn issue(&self, domain: &str, tokens: &mut Vec<String>) -> Result<IssuedCertificate> {
		let key = KeyPair::generate_rsa_for(&PKCS_RSA_SHA256, RsaKeySize::_2048)?;
		let csr = CertificateParams::new(vec![domain.to_string()])?.serialize_request(&key)?;
		let csr_der = csr.der().to_vec();

		let chain_pem = tokio::time::timeout(self.order_timeout, self.run_order(domain, &csr_der, tokens))
			.await
			.map_err(|_| AcmeError::Timeout {
				domain: domain.to_string(),
				secs: self.order_timeout.as_secs(),
			})??;

		Ok(IssuedCertificate {
			chain_pem,
			key_pem: key.serialize_pem(),
		})
	}

	async fn run_order(&self, domain: &str, csr_der: &[u8], tokens: &mut Vec<String>) -> Result<String> {
		let mut order = self.directory.new_order(domain).await?;
		let challenges = order.http01_challenges().await?;

		// Tokens must be servable before the server is told to validate.
		let expired_at = Utc::now() + chrono::Duration::hours(CHALLENGE_TTL_HOURS);
		{
			let mut conn = self.pool.acquire().await?;
			for challenge in &challenges {
				AcmeChallengeRepository::insert(
					&mut conn,
					&challenge.token,
					&challenge.key_authorization,
					expired_at,
				)
				.await?;
				self.challenges
					.insert(&challenge.token, &challenge.key_authorization, expired_at);
				tokens.push(challenge.token.clone());
			}
		}

		for challenge in &challenges {
			order.accept(challenge).await?;
		}
		order.wait_ready().await?;
		order.finalize(csr_der).await
	}

	async fn store(
		conn: &mut SqliteConnection,
		domain: &str,
		issued: &IssuedCertificate,
	) -> Result<Certificate> {
		let info = discern(&issued.chain_pem)?;
		let fields = CertificateFields {
			sni: domain.to_string(),
			certificate: issued.chain_pem.trim().to_string(),
			private_key: issued.key_pem.trim().to_string(),
			expired_at: info.not_after,
			enable: Enable::Off,
			ca_provider: CA_PROVIDER_LETSENCRYPT.to_string(),
			key_algorithm: ISSUED_KEY_ALGORITHM.to_string(),
			issuer: issuer_organization(&issued.chain_pem).unwrap_or(info.issuer),
		};

		let res_id = ResIdGenerator::allocate(conn, IdPrefix::Certificate).await?;
		CertificateRepository::insert(conn, &res_id, &fields).await?;
		CertificateRepository::get(conn, &res_id)
			.await?
			.ok_or_else(|| AcmeError::Validation(format!("certificate {res_id} vanished after insert")))
	}

	/// Best effort: failures are logged, never returned.
	async fn cleanup_challenges(&self, tokens: &[String]) {
		if tokens.is_empty() {
			return;
		}
		for token in tokens {
			self.challenges.remove(token);
		}
		let removed = match self.pool.acquire().await {
			Ok(mut conn) => AcmeChallengeRepository::delete_by_tokens(&mut conn, tokens).await,
			Err(e) => Err(e.into()),
		};
		if let Err(e) = removed {
			warn!(error = %e, count = tokens.len(), "failed to remove challenge tokens");
		}
	}

	/// Key authorization for `token`, or `None` when it is unknown or expired.
	pub async fn get_challenge_token(&self, token: &str) -> Result<Option<String>> {
		if let Some(hit) = self.challenges.get(token) {
			return Ok(Some(hit));
		}
		let mut conn = self.pool.acquire().await?;
		let found = AcmeChallengeRepository::find_valid_until(&mut conn, token).await?;
		Ok(found.map(|(key_authorization, expired_at)| {
			self.challenges.insert(token, &key_authorization, expired_at);
			key_authorization
		}))
	}

	/// Re-issue every enabled Let's Encrypt certificate inside the renewal
	/// window. One failure does not stop the sweep.
	#[tracing::instrument(skip(self))]
	pub async fn renew_expiring_certificates(&self) -> Result<RenewalReport> {
		let due = {
			let mut conn = self.pool.acquire().await?;
			CertificateRepository::expiring(
				&mut conn,
				CA_PROVIDER_LETSENCRYPT,
				Utc::now() + self.renew_before,
			)
			.await?
		};

		let mut report = RenewalReport::default();
		for certificate in &due {
			match self.renew(certificate).await {
				Ok(res_id) => {
					info!(old = %certificate.res_id, new = %res_id, sni = %certificate.sni, "certificate renewed");
					report.renewed += 1;
				}
				Err(e) => {
					error!(res_id = %certificate.res_id, sni = %certificate.sni, error = %e, "certificate renewal failed");
					report.failed += 1;
				}
			}
		}

		info!(due = due.len(), renewed = report.renewed, failed = report.failed, "renewal sweep finished");
		Ok(report)
	}

	async fn renew(&self, old: &Certificate) -> Result<String> {
		let mut tokens = Vec::new();
		let result = self.replace(old, &mut tokens).await;
		self.cleanup_challenges(&tokens).await;
		result
	}

	async fn replace(&self, old: &Certificate, tokens: &mut Vec<String>) -> Result<String> {
		let issued = self.issue(&old.sni, tokens).await?;

		let mut tx = self.pool.begin().await?;
		let certificate = Self::store(&mut tx, &old.sni, &issued).await?;
		sync_certificate(&mut tx, self.snapshot.as_ref(), &certificate, None)
			.await?
			.into_result()?;
		CertificateRepository::set_enable(&mut tx, &old.res_id, Enable::Off).await?;
		CertificateRepository::set_enable(&mut tx, &certificate.res_id, Enable::On).await?;
		tx.commit().await?;

		// Usually already gone: the resolver retracts the displaced document.
		if let Err(e) = self
			.snapshot
			.delete(SnapshotType::Certificates, &old.res_id)
			.await
		{
			warn!(res_id = %old.res_id, error = %e, "failed to delete renewed certificate document");
		}
		Ok(certificate.res_id)
	}

	/// Drop expired challenge tokens from storage and the cache.
	pub async fn cleanup_expired_challenges(&self) -> Result<usize> {
		let mut conn = self.pool.acquire().await?;
		let expired = AcmeChallengeRepository::delete_expired(&mut conn).await?;
		for token in &expired {
			self.challenges.remove(token);
		}
		Ok(expired.len())
	}

	pub fn cached_challenges(&self) -> usize {
		self.challenges.len()
	}
}
