// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Certificate admin operations.

use apiok_server_db::{
	Certificate, CertificateFields, CertificateRepository, Enable, IdPrefix, ResIdGenerator,
	SnapshotType, SqliteConnection, CA_PROVIDER_MANUAL,
};
use serde::Deserialize;

use crate::discern::{discern, CertificateInfo};
use crate::engine::ReleaseEngine;
use crate::error::{ErrorCode, GatewayError, Result};
use crate::resolver::sync_certificate;
use crate::service::default_enable;

#[derive(Debug, Clone, Deserialize)]
pub struct CertificateInput {
	pub certificate: String,
	pub private_key: String,
	#[serde(default = "default_enable")]
	pub enable: Enable,
}

fn inspect(input: &CertificateInput) -> Result<CertificateInfo> {
	if !input.private_key.contains("PRIVATE KEY-----") {
		return Err(GatewayError::with(
			ErrorCode::CertificateFormatError,
			"detail",
			"private key is not PEM",
		));
	}
	let info = discern(&input.certificate)?;
	if info.common_name.is_empty() {
		return Err(GatewayError::with(
			ErrorCode::CertificateParseError,
			"detail",
			"certificate has no common name",
		));
	}
	Ok(info)
}

fn fields(input: &CertificateInput, info: CertificateInfo, enable: Enable) -> CertificateFields {
	CertificateFields {
		sni: info.common_name,
		certificate: input.certificate.trim().to_string(),
		private_key: input.private_key.trim().to_string(),
		expired_at: info.not_after,
		enable,
		ca_provider: CA_PROVIDER_MANUAL.to_string(),
		key_algorithm: info.key_algorithm,
		issuer: info.issuer,
	}
}

#[derive(Clone)]
pub struct CertificateManager {
	engine: ReleaseEngine,
}

impl CertificateManager {
	pub fn new(engine: ReleaseEngine) -> Self {
		Self { engine }
	}

	async fn require(conn: &mut SqliteConnection, res_id: &str) -> Result<Certificate> {
		CertificateRepository::get(conn, res_id)
			.await?
			.ok_or_else(|| GatewayError::with(ErrorCode::CertificateNull, "res_id", res_id))
	}

	/// Run the conflict resolver for `res_id` and switch it on.
	async fn activate(&self, conn: &mut SqliteConnection, res_id: &str) -> Result<()> {
		let certificate = Self::require(conn, res_id).await?;
		let displaced = sync_certificate(conn, self.engine.snapshot(), &certificate, Some(res_id))
			.await?
			.into_result()?;
		if let Some(displaced) = displaced {
			tracing::info!(res_id = %res_id, displaced = %displaced, "certificate took over sni");
		}
		CertificateRepository::set_enable(conn, res_id, Enable::On).await?;
		Ok(())
	}

	#[tracing::instrument(skip(self, input), fields(enable = input.enable.is_on()))]
	pub async fn add(&self, input: CertificateInput) -> Result<String> {
		let info = inspect(&input)?;
		let fields = fields(&input, info, Enable::Off);

		let mut tx = self.engine.pool().begin().await?;
		let res_id = ResIdGenerator::allocate(&mut tx, IdPrefix::Certificate).await?;
		CertificateRepository::insert(&mut tx, &res_id, &fields).await?;
		if input.enable.is_on() {
			self.activate(&mut tx, &res_id).await?;
		}
		tx.commit().await?;

		tracing::info!(res_id = %res_id, sni = %fields.sni, "certificate added");
		Ok(res_id)
	}

	#[tracing::instrument(skip(self, input))]
	pub async fn update(&self, res_id: &str, input: CertificateInput) -> Result<()> {
		let info = inspect(&input)?;
		let fields = fields(&input, info, Enable::Off);

		let mut tx = self.engine.pool().begin().await?;
		Self::require(&mut tx, res_id).await?;
		CertificateRepository::update(&mut tx, res_id, &fields).await?;
		if input.enable.is_on() {
			self.activate(&mut tx, res_id).await?;
		}
		tx.commit().await?;

		if !input.enable.is_on() {
			self.engine
				.snapshot()
				.delete(SnapshotType::Certificates, res_id)
				.await?;
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete(&self, res_id: &str) -> Result<()> {
		let mut tx = self.engine.pool().begin().await?;
		Self::require(&mut tx, res_id).await?;
		CertificateRepository::delete(&mut tx, res_id).await?;
		tx.commit().await?;

		self.engine
			.snapshot()
			.delete(SnapshotType::Certificates, res_id)
			.await?;
		tracing::info!(res_id = %res_id, "certificate deleted");
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn switch_enable(&self, res_id: &str, enable: Enable) -> Result<()> {
		let mut tx = self.engine.pool().begin().await?;
		let certificate = Self::require(&mut tx, res_id).await?;
		if certificate.enable == enable {
			return Err(GatewayError::new(ErrorCode::SwitchNoChange));
		}

		if enable.is_on() {
			self.activate(&mut tx, res_id).await?;
			tx.commit().await?;
		} else {
			CertificateRepository::set_enable(&mut tx, res_id, Enable::Off).await?;
			tx.commit().await?;
			self.engine
				.snapshot()
				.delete(SnapshotType::Certificates, res_id)
				.await?;
		}
		Ok(())
	}

	pub async fn info(&self, res_id: &str) -> Result<Certificate> {
		let mut conn = self.engine.pool().acquire().await?;
		Self::require(&mut conn, res_id).await
	}

	pub async fn list(&self, search: Option<&str>) -> Result<Vec<Certificate>> {
		let mut conn = self.engine.pool().acquire().await?;
		Ok(CertificateRepository::list(&mut conn, search).await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::harness;
	use apiok_server_db::SnapshotStore;
	use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

	fn issue(cn: &str) -> CertificateInput {
		let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
		let mut params = CertificateParams::new(vec![cn.to_string()]).unwrap();
		let mut dn = DistinguishedName::new();
		dn.push(DnType::CommonName, cn);
		params.distinguished_name = dn;
		let cert = params.self_signed(&key).unwrap();
		CertificateInput {
			certificate: cert.pem(),
			private_key: key.serialize_pem(),
			enable: Enable::On,
		}
	}

	#[tokio::test]
	async fn test_add_enabled_certificate_goes_live() {
		let h = harness().await;
		let manager = CertificateManager::new(h.engine.clone());
		let res_id = manager.add(issue("api.example.com")).await.unwrap();

		let cert = manager.info(&res_id).await.unwrap();
		assert_eq!(cert.sni, "api.example.com");
		assert_eq!(cert.enable, Enable::On);
		assert_eq!(cert.key_algorithm, "ecdsa_p256");
		assert_eq!(cert.ca_provider, CA_PROVIDER_MANUAL);
		let doc = h.store.get(SnapshotType::Certificates, &res_id).await.unwrap().unwrap();
		assert_eq!(doc["snis"], serde_json::json!(["api.example.com"]));
	}

	#[tokio::test]
	async fn test_second_certificate_displaces_first() {
		let h = harness().await;
		let manager = CertificateManager::new(h.engine.clone());
		let first = manager.add(issue("api.example.com")).await.unwrap();
		let second = manager.add(issue("api.example.com")).await.unwrap();

		assert_eq!(manager.info(&first).await.unwrap().enable, Enable::Off);
		assert_eq!(manager.info(&second).await.unwrap().enable, Enable::On);
		assert!(h.store.get(SnapshotType::Certificates, &first).await.unwrap().is_none());

		manager.switch_enable(&first, Enable::On).await.unwrap();
		assert_eq!(manager.info(&second).await.unwrap().enable, Enable::Off);
		assert!(h.store.get(SnapshotType::Certificates, &first).await.unwrap().is_some());
	}

	#[tokio::test]
	async fn test_failed_activation_rolls_back() {
		let h = harness().await;
		let manager = CertificateManager::new(h.engine.clone());
		let first = manager.add(issue("api.example.com")).await.unwrap();
		h.store.fail_all_upserts(true);
		let mut input = issue("api.example.com");
		input.enable = Enable::On;

		let err = manager.add(input).await.unwrap_err();
		assert_eq!(err.code(), ErrorCode::CertificateInconsistent);
		h.store.heal();

		let certs = manager.list(None).await.unwrap();
		assert_eq!(certs.len(), 1);
		assert_eq!(manager.info(&first).await.unwrap().enable, Enable::On);
	}

	#[tokio::test]
	async fn test_disable_retracts_document() {
		let h = harness().await;
		let manager = CertificateManager::new(h.engine.clone());
		let res_id = manager.add(issue("api.example.com")).await.unwrap();
		assert_eq!(
			manager.switch_enable(&res_id, Enable::On).await.unwrap_err().code(),
			ErrorCode::SwitchNoChange
		);

		let mut input = issue("api.example.com");
		input.enable = Enable::Off;
		manager.update(&res_id, input).await.unwrap();
		assert_eq!(manager.info(&res_id).await.unwrap().enable, Enable::Off);
		assert!(h.store.get(SnapshotType::Certificates, &res_id).await.unwrap().is_none());

		manager.delete(&res_id).await.unwrap();
		assert_eq!(manager.info(&res_id).await.unwrap_err().code(), ErrorCode::CertificateNull);
	}

	#[tokio::test]
	async fn test_rejects_non_pem_key() {
		let h = harness().await;
		let manager = CertificateManager::new(h.engine.clone());
		let mut input = issue("api.example.com");
		input.private_key = "not a key".to_string();
		assert_eq!(
			manager.add(input).await.unwrap_err().code(),
			ErrorCode::CertificateFormatError
		);
	}
}
