// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Certificate inspection.

use chrono::{DateTime, Utc};
use serde::Serialize;
use x509_parser::certificate::X509Certificate;
use x509_parser::pem::parse_x509_pem;
use x509_parser::public_key::PublicKey;
use x509_parser::x509::X509Name;

use crate::error::{ErrorCode, GatewayError, Result};

/// Facts read from the leaf certificate of a PEM chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateInfo {
	pub not_after: DateTime<Utc>,
	pub common_name: String,
	pub key_algorithm: String,
	pub issuer: String,
}

/// Inspect the first certificate of a PEM chain.
pub fn discern(pem: &str) -> Result<CertificateInfo> {
	let (_, pem) = parse_x509_pem(pem.trim().as_bytes())
		.map_err(|e| GatewayError::with(ErrorCode::CertificateFormatError, "detail", e.to_string()))?;
	if pem.label != "CERTIFICATE" {
		return Err(GatewayError::with(
			ErrorCode::CertificateFormatError,
			"detail",
			format!("unexpected PEM block {}", pem.label),
		));
	}

	let cert = pem
		.parse_x509()
		.map_err(|e| GatewayError::with(ErrorCode::CertificateParseError, "detail", e.to_string()))?;

	let timestamp = cert.validity().not_after.timestamp();
	let not_after = DateTime::from_timestamp(timestamp, 0).ok_or_else(|| {
		GatewayError::with(ErrorCode::CertificateParseError, "detail", "not_after out of range")
	})?;

	Ok(CertificateInfo {
		not_after,
		common_name: first_common_name(cert.subject()).unwrap_or_default(),
		key_algorithm: key_algorithm(&cert).to_string(),
		issuer: issuer_name(cert.issuer()),
	})
}

fn first_common_name(name: &X509Name<'_>) -> Option<String> {
	name.iter_common_name()
		.next()
		.and_then(|cn| cn.as_str().ok())
		.map(str::to_string)
}

fn first_organization(name: &X509Name<'_>) -> Option<String> {
	name.iter_organization()
		.next()
		.and_then(|o| o.as_str().ok())
		.map(str::to_string)
}

/// Issuer common name, falling back to its organization.
fn issuer_name(name: &X509Name<'_>) -> String {
	first_common_name(name)
		.or_else(|| first_organization(name))
		.unwrap_or_default()
}

/// Issuer organization, falling back to its common name.
pub fn issuer_organization(pem: &str) -> Option<String> {
	let (_, pem) = parse_x509_pem(pem.trim().as_bytes()).ok()?;
	let cert = pem.parse_x509().ok()?;
	first_organization(cert.issuer()).or_else(|| first_common_name(cert.issuer()))
}

fn key_algorithm(cert: &X509Certificate<'_>) -> &'static str {
	match cert.public_key().parsed() {
		Ok(PublicKey::RSA(rsa)) => match rsa.key_size() {
			2048 => "rsa2048",
			3072 => "rsa3072",
			4096 => "rsa4096",
			_ => "unknown",
		},
		Ok(PublicKey::EC(point)) => match point.key_size() {
			256 => "ecdsa_p256",
			384 => "ecdsa_p384",
			521 | 528 => "ecdsa_p521",
			_ => "ecdsa",
		},
		_ => "unknown",
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

	fn self_signed(alg: &'static rcgen::SignatureAlgorithm) -> String {
		let key = KeyPair::generate_for(alg).unwrap();
		let mut params = CertificateParams::new(vec!["api.example.com".to_string()]).unwrap();
		let mut dn = DistinguishedName::new();
		dn.push(DnType::CommonName, "api.example.com");
		dn.push(DnType::OrganizationName, "Example Org");
		params.distinguished_name = dn;
		params.not_after = rcgen::date_time_ymd(2040, 1, 1);
		params.self_signed(&key).unwrap().pem()
	}

	#[test]
	fn test_discern_ecdsa_certificate() {
		let info = discern(&self_signed(&rcgen::PKCS_ECDSA_P256_SHA256)).unwrap();
		assert_eq!(info.common_name, "api.example.com");
		assert_eq!(info.key_algorithm, "ecdsa_p256");
		assert_eq!(info.issuer, "api.example.com");
		assert_eq!(info.not_after.format("%Y-%m-%d").to_string(), "2040-01-01");
	}

	#[test]
	fn test_discern_p384() {
		let info = discern(&self_signed(&rcgen::PKCS_ECDSA_P384_SHA384)).unwrap();
		assert_eq!(info.key_algorithm, "ecdsa_p384");
	}

	#[test]
	fn test_issuer_organization_first() {
		let pem = self_signed(&rcgen::PKCS_ECDSA_P256_SHA256);
		assert_eq!(issuer_organization(&pem).as_deref(), Some("Example Org"));
	}

	#[test]
	fn test_not_pem() {
		let err = discern("definitely not a certificate").unwrap_err();
		assert_eq!(err.code(), ErrorCode::CertificateFormatError);
	}

	#[test]
	fn test_pem_without_x509_body() {
		let pem = "-----BEGIN CERTIFICATE-----\naGVsbG8gd29ybGQ=\n-----END CERTIFICATE-----\n";
		let err = discern(pem).unwrap_err();
		assert_eq!(err.code(), ErrorCode::CertificateParseError);
	}

	#[test]
	fn test_private_key_is_not_a_certificate() {
		let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
		let err = discern(&key.serialize_pem()).unwrap_err();
		assert_eq!(err.code(), ErrorCode::CertificateFormatError);
	}
}
