// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Protocol seam between the issuance flow and an ACME server.

use async_trait::async_trait;

use crate::error::Result;

/// One pending http-01 challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Http01Challenge {
	pub token: String,
	/// Body served at `/.well-known/acme-challenge/{token}`.
	pub key_authorization: String,
	pub url: String,
}

#[async_trait]
pub trait AcmeDirectory: Send + Sync {
	/// Open an order for a single DNS identifier.
	async fn new_order(&self, domain: &str) -> Result<Box<dyn AcmeOrder>>;
}

#[async_trait]
pub trait AcmeOrder: Send {
	/// One http-01 challenge per pending authorization. Authorizations that
	/// are already valid are skipped.
	async fn http01_challenges(&mut self) -> Result<Vec<Http01Challenge>>;

	/// Tell the server the challenge can be validated.
	async fn accept(&mut self, challenge: &Http01Challenge) -> Result<()>;

	/// Block until every authorization is validated.
	async fn wait_ready(&mut self) -> Result<()>;

	/// Submit the CSR and return the issued chain as PEM.
	async fn finalize(&mut self, csr_der: &[u8]) -> Result<String>;
}
