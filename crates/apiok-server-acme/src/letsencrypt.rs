// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! [`AcmeDirectory`] backed by Let's Encrypt through `instant-acme`.
//!
//! Account credentials are created on first use and persisted as JSON in
//! `cert_dir/account.json`, so restarts reuse the same ACME account.

use std::path::PathBuf;
use std::time::Duration;

use apiok_server_config::AcmeConfig;
use async_trait::async_trait;
use instant_acme::{
	Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, LetsEncrypt,
	NewAccount, NewOrder, Order, OrderStatus,
};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::directory::{AcmeDirectory, AcmeOrder, Http01Challenge};
use crate::error::{AcmeError, Result};

pub const ACCOUNT_FILE: &str = "account.json";

const POLL_INITIAL_DELAY: Duration = Duration::from_millis(250);
const MAX_POLLS: u32 = 10;

pub struct LetsEncryptDirectory {
	email: String,
	directory_url: &'static str,
	account_path: PathBuf,
	account: OnceCell<Account>,
}

impl LetsEncryptDirectory {
	pub fn new(config: &AcmeConfig) -> Self {
		let directory_url = if config.use_staging {
			LetsEncrypt::Staging.url()
		} else {
			LetsEncrypt::Production.url()
		};
		Self {
			email: config.email.clone(),
			directory_url,
			account_path: config.cert_dir.join(ACCOUNT_FILE),
			account: OnceCell::new(),
		}
	}

	async fn account(&self) -> Result<&Account> {
		self.account.get_or_try_init(|| self.load_or_create()).await
	}

	async fn load_or_create(&self) -> Result<Account> {
		match tokio::fs::read_to_string(&self.account_path).await {
			Ok(json) => {
				let credentials: AccountCredentials = serde_json::from_str(&json)?;
				debug!(path = %self.account_path.display(), "loaded ACME account");
				return Ok(Account::from_credentials(credentials).await?);
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
			Err(e) => return Err(e.into()),
		}

		let contact = format!("mailto:{}", self.email);
		let (account, credentials) = Account::create(
			&NewAccount {
				contact: &[contact.as_str()],
				terms_of_service_agreed: true,
				only_return_existing: false,
			},
			self.directory_url,
			None,
		)
		.await?;

		if let Some(dir) = self.account_path.parent() {
			tokio::fs::create_dir_all(dir).await?;
		}
		tokio::fs::write(&self.account_path, serde_json::to_string_pretty(&credentials)?).await?;
		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			tokio::fs::set_permissions(&self.account_path, std::fs::Permissions::from_mode(0o600))
				.await?;
		}

		info!(
			directory = %self.directory_url,
			path = %self.account_path.display(),
			"created ACME account"
		);
		Ok(account)
	}
}

#[async_trait]
impl AcmeDirectory for LetsEncryptDirectory {
	async fn new_order(&self, domain: &str) -> Result<Box<dyn AcmeOrder>> {
		let identifier = Identifier::Dns(domain.to_string());
		let order = self
			.account()
			.await?
			.new_order(&NewOrder {
				identifiers: &[identifier],
			})
			.await?;
		debug!(domain = %domain, "ACME order created");
		Ok(Box::new(LetsEncryptOrder {
			domain: domain.to_string(),
			order,
		}))
	}
}

struct LetsEncryptOrder {
	domain: String,
	order: Order,
}

#[async_trait]
impl AcmeOrder for LetsEncryptOrder {
	async fn http01_challenges(&mut self) -> Result<Vec<Http01Challenge>> {
		let authorizations = self.order.authorizations().await?;
		let mut challenges = Vec::with_capacity(authorizations.len());
		for authorization in &authorizations {
			match &authorization.status {
				AuthorizationStatus::Pending => {}
				AuthorizationStatus::Valid => continue,
				status => {
					return Err(AcmeError::Validation(format!(
						"authorization for {} is {status:?}",
						self.domain
					)))
				}
			}

			let challenge = authorization
				.challenges
				.iter()
				.find(|c| c.r#type == ChallengeType::Http01)
				.ok_or_else(|| AcmeError::NoHttp01Challenge(self.domain.clone()))?;

			challenges.push(Http01Challenge {
				token: challenge.token.clone(),
				key_authorization: self.order.key_authorization(challenge).as_str().to_string(),
				url: challenge.url.clone(),
			});
		}
		Ok(challenges)
	}

	async fn accept(&mut self, challenge: &Http01Challenge) -> Result<()> {
		self.order.set_challenge_ready(&challenge.url).await?;
		Ok(())
	}

	async fn wait_ready(&mut self) -> Result<()> {
		let mut delay = POLL_INITIAL_DELAY;
		for attempt in 1..=MAX_POLLS {
			tokio::time::sleep(delay).await;
			let state = self.order.refresh().await?;
			match &state.status {
				OrderStatus::Ready => return Ok(()),
				OrderStatus::Invalid => {
					return Err(AcmeError::Validation(format!(
						"order for {} is invalid",
						self.domain
					)))
				}
				status => debug!(domain = %self.domain, ?status, attempt, "order not ready"),
			}
			delay *= 2;
		}
		Err(AcmeError::Validation(format!(
			"order for {} not ready after {MAX_POLLS} polls",
			self.domain
		)))
	}

	async fn finalize(&mut self, csr_der: &[u8]) -> Result<String> {
		self.order.finalize(csr_der).await?;

		let mut delay = POLL_INITIAL_DELAY;
		for _ in 0..MAX_POLLS {
			if let Some(chain) = self.order.certificate().await? {
				return Ok(chain);
			}
			tokio::time::sleep(delay).await;
			delay *= 2;
		}
		Err(AcmeError::Validation(format!(
			"certificate for {} was not issued after {MAX_POLLS} polls",
			self.domain
		)))
	}
}
