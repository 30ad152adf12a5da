// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Let's Encrypt certificates for the apiok control plane.
//!
//! [`AcmeService`] drives http-01 issuance against an [`AcmeDirectory`],
//! stores the result as a certificate row, and serves challenge tokens to
//! the unauthenticated `/.well-known/acme-challenge/{token}` route.
//! [`LetsEncryptDirectory`] is the production directory; tests plug in their
//! own.

pub mod challenge;
pub mod directory;
pub mod error;
pub mod letsencrypt;
pub mod service;

pub use challenge::{ChallengeCache, ACME_CHALLENGE_PREFIX};
pub use directory::{AcmeDirectory, AcmeOrder, Http01Challenge};
pub use error::{AcmeError, Result};
pub use letsencrypt::LetsEncryptDirectory;
pub use service::{AcmeService, RenewalReport, ISSUED_KEY_ALGORITHM};
