// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use apiok_server_db::DbError;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
	#[error("Job not found: {0}")]
	NotFound(String),

	#[error("Job cancelled")]
	Cancelled,

	#[error("Job failed: {message}")]
	Failed { message: String, retryable: bool },

	#[error("Job history error: {0}")]
	Db(#[from] DbError),
}

impl JobError {
	/// A failure worth retrying with backoff.
	pub fn retryable(message: impl Into<String>) -> Self {
		JobError::Failed {
			message: message.into(),
			retryable: true,
		}
	}

	pub fn fatal(message: impl Into<String>) -> Self {
		JobError::Failed {
			message: message.into(),
			retryable: false,
		}
	}
}

pub type Result<T> = std::result::Result<T, JobError>;
