// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Undo log for snapshot writes made during one release batch.
//!
//! The snapshot store lives in a different database from the control-plane
//! rows, so a failed batch cannot be rolled back by one transaction. The
//! journal remembers the prior value of every key it touches and restores
//! them on [`SnapshotJournal::rollback`].

use std::collections::HashSet;

use apiok_server_db::{DbError, SnapshotStore, SnapshotType};
use serde_json::Value;

pub struct SnapshotJournal<'a> {
	store: &'a dyn SnapshotStore,
	priors: Vec<(SnapshotType, String, Option<Value>)>,
	seen: HashSet<(SnapshotType, String)>,
}

impl<'a> SnapshotJournal<'a> {
	pub fn new(store: &'a dyn SnapshotStore) -> Self {
		Self {
			store,
			priors: Vec::new(),
			seen: HashSet::new(),
		}
	}

	async fn remember(&mut self, kind: SnapshotType, name: &str) -> Result<(), DbError> {
		if self.seen.insert((kind, name.to_string())) {
			let prior = self.store.get(kind, name).await?;
			self.priors.push((kind, name.to_string(), prior));
		}
		Ok(())
	}

	/// Read through to the store; reads are not journaled.
	pub async fn get(&self, kind: SnapshotType, name: &str) -> Result<Option<Value>, DbError> {
		self.store.get(kind, name).await
	}

	pub async fn upsert(&mut self, kind: SnapshotType, name: &str, data: &Value) -> Result<(), DbError> {
		self.remember(kind, name).await?;
		self.store.upsert(kind, name, data).await
	}

	pub async fn delete(&mut self, kind: SnapshotType, name: &str) -> Result<(), DbError> {
		self.remember(kind, name).await?;
		self.store.delete(kind, name).await
	}

	/// Number of distinct keys written so far.
	pub fn touched(&self) -> usize {
		self.priors.len()
	}

	/// Restore every touched key to its prior value, newest first.
	///
	/// Keeps going after a failed restore and returns the first error.
	pub async fn rollback(self) -> Result<(), DbError> {
		let mut first_error = None;
		for (kind, name, prior) in self.priors.into_iter().rev() {
			let restored = match &prior {
				Some(value) => self.store.upsert(kind, &name, value).await,
				None => self.store.delete(kind, &name).await,
			};
			if let Err(e) = restored {
				tracing::error!(
					kind = %kind,
					name = %name,
					error = %e,
					fatal_inconsistency = true,
					"failed to restore snapshot document"
				);
				first_error.get_or_insert(e);
			}
		}
		first_error.map_or(Ok(()), Err)
	}
}
