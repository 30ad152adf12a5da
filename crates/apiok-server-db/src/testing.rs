// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory pools for tests across the workspace.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::schema::{run_migrations, run_snapshot_migrations};

async fn memory_pool() -> SqlitePool {
	// One connection: every `:memory:` connection is its own database.
	SqlitePoolOptions::new()
		.max_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect("sqlite::memory:")
		.await
		.unwrap()
}

/// Control-plane pool with the full schema applied.
pub async fn create_test_pool() -> SqlitePool {
	let pool = memory_pool().await;
	run_migrations(&pool).await.unwrap();
	pool
}

/// Data-plane snapshot pool with the `apiok_data` table.
pub async fn create_snapshot_test_pool() -> SqlitePool {
	let pool = memory_pool().await;
	run_snapshot_migrations(&pool).await.unwrap();
	pool
}
