// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `page` / `page_size` slicing for list handlers.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
	pub search: Option<String>,
	pub page: Option<usize>,
	pub page_size: Option<usize>,
}

impl ListParams {
	pub fn search(&self) -> Option<&str> {
		self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
	}

	pub fn page(&self) -> usize {
		self.page.unwrap_or(1).max(1)
	}

	pub fn page_size(&self) -> usize {
		self.page_size
			.unwrap_or(DEFAULT_PAGE_SIZE)
			.clamp(1, MAX_PAGE_SIZE)
	}

	pub fn paginate<T>(&self, items: Vec<T>) -> Page<T> {
		let total = items.len();
		let page = self.page();
		let page_size = self.page_size();
		let list = items
			.into_iter()
			.skip((page - 1).saturating_mul(page_size))
			.take(page_size)
			.collect();
		Page {
			list,
			total,
			page,
			page_size,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
	pub list: Vec<T>,
	pub total: usize,
	pub page: usize,
	pub page_size: usize,
}
