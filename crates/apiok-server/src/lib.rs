// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Admin HTTP server for the apiok gateway control plane.
//!
//! Handlers are thin: they extract the request, call one of the gateway
//! managers (or the ACME service) and wrap the result in the
//! `{code, msg, data}` envelope.

pub mod api;
pub mod api_response;
pub mod auth_middleware;
pub mod jobs;
pub mod pagination;
pub mod routes;

pub use api::{create_app_state, create_router, AppState};
pub use api_response::{ApiError, ApiResponse, ApiResult};
