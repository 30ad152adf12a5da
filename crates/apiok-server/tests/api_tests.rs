// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP tests driving the full router with `tower::ServiceExt::oneshot`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use apiok_server::{create_app_state, create_router, AppState};
use apiok_server_acme::{AcmeDirectory, AcmeError, AcmeOrder, Http01Challenge};
use apiok_server_config::{AcmeConfig, ServerConfig};
use apiok_server_db::testing::{create_snapshot_test_pool, create_test_pool};
use apiok_server_db::{AcmeChallengeRepository, SnapshotRepository, SnapshotType};
use async_trait::async_trait;
use axum::{
	body::Body,
	http::{header, Method, Request, StatusCode},
	Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
	router: Router,
	state: AppState,
	token: String,
}

impl TestApp {
	async fn new() -> Self {
		let state = create_app_state(
			create_test_pool().await,
			create_snapshot_test_pool().await,
			&ServerConfig::default(),
		);
		Self::with_state(state).await
	}

	async fn with_state(state: AppState) -> Self {
		state
			.users
			.add("admin", "admin@example.com", "password")
			.await
			.unwrap();
		let token = state
			.users
			.login("admin@example.com", "password")
			.await
			.unwrap()
			.token;
		Self {
			router: create_router(state.clone()),
			state,
			token,
		}
	}

	async fn raw(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
		let response = self.router.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let body = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		(status, body.to_vec())
	}

	async fn call(
		&self,
		method: Method,
		uri: &str,
		token: Option<&str>,
		body: Option<Value>,
	) -> (StatusCode, Value) {
		let mut builder = Request::builder().method(method).uri(uri);
		if let Some(token) = token {
			builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
		}
		let request = match body {
			Some(body) => builder
				.header(header::CONTENT_TYPE, "application/json")
				.body(Body::from(body.to_string()))
				.unwrap(),
			None => builder.body(Body::empty()).unwrap(),
		};
		let (status, bytes) = self.raw(request).await;
		(status, serde_json::from_slice(&bytes).unwrap())
	}

	async fn get(&self, uri: &str) -> Value {
		self.call(Method::GET, uri, Some(&self.token), None).await.1
	}

	async fn post(&self, uri: &str, body: Value) -> Value {
		self.call(Method::POST, uri, Some(&self.token), Some(body))
			.await
			.1
	}

	async fn put(&self, uri: &str, body: Option<Value>) -> Value {
		self.call(Method::PUT, uri, Some(&self.token), body).await.1
	}

	async fn create_service(&self, name: &str, domain: &str) -> String {
		let body = self
			.post(
				"/admin/service/add",
				json!({"name": name, "protocol": 1, "domains": [domain]}),
			)
			.await;
		assert_eq!(body["code"], 0, "{body}");
		body["data"]["res_id"].as_str().unwrap().to_string()
	}
}

#[tokio::test]
async fn test_health_is_public() {
	let app = TestApp::new().await;
	let (status, body) = app.call(Method::GET, "/health", None, None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["status"], "healthy");
	assert_eq!(body["database"]["status"], "healthy");
	assert_eq!(body["acme_enabled"], false);
}

#[tokio::test]
async fn test_admin_routes_require_bearer_token() {
	let app = TestApp::new().await;

	let (status, body) = app
		.call(Method::GET, "/admin/service/list", None, None)
		.await;
	assert_eq!(status, StatusCode::UNAUTHORIZED);
	assert_eq!(body["code"], 10003);
	assert!(body["data"].is_null());

	let (status, _) = app
		.call(Method::GET, "/admin/service/list", Some("not-a-token"), None)
		.await;
	assert_eq!(status, StatusCode::UNAUTHORIZED);

	let (status, body) = app
		.call(Method::GET, "/admin/service/list", Some(&app.token), None)
		.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["code"], 0);
	assert_eq!(body["msg"], "success");
	assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn test_login_errors_are_localized() {
	let app = TestApp::new().await;
	let body = json!({"email": "admin@example.com", "password": "wrong-password"});

	let (status, en) = app
		.call(Method::POST, "/admin/user/login", None, Some(body.clone()))
		.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(en["code"], 16001);
	assert_eq!(en["msg"], "incorrect email or password");

	let request = Request::builder()
		.method(Method::POST)
		.uri("/admin/user/login")
		.header(header::CONTENT_TYPE, "application/json")
		.header(header::ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9")
		.body(Body::from(body.to_string()))
		.unwrap();
	let (status, bytes) = app.raw(request).await;
	let zh: Value = serde_json::from_slice(&bytes).unwrap();
	assert_eq!(status, StatusCode::OK);
	assert_eq!(zh["code"], 16001);
	assert_eq!(zh["msg"], "邮箱或密码错误");
}

#[tokio::test]
async fn test_login_logout_round() {
	let app = TestApp::new().await;
	let (_, body) = app
		.call(
			Method::POST,
			"/admin/user/login",
			None,
			Some(json!({"email": "admin@example.com", "password": "password"})),
		)
		.await;
	assert_eq!(body["code"], 0);
	assert!(body["data"]["user"].get("password_hash").is_none());
	let token = body["data"]["token"].as_str().unwrap().to_string();

	let (status, _) = app
		.call(Method::POST, "/admin/user/logout", Some(&token), None)
		.await;
	assert_eq!(status, StatusCode::OK);

	let (status, _) = app
		.call(Method::GET, "/admin/user/list", Some(&token), None)
		.await;
	assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_body_is_params_error() {
	let app = TestApp::new().await;
	let body = app
		.post("/admin/service/add", json!({"name": "no protocol"}))
		.await;
	assert_eq!(body["code"], 10001);
}

#[tokio::test]
async fn test_service_publish_edit_republish() {
	let app = TestApp::new().await;
	let res_id = app.create_service("shop", "shop.example.com").await;
	let snapshot = SnapshotRepository::new(app.state.snapshot_pool.clone());

	let body = app
		.put(&format!("/admin/service/switch/release/{res_id}"), None)
		.await;
	assert_eq!(body["code"], 0, "{body}");
	let doc = snapshot
		.get(SnapshotType::Services, &res_id)
		.await
		.unwrap()
		.unwrap();
	assert_eq!(doc["display_name"], "shop");
	let first_hash = snapshot.sync_hash().await.unwrap().unwrap();

	let body = app
		.put(&format!("/admin/service/switch/release/{res_id}"), None)
		.await;
	assert_eq!(body["code"], 10006);

	let body = app
		.put(
			&format!("/admin/service/update/name/{res_id}"),
			Some(json!({"name": "storefront"})),
		)
		.await;
	assert_eq!(body["code"], 0);
	let info = app.get(&format!("/admin/service/info/{res_id}")).await;
	assert_eq!(info["data"]["release"], 2);

	let body = app
		.put(&format!("/admin/service/switch/release/{res_id}"), None)
		.await;
	assert_eq!(body["code"], 0);
	let doc = snapshot
		.get(SnapshotType::Services, &res_id)
		.await
		.unwrap()
		.unwrap();
	assert_eq!(doc["display_name"], "storefront");
	assert_ne!(snapshot.sync_hash().await.unwrap().unwrap().new, first_hash.new);
}

#[tokio::test]
async fn test_batch_release_rejects_published_ids() {
	let app = TestApp::new().await;
	let shop = app.create_service("shop", "shop.example.com").await;
	let blog = app.create_service("blog", "blog.example.com").await;
	let snapshot = SnapshotRepository::new(app.state.snapshot_pool.clone());

	let body = app
		.post(
			"/admin/release",
			json!({"kind": "services", "res_ids": [shop], "type": "push"}),
		)
		.await;
	assert_eq!(body["code"], 0, "{body}");
	assert_eq!(body["data"]["released"], json!([shop]));
	let first_hash = snapshot.sync_hash().await.unwrap().unwrap();

	let body = app
		.post(
			"/admin/release",
			json!({"kind": "services", "res_ids": [shop, blog], "type": "push"}),
		)
		.await;
	assert_eq!(body["code"], 10006);
	let msg = body["msg"].as_str().unwrap();
	assert!(msg.contains(&shop), "{msg}");
	assert!(!msg.contains(&blog), "{msg}");
	assert_eq!(snapshot.sync_hash().await.unwrap().unwrap(), first_hash);
	assert!(snapshot
		.get(SnapshotType::Services, &blog)
		.await
		.unwrap()
		.is_none());

	let info = app.get(&format!("/admin/service/info/{blog}")).await;
	assert_eq!(info["data"]["release"], 1);

	let body = app
		.post(
			"/admin/release",
			json!({"kind": "services", "res_ids": [blog], "type": "push"}),
		)
		.await;
	assert_eq!(body["code"], 0, "{body}");
}

#[tokio::test]
async fn test_domain_conflict_names_domains() {
	let app = TestApp::new().await;
	app.create_service("a", "api.example.com").await;

	let body = app
		.post(
			"/admin/service/add",
			json!({"name": "b", "protocol": 1, "domains": ["API.example.com"]}),
		)
		.await;
	assert_eq!(body["code"], 11002);
	assert_eq!(body["msg"], "domains already in use: api.example.com");

	let list = app.get("/admin/service/list?search=api&page=1&page_size=10").await;
	assert_eq!(list["data"]["total"], 1);
}

#[tokio::test]
async fn test_router_needs_published_service() {
	let app = TestApp::new().await;
	let service = app.create_service("shop", "shop.example.com").await;

	let body = app
		.post(
			"/admin/router/add",
			json!({
				"service_res_id": service,
				"router_name": "orders",
				"request_methods": ["get", "post"],
				"router_path": "/orders",
			}),
		)
		.await;
	assert_eq!(body["code"], 0, "{body}");
	let router = body["data"]["res_id"].as_str().unwrap().to_string();

	let body = app
		.put(&format!("/admin/router/switch/release/{router}"), None)
		.await;
	assert_eq!(body["code"], 12005);

	let list = app
		.get(&format!("/admin/router/list?service_res_id={service}"))
		.await;
	assert_eq!(list["data"]["total"], 1);
	assert_eq!(list["data"]["list"][0]["request_methods"], "GET,POST");

	let body = app
		.post(
			"/admin/release",
			json!({"kind": "routers", "res_ids": [router], "type": "publish"}),
		)
		.await;
	assert_eq!(body["code"], 10005);
}

#[tokio::test]
async fn test_plugin_configs_stay_in_their_scope() {
	let app = TestApp::new().await;
	app.state.plugins.reconcile_catalog().await.unwrap();

	let plugins = app.get("/admin/plugin/add-list").await;
	let cors = plugins["data"]
		.as_array()
		.unwrap()
		.iter()
		.find(|p| p["plugin_key"] == "cors")
		.unwrap()["res_id"]
		.as_str()
		.unwrap()
		.to_string();

	let body = app
		.post(
			"/admin/global/plugin/config/add",
			json!({"plugin_res_id": cors, "name": "allow-all", "config": {"allow_origins": "*"}}),
		)
		.await;
	assert_eq!(body["code"], 0, "{body}");
	let config = body["data"]["res_id"].as_str().unwrap().to_string();

	let list = app.get("/admin/global/plugin/config/list").await;
	assert_eq!(list["data"].as_array().unwrap().len(), 1);

	let wrong_scope = app
		.get(&format!("/admin/service/plugin/config/info/{config}"))
		.await;
	assert_eq!(wrong_scope["code"], 14002);

	let snapshot = SnapshotRepository::new(app.state.snapshot_pool.clone());
	assert!(snapshot
		.get(SnapshotType::Plugins, &config)
		.await
		.unwrap()
		.is_some());

	let body = app
		.post(
			"/admin/global/plugin/config/add",
			json!({"plugin_res_id": cors, "name": "again", "config": []}),
		)
		.await;
	assert_eq!(body["code"], 14004);
}

#[tokio::test]
async fn test_plugin_config_error_names_the_field() {
	let app = TestApp::new().await;
	app.state.plugins.reconcile_catalog().await.unwrap();
	let plugins = app.get("/admin/plugin/add-list").await;
	let tag = plugins["data"]
		.as_array()
		.unwrap()
		.iter()
		.find(|p| p["plugin_key"] == "traffic-tag")
		.unwrap()["res_id"]
		.as_str()
		.unwrap()
		.to_string();

	let body = app
		.post(
			"/admin/global/plugin/config/add",
			json!({"plugin_res_id": tag, "name": "canary", "config": {"tags": {}}}),
		)
		.await;
	assert_eq!(body["code"], 14004);
	assert_eq!(body["msg"], "invalid plugin config: [config.tags] expected object");

	let body = app
		.post(
			"/admin/global/plugin/config/add",
			json!({"plugin_res_id": tag, "name": "canary", "config": {"tags": {"lane": "b"}}}),
		)
		.await;
	assert_eq!(body["code"], 0, "{body}");
}

#[tokio::test]
async fn test_acme_disabled() {
	let app = TestApp::new().await;

	let body = app
		.post("/admin/letsencrypt/request", json!({"domain": "example.com"}))
		.await;
	assert_eq!(body["code"], 17001);

	let request = Request::builder()
		.uri("/.well-known/acme-challenge/anything")
		.body(Body::empty())
		.unwrap();
	let (status, body) = app.raw(request).await;
	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body, b"Challenge token not found");
}

struct SelfSignedDirectory;

#[async_trait]
impl AcmeDirectory for SelfSignedDirectory {
	async fn new_order(&self, domain: &str) -> Result<Box<dyn AcmeOrder>, AcmeError> {
		Ok(Box::new(SelfSignedOrder {
			domain: domain.to_string(),
		}))
	}
}

struct SelfSignedOrder {
	domain: String,
}

#[async_trait]
impl AcmeOrder for SelfSignedOrder {
	async fn http01_challenges(&mut self) -> Result<Vec<Http01Challenge>, AcmeError> {
		Ok(vec![Http01Challenge {
			token: format!("token-{}", self.domain),
			key_authorization: "token.thumbprint".to_string(),
			url: "https://acme.test/chall/1".to_string(),
		}])
	}

	async fn accept(&mut self, _challenge: &Http01Challenge) -> Result<(), AcmeError> {
		Ok(())
	}

	async fn wait_ready(&mut self) -> Result<(), AcmeError> {
		Ok(())
	}

	async fn finalize(&mut self, _csr_der: &[u8]) -> Result<String, AcmeError> {
		let key = rcgen::KeyPair::generate()?;
		let mut params = rcgen::CertificateParams::new(vec![self.domain.clone()])?;
		let mut dn = rcgen::DistinguishedName::new();
		dn.push(rcgen::DnType::CommonName, self.domain.as_str());
		params.distinguished_name = dn;
		Ok(params.self_signed(&key)?.pem())
	}
}

async fn acme_app() -> TestApp {
	let acme = AcmeConfig {
		email: "ops@example.com".to_string(),
		use_staging: true,
		cert_dir: PathBuf::from("./certs"),
		renew_before_days: 30,
		renew_interval: Duration::from_secs(86_400),
		renew_initial_delay: Duration::from_secs(60),
		order_timeout: Duration::from_secs(10),
	};
	let state = create_app_state(
		create_test_pool().await,
		create_snapshot_test_pool().await,
		&ServerConfig::default(),
	)
	.with_acme(Arc::new(SelfSignedDirectory), &acme);
	TestApp::with_state(state).await
}

#[tokio::test]
async fn test_letsencrypt_request_stores_certificate() {
	let app = acme_app().await;

	let body = app
		.post(
			"/admin/letsencrypt/request",
			json!({"domain": "www.example.com", "enable": false}),
		)
		.await;
	assert_eq!(body["code"], 0, "{body}");
	assert_eq!(body["msg"], "Certificate requested successfully");

	let list = app.get("/admin/certificate/list").await;
	assert_eq!(list["data"]["total"], 1);
	let certificate = &list["data"]["list"][0];
	assert_eq!(certificate["sni"], "www.example.com");
	assert_eq!(certificate["ca_provider"], "letsencrypt");
	assert_eq!(certificate["enable"], 2);
	assert!(certificate.get("private_key").is_none());

	let wildcard = app
		.post("/admin/letsencrypt/request", json!({"domain": "*.example.com"}))
		.await;
	assert_eq!(wildcard["code"], 10001);
}

#[tokio::test]
async fn test_challenge_endpoint_serves_stored_token() {
	let app = acme_app().await;
	{
		let mut conn = app.state.pool.acquire().await.unwrap();
		AcmeChallengeRepository::insert(
			&mut conn,
			"tok-1",
			"tok-1.thumbprint",
			Utc::now() + chrono::Duration::minutes(10),
		)
		.await
		.unwrap();
	}

	let request = Request::builder()
		.uri("/.well-known/acme-challenge/tok-1")
		.body(Body::empty())
		.unwrap();
	let (status, body) = app.raw(request).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, b"tok-1.thumbprint");

	let request = Request::builder()
		.uri("/.well-known/acme-challenge/unknown")
		.body(Body::empty())
		.unwrap();
	let (status, _) = app.raw(request).await;
	assert_eq!(status, StatusCode::NOT_FOUND);
}
