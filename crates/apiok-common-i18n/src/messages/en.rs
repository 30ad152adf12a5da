// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub const MESSAGES: &[(&str, &str)] = &[
	("server.api.success", "success"),
	("server.api.params_error", "invalid parameter: {detail}"),
	("server.api.internal_error", "internal server error"),
	("server.api.unauthorized", "login required"),
	("server.api.id_conflict", "failed to allocate a unique resource id"),
	("server.api.release_type_error", "unknown release type: {detail}"),
	("server.api.switch_published", "already published, nothing to release: {res_ids}"),
	("server.api.switch_no_change", "state is unchanged"),
	("server.api.size_format_error", "invalid size format: {detail}"),
	("server.api.service_null", "service not found"),
	("server.api.service_domain_exist", "domains already in use: {domains}"),
	("server.api.service_domain_format_error", "invalid domain: {domains}"),
	("server.api.service_domain_ssl_null", "no enabled certificate covers: {domains}"),
	("server.api.service_binding_router", "service still has routers"),
	("server.api.router_null", "router not found"),
	("server.api.router_path_exist", "router paths already in use: {paths}"),
	(
		"server.api.router_default_path_no_permission",
		"the default router path is reserved",
	),
	(
		"server.api.router_default_path_forbidden_prefix",
		"router path may not start with the default path",
	),
	(
		"server.api.router_service_unpublished",
		"the router's service has not been published",
	),
	("server.api.router_method_error", "unsupported request method: {detail}"),
	("server.api.upstream_null", "upstream not found"),
	("server.api.upstream_name_exist", "upstream name already in use: {name}"),
	("server.api.upstream_router_exist", "upstream is still used by routers"),
	("server.api.upstream_node_error", "invalid upstream node: {detail}"),
	("server.api.plugin_null", "plugin not found"),
	("server.api.plugin_config_null", "plugin config not found"),
	(
		"server.api.plugin_config_exist",
		"plugin is already configured for this target: {name}",
	),
	(
		"server.api.plugin_config_format_error",
		"invalid plugin config: [{field}] expected {expected}",
	),
	("server.api.certificate_null", "certificate not found"),
	("server.api.certificate_format_error", "certificate is not valid PEM"),
	("server.api.certificate_parse_error", "certificate could not be parsed"),
	(
		"server.api.certificate_sync_error",
		"failed to activate certificate: {detail}",
	),
	(
		"server.api.certificate_inconsistent",
		"certificate activation left the data plane inconsistent, operator attention required",
	),
	("server.api.user_login_error", "incorrect email or password"),
	("server.api.user_null", "user not found"),
	("server.api.user_email_exist", "email already registered: {name}"),
	("server.api.acme_disabled", "ACME certificate issuance is disabled"),
	("server.api.acme_request_error", "certificate request failed: {detail}"),
	("server.api.acme_challenge_null", "Challenge token not found"),
	(
		"server.api.letsencrypt_requested",
		"Certificate requested successfully",
	),
];
