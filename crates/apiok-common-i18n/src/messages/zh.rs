// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub const MESSAGES: &[(&str, &str)] = &[
	("server.api.success", "成功"),
	("server.api.params_error", "参数错误: {detail}"),
	("server.api.internal_error", "服务器内部错误"),
	("server.api.unauthorized", "请先登录"),
	("server.api.id_conflict", "资源ID生成失败"),
	("server.api.release_type_error", "未知的发布类型: {detail}"),
	("server.api.switch_published", "已发布，无需重复发布：{res_ids}"),
	("server.api.switch_no_change", "状态未改变"),
	("server.api.size_format_error", "大小格式错误: {detail}"),
	("server.api.service_null", "服务不存在"),
	("server.api.service_domain_exist", "域名已存在: {domains}"),
	("server.api.service_domain_format_error", "域名格式错误: {domains}"),
	("server.api.service_domain_ssl_null", "以下域名缺少可用证书: {domains}"),
	("server.api.service_binding_router", "服务下存在路由，无法删除"),
	("server.api.router_null", "路由不存在"),
	("server.api.router_path_exist", "路由路径已存在: {paths}"),
	("server.api.router_default_path_no_permission", "默认路由路径不允许操作"),
	(
		"server.api.router_default_path_forbidden_prefix",
		"路由路径不能以默认路径开头",
	),
	("server.api.router_service_unpublished", "路由所属服务尚未发布"),
	("server.api.router_method_error", "不支持的请求方法: {detail}"),
	("server.api.upstream_null", "上游不存在"),
	("server.api.upstream_name_exist", "上游名称已存在: {name}"),
	("server.api.upstream_router_exist", "上游正在被路由使用"),
	("server.api.upstream_node_error", "上游节点无效: {detail}"),
	("server.api.plugin_null", "插件不存在"),
	("server.api.plugin_config_null", "插件配置不存在"),
	("server.api.plugin_config_exist", "该对象已配置此插件: {name}"),
	("server.api.plugin_config_format_error", "插件配置无效：[{field}] 期望 {expected}"),
	("server.api.certificate_null", "证书不存在"),
	("server.api.certificate_format_error", "证书不是有效的PEM格式"),
	("server.api.certificate_parse_error", "证书解析失败"),
	("server.api.certificate_sync_error", "证书启用失败: {detail}"),
	(
		"server.api.certificate_inconsistent",
		"证书启用导致数据面不一致，需要人工处理",
	),
	("server.api.user_login_error", "邮箱或密码错误"),
	("server.api.user_null", "用户不存在"),
	("server.api.user_email_exist", "邮箱已注册: {name}"),
	("server.api.acme_disabled", "未启用ACME证书申请"),
	("server.api.acme_request_error", "证书申请失败: {detail}"),
	("server.api.acme_challenge_null", "挑战令牌不存在"),
	("server.api.letsencrypt_requested", "证书申请成功"),
];
