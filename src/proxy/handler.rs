//! # 请求处理器
//!
//! 聊天补全主管线与周边端点。管线步骤：有界读体 → 去重 → 解析 →
//! 模型解析/路由 → 请求改写 → 降级循环 → 响应翻译（必要时SSE合成）→
//! 去重完成 + 用量汇报。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use chrono::Utc;
use serde_json::{Value, json};

use crate::catalog::AUTO_MODEL_ID;
use crate::catalog::resolve_alias;
use crate::dedup::{CachedResponse, DedupGuard, DedupOutcome, Deduplicator, is_hop_by_hop};
use crate::error::GatewayError;
use crate::logging::{LogComponent, LogStage};
use crate::provider::{ProviderFailure, ProviderResponse, UpstreamRequest};
use crate::routing::{
    RouteMethod, RoutingDecision, SelectorConstraints, Tier, approx_tokens,
};
use crate::statistics::UsageEvent;
use crate::{ldebug, linfo, lwarn};

use super::context::RequestContext;
use super::request_transform::{normalize_messages, sanitize_tool_ids};
use super::response_transform::{
    DONE_FRAME, error_frame, synthesize_chunks,
};
use super::server::Gateway;
use super::streaming::{SseWriter, spawn_heartbeat};
use super::types::{force_non_streaming, parse_chat_request};

/// 网关合成前缀：客户端可能带着本网关的合成提供商前缀请求模型
const GATEWAY_MODEL_PREFIX: &str = "gateway/";

// ================ 周边端点 ================

/// `GET /health`
///
/// 基础形态不触碰任何提供商，必须在50ms内返回；
/// `?full=true` 附带有界超时的提供商健康报告。
pub async fn health(
    State(gateway): State<Arc<Gateway>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut body = json!({
        "status": "ok",
        "identity": gateway.config.server.identity,
    });

    if params.get("full").map(String::as_str) == Some("true") {
        let report = gateway.registry.health_check_all().await;
        body["providers"] = serde_json::to_value(&report).unwrap_or(Value::Null);
        body["sessions"] = json!(gateway.sessions.len());
        body["models"] = json!(gateway.catalog.len().saturating_sub(1));
    }

    Json(body).into_response()
}

/// `GET /stats` — 内存用量聚合
pub async fn stats(State(gateway): State<Arc<Gateway>>) -> Response {
    Json(gateway.usage.snapshot()).into_response()
}

/// `GET /v1/models` — 本地服务目录（不含合成 `auto`），上游 `list` 信封
pub async fn list_models(State(gateway): State<Arc<Gateway>>) -> Response {
    let data: Vec<Value> = gateway
        .catalog
        .without_synthetic()
        .map(|model| {
            json!({
                "id": model.id,
                "object": "model",
                "created": 1_715_000_000,
                "owned_by": model.family(),
                "display_name": model.display_name,
                "context_window": model.context_window,
            })
        })
        .collect();
    Json(json!({"object": "list", "data": data})).into_response()
}

/// 兜底：未知路径返回JSON 404
pub async fn not_found() -> Response {
    let body = json!({
        "error": {"message": "未找到该路径", "type": "not_found", "status": 404}
    });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

/// 其余 `/v1/*` 路径：透明转发到最高优先级提供商
pub async fn passthrough(State(gateway): State<Arc<Gateway>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), |pq| pq.as_str().to_string());

    let max_body = gateway.config.server.max_body_bytes;
    let Ok(body_bytes) = axum::body::to_bytes(body, max_body).await else {
        return error_response(&GatewayError::payload_too_large(max_body));
    };

    let Some(provider) = gateway.registry.primary() else {
        return error_response(&GatewayError::upstream_not_available("未配置任何提供商"));
    };

    // 只转发内容协商相关的客户端请求头；认证由提供商自己附加
    let mut forward_headers = Vec::new();
    for name in [header::CONTENT_TYPE, header::ACCEPT] {
        if let Some(value) = parts.headers.get(&name) {
            if let Ok(v) = value.to_str() {
                forward_headers.push((name.to_string(), v.to_string()));
            }
        }
    }

    match provider
        .forward_raw(parts.method, &path_and_query, forward_headers, body_bytes)
        .await
    {
        ProviderResponse::Success {
            status,
            headers,
            body,
        } => build_upstream_response(status, &headers, body),
        ProviderResponse::Failure(failure) => terminal_failure_response(&failure).1,
    }
}

// ================ 聊天补全主管线 ================

/// `POST /v1/chat/completions`
pub async fn chat_completions(State(gateway): State<Arc<Gateway>>, request: Request) -> Response {
    let mut ctx = RequestContext::new();
    let (parts, body) = request.into_parts();
    ctx.session_id = gateway.sessions.extract_session_id(&parts.headers);

    // 1. 有界读取请求体
    let max_body = gateway.config.server.max_body_bytes;
    let Ok(body_bytes) = axum::body::to_bytes(body, max_body).await else {
        return error_response(&GatewayError::payload_too_large(max_body));
    };

    // 2. 去重：命中完成态或挂到进行中直接回放
    let dedup_key = Deduplicator::key_for(&body_bytes);
    let guard = match gateway.dedup.acquire(&dedup_key).await {
        DedupOutcome::Replay(cached) => {
            ldebug!(
                ctx.request_id,
                LogStage::Cache,
                LogComponent::Dedup,
                "replay",
                "去重命中，回放缓存响应",
                status = cached.status
            );
            return replay_response(&cached);
        }
        DedupOutcome::Primary(guard) => guard,
    };

    // 3. 解析；格式错误立即400，不缓存、不降级
    let parsed = match parse_chat_request(&body_bytes) {
        Ok(parsed) => parsed,
        Err(e) => {
            drop(guard);
            return error_response(&e);
        }
    };

    // 4. 上游一律非流式；入站的流式意图由网关合成兑现
    ctx.client_wants_streaming = parsed.stream;
    let mut body_value = parsed.body.clone();
    force_non_streaming(&mut body_value);

    linfo!(
        ctx.request_id,
        LogStage::RequestStart,
        LogComponent::Handler,
        "accepted",
        "接受聊天补全请求",
        model = %parsed.model_raw,
        stream = parsed.stream,
        session = ctx.session_id.as_deref().unwrap_or("-")
    );

    // 5-6. 模型解析与路由
    let estimated_input_tokens = approx_tokens(parsed.content_chars);
    let estimated_total_tokens = estimated_input_tokens + parsed.max_tokens as usize;

    let normalized_model = parsed.model_raw.trim().to_lowercase();
    let logical_model = normalized_model
        .strip_prefix(GATEWAY_MODEL_PREFIX)
        .unwrap_or(&normalized_model)
        .to_string();

    let route = if logical_model == AUTO_MODEL_ID {
        route_auto(&gateway, &mut ctx, &parsed.last_user_message, &parsed.first_system_message, estimated_input_tokens, parsed.has_tools)
    } else {
        // 别名解析；解析后仍未知的模型是客户端错误，不降级
        let resolved = resolve_alias(&logical_model).into_owned();
        if !gateway.catalog.contains(&resolved) {
            drop(guard);
            return error_response(&GatewayError::model_not_found(&logical_model));
        }
        RoutePlan {
            tier: tier_of_model(&gateway, &resolved),
            method: RouteMethod::Override,
            confidence: 1.0,
            reasoning: format!("explicit model request: {resolved}"),
            pin: Some(resolved),
            prefer_agentic: parsed.has_tools,
        }
    };

    // 9. 构建降级链
    let constraints = SelectorConstraints {
        estimated_tokens: estimated_total_tokens,
        prefer_agentic: route.prefer_agentic,
        session_pin: route.pin.clone(),
    };
    let chain = gateway.selector.chain(route.tier, &constraints);
    let selected = chain[0].clone();

    // 首次路由的会话固定（已命中固定时只刷新，不重写）
    if logical_model == AUTO_MODEL_ID && route.method != RouteMethod::Session {
        if let Some(session_id) = &ctx.session_id {
            gateway.sessions.pin(session_id, &selected, route.tier);
        }
    }

    let (cost_estimate, baseline_cost, savings) = cost_triple(
        &gateway,
        &selected,
        estimated_input_tokens,
        parsed.max_tokens as usize,
    );
    ctx.decision = Some(RoutingDecision {
        model: selected.clone(),
        tier: route.tier,
        confidence: route.confidence,
        method: route.method,
        reasoning: route.reasoning.clone(),
        cost_estimate,
        baseline_cost,
        savings,
    });

    linfo!(
        ctx.request_id,
        LogStage::Routing,
        LogComponent::Handler,
        "routed",
        "路由决策完成",
        model = %selected,
        tier = route.tier.as_str(),
        method = route.method.as_str(),
        confidence = route.confidence,
        chain = %chain.join(" -> ")
    );

    // 8. 工具ID净化（同一请求内映射一致）
    sanitize_tool_ids(&mut body_value);

    // 余额策略准入
    let balance_probe = UpstreamRequest {
        model: selected.clone(),
        body: Bytes::new(),
        estimated_input_tokens,
        max_output_tokens: parsed.max_tokens as usize,
        request_id: ctx.request_id.clone(),
    };
    if let Err(veto) = gateway.balance.check(&balance_probe).await {
        let response_body = Bytes::from(veto.to_error_body().to_string());
        guard.complete(
            veto.status_code().as_u16(),
            vec![("content-type".to_string(), "application/json".to_string())],
            response_body.clone(),
        );
        return build_upstream_response(
            veto.status_code().as_u16(),
            &[("content-type".to_string(), "application/json".to_string())],
            response_body,
        );
    }

    let deadline = Duration::from_millis(gateway.config.server.request_timeout_ms);

    if ctx.client_wants_streaming {
        stream_pipeline(gateway, ctx, guard, chain, body_value, estimated_input_tokens, parsed.max_tokens as usize, deadline)
    } else {
        buffered_pipeline(gateway, ctx, guard, chain, body_value, estimated_input_tokens, parsed.max_tokens as usize, deadline).await
    }
}

/// 非流式路径：降级循环 → 原样转发上游响应
#[allow(clippy::too_many_arguments)]
async fn buffered_pipeline(
    gateway: Arc<Gateway>,
    mut ctx: RequestContext,
    guard: DedupGuard,
    chain: Vec<String>,
    mut body_value: Value,
    estimated_input_tokens: usize,
    max_output_tokens: usize,
    deadline: Duration,
) -> Response {
    let outcome = tokio::time::timeout(
        deadline,
        run_fallback_loop(
            &gateway,
            &mut ctx,
            &chain,
            &mut body_value,
            estimated_input_tokens,
            max_output_tokens,
        ),
    )
    .await;

    match outcome {
        Err(_) => {
            // 总超时：终止为502，不降级，不缓存（等待者重新竞争）
            drop(guard);
            let error = GatewayError::request_timeout(gateway.config.server.request_timeout_ms);
            lwarn!(
                ctx.request_id,
                LogStage::ResponseFailure,
                LogComponent::Handler,
                "deadline_exceeded",
                "请求整体超时",
                elapsed_ms = ctx.elapsed_ms()
            );
            error_response(&error)
        }
        Ok(LoopResult::Success {
            status,
            headers,
            body,
            model,
        }) => {
            finalize_decision(&gateway, &mut ctx, &model, estimated_input_tokens, max_output_tokens);
            guard.complete(status, headers.clone(), body.clone());
            emit_usage(&gateway, &ctx).await;
            build_upstream_response(status, &headers, body)
        }
        Ok(LoopResult::Failure(failure)) => {
            let (status, response) = terminal_failure_response(&failure);
            let cached_body = body_bytes_of(&failure);
            guard.complete(
                status,
                vec![("content-type".to_string(), "application/json".to_string())],
                cached_body,
            );
            lwarn!(
                ctx.request_id,
                LogStage::ResponseFailure,
                LogComponent::Handler,
                "all_attempts_failed",
                "全部候选模型失败",
                attempts = ctx.attempts,
                kind = failure.kind.as_str(),
                status = failure.status.unwrap_or(0)
            );
            response
        }
    }
}

/// 流式路径：立即返回SSE响应头与心跳，降级循环与合成在后台任务完成
#[allow(clippy::too_many_arguments)]
fn stream_pipeline(
    gateway: Arc<Gateway>,
    mut ctx: RequestContext,
    guard: DedupGuard,
    chain: Vec<String>,
    mut body_value: Value,
    estimated_input_tokens: usize,
    max_output_tokens: usize,
    deadline: Duration,
) -> Response {
    let (writer, response_body) = SseWriter::channel();
    let heartbeat_interval = Duration::from_millis(gateway.config.heartbeat.interval_ms);
    let heartbeat = spawn_heartbeat(Arc::clone(&writer), heartbeat_interval);

    let task_writer = Arc::clone(&writer);
    tokio::spawn(async move {
        let request_id = ctx.request_id.clone();
        // 客户端断开立即中止上游尝试：进行中的去重条目随守卫清除
        let outcome = tokio::select! {
            outcome = tokio::time::timeout(
                deadline,
                run_fallback_loop(
                    &gateway,
                    &mut ctx,
                    &chain,
                    &mut body_value,
                    estimated_input_tokens,
                    max_output_tokens,
                ),
            ) => outcome,
            () = task_writer.closed() => {
                heartbeat.abort();
                ldebug!(
                    request_id,
                    LogStage::Response,
                    LogComponent::Sse,
                    "client_gone",
                    "客户端在上游完成前断开，中止请求"
                );
                drop(guard);
                return;
            }
        };
        heartbeat.abort();

        match outcome {
            Ok(LoopResult::Success { body, model, .. }) => {
                finalize_decision(&gateway, &mut ctx, &model, estimated_input_tokens, max_output_tokens);

                let upstream: Value = match serde_json::from_slice(&body) {
                    Ok(value) => value,
                    Err(e) => {
                        let frame = error_frame(&format!("上游响应不是合法JSON: {e}"), None);
                        let _ = task_writer.send_frame(&frame).await;
                        let _ = task_writer.send_frame(DONE_FRAME).await;
                        drop(guard);
                        return;
                    }
                };

                for frame in synthesize_chunks(&upstream) {
                    if !task_writer.send_frame(&frame).await {
                        // 客户端断开：放弃完成，去重进行中条目随守卫清除
                        ldebug!(
                            ctx.request_id,
                            LogStage::Response,
                            LogComponent::Sse,
                            "client_gone",
                            "客户端断开，终止SSE合成"
                        );
                        drop(guard);
                        return;
                    }
                }
                let _ = task_writer.send_frame(DONE_FRAME).await;

                guard.complete(200, sse_cache_headers(), task_writer.captured_bytes());
                emit_usage(&gateway, &ctx).await;
            }
            Ok(LoopResult::Failure(failure)) => {
                let message = failure_message(&failure);
                let frame = error_frame(&message, failure.status);
                let _ = task_writer.send_frame(&frame).await;
                let _ = task_writer.send_frame(DONE_FRAME).await;
                guard.complete(200, sse_cache_headers(), task_writer.captured_bytes());
                lwarn!(
                    ctx.request_id,
                    LogStage::ResponseFailure,
                    LogComponent::Sse,
                    "all_attempts_failed",
                    "全部候选模型失败（流式）",
                    attempts = ctx.attempts,
                    kind = failure.kind.as_str()
                );
            }
            Err(_) => {
                let frame = error_frame("请求整体超时", Some(502));
                let _ = task_writer.send_frame(&frame).await;
                let _ = task_writer.send_frame(DONE_FRAME).await;
                drop(guard);
                lwarn!(
                    ctx.request_id,
                    LogStage::ResponseFailure,
                    LogComponent::Sse,
                    "deadline_exceeded",
                    "请求整体超时（流式）"
                );
            }
        }
    });

    // 流式前导：立刻交出200与SSE响应头，心跳任务已经在写第一帧
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(response_body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

// ================ 路由与降级 ================

/// 路由计划（决策的前半部分，链构建之前）
struct RoutePlan {
    tier: Tier,
    method: RouteMethod,
    confidence: f64,
    reasoning: String,
    pin: Option<String>,
    prefer_agentic: bool,
}

/// `auto` 请求的路由：会话固定优先，其次规则分类器
fn route_auto(
    gateway: &Gateway,
    ctx: &mut RequestContext,
    last_user_message: &str,
    first_system_message: &str,
    estimated_input_tokens: usize,
    has_tools: bool,
) -> RoutePlan {
    if let Some(session_id) = &ctx.session_id {
        if let Some(pinned) = gateway.sessions.get_pinned(session_id) {
            ldebug!(
                ctx.request_id,
                LogStage::Routing,
                LogComponent::SessionStore,
                "pin_hit",
                "命中会话固定",
                model = %pinned.model
            );
            return RoutePlan {
                tier: pinned.tier,
                method: RouteMethod::Session,
                confidence: 1.0,
                reasoning: format!("session pin: {}", pinned.model),
                pin: Some(pinned.model),
                prefer_agentic: has_tools,
            };
        }
    }

    let result = gateway.scorer.classify(
        last_user_message,
        first_system_message,
        estimated_input_tokens,
    );
    let tier = result.tier.unwrap_or_else(|| gateway.scorer.default_tier());
    let method = if result.override_applied.is_some() {
        RouteMethod::Override
    } else {
        RouteMethod::Rules
    };

    RoutePlan {
        tier,
        method,
        confidence: result.confidence,
        reasoning: result.reasoning,
        pin: None,
        prefer_agentic: has_tools || result.prefers_agentic,
    }
}

/// 显式模型请求的层级归类：取包含该模型的层级，否则 MEDIUM
fn tier_of_model(gateway: &Gateway, model: &str) -> Tier {
    for tier in Tier::all() {
        let models = gateway.selector.tier_models(tier);
        if models.primary == model || models.fallback.iter().any(|m| m == model) {
            return tier;
        }
    }
    Tier::Medium
}

/// 降级循环的结果
enum LoopResult {
    Success {
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
        model: String,
    },
    Failure(ProviderFailure),
}

/// 降级循环：按链逐个模型尝试，整体受调用方的统一截止时间约束
async fn run_fallback_loop(
    gateway: &Gateway,
    ctx: &mut RequestContext,
    chain: &[String],
    body_value: &mut Value,
    estimated_input_tokens: usize,
    max_output_tokens: usize,
) -> LoopResult {
    let mut last_failure: Option<ProviderFailure> = None;

    for (index, model) in chain.iter().enumerate() {
        let is_last = index + 1 == chain.len();

        // a. 当前模型写入请求体；消息规范化按该模型的提供商族执行（幂等）
        if let Some(obj) = body_value.as_object_mut() {
            obj.insert("model".to_string(), Value::String(model.clone()));
        }
        normalize_messages(body_value, model);

        let body_bytes = match serde_json::to_vec(body_value) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                return LoopResult::Failure(ProviderFailure {
                    status: None,
                    body: Bytes::from(format!("请求体序列化失败: {e}")),
                    retryable: false,
                    kind: crate::provider::FailureKind::Other,
                });
            }
        };

        let request = UpstreamRequest {
            model: model.clone(),
            body: body_bytes,
            estimated_input_tokens,
            max_output_tokens,
            request_id: ctx.request_id.clone(),
        };

        // 按优先级取首个可服务该模型的提供商
        let Some(provider) = gateway.registry.providers_for_model(model).into_iter().next()
        else {
            lwarn!(
                ctx.request_id,
                LogStage::UpstreamRequest,
                LogComponent::Registry,
                "no_provider",
                "没有提供商可服务该模型",
                model = %model
            );
            last_failure = Some(ProviderFailure {
                status: None,
                body: Bytes::from(format!("没有提供商可服务模型 {model}")),
                retryable: true,
                kind: crate::provider::FailureKind::Capacity,
            });
            continue;
        };

        ctx.attempts += 1;
        match provider.execute(&request).await {
            ProviderResponse::Success {
                status,
                headers,
                body,
            } => {
                linfo!(
                    ctx.request_id,
                    LogStage::Response,
                    LogComponent::Handler,
                    "upstream_ok",
                    "上游响应成功",
                    model = %model,
                    provider = %provider.id(),
                    status = status,
                    attempt = ctx.attempts
                );
                return LoopResult::Success {
                    status,
                    headers,
                    body,
                    model: model.clone(),
                };
            }
            ProviderResponse::Failure(failure) => {
                lwarn!(
                    ctx.request_id,
                    LogStage::ResponseFailure,
                    LogComponent::Handler,
                    "upstream_failed",
                    "上游尝试失败",
                    model = %model,
                    provider = %provider.id(),
                    status = failure.status.unwrap_or(0),
                    kind = failure.kind.as_str(),
                    retryable = failure.retryable,
                    attempt = ctx.attempts
                );
                let retryable = failure.retryable;
                last_failure = Some(failure);
                if retryable && !is_last {
                    continue;
                }
                break;
            }
        }
    }

    LoopResult::Failure(last_failure.unwrap_or_else(|| ProviderFailure {
        status: None,
        body: Bytes::from_static("候选链为空".as_bytes()),
        retryable: false,
        kind: crate::provider::FailureKind::Capacity,
    }))
}

// ================ 决策与用量 ================

/// 实际使用模型与初始决策不同（降级生效）时更新决策
fn finalize_decision(
    gateway: &Gateway,
    ctx: &mut RequestContext,
    model_used: &str,
    estimated_input_tokens: usize,
    max_output_tokens: usize,
) {
    let Some(decision) = ctx.decision.as_mut() else {
        return;
    };
    if decision.model != model_used {
        let (cost, baseline, savings) =
            cost_triple(gateway, model_used, estimated_input_tokens, max_output_tokens);
        decision.model = model_used.to_string();
        decision.method = RouteMethod::Fallback;
        decision.cost_estimate = cost;
        decision.baseline_cost = baseline;
        decision.savings = savings;
    }
}

/// 成功完成后的用量汇报与余额乐观通知
async fn emit_usage(gateway: &Gateway, ctx: &RequestContext) {
    let Some(decision) = &ctx.decision else {
        return;
    };
    gateway.usage.emit(UsageEvent {
        timestamp: Utc::now(),
        model: decision.model.clone(),
        tier: decision.tier,
        cost_estimate: decision.cost_estimate,
        baseline_cost: decision.baseline_cost,
        savings: decision.savings,
        latency_ms: ctx.elapsed_ms(),
        attempts: ctx.attempts,
    });
    gateway.balance.notify_spend(decision.cost_estimate).await;
}

/// 估算费用三元组：(该模型费用, 基准模型费用, 节省率)
fn cost_triple(
    gateway: &Gateway,
    model: &str,
    input_tokens: usize,
    output_tokens: usize,
) -> (f64, f64, f64) {
    let cost = gateway
        .catalog
        .get(model)
        .map_or(0.0, |m| m.estimate_cost(input_tokens, output_tokens));
    let baseline = gateway
        .catalog
        .get(&gateway.config.routing.baseline_model)
        .map_or(0.0, |m| m.estimate_cost(input_tokens, output_tokens));
    let savings = if baseline > 0.0 {
        (1.0 - cost / baseline).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (cost, baseline, savings)
}

// ================ 响应构造 ================

/// 统一的JSON错误响应
fn error_response(error: &GatewayError) -> Response {
    (error.status_code(), Json(error.to_error_body())).into_response()
}

/// 回放去重缓存的响应（字节级一致）
fn replay_response(cached: &CachedResponse) -> Response {
    build_upstream_response(cached.status, &cached.headers, cached.body.clone())
}

/// 按上游的状态与响应头（剔除逐跳头）构造响应
fn build_upstream_response(status: u16, headers: &[(String, String)], body: Bytes) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY));
    for (name, value) in headers {
        if is_hop_by_hop(name) {
            continue;
        }
        if let Ok(value) = HeaderValue::from_str(value) {
            builder = builder.header(name.as_str(), value);
        }
    }
    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// 终态失败的响应：有上游状态则原样转发上游响应体，纯网络错误为502信封
fn terminal_failure_response(failure: &ProviderFailure) -> (u16, Response) {
    match failure.status {
        Some(status) => (
            status,
            build_upstream_response(
                status,
                &[("content-type".to_string(), "application/json".to_string())],
                failure.body.clone(),
            ),
        ),
        None => {
            let error = GatewayError::bad_gateway(failure_message(failure));
            (502, error_response(&error))
        }
    }
}

/// 终态失败的缓存响应体
fn body_bytes_of(failure: &ProviderFailure) -> Bytes {
    match failure.status {
        Some(_) => failure.body.clone(),
        None => {
            let error = GatewayError::bad_gateway(failure_message(failure));
            Bytes::from(error.to_error_body().to_string())
        }
    }
}

/// 从失败详情提取人类可读消息
fn failure_message(failure: &ProviderFailure) -> String {
    let text = String::from_utf8_lossy(&failure.body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        format!("上游失败: {}", failure.kind.as_str())
    } else {
        // 错误体截断到512字符
        trimmed.chars().take(512).collect()
    }
}

/// 流式响应写入去重缓存时使用的响应头
fn sse_cache_headers() -> Vec<(String, String)> {
    vec![
        ("content-type".to_string(), "text/event-stream".to_string()),
        ("cache-control".to_string(), "no-cache".to_string()),
    ]
}
