//! Management and invocation handlers for `/functions` (spec §6). Each
//! management handler checks [`auth::is_admin_authorized`] first; `invoke`
//! instead applies the function's own `allow_unauthenticated` policy.

use std::{collections::BTreeMap, time::Duration};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use edgefn_bundler::ExternalBundler;
use edgefn_common::{
    model::{ExecutionRecord, ExecutionStatus, FunctionPermissions, FunctionRecord, FunctionSource, TriggerType},
    CronSpec, FunctionName, Namespace, UnixNanos,
};
use edgefn_errors::EdgeError;
use edgefn_invoker::{InvokeParams, InvokeRequest, SandboxRuntime};
use edgefn_store::CatalogueStore;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth, bundling, cors,
    dto::{
        ExecutionsQuery, FunctionResponse, FunctionSpec, ListFunctionsQuery, LogsQuery, SyncError, SyncRequest,
        SyncSummary,
    },
    error_response::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
}

fn require_admin(config: &edgefn_config::GlobalConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    if auth::is_admin_authorized(config, headers) {
        Ok(())
    } else {
        Err(ApiError::from(EdgeError::auth_required()))
    }
}

async fn resolve<S: CatalogueStore>(
    store: &S,
    name: &str,
    namespace: &Option<String>,
) -> Result<FunctionRecord, EdgeError> {
    let name = FunctionName::parse(name)?;
    let ns = namespace.as_ref().map(|n| Namespace::new(n.clone()));
    store
        .resolve_function(&name, ns.as_ref())
        .await
        ?
        .ok_or_else(|| EdgeError::not_found(format!("function \"{name}\"")))
}

pub async fn create_function<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    State(state): State<AppState<S, B, R>>,
    headers: HeaderMap,
    Json(spec): Json<FunctionSpec>,
) -> ApiResult<Response> {
    require_admin(&state.config, &headers)?;

    let name = FunctionName::parse(spec.name.clone().unwrap_or_default())?;
    let namespace = spec
        .namespace
        .clone()
        .map(Namespace::new)
        .unwrap_or_else(Namespace::default_namespace);
    let code = spec.code.clone().ok_or_else(|| EdgeError::invalid_code("\"code\" is required"))?;
    if code.is_empty() || code.len() > 1024 * 1024 {
        return Err(EdgeError::invalid_code("code must be non-empty and at most 1 MiB").into());
    }

    let supporting_files: Vec<(String, String)> =
        spec.supporting_files.iter().map(|f| (f.path.clone(), f.content.clone())).collect();

    let bundled = bundling::bundle_for_function(
        state.store.as_ref(),
        state.bundler.as_ref(),
        bundling::BundleRequest {
            main_code: code.clone(),
            supporting_files: supporting_files.clone(),
            import_map: spec.import_map.clone(),
        },
    )
    .await?;

    let cron_schedule = spec
        .cron_schedule
        .as_ref()
        .map(|c| CronSpec::parse(c.clone()).map_err(|e| EdgeError::invalid_name(e.to_string())))
        .transpose()?;

    let now = UnixNanos::now();
    let created_by = headers
        .get("x-edgefn-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let record = FunctionRecord {
        namespace,
        name,
        description: spec.description.clone().unwrap_or_default(),
        original_code: code,
        artifact: bundled.artifact,
        is_bundled: bundled.is_bundled,
        bundle_error: bundled.bundle_error,
        version: 1,
        enabled: spec.enabled.unwrap_or(true),
        permissions: spec.permissions(FunctionPermissions::default()),
        allow_unauthenticated: spec.allow_unauthenticated.unwrap_or(false),
        is_public: spec.is_public.unwrap_or(true),
        timeout_seconds: state.config.clamp_timeout(spec.timeout_seconds.unwrap_or(30)),
        memory_limit_mb: spec.memory_limit_mb,
        cron_schedule,
        cors: spec.cors.clone().unwrap_or_default(),
        source: FunctionSource::Api,
        created_at: now,
        updated_at: now,
        created_by,
    };

    let created = state
        .store
        .create_function(record)
        .await
        ?;

    let file_records = supporting_files
        .into_iter()
        .map(|(path, content)| edgefn_common::model::SupportingFileRecord {
            namespace: created.namespace.clone(),
            function_name: created.name.clone(),
            path,
            content,
        })
        .collect();
    state
        .store
        .replace_supporting_files(&created.namespace, &created.name, file_records)
        .await
        ?;

    state.scheduler.schedule(&created.namespace, &created.name, created.cron_schedule.as_ref(), created.enabled);

    Ok((StatusCode::CREATED, Json(FunctionResponse::from(created))).into_response())
}

pub async fn list_functions<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    State(state): State<AppState<S, B, R>>,
    headers: HeaderMap,
    Query(query): Query<ListFunctionsQuery>,
) -> ApiResult<Response> {
    require_admin(&state.config, &headers)?;
    let ns = query.namespace.map(Namespace::new);
    let summaries = state
        .store
        .list_public(ns.as_ref())
        .await
        ?;
    Ok(Json(summaries).into_response())
}

pub async fn get_function<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    State(state): State<AppState<S, B, R>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult<Response> {
    require_admin(&state.config, &headers)?;
    let function = resolve(state.store.as_ref(), &name, &query.namespace).await?;
    Ok(Json(FunctionResponse::from(function)).into_response())
}

pub async fn update_function<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    State(state): State<AppState<S, B, R>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(query): Query<NamespaceQuery>,
    Json(spec): Json<FunctionSpec>,
) -> ApiResult<Response> {
    require_admin(&state.config, &headers)?;
    let mut existing = resolve(state.store.as_ref(), &name, &query.namespace).await?;

    if let Some(description) = spec.description.clone() {
        existing.description = description;
    }
    if let Some(code) = spec.code.clone() {
        if code.is_empty() || code.len() > 1024 * 1024 {
            return Err(EdgeError::invalid_code("code must be non-empty and at most 1 MiB").into());
        }
        let supporting_files: Vec<(String, String)> =
            spec.supporting_files.iter().map(|f| (f.path.clone(), f.content.clone())).collect();
        let bundled = bundling::bundle_for_function(
            state.store.as_ref(),
            state.bundler.as_ref(),
            bundling::BundleRequest {
                main_code: code.clone(),
                supporting_files: supporting_files.clone(),
                import_map: spec.import_map.clone(),
            },
        )
        .await?;
        existing.original_code = code;
        existing.artifact = bundled.artifact;
        existing.is_bundled = bundled.is_bundled;
        existing.bundle_error = bundled.bundle_error;

        let file_records = supporting_files
            .into_iter()
            .map(|(path, content)| edgefn_common::model::SupportingFileRecord {
                namespace: existing.namespace.clone(),
                function_name: existing.name.clone(),
                path,
                content,
            })
            .collect();
        state
            .store
            .replace_supporting_files(&existing.namespace, &existing.name, file_records)
            .await
            ?;
    }
    existing.permissions = spec.permissions(existing.permissions);
    if let Some(allow_unauthenticated) = spec.allow_unauthenticated {
        existing.allow_unauthenticated = allow_unauthenticated;
    }
    if let Some(is_public) = spec.is_public {
        existing.is_public = is_public;
    }
    if let Some(timeout_seconds) = spec.timeout_seconds {
        existing.timeout_seconds = state.config.clamp_timeout(timeout_seconds);
    }
    if spec.memory_limit_mb.is_some() {
        existing.memory_limit_mb = spec.memory_limit_mb;
    }
    if let Some(cron) = &spec.cron_schedule {
        existing.cron_schedule = Some(CronSpec::parse(cron.clone()).map_err(|e| EdgeError::invalid_name(e.to_string()))?);
    }
    if let Some(enabled) = spec.enabled {
        existing.enabled = enabled;
    }
    if let Some(cors) = spec.cors.clone() {
        existing.cors = cors;
    }
    existing.version += 1;
    existing.updated_at = UnixNanos::now();

    let updated = state
        .store
        .update_function(existing)
        .await
        ?;

    state.scheduler.reschedule(&updated.namespace, &updated.name, updated.cron_schedule.as_ref(), updated.enabled);

    Ok(Json(FunctionResponse::from(updated)).into_response())
}

pub async fn delete_function<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    State(state): State<AppState<S, B, R>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult<Response> {
    require_admin(&state.config, &headers)?;
    let function = resolve(state.store.as_ref(), &name, &query.namespace).await?;
    state
        .store
        .delete_function(&function.namespace, &function.name)
        .await
        ?;
    state.scheduler.unschedule(&function.namespace, &function.name);
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn list_executions<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    State(state): State<AppState<S, B, R>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(ns_query): Query<NamespaceQuery>,
    Query(query): Query<ExecutionsQuery>,
) -> ApiResult<Response> {
    require_admin(&state.config, &headers)?;
    let function = resolve(state.store.as_ref(), &name, &ns_query.namespace).await?;
    let limit = query.limit.unwrap_or(50).min(100);
    let executions = state
        .store
        .list_executions(&function.namespace, &function.name, limit)
        .await
        ?;
    Ok(Json(executions).into_response())
}

pub async fn tail_logs<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    State(state): State<AppState<S, B, R>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Response> {
    require_admin(&state.config, &headers)?;
    let after = query.after.unwrap_or(0);
    let lines = state
        .store
        .log_lines_since(id, after)
        .await
        ?;
    Ok(Json(lines).into_response())
}

/// `POST /functions/:name/invoke`: the one endpoint governed by the
/// function's own `allow_unauthenticated`/CORS policy rather than the admin
/// bearer token (spec §6 "Function invocation contract").
pub async fn invoke<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    State(state): State<AppState<S, B, R>>,
    Path(name): Path<String>,
    Query(ns_query): Query<NamespaceQuery>,
    Query(query_params): Query<BTreeMap<String, String>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let request_origin = headers.get(axum::http::header::ORIGIN).and_then(|v| v.to_str().ok()).map(str::to_string);

    let function = resolve(state.store.as_ref(), &name, &ns_query.namespace).await?;
    let effective_cors = cors::merge(&function.cors, &state.config.cors_defaults);

    if method == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        cors::apply_headers(response.headers_mut(), &effective_cors, request_origin.as_deref());
        return Ok(response);
    }

    if !function.enabled {
        return Err(EdgeError::function_disabled(&function.name).into());
    }
    if !function.allow_unauthenticated && !auth::has_invoke_credential(&headers) {
        return Err(EdgeError::auth_required().into());
    }

    let header_map: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();
    let body_string = if body.is_empty() { None } else { Some(String::from_utf8_lossy(&body).to_string()) };

    let user_id = headers.get("x-edgefn-user-id").and_then(|v| v.to_str().ok()).map(str::to_string);
    let request = InvokeRequest {
        method: method.as_str().to_string(),
        url: uri.to_string(),
        base_url: String::new(),
        headers: header_map,
        body: body_string,
        params: query_params,
        user_id,
        user_email: None,
        user_role: None,
        session_id: None,
    };

    let execution_id = Uuid::new_v4();
    state.demux.register(execution_id);
    let started_at = UnixNanos::now();
    state
        .store
        .create_execution(ExecutionRecord {
            id: execution_id,
            namespace: function.namespace.clone(),
            function_name: function.name.clone(),
            trigger: TriggerType::Http,
            status: ExecutionStatus::Running,
            http_status: None,
            duration_ms: None,
            result: None,
            aggregate_logs: None,
            error_message: None,
            started_at,
            completed_at: None,
        })
        .await
        ?;

    let sink = state.demux.sink_for(execution_id);
    let timeout = Duration::from_secs(function.timeout_seconds as u64);
    let outcome = state
        .runtime
        .invoke(
            InvokeParams {
                execution_id,
                artifact: function.artifact.clone(),
                request,
                permissions: function.permissions,
                timeout,
                memory_limit_mb: function.memory_limit_mb,
                user_env: Vec::new(),
            },
            &sink,
            tokio_util::sync::CancellationToken::new(),
        )
        .await;

    let response = build_invoke_response(&state, execution_id, outcome).await?;
    let mut response = response;
    cors::apply_headers(response.headers_mut(), &effective_cors, request_origin.as_deref());
    Ok(response)
}

async fn build_invoke_response<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    state: &AppState<S, B, R>,
    execution_id: Uuid,
    outcome: Result<edgefn_invoker::InvokeOutcome, EdgeError>,
) -> ApiResult<Response> {
    let completion_store = state.store.clone();
    let demux = state.demux.clone();

    match outcome {
        Ok(outcome) => {
            let status = StatusCode::from_u16(outcome.response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = outcome.response.body.clone().unwrap_or_default();
            let mut response = (status, body).into_response();
            for (key, value) in &outcome.response.headers {
                if let (Ok(name), Ok(val)) = (
                    axum::http::HeaderName::from_bytes(key.as_bytes()),
                    axum::http::HeaderValue::from_str(value),
                ) {
                    response.headers_mut().insert(name, val);
                }
            }

            let completion = edgefn_store::ExecutionCompletion {
                status: if outcome.error.is_some() { ExecutionStatus::Error } else { ExecutionStatus::Success },
                http_status: Some(outcome.response.status),
                duration_ms: outcome.duration_ms,
                result: outcome.response.body,
                aggregate_logs: outcome.aggregate_logs,
                error_message: outcome.error,
            };
            tokio::spawn(async move {
                if let Err(err) = completion_store.complete_execution(execution_id, completion).await {
                    tracing::warn!(%execution_id, %err, "failed to finalize execution row");
                }
                demux.unregister(execution_id);
            });

            Ok(response)
        }
        Err(err) => {
            let completion = edgefn_store::ExecutionCompletion {
                status: ExecutionStatus::Error,
                http_status: None,
                duration_ms: 0,
                result: None,
                aggregate_logs: None,
                error_message: Some(err.msg.to_string()),
            };
            tokio::spawn(async move {
                if let Err(e) = completion_store.complete_execution(execution_id, completion).await {
                    tracing::warn!(%execution_id, %e, "failed to finalize execution row");
                }
                demux.unregister(execution_id);
            });
            Err(err.into())
        }
    }
}

/// `POST /functions/sync` (spec §6): bulk upsert into one namespace.
/// Partial failures are collected per-function rather than aborting the
/// whole batch (spec §7 "bulk sync never aborts on the first error").
pub async fn sync_functions<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    State(state): State<AppState<S, B, R>>,
    headers: HeaderMap,
    Json(request): Json<SyncRequest>,
) -> ApiResult<Response> {
    require_admin(&state.config, &headers)?;
    let namespace = Namespace::new(request.namespace.clone());
    let mut summary = SyncSummary::default();
    let mut seen_names = std::collections::BTreeSet::new();

    for spec in &request.functions {
        let Some(name_raw) = spec.name.clone() else {
            summary.errors.push(SyncError {
                name: String::new(),
                error: "missing_name".to_string(),
                details: Some("every sync entry must name the function".to_string()),
            });
            continue;
        };
        match sync_one(&state, &namespace, spec, request.options.dry_run).await {
            Ok(outcome) => {
                seen_names.insert(name_raw.clone());
                match outcome {
                    SyncOutcome::Created => summary.created.push(name_raw),
                    SyncOutcome::Updated => summary.updated.push(name_raw),
                    SyncOutcome::Unchanged => summary.unchanged.push(name_raw),
                }
            }
            Err(err) => summary.errors.push(SyncError {
                name: name_raw,
                error: err.short_msg().to_string(),
                details: Some(err.msg.to_string()),
            }),
        }
    }

    if request.options.delete_missing {
        let existing = state
            .store
            .list_all_functions()
            .await
            ?;
        for function in existing.into_iter().filter(|f| f.namespace == namespace) {
            if seen_names.contains(function.name.as_str()) {
                continue;
            }
            if !request.options.dry_run {
                state
                    .store
                    .delete_function(&function.namespace, &function.name)
                    .await
                    ?;
                state.scheduler.unschedule(&function.namespace, &function.name);
            }
            summary.deleted.push(function.name.as_str().to_string());
        }
    }

    Ok(Json(summary).into_response())
}

enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
}

async fn sync_one<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    state: &AppState<S, B, R>,
    namespace: &Namespace,
    spec: &crate::dto::FunctionSpec,
    dry_run: bool,
) -> Result<SyncOutcome, EdgeError> {
    let name = FunctionName::parse(spec.name.clone().unwrap_or_default())?;
    let existing = state
        .store
        .get_function(namespace, &name)
        .await
        ?;

    let Some(mut existing) = existing else {
        let code = spec.code.clone().ok_or_else(|| EdgeError::invalid_code("\"code\" is required for new functions"))?;
        if dry_run {
            // Validate the bundle would succeed without persisting anything.
            bundling::bundle_for_function(
                state.store.as_ref(),
                state.bundler.as_ref(),
                bundling::BundleRequest {
                    main_code: code,
                    supporting_files: spec.supporting_files.iter().map(|f| (f.path.clone(), f.content.clone())).collect(),
                    import_map: spec.import_map.clone(),
                },
            )
            .await?;
            return Ok(SyncOutcome::Created);
        }

        let supporting_files: Vec<(String, String)> =
            spec.supporting_files.iter().map(|f| (f.path.clone(), f.content.clone())).collect();
        let bundled = bundling::bundle_for_function(
            state.store.as_ref(),
            state.bundler.as_ref(),
            bundling::BundleRequest {
                main_code: code.clone(),
                supporting_files: supporting_files.clone(),
                import_map: spec.import_map.clone(),
            },
        )
        .await?;
        let now = UnixNanos::now();
        let record = FunctionRecord {
            namespace: namespace.clone(),
            name,
            description: spec.description.clone().unwrap_or_default(),
            original_code: code,
            artifact: bundled.artifact,
            is_bundled: bundled.is_bundled,
            bundle_error: bundled.bundle_error,
            version: 1,
            enabled: spec.enabled.unwrap_or(true),
            permissions: spec.permissions(FunctionPermissions::default()),
            allow_unauthenticated: spec.allow_unauthenticated.unwrap_or(false),
            is_public: spec.is_public.unwrap_or(true),
            timeout_seconds: state.config.clamp_timeout(spec.timeout_seconds.unwrap_or(30)),
            memory_limit_mb: spec.memory_limit_mb,
            cron_schedule: spec
                .cron_schedule
                .as_ref()
                .map(|c| CronSpec::parse(c.clone()).map_err(|e| EdgeError::invalid_name(e.to_string())))
                .transpose()?,
            cors: spec.cors.clone().unwrap_or_default(),
            source: FunctionSource::Filesystem,
            created_at: now,
            updated_at: now,
            created_by: None,
        };
        let created = state.store.create_function(record).await?;
        state
            .store
            .replace_supporting_files(
                &created.namespace,
                &created.name,
                supporting_files
                    .into_iter()
                    .map(|(path, content)| edgefn_common::model::SupportingFileRecord {
                        namespace: created.namespace.clone(),
                        function_name: created.name.clone(),
                        path,
                        content,
                    })
                    .collect(),
            )
            .await
            ?;
        state.scheduler.schedule(&created.namespace, &created.name, created.cron_schedule.as_ref(), created.enabled);
        return Ok(SyncOutcome::Created);
    };

    let code_unchanged = match spec.code.as_deref() {
        Some(c) => c == existing.original_code,
        None => true,
    };
    let fields_unchanged = spec.description.is_none()
        && spec.allow_net.is_none()
        && spec.allow_env.is_none()
        && spec.allow_read.is_none()
        && spec.allow_write.is_none()
        && spec.allow_unauthenticated.is_none()
        && spec.is_public.is_none()
        && spec.timeout_seconds.is_none()
        && spec.memory_limit_mb.is_none()
        && spec.cron_schedule.is_none()
        && spec.enabled.is_none()
        && spec.cors.is_none();
    if code_unchanged && fields_unchanged {
        return Ok(SyncOutcome::Unchanged);
    }
    if dry_run {
        return Ok(SyncOutcome::Updated);
    }

    if let Some(code) = spec.code.clone() {
        let supporting_files: Vec<(String, String)> =
            spec.supporting_files.iter().map(|f| (f.path.clone(), f.content.clone())).collect();
        let bundled = bundling::bundle_for_function(
            state.store.as_ref(),
            state.bundler.as_ref(),
            bundling::BundleRequest {
                main_code: code.clone(),
                supporting_files: supporting_files.clone(),
                import_map: spec.import_map.clone(),
            },
        )
        .await?;
        existing.original_code = code;
        existing.artifact = bundled.artifact;
        existing.is_bundled = bundled.is_bundled;
        existing.bundle_error = bundled.bundle_error;
        state
            .store
            .replace_supporting_files(
                &existing.namespace,
                &existing.name,
                supporting_files
                    .into_iter()
                    .map(|(path, content)| edgefn_common::model::SupportingFileRecord {
                        namespace: existing.namespace.clone(),
                        function_name: existing.name.clone(),
                        path,
                        content,
                    })
                    .collect(),
            )
            .await
            ?;
    }
    existing.permissions = spec.permissions(existing.permissions);
    if let Some(v) = spec.allow_unauthenticated {
        existing.allow_unauthenticated = v;
    }
    if let Some(v) = spec.is_public {
        existing.is_public = v;
    }
    if let Some(v) = spec.timeout_seconds {
        existing.timeout_seconds = state.config.clamp_timeout(v);
    }
    if spec.memory_limit_mb.is_some() {
        existing.memory_limit_mb = spec.memory_limit_mb;
    }
    if let Some(cron) = &spec.cron_schedule {
        existing.cron_schedule = Some(CronSpec::parse(cron.clone()).map_err(|e| EdgeError::invalid_name(e.to_string()))?);
    }
    if let Some(v) = spec.enabled {
        existing.enabled = v;
    }
    if let Some(cors) = spec.cors.clone() {
        existing.cors = cors;
    }
    existing.version += 1;
    existing.updated_at = UnixNanos::now();
    let updated = state.store.update_function(existing).await?;
    state.scheduler.reschedule(&updated.namespace, &updated.name, updated.cron_schedule.as_ref(), updated.enabled);
    Ok(SyncOutcome::Updated)
}
