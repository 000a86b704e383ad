//! `POST /admin/functions/reload` (spec §6): scans the configured
//! filesystem directory and reconciles it with the catalogue. Only rows
//! whose `source=filesystem` and that are absent from the scan are deleted
//! -- API-created functions are left untouched even if they share a name
//! with nothing on disk.

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use edgefn_bundler::ExternalBundler;
use edgefn_common::model::{FunctionPermissions, FunctionRecord, FunctionSource, SupportingFileRecord};
use edgefn_common::{FunctionName, Namespace, UnixNanos};
use edgefn_errors::EdgeError;
use edgefn_invoker::SandboxRuntime;
use edgefn_store::CatalogueStore;

use crate::{
    auth, bundling,
    dto::{ReloadSummary, SyncError},
    error_response::{ApiError, ApiResult},
    fs_layout,
    state::AppState,
};

fn require_admin(config: &edgefn_config::GlobalConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    if auth::is_admin_authorized(config, headers) {
        Ok(())
    } else {
        Err(ApiError::from(EdgeError::auth_required()))
    }
}

pub async fn reload<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    State(state): State<AppState<S, B, R>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    require_admin(&state.config, &headers)?;
    let Some(dir) = state.config.functions_dir.clone() else {
        return Err(EdgeError::store_error("no functions_dir configured for this process").into());
    };

    let shared_modules = fs_layout::scan_shared_modules(&dir).await?;
    for (path, content) in &shared_modules {
        state
            .store
            .put_shared_module(path, content.clone())
            .await
            ?;
    }

    let scanned = fs_layout::scan_functions(&dir).await?;
    let namespace = Namespace::default_namespace();
    let mut summary = ReloadSummary::default();
    let mut seen_names = std::collections::BTreeSet::new();

    for function in scanned {
        seen_names.insert(function.name.clone());
        match reload_one(&state, &namespace, &function).await {
            Ok(true) => summary.created.push(function.name),
            Ok(false) => summary.updated.push(function.name),
            Err(err) => summary.errors.push(SyncError {
                name: function.name,
                error: err.short_msg().to_string(),
                details: Some(err.msg.to_string()),
            }),
        }
    }

    let existing = state
        .store
        .list_all_functions()
        .await
        ?;
    for record in existing
        .into_iter()
        .filter(|f| f.namespace == namespace && f.source == FunctionSource::Filesystem)
    {
        if seen_names.contains(record.name.as_str()) {
            continue;
        }
        state
            .store
            .delete_function(&record.namespace, &record.name)
            .await
            ?;
        state.scheduler.unschedule(&record.namespace, &record.name);
        summary.deleted.push(record.name.as_str().to_string());
    }

    Ok(Json(summary).into_response())
}

/// Returns `Ok(true)` on create, `Ok(false)` on update.
async fn reload_one<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    state: &AppState<S, B, R>,
    namespace: &Namespace,
    scanned: &fs_layout::ScannedFunction,
) -> Result<bool, EdgeError> {
    let name = FunctionName::parse(scanned.name.clone())?;
    let bundled = bundling::bundle_for_function(
        state.store.as_ref(),
        state.bundler.as_ref(),
        bundling::BundleRequest {
            main_code: scanned.main_code.clone(),
            supporting_files: scanned.supporting_files.clone(),
            import_map: scanned.import_map.clone(),
        },
    )
    .await?;

    let supporting_file_records: Vec<SupportingFileRecord> = scanned
        .supporting_files
        .iter()
        .map(|(path, content)| SupportingFileRecord {
            namespace: namespace.clone(),
            function_name: name.clone(),
            path: path.clone(),
            content: content.clone(),
        })
        .collect();

    let existing = state
        .store
        .get_function(namespace, &name)
        .await
        ?;

    let created = match existing {
        Some(mut record) => {
            record.original_code = scanned.main_code.clone();
            record.artifact = bundled.artifact;
            record.is_bundled = bundled.is_bundled;
            record.bundle_error = bundled.bundle_error;
            record.version += 1;
            record.updated_at = UnixNanos::now();
            let updated = state.store.update_function(record).await?;
            state.scheduler.reschedule(&updated.namespace, &updated.name, updated.cron_schedule.as_ref(), updated.enabled);
            false
        }
        None => {
            let now = UnixNanos::now();
            let record = FunctionRecord {
                namespace: namespace.clone(),
                name,
                description: String::new(),
                original_code: scanned.main_code.clone(),
                artifact: bundled.artifact,
                is_bundled: bundled.is_bundled,
                bundle_error: bundled.bundle_error,
                version: 1,
                enabled: true,
                permissions: FunctionPermissions::default(),
                allow_unauthenticated: false,
                is_public: true,
                timeout_seconds: state.config.clamp_timeout(30),
                memory_limit_mb: None,
                cron_schedule: None,
                cors: Default::default(),
                source: FunctionSource::Filesystem,
                created_at: now,
                updated_at: now,
                created_by: None,
            };
            let created = state.store.create_function(record).await?;
            state.scheduler.schedule(&created.namespace, &created.name, created.cron_schedule.as_ref(), created.enabled);
            true
        }
    };

    state
        .store
        .replace_supporting_files(namespace, &FunctionName::parse(scanned.name.clone())?, supporting_file_records)
        .await
        ?;

    Ok(created)
}
