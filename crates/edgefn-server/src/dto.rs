//! Wire types for the management HTTP surface (spec §6). Kept separate
//! from `edgefn_common::model` so the storage model's field names
//! (`artifact`, `source`, audit timestamps) never have to bend to match an
//! external request/response shape.

use edgefn_common::model::{CorsOverrides, FunctionPermissions, FunctionRecord, FunctionSource};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct SupportingFileSpec {
    pub path: String,
    pub content: String,
}

/// Body of `POST /functions` and, partially, `PUT /functions/:name` (every
/// field optional there). `code` is the human-authored source; everything
/// else mirrors a `FunctionRecord`'s spec-facing fields.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FunctionSpec {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub description: Option<String>,
    pub code: Option<String>,
    #[serde(default)]
    pub supporting_files: Vec<SupportingFileSpec>,
    pub import_map: Option<String>,
    pub allow_net: Option<bool>,
    pub allow_env: Option<bool>,
    pub allow_read: Option<bool>,
    pub allow_write: Option<bool>,
    pub allow_unauthenticated: Option<bool>,
    pub is_public: Option<bool>,
    pub timeout_seconds: Option<u32>,
    pub memory_limit_mb: Option<u32>,
    pub cron_schedule: Option<String>,
    pub enabled: Option<bool>,
    pub cors: Option<CorsOverrides>,
}

impl FunctionSpec {
    pub fn permissions(&self, existing: FunctionPermissions) -> FunctionPermissions {
        FunctionPermissions {
            allow_net: self.allow_net.unwrap_or(existing.allow_net),
            allow_env: self.allow_env.unwrap_or(existing.allow_env),
            allow_read: self.allow_read.unwrap_or(existing.allow_read),
            allow_write: self.allow_write.unwrap_or(existing.allow_write),
        }
    }
}

/// Public JSON projection of a [`FunctionRecord`]. Exists mainly to rename
/// `artifact` to the API-facing `code` (spec §6: "Load full function
/// (includes `code` and `original_code`)").
#[derive(Debug, Clone, Serialize)]
pub struct FunctionResponse {
    pub namespace: String,
    pub name: String,
    pub description: String,
    pub original_code: String,
    pub code: String,
    pub is_bundled: bool,
    pub bundle_error: Option<String>,
    pub version: u64,
    pub enabled: bool,
    pub allow_net: bool,
    pub allow_env: bool,
    pub allow_read: bool,
    pub allow_write: bool,
    pub allow_unauthenticated: bool,
    pub is_public: bool,
    pub timeout_seconds: u32,
    pub memory_limit_mb: Option<u32>,
    pub cron_schedule: Option<String>,
    pub cors: CorsOverrides,
    pub source: FunctionSource,
    pub created_at: i64,
    pub updated_at: i64,
    pub created_by: Option<String>,
}

impl From<FunctionRecord> for FunctionResponse {
    fn from(f: FunctionRecord) -> Self {
        Self {
            namespace: f.namespace.as_str().to_string(),
            name: f.name.as_str().to_string(),
            description: f.description,
            original_code: f.original_code,
            code: f.artifact,
            is_bundled: f.is_bundled,
            bundle_error: f.bundle_error,
            version: f.version,
            enabled: f.enabled,
            allow_net: f.permissions.allow_net,
            allow_env: f.permissions.allow_env,
            allow_read: f.permissions.allow_read,
            allow_write: f.permissions.allow_write,
            allow_unauthenticated: f.allow_unauthenticated,
            is_public: f.is_public,
            timeout_seconds: f.timeout_seconds,
            memory_limit_mb: f.memory_limit_mb,
            cron_schedule: f.cron_schedule.map(|c| c.as_str().to_string()),
            cors: f.cors,
            source: f.source,
            created_at: f.created_at.as_i64(),
            updated_at: f.updated_at.as_i64(),
            created_by: f.created_by,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListFunctionsQuery {
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExecutionsQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub after: Option<u32>,
}

/// Body of `POST /functions/sync` (spec §6).
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub namespace: String,
    pub functions: Vec<FunctionSpec>,
    #[serde(default)]
    pub options: SyncOptions,
}

#[derive(Debug, Deserialize, Default)]
pub struct SyncOptions {
    #[serde(default)]
    pub delete_missing: bool,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize, Default)]
pub struct SyncSummary {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: Vec<String>,
    pub errors: Vec<SyncError>,
}

#[derive(Debug, Serialize)]
pub struct SyncError {
    pub name: String,
    pub error: String,
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct ReloadSummary {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: Vec<String>,
    pub errors: Vec<SyncError>,
}

#[derive(Debug, Deserialize)]
pub struct SharedModuleSpec {
    pub content: String,
}
