//! The records of spec §3: Function, Supporting File, Shared Module,
//! Execution. Plain data types; the store (C1) is the only thing that
//! persists or queries them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{cron::CronSpec, name::FunctionName, name::Namespace, timestamp::UnixNanos};

/// Where a function definition came from. Determines how `/admin/functions/
/// reload` reconciles (spec §6): only `Filesystem` rows absent from a scan
/// are deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionSource {
    Filesystem,
    Api,
}

/// Advisory-only permission quadruple (spec §3): enforced by the sandbox's
/// own command-line flags (§4.3.1), not by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionPermissions {
    pub allow_net: bool,
    pub allow_env: bool,
    pub allow_read: bool,
    pub allow_write: bool,
}

impl Default for FunctionPermissions {
    fn default() -> Self {
        // net and env default on; read and write default off (spec §3).
        Self {
            allow_net: true,
            allow_env: true,
            allow_read: false,
            allow_write: false,
        }
    }
}

/// Per-function CORS overrides. Each field `None` means "inherit global"
/// (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsOverrides {
    pub allow_origin: Option<String>,
    pub allow_methods: Option<String>,
    pub allow_headers: Option<String>,
    pub expose_headers: Option<String>,
    pub max_age_seconds: Option<u32>,
}

pub const DEFAULT_TIMEOUT_SECONDS: u32 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub namespace: Namespace,
    pub name: FunctionName,
    pub description: String,

    pub original_code: String,
    pub artifact: String,
    pub is_bundled: bool,
    pub bundle_error: Option<String>,

    pub version: u64,
    pub enabled: bool,

    pub permissions: FunctionPermissions,
    pub allow_unauthenticated: bool,
    pub is_public: bool,

    pub timeout_seconds: u32,
    pub memory_limit_mb: Option<u32>,
    pub cron_schedule: Option<CronSpec>,

    pub cors: CorsOverrides,

    pub source: FunctionSource,
    pub created_at: UnixNanos,
    pub updated_at: UnixNanos,
    pub created_by: Option<String>,
}

impl FunctionRecord {
    /// Whether this function should currently be bound in the cron table
    /// (spec §4.4.1: "every function whose `enabled` is true and whose
    /// `cron_schedule` is non-empty").
    pub fn is_cron_eligible(&self) -> bool {
        self.enabled && self.cron_schedule.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportingFileRecord {
    pub namespace: Namespace,
    pub function_name: FunctionName,
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedModuleRecord {
    /// Must start with `_shared/` (spec §3).
    pub path: String,
    pub content: String,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Http,
    Cron,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub namespace: Namespace,
    pub function_name: FunctionName,
    pub trigger: TriggerType,
    pub status: ExecutionStatus,
    pub http_status: Option<u16>,
    pub duration_ms: Option<u64>,
    pub result: Option<String>,
    pub aggregate_logs: Option<String>,
    pub error_message: Option<String>,
    pub started_at: UnixNanos,
    pub completed_at: Option<UnixNanos>,
}
