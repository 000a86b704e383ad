//! C1: the Catalogue Store. Durable record of functions, supporting files,
//! shared modules, executions, and log lines, with the transactional CRUD
//! and query primitives spec §4.1 requires.

mod schema;
mod sqlite_store;

use async_trait::async_trait;
use edgefn_common::{
    model::{ExecutionRecord, ExecutionStatus, FunctionRecord, SharedModuleRecord, SupportingFileRecord},
    ExecutionLogLine, FunctionName, LogLevel, Namespace, UnixNanos,
};
use edgefn_errors::EdgeError;
use uuid::Uuid;

pub use sqlite_store::SqliteCatalogueStore;

/// Listing-safe projection of a function: excludes `artifact` and
/// `original_code` to keep discovery payloads small (spec §4.1 list-public).
#[derive(Debug, Clone, serde::Serialize)]
pub struct FunctionSummary {
    pub namespace: Namespace,
    pub name: FunctionName,
    pub description: String,
    pub enabled: bool,
    pub is_public: bool,
    pub version: u64,
}

impl From<&FunctionRecord> for FunctionSummary {
    fn from(f: &FunctionRecord) -> Self {
        Self {
            namespace: f.namespace.clone(),
            name: f.name.clone(),
            description: f.description.clone(),
            enabled: f.enabled,
            is_public: f.is_public,
            version: f.version,
        }
    }
}

/// Everything needed to finalize an execution row exactly once
/// (spec §3 Execution lifecycle: created running, updated exactly once).
#[derive(Debug, Clone)]
pub struct ExecutionCompletion {
    pub status: ExecutionStatus,
    pub http_status: Option<u16>,
    pub duration_ms: u64,
    pub result: Option<String>,
    pub aggregate_logs: Option<String>,
    pub error_message: Option<String>,
}

#[async_trait]
pub trait CatalogueStore: Send + Sync + 'static {
    // -- functions --
    async fn create_function(&self, function: FunctionRecord) -> Result<FunctionRecord, EdgeError>;
    async fn get_function(
        &self,
        namespace: &Namespace,
        name: &FunctionName,
    ) -> Result<Option<FunctionRecord>, EdgeError>;
    /// spec §4.1: resolve-by-name-preferring-default-namespace. Rows are
    /// ordered lexicographically by namespace so the literal `default`
    /// namespace wins if present.
    async fn resolve_function(
        &self,
        name: &FunctionName,
        namespace: Option<&Namespace>,
    ) -> Result<Option<FunctionRecord>, EdgeError>;
    async fn update_function(&self, function: FunctionRecord) -> Result<FunctionRecord, EdgeError>;
    async fn delete_function(&self, namespace: &Namespace, name: &FunctionName) -> Result<(), EdgeError>;
    /// spec §4.1: list-public. Excludes `artifact`/`original_code`.
    async fn list_public(&self, namespace: Option<&Namespace>) -> Result<Vec<FunctionSummary>, EdgeError>;
    /// Unfiltered listing for admin/internal use (scheduler bootstrap,
    /// filesystem reload reconciliation).
    async fn list_all_functions(&self) -> Result<Vec<FunctionRecord>, EdgeError>;

    // -- supporting files --
    /// Atomic delete-all-then-insert (spec §3 Supporting File lifecycle).
    async fn replace_supporting_files(
        &self,
        namespace: &Namespace,
        function_name: &FunctionName,
        files: Vec<SupportingFileRecord>,
    ) -> Result<(), EdgeError>;
    async fn list_supporting_files(
        &self,
        namespace: &Namespace,
        function_name: &FunctionName,
    ) -> Result<Vec<SupportingFileRecord>, EdgeError>;

    // -- shared modules --
    async fn put_shared_module(&self, path: &str, content: String) -> Result<SharedModuleRecord, EdgeError>;
    async fn get_shared_module(&self, path: &str) -> Result<Option<SharedModuleRecord>, EdgeError>;
    async fn delete_shared_module(&self, path: &str) -> Result<(), EdgeError>;
    async fn list_shared_modules(&self) -> Result<Vec<SharedModuleRecord>, EdgeError>;

    // -- executions --
    /// Creates a row in `running` state (spec §3 Execution lifecycle).
    async fn create_execution(&self, execution: ExecutionRecord) -> Result<(), EdgeError>;
    /// Terminal-state update; must be called exactly once per execution id.
    async fn complete_execution(&self, id: Uuid, completion: ExecutionCompletion) -> Result<(), EdgeError>;
    async fn get_execution(&self, id: Uuid) -> Result<Option<ExecutionRecord>, EdgeError>;
    async fn list_executions(
        &self,
        namespace: &Namespace,
        function_name: &FunctionName,
        limit: u32,
    ) -> Result<Vec<ExecutionRecord>, EdgeError>;

    // -- log lines --
    async fn append_log_line(
        &self,
        execution_id: Uuid,
        line_number: u32,
        level: LogLevel,
        message: String,
        timestamp: UnixNanos,
    ) -> Result<(), EdgeError>;
    /// spec §4.5: tailing clients read via `since(execution_id, after_line)`.
    async fn log_lines_since(
        &self,
        execution_id: Uuid,
        after_line: u32,
    ) -> Result<Vec<ExecutionLogLine>, EdgeError>;
}
