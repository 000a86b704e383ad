use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use edgefn_common::{
    cron::CronSpec,
    model::{
        CorsOverrides, ExecutionRecord, ExecutionStatus, FunctionPermissions, FunctionRecord,
        FunctionSource, SharedModuleRecord, SupportingFileRecord, TriggerType,
    },
    ExecutionLogLine, FunctionName, LogLevel, Namespace, UnixNanos,
};
use edgefn_errors::EdgeError;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::{schema, CatalogueStore, ExecutionCompletion, FunctionSummary};

/// SQLite-backed Catalogue Store. A single connection behind a
/// `parking_lot::Mutex`: SQLite serializes writers internally anyway, and at
/// the scale of a single-process edge-function deployment a connection pool
/// buys nothing (see `DESIGN.md`). Blocking calls are shipped to
/// `spawn_blocking` so they never occupy an async worker thread, matching
/// the suspension-point doctrine of spec §5.
pub struct SqliteCatalogueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogueStore {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, EdgeError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| EdgeError::store_error(format!("store task panicked: {e}")))?
        .map_err(map_sqlite_err)
    }
}

fn map_sqlite_err(e: rusqlite::Error) -> EdgeError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            return EdgeError::already_exists(format!("row ({e})"));
        }
    }
    EdgeError::store_error(e.to_string())
}

fn function_from_row(row: &Row) -> rusqlite::Result<FunctionRecord> {
    let cron_schedule: Option<String> = row.get("cron_schedule")?;
    let source: String = row.get("source")?;
    Ok(FunctionRecord {
        namespace: Namespace::new(row.get::<_, String>("namespace")?),
        name: FunctionName::parse(row.get::<_, String>("name")?)
            .expect("name stored in db was validated on write"),
        description: row.get("description")?,
        original_code: row.get("original_code")?,
        artifact: row.get("artifact")?,
        is_bundled: row.get("is_bundled")?,
        bundle_error: row.get("bundle_error")?,
        version: row.get::<_, i64>("version")? as u64,
        enabled: row.get("enabled")?,
        permissions: FunctionPermissions {
            allow_net: row.get("allow_net")?,
            allow_env: row.get("allow_env")?,
            allow_read: row.get("allow_read")?,
            allow_write: row.get("allow_write")?,
        },
        allow_unauthenticated: row.get("allow_unauthenticated")?,
        is_public: row.get("is_public")?,
        timeout_seconds: row.get::<_, i64>("timeout_seconds")? as u32,
        memory_limit_mb: row
            .get::<_, Option<i64>>("memory_limit_mb")?
            .map(|v| v as u32),
        cron_schedule: cron_schedule
            .map(|s| CronSpec::parse(s).expect("cron stored in db was validated on write")),
        cors: CorsOverrides {
            allow_origin: row.get("cors_allow_origin")?,
            allow_methods: row.get("cors_allow_methods")?,
            allow_headers: row.get("cors_allow_headers")?,
            expose_headers: row.get("cors_expose_headers")?,
            max_age_seconds: row
                .get::<_, Option<i64>>("cors_max_age_seconds")?
                .map(|v| v as u32),
        },
        source: if source == "filesystem" {
            FunctionSource::Filesystem
        } else {
            FunctionSource::Api
        },
        created_at: UnixNanos::from_i64(row.get("created_at")?),
        updated_at: UnixNanos::from_i64(row.get("updated_at")?),
        created_by: row.get("created_by")?,
    })
}

fn execution_from_row(row: &Row) -> rusqlite::Result<ExecutionRecord> {
    let id: String = row.get("id")?;
    let trigger: String = row.get("trigger")?;
    let status: String = row.get("status")?;
    Ok(ExecutionRecord {
        id: Uuid::parse_str(&id).expect("uuid stored in db was validated on write"),
        namespace: Namespace::new(row.get::<_, String>("namespace")?),
        function_name: FunctionName::parse(row.get::<_, String>("function_name")?)
            .expect("name stored in db was validated on write"),
        trigger: match trigger.as_str() {
            "http" => TriggerType::Http,
            "cron" => TriggerType::Cron,
            _ => TriggerType::Manual,
        },
        status: match status.as_str() {
            "running" => ExecutionStatus::Running,
            "success" => ExecutionStatus::Success,
            _ => ExecutionStatus::Error,
        },
        http_status: row
            .get::<_, Option<i64>>("http_status")?
            .map(|v| v as u16),
        duration_ms: row.get::<_, Option<i64>>("duration_ms")?.map(|v| v as u64),
        result: row.get("result")?,
        aggregate_logs: row.get("aggregate_logs")?,
        error_message: row.get("error_message")?,
        started_at: UnixNanos::from_i64(row.get("started_at")?),
        completed_at: row
            .get::<_, Option<i64>>("completed_at")?
            .map(UnixNanos::from_i64),
    })
}

fn source_str(source: FunctionSource) -> &'static str {
    match source {
        FunctionSource::Filesystem => "filesystem",
        FunctionSource::Api => "api",
    }
}

fn trigger_str(trigger: TriggerType) -> &'static str {
    match trigger {
        TriggerType::Http => "http",
        TriggerType::Cron => "cron",
        TriggerType::Manual => "manual",
    }
}

fn status_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Running => "running",
        ExecutionStatus::Success => "success",
        ExecutionStatus::Error => "error",
    }
}

fn insert_or_replace_function(conn: &Connection, f: &FunctionRecord) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT INTO functions (
            namespace, name, description, original_code, artifact, is_bundled, bundle_error,
            version, enabled, allow_net, allow_env, allow_read, allow_write,
            allow_unauthenticated, is_public, timeout_seconds, memory_limit_mb, cron_schedule,
            cors_allow_origin, cors_allow_methods, cors_allow_headers, cors_expose_headers,
            cors_max_age_seconds, source, created_at, updated_at, created_by
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
            ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27
        )
        ON CONFLICT (namespace, name) DO UPDATE SET
            description = excluded.description,
            original_code = excluded.original_code,
            artifact = excluded.artifact,
            is_bundled = excluded.is_bundled,
            bundle_error = excluded.bundle_error,
            version = excluded.version,
            enabled = excluded.enabled,
            allow_net = excluded.allow_net,
            allow_env = excluded.allow_env,
            allow_read = excluded.allow_read,
            allow_write = excluded.allow_write,
            allow_unauthenticated = excluded.allow_unauthenticated,
            is_public = excluded.is_public,
            timeout_seconds = excluded.timeout_seconds,
            memory_limit_mb = excluded.memory_limit_mb,
            cron_schedule = excluded.cron_schedule,
            cors_allow_origin = excluded.cors_allow_origin,
            cors_allow_methods = excluded.cors_allow_methods,
            cors_allow_headers = excluded.cors_allow_headers,
            cors_expose_headers = excluded.cors_expose_headers,
            cors_max_age_seconds = excluded.cors_max_age_seconds,
            updated_at = excluded.updated_at,
            created_by = excluded.created_by
        "#,
        params![
            f.namespace.as_str(),
            f.name.as_str(),
            f.description,
            f.original_code,
            f.artifact,
            f.is_bundled,
            f.bundle_error,
            f.version as i64,
            f.enabled,
            f.permissions.allow_net,
            f.permissions.allow_env,
            f.permissions.allow_read,
            f.permissions.allow_write,
            f.allow_unauthenticated,
            f.is_public,
            f.timeout_seconds as i64,
            f.memory_limit_mb.map(|v| v as i64),
            f.cron_schedule.as_ref().map(CronSpec::as_str),
            f.cors.allow_origin,
            f.cors.allow_methods,
            f.cors.allow_headers,
            f.cors.expose_headers,
            f.cors.max_age_seconds.map(|v| v as i64),
            source_str(f.source),
            f.created_at.as_i64(),
            f.updated_at.as_i64(),
            f.created_by,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl CatalogueStore for SqliteCatalogueStore {
    async fn create_function(&self, function: FunctionRecord) -> Result<FunctionRecord, EdgeError> {
        let existing_namespace = function.namespace.clone();
        let existing_name = function.name.clone();
        let already_exists = self
            .get_function(&existing_namespace, &existing_name)
            .await?
            .is_some();
        if already_exists {
            return Err(EdgeError::already_exists(format!(
                "function {existing_namespace}/{existing_name}"
            )));
        }
        self.with_conn(move |conn| {
            insert_or_replace_function(conn, &function)?;
            Ok(function)
        })
        .await
    }

    async fn get_function(
        &self,
        namespace: &Namespace,
        name: &FunctionName,
    ) -> Result<Option<FunctionRecord>, EdgeError> {
        let namespace = namespace.as_str().to_owned();
        let name = name.as_str().to_owned();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT * FROM functions WHERE namespace = ?1 AND name = ?2",
                params![namespace, name],
                function_from_row,
            )
            .optional()
        })
        .await
    }

    async fn resolve_function(
        &self,
        name: &FunctionName,
        namespace: Option<&Namespace>,
    ) -> Result<Option<FunctionRecord>, EdgeError> {
        if let Some(namespace) = namespace {
            return self.get_function(namespace, name).await;
        }
        // Caller omitted the namespace: order lexicographically so `default`
        // wins if it exists (spec §4.1).
        let name = name.as_str().to_owned();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT * FROM functions WHERE name = ?1 ORDER BY namespace ASC LIMIT 1",
                params![name],
                function_from_row,
            )
            .optional()
        })
        .await
    }

    async fn update_function(&self, function: FunctionRecord) -> Result<FunctionRecord, EdgeError> {
        let namespace = function.namespace.clone();
        let name = function.name.clone();
        let exists = self.get_function(&namespace, &name).await?.is_some();
        if !exists {
            return Err(EdgeError::not_found(format!("function {namespace}/{name}")));
        }
        self.with_conn(move |conn| {
            insert_or_replace_function(conn, &function)?;
            Ok(function)
        })
        .await
    }

    async fn delete_function(&self, namespace: &Namespace, name: &FunctionName) -> Result<(), EdgeError> {
        let namespace = namespace.as_str().to_owned();
        let name = name.as_str().to_owned();
        let rows = self
            .with_conn(move |conn| {
                conn.execute(
                    "DELETE FROM functions WHERE namespace = ?1 AND name = ?2",
                    params![namespace, name],
                )
            })
            .await?;
        if rows == 0 {
            return Err(EdgeError::not_found("function"));
        }
        Ok(())
    }

    async fn list_public(&self, namespace: Option<&Namespace>) -> Result<Vec<FunctionSummary>, EdgeError> {
        let namespace = namespace.map(|n| n.as_str().to_owned());
        self.with_conn(move |conn| {
            let (sql, has_ns) = match &namespace {
                Some(_) => (
                    "SELECT * FROM functions WHERE is_public = 1 AND namespace = ?1",
                    true,
                ),
                None => ("SELECT * FROM functions WHERE is_public = 1", false),
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = if has_ns {
                stmt.query_map(params![namespace.clone().unwrap()], |row| {
                    function_from_row(row).map(|f| FunctionSummary::from(&f))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?
            } else {
                stmt.query_map([], |row| {
                    function_from_row(row).map(|f| FunctionSummary::from(&f))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?
            };
            Ok(rows)
        })
        .await
    }

    async fn list_all_functions(&self) -> Result<Vec<FunctionRecord>, EdgeError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM functions")?;
            stmt.query_map([], function_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }

    async fn replace_supporting_files(
        &self,
        namespace: &Namespace,
        function_name: &FunctionName,
        files: Vec<SupportingFileRecord>,
    ) -> Result<(), EdgeError> {
        let namespace = namespace.as_str().to_owned();
        let function_name = function_name.as_str().to_owned();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM supporting_files WHERE namespace = ?1 AND function_name = ?2",
                params![namespace, function_name],
            )?;
            for file in &files {
                tx.execute(
                    "INSERT INTO supporting_files (namespace, function_name, path, content) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![namespace, function_name, file.path, file.content],
                )?;
            }
            tx.commit()
        })
        .await
    }

    async fn list_supporting_files(
        &self,
        namespace: &Namespace,
        function_name: &FunctionName,
    ) -> Result<Vec<SupportingFileRecord>, EdgeError> {
        let ns = namespace.as_str().to_owned();
        let fname = function_name.as_str().to_owned();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT namespace, function_name, path, content FROM supporting_files \
                 WHERE namespace = ?1 AND function_name = ?2",
            )?;
            stmt.query_map(params![ns, fname], |row| {
                Ok(SupportingFileRecord {
                    namespace: Namespace::new(row.get::<_, String>(0)?),
                    function_name: FunctionName::parse(row.get::<_, String>(1)?)
                        .expect("name stored in db was validated on write"),
                    path: row.get(2)?,
                    content: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }

    async fn put_shared_module(&self, path: &str, content: String) -> Result<SharedModuleRecord, EdgeError> {
        let path = path.to_owned();
        self.with_conn(move |conn| {
            let prev_version: Option<i64> = conn
                .query_row(
                    "SELECT version FROM shared_modules WHERE path = ?1",
                    params![path],
                    |row| row.get(0),
                )
                .optional()?;
            let version = prev_version.unwrap_or(0) + 1;
            conn.execute(
                "INSERT INTO shared_modules (path, content, version) VALUES (?1, ?2, ?3) \
                 ON CONFLICT (path) DO UPDATE SET content = excluded.content, version = excluded.version",
                params![path, content, version],
            )?;
            Ok(SharedModuleRecord {
                path,
                content,
                version: version as u64,
            })
        })
        .await
    }

    async fn get_shared_module(&self, path: &str) -> Result<Option<SharedModuleRecord>, EdgeError> {
        let path = path.to_owned();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT path, content, version FROM shared_modules WHERE path = ?1",
                params![path],
                |row| {
                    Ok(SharedModuleRecord {
                        path: row.get(0)?,
                        content: row.get(1)?,
                        version: row.get::<_, i64>(2)? as u64,
                    })
                },
            )
            .optional()
        })
        .await
    }

    async fn delete_shared_module(&self, path: &str) -> Result<(), EdgeError> {
        let path = path.to_owned();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM shared_modules WHERE path = ?1", params![path])
        })
        .await?;
        Ok(())
    }

    async fn list_shared_modules(&self) -> Result<Vec<SharedModuleRecord>, EdgeError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT path, content, version FROM shared_modules")?;
            stmt.query_map([], |row| {
                Ok(SharedModuleRecord {
                    path: row.get(0)?,
                    content: row.get(1)?,
                    version: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }

    async fn create_execution(&self, execution: ExecutionRecord) -> Result<(), EdgeError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO executions (id, namespace, function_name, trigger, status, \
                 http_status, duration_ms, result, aggregate_logs, error_message, started_at, \
                 completed_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    execution.id.to_string(),
                    execution.namespace.as_str(),
                    execution.function_name.as_str(),
                    trigger_str(execution.trigger),
                    status_str(execution.status),
                    execution.http_status.map(|v| v as i64),
                    execution.duration_ms.map(|v| v as i64),
                    execution.result,
                    execution.aggregate_logs,
                    execution.error_message,
                    execution.started_at.as_i64(),
                    execution.completed_at.map(UnixNanos::as_i64),
                ],
            )
        })
        .await?;
        Ok(())
    }

    async fn complete_execution(&self, id: Uuid, completion: ExecutionCompletion) -> Result<(), EdgeError> {
        let completed_at = UnixNanos::now();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE executions SET status = ?1, http_status = ?2, duration_ms = ?3, \
                 result = ?4, aggregate_logs = ?5, error_message = ?6, completed_at = ?7 \
                 WHERE id = ?8 AND status = 'running'",
                params![
                    status_str(completion.status),
                    completion.http_status.map(|v| v as i64),
                    completion.duration_ms as i64,
                    completion.result,
                    completion.aggregate_logs,
                    completion.error_message,
                    completed_at.as_i64(),
                    id.to_string(),
                ],
            )
        })
        .await?;
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<Option<ExecutionRecord>, EdgeError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT * FROM executions WHERE id = ?1",
                params![id.to_string()],
                execution_from_row,
            )
            .optional()
        })
        .await
    }

    async fn list_executions(
        &self,
        namespace: &Namespace,
        function_name: &FunctionName,
        limit: u32,
    ) -> Result<Vec<ExecutionRecord>, EdgeError> {
        let ns = namespace.as_str().to_owned();
        let fname = function_name.as_str().to_owned();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM executions WHERE namespace = ?1 AND function_name = ?2 \
                 ORDER BY started_at DESC LIMIT ?3",
            )?;
            stmt.query_map(params![ns, fname, limit], execution_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }

    async fn append_log_line(
        &self,
        execution_id: Uuid,
        line_number: u32,
        level: LogLevel,
        message: String,
        timestamp: UnixNanos,
    ) -> Result<(), EdgeError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO execution_log_lines (execution_id, line_number, level, message, \
                 timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    execution_id.to_string(),
                    line_number,
                    level.to_string(),
                    message,
                    timestamp.as_i64(),
                ],
            )
        })
        .await?;
        Ok(())
    }

    async fn log_lines_since(
        &self,
        execution_id: Uuid,
        after_line: u32,
    ) -> Result<Vec<ExecutionLogLine>, EdgeError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT line_number, level, message, timestamp FROM execution_log_lines \
                 WHERE execution_id = ?1 AND line_number > ?2 ORDER BY line_number ASC",
            )?;
            stmt.query_map(params![execution_id.to_string(), after_line], |row| {
                let level: String = row.get(1)?;
                Ok(ExecutionLogLine {
                    line_number: row.get::<_, i64>(0)? as u32,
                    level: level.parse().unwrap_or(LogLevel::Info),
                    message: row.get(2)?,
                    timestamp: UnixNanos::from_i64(row.get(3)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use edgefn_common::model::{CorsOverrides, FunctionPermissions};

    use super::*;

    fn sample_function(namespace: &str, name: &str) -> FunctionRecord {
        let now = UnixNanos::now();
        FunctionRecord {
            namespace: Namespace::new(namespace),
            name: FunctionName::parse(name).unwrap(),
            description: "desc".into(),
            original_code: "export default {}".into(),
            artifact: "export default {}".into(),
            is_bundled: false,
            bundle_error: None,
            version: 1,
            enabled: true,
            permissions: FunctionPermissions::default(),
            allow_unauthenticated: false,
            is_public: true,
            timeout_seconds: 30,
            memory_limit_mb: None,
            cron_schedule: None,
            cors: CorsOverrides::default(),
            source: FunctionSource::Api,
            created_at: now,
            updated_at: now,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn create_get_roundtrip() {
        let store = SqliteCatalogueStore::open_in_memory().unwrap();
        let f = sample_function("default", "echo");
        store.create_function(f.clone()).await.unwrap();
        let loaded = store
            .get_function(&f.namespace, &f.name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.name.as_str(), "echo");
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn create_duplicate_rejected() {
        let store = SqliteCatalogueStore::open_in_memory().unwrap();
        let f = sample_function("default", "echo");
        store.create_function(f.clone()).await.unwrap();
        let err = store.create_function(f).await.unwrap_err();
        assert_eq!(err.kind, edgefn_errors::ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn resolve_prefers_default_namespace() {
        let store = SqliteCatalogueStore::open_in_memory().unwrap();
        store
            .create_function(sample_function("acme", "echo"))
            .await
            .unwrap();
        store
            .create_function(sample_function("default", "echo"))
            .await
            .unwrap();
        let resolved = store
            .resolve_function(&FunctionName::parse("echo").unwrap(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.namespace.as_str(), "default");
    }

    #[tokio::test]
    async fn list_public_excludes_code_fields() {
        let store = SqliteCatalogueStore::open_in_memory().unwrap();
        store
            .create_function(sample_function("default", "echo"))
            .await
            .unwrap();
        let summaries = store.list_public(None).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].name.as_str(), "echo");
    }

    #[tokio::test]
    async fn log_lines_have_no_gaps() {
        let store = SqliteCatalogueStore::open_in_memory().unwrap();
        let f = sample_function("default", "echo");
        store.create_function(f.clone()).await.unwrap();
        let execution = ExecutionRecord {
            id: Uuid::new_v4(),
            namespace: f.namespace.clone(),
            function_name: f.name.clone(),
            trigger: TriggerType::Http,
            status: ExecutionStatus::Running,
            http_status: None,
            duration_ms: None,
            result: None,
            aggregate_logs: None,
            error_message: None,
            started_at: UnixNanos::now(),
            completed_at: None,
        };
        store.create_execution(execution.clone()).await.unwrap();
        for i in 0..5u32 {
            store
                .append_log_line(
                    execution.id,
                    i,
                    LogLevel::Info,
                    format!("line {i}"),
                    UnixNanos::now(),
                )
                .await
                .unwrap();
        }
        let lines = store.log_lines_since(execution.id, 0).await.unwrap();
        assert_eq!(lines.len(), 4);
        let numbers: Vec<u32> = lines.iter().map(|l| l.line_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn delete_function_cascades_supporting_files() {
        let store = SqliteCatalogueStore::open_in_memory().unwrap();
        let f = sample_function("default", "echo");
        store.create_function(f.clone()).await.unwrap();
        store
            .replace_supporting_files(
                &f.namespace,
                &f.name,
                vec![SupportingFileRecord {
                    namespace: f.namespace.clone(),
                    function_name: f.name.clone(),
                    path: "utils.ts".into(),
                    content: "export const x = 1;".into(),
                }],
            )
            .await
            .unwrap();
        store.delete_function(&f.namespace, &f.name).await.unwrap();
        let files = store.list_supporting_files(&f.namespace, &f.name).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn delete_function_cascades_executions_and_log_lines() {
        let store = SqliteCatalogueStore::open_in_memory().unwrap();
        let f = sample_function("default", "echo");
        store.create_function(f.clone()).await.unwrap();
        let execution = ExecutionRecord {
            id: Uuid::new_v4(),
            namespace: f.namespace.clone(),
            function_name: f.name.clone(),
            trigger: TriggerType::Http,
            status: ExecutionStatus::Running,
            http_status: None,
            duration_ms: None,
            result: None,
            aggregate_logs: None,
            error_message: None,
            started_at: UnixNanos::now(),
            completed_at: None,
        };
        store.create_execution(execution.clone()).await.unwrap();
        store
            .append_log_line(execution.id, 0, LogLevel::Info, "hi".into(), UnixNanos::now())
            .await
            .unwrap();

        store.delete_function(&f.namespace, &f.name).await.unwrap();

        assert!(store.get_execution(execution.id).await.unwrap().is_none());
        assert!(store.log_lines_since(execution.id, 0).await.unwrap().is_empty());
    }
}
