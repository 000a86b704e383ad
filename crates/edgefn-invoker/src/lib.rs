//! C3: the Invoker. Spawns the sandbox subprocess, enforces permissions and
//! wall-clock timeout, transports the request/response, and demultiplexes
//! log lines to C5, per spec §4.3.
//!
//! Mirrors the teacher's separation between `node_executor::executor::
//! NodeExecutor` (trait) and `node_executor::local::LocalNodeExecutor`
//! (concrete subprocess-spawning impl): [`SandboxRuntime`] is the trait,
//! [`DenoSandboxRuntime`] the concrete implementation, [`NoopSandboxRuntime`]
//! the test double (`node_executor::noop`).

mod bridge;
mod env;
mod sandbox;

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use edgefn_common::{model::FunctionPermissions, LogLevel};
use edgefn_errors::EdgeError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use sandbox::{DenoSandboxRuntime, NoopSandboxRuntime};

/// Spec §6 "Function invocation contract": the JSON object presented to
/// user code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub method: String,
    pub url: String,
    pub base_url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub params: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl InvokeRequest {
    /// The synthetic request the scheduler builds for a cron fire (spec
    /// §4.4.2 step 3: "empty POST request with a `/scheduled` URL").
    pub fn scheduled(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            method: "POST".to_string(),
            url: format!("{base_url}/scheduled"),
            base_url,
            headers: BTreeMap::new(),
            body: Some("{}".to_string()),
            params: BTreeMap::new(),
            user_id: None,
            user_email: None,
            user_role: None,
            session_id: None,
        }
    }
}

/// The `{status, headers, body}` shape of spec §4.3.2/§6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

/// §4.3.3 result contract, plus an `error_kind` the HTTP layer uses to
/// choose a status code without re-parsing `error`'s free text.
#[derive(Debug, Clone)]
pub struct InvokeOutcome {
    pub response: InvokeResponse,
    pub aggregate_logs: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<edgefn_errors::ErrorKind>,
    pub duration_ms: u64,
}

/// Everything `invoke` needs besides the log sink and cancellation token.
pub struct InvokeParams {
    pub execution_id: Uuid,
    pub artifact: String,
    pub request: InvokeRequest,
    pub permissions: FunctionPermissions,
    pub timeout: Duration,
    pub memory_limit_mb: Option<u32>,
    /// User-declared env vars to forward when `permissions.allow_env` is set
    /// (spec §3's permission quadruple, §4.3.1's curated environment).
    pub user_env: Vec<(String, String)>,
}

/// A sink the invoker feeds demultiplexed stderr lines into, decoupling
/// this crate from C5's concrete implementation (`edgefn_logs::LogSink`).
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn emit(&self, level: LogLevel, message: String);
}

/// Any `edgefn_logs::LogSink` (e.g. `ExecutionLogSink`, `NullLogSink`)
/// already satisfies this crate's own `LogSink`, so callers can hand
/// `invoke` a demultiplexer-bound sink directly without this crate naming
/// C5's concrete types in its public API surface.
#[async_trait]
impl<T: edgefn_logs::LogSink + ?Sized> LogSink for T {
    async fn emit(&self, level: LogLevel, message: String) {
        edgefn_logs::LogSink::emit(self, level, message).await;
    }
}

#[async_trait]
pub trait SandboxRuntime: Send + Sync + 'static {
    /// Runs one invocation to completion (or timeout/cancellation). Returns
    /// `Err` only for infrastructure failures that happen before the
    /// sandbox subprocess could be spawned at all; everything else (thrown
    /// handler errors, non-zero exit, timeout, cancellation) is represented
    /// in the returned [`InvokeOutcome`], per spec §4.3.3.
    async fn invoke(
        &self,
        params: InvokeParams,
        log_sink: &(dyn LogSink + Send + Sync),
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<InvokeOutcome, EdgeError>;
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use edgefn_common::model::FunctionPermissions;
    use tokio_util::sync::CancellationToken;

    use super::*;

    struct CollectingSink(Arc<Mutex<Vec<(LogLevel, String)>>>);

    #[async_trait]
    impl LogSink for CollectingSink {
        async fn emit(&self, level: LogLevel, message: String) {
            self.0.lock().unwrap().push((level, message));
        }
    }

    #[tokio::test]
    async fn noop_runtime_echoes_body() {
        let runtime = NoopSandboxRuntime;
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = CollectingSink(lines.clone());
        let outcome = runtime
            .invoke(
                InvokeParams {
                    execution_id: Uuid::new_v4(),
                    artifact: "async function handler(r){return {status:200, body:r.body}}".to_string(),
                    request: InvokeRequest {
                        method: "POST".to_string(),
                        url: "/".to_string(),
                        base_url: "".to_string(),
                        headers: BTreeMap::new(),
                        body: Some("hi".to_string()),
                        params: BTreeMap::new(),
                        user_id: None,
                        user_email: None,
                        user_role: None,
                        session_id: None,
                    },
                    permissions: FunctionPermissions::default(),
                    timeout: Duration::from_secs(5),
                    memory_limit_mb: None,
                    user_env: vec![],
                },
                &sink,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.response.status, 200);
        assert_eq!(outcome.response.body.as_deref(), Some("hi"));
    }
}
