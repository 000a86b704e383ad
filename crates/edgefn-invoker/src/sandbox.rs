//! The concrete [`SandboxRuntime`] implementations: a real subprocess-backed
//! runtime and a noop test double, mirroring the bundler's
//! `DenoBundleExternalBundler`/`NoopExternalBundler` split.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use edgefn_errors::EdgeError;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::Command,
};
use tokio_util::sync::CancellationToken;

use crate::{bridge, env, InvokeOutcome, InvokeParams, InvokeResponse, LogSink, SandboxRuntime};

/// Subprocess-backed sandbox. One process per invocation (spec §4.3: "no
/// shared sandbox across requests"), unlike the teacher's `LocalNodeExecutor`
/// which pools a persistent Node HTTP server across calls.
pub struct DenoSandboxRuntime {
    binary: String,
}

impl DenoSandboxRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn permission_flags(permissions: &edgefn_common::model::FunctionPermissions) -> Vec<String> {
        let mut flags = vec!["--no-prompt".to_string()];
        if permissions.allow_net {
            flags.push("--allow-net".to_string());
        }
        if permissions.allow_env {
            flags.push("--allow-env".to_string());
        }
        if permissions.allow_read {
            flags.push("--allow-read".to_string());
        }
        if permissions.allow_write {
            flags.push("--allow-write".to_string());
        }
        flags
    }
}

#[async_trait]
impl SandboxRuntime for DenoSandboxRuntime {
    async fn invoke(
        &self,
        params: InvokeParams,
        log_sink: &(dyn LogSink + Send + Sync),
        cancel: CancellationToken,
    ) -> Result<InvokeOutcome, EdgeError> {
        let started = Instant::now();

        let scratch = tempfile::tempdir()
            .map_err(|e| EdgeError::execution_error(format!("failed to create scratch dir: {e}")))?;
        let script_path = scratch.path().join("function.ts");
        let request_json = serde_json::to_string(&params.request)
            .map_err(|e| EdgeError::execution_error(format!("failed to serialise request: {e}")))?;
        let rendered = bridge::render(&params.artifact, &request_json);
        tokio::fs::write(&script_path, rendered)
            .await
            .map_err(|e| EdgeError::execution_error(format!("failed to write scratch file: {e}")))?;

        let home_dir = scratch.path().join("home");
        let cache_dir = scratch.path().join("deno-cache");
        let _ = tokio::fs::create_dir_all(&home_dir).await;
        let _ = tokio::fs::create_dir_all(&cache_dir).await;
        let curated = env::curated_sandbox_env(
            &home_dir.to_string_lossy(),
            &cache_dir.to_string_lossy(),
        );
        let sandbox_env = if params.permissions.allow_env {
            env::merge_user_env(curated, &params.user_env)
        } else {
            curated
        };

        let mut cmd = Command::new(&self.binary);
        cmd.arg("run");
        for flag in Self::permission_flags(&params.permissions) {
            cmd.arg(flag);
        }
        if let Some(mb) = params.memory_limit_mb {
            cmd.arg(format!("--v8-flags=--max-old-space-size={mb}"));
        }
        cmd.arg(&script_path)
            .current_dir(scratch.path())
            .env_clear()
            .envs(sandbox_env)
            .kill_on_drop(true)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| EdgeError::execution_error(format!("failed to spawn sandbox: {e}")))?;

        let mut stdout_pipe = child.stdout.take().expect("piped stdout");
        let mut stderr_pipe = child.stderr.take().expect("piped stderr");

        let mut aggregate_logs = String::new();
        let stderr_task = async {
            let mut lines = BufReader::new(&mut stderr_pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let (level, message) = parse_bridge_line(&line);
                aggregate_logs.push_str(&message);
                aggregate_logs.push('\n');
                log_sink.emit(level, message).await;
            }
        };

        let wait_and_drain = async {
            let mut stdout_buf = Vec::new();
            let read_stdout = stdout_pipe.read_to_end(&mut stdout_buf);
            let (status, _) = tokio::join!(child.wait(), read_stdout);
            (status, stdout_buf)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Ok(timeout_outcome(started, EdgeError::cancelled(), "execution was cancelled"));
            }
            result = tokio::time::timeout(params.timeout, async {
                tokio::join!(wait_and_drain, stderr_task)
            }) => {
                match result {
                    Err(_) => {
                        let _ = child.kill().await;
                        let seconds = params.timeout.as_secs();
                        return Ok(timeout_outcome(started, EdgeError::execution_timeout(seconds), "execution timed out"));
                    }
                    Ok(((status, stdout_buf), ())) => {
                        let duration_ms = started.elapsed().as_millis() as u64;
                        let status = status.map_err(|e| EdgeError::execution_error(format!("sandbox I/O error: {e}")))?;
                        let stdout = String::from_utf8_lossy(&stdout_buf).trim().to_string();

                        if !status.success() && stdout.is_empty() {
                            return Ok(InvokeOutcome {
                                response: InvokeResponse {
                                    status: 500,
                                    headers: Default::default(),
                                    body: Some(format!("sandbox exited with {status}")),
                                },
                                aggregate_logs: Some(aggregate_logs),
                                error: Some(format!("sandbox exited with {status} and no output")),
                                error_kind: Some(edgefn_errors::ErrorKind::ExecutionError),
                                duration_ms,
                            });
                        }

                        let response = parse_stdout(&stdout);
                        let error = if response.status >= 500 { response.body.clone() } else { None };
                        let error_kind = if error.is_some() {
                            Some(edgefn_errors::ErrorKind::ExecutionError)
                        } else {
                            None
                        };
                        Ok(InvokeOutcome {
                            response,
                            aggregate_logs: Some(aggregate_logs),
                            error,
                            error_kind,
                            duration_ms,
                        })
                    }
                }
            }
        }
    }
}

fn timeout_outcome(started: Instant, err: EdgeError, body: &str) -> InvokeOutcome {
    InvokeOutcome {
        response: InvokeResponse {
            status: err.kind.http_status().as_u16(),
            headers: Default::default(),
            body: Some(body.to_string()),
        },
        aggregate_logs: None,
        error: Some(err.msg.to_string()),
        error_kind: Some(err.kind),
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Parses a single NDJSON-tagged bridge stderr line (`{"__level":..,"msg":..}`
/// per `bridge.js`), falling back to raw text at `Info` level for anything
/// the bridge didn't emit itself (e.g. a runtime-level uncaught panic line).
fn parse_bridge_line(line: &str) -> (edgefn_common::LogLevel, String) {
    #[derive(serde::Deserialize)]
    struct Tagged {
        __level: String,
        msg: String,
    }
    match serde_json::from_str::<Tagged>(line) {
        Ok(tagged) => {
            let level = tagged.__level.parse().unwrap_or(edgefn_common::LogLevel::Info);
            (level, tagged.msg)
        }
        Err(_) => (edgefn_common::LogLevel::Info, line.to_string()),
    }
}

/// Parses the bridge's single stdout JSON line into `{status, headers,
/// body}`, falling back to a plain 200-text response if stdout isn't valid
/// JSON (defensive: a malformed artifact could `console.log` before the
/// bridge's overrides take effect is no longer possible, but a corrupted
/// sandbox binary could still print garbage).
fn parse_stdout(stdout: &str) -> InvokeResponse {
    if stdout.is_empty() {
        return InvokeResponse {
            status: 200,
            headers: Default::default(),
            body: None,
        };
    }
    serde_json::from_str(stdout).unwrap_or_else(|_| InvokeResponse {
        status: 200,
        headers: Default::default(),
        body: Some(stdout.to_string()),
    })
}

/// Test double that runs the rendered bridge output through nothing at all:
/// it evaluates a tiny, fixed subset of handler shapes so unit tests can
/// exercise the invoker's plumbing without a `deno` binary on PATH. Mirrors
/// `node_executor::noop::NoopNodeExecutor`.
pub struct NoopSandboxRuntime;

#[async_trait]
impl SandboxRuntime for NoopSandboxRuntime {
    async fn invoke(
        &self,
        params: InvokeParams,
        log_sink: &(dyn LogSink + Send + Sync),
        _cancel: CancellationToken,
    ) -> Result<InvokeOutcome, EdgeError> {
        log_sink
            .emit(edgefn_common::LogLevel::Info, "noop sandbox invoked".to_string())
            .await;
        Ok(InvokeOutcome {
            response: InvokeResponse {
                status: 200,
                headers: Default::default(),
                body: params.request.body,
            },
            aggregate_logs: Some(String::new()),
            error: None,
            error_kind: None,
            duration_ms: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_flags_reflect_bits() {
        let permissions = edgefn_common::model::FunctionPermissions {
            allow_net: true,
            allow_env: false,
            allow_read: true,
            allow_write: false,
        };
        let flags = DenoSandboxRuntime::permission_flags(&permissions);
        assert!(flags.contains(&"--allow-net".to_string()));
        assert!(flags.contains(&"--allow-read".to_string()));
        assert!(!flags.contains(&"--allow-env".to_string()));
        assert!(!flags.contains(&"--allow-write".to_string()));
    }

    #[test]
    fn parse_bridge_line_falls_back_to_raw_text() {
        let (level, msg) = parse_bridge_line("not json at all");
        assert_eq!(level, edgefn_common::LogLevel::Info);
        assert_eq!(msg, "not json at all");
    }

    #[test]
    fn parse_bridge_line_reads_tagged_level() {
        let (level, msg) = parse_bridge_line(r#"{"__level":"warn","msg":"careful"}"#);
        assert_eq!(level, edgefn_common::LogLevel::Warn);
        assert_eq!(msg, "careful");
    }

    #[test]
    fn parse_stdout_falls_back_to_plain_200() {
        let response = parse_stdout("not json");
        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_deref(), Some("not json"));
    }

    #[test]
    fn parse_stdout_reads_structured_response() {
        let response = parse_stdout(r#"{"status":404,"headers":{},"body":"nope"}"#);
        assert_eq!(response.status, 404);
        assert_eq!(response.body.as_deref(), Some("nope"));
    }
}
