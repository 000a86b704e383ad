//! §4.2.5 external bundling: materialising inputs to a scratch directory and
//! invoking a third-party single-file ES-module bundler as a subprocess.
//!
//! Modeled on the teacher's `node_executor` split between a trait
//! (`NodeExecutor`) and a concrete subprocess-spawning implementation
//! (`LocalNodeExecutor`), including its memoised one-shot pre-cache.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use edgefn_errors::EdgeError;
use tokio::{io::AsyncWriteExt, process::Command};

use crate::{diagnostics::clean_diagnostic, importmap::ImportMap};

pub const BUNDLE_TIMEOUT: Duration = Duration::from_secs(30);
pub const ARTIFACT_SIZE_CEILING: usize = 50 * 1024 * 1024;

/// Specifier schemes §4.2.5(d) requires the bundler to leave unresolved
/// rather than try to inline.
const EXTERNAL_SPECIFIER_PREFIXES: &[&str] = &["npm:", "https:", "http:", "jsr:"];

pub struct ExternalBundleRequest {
    pub main_code: String,
    /// (relative path, content), materialised verbatim.
    pub supporting_files: Vec<(String, String)>,
    /// (relative path under `_shared/`, content).
    pub shared_modules: Vec<(String, String)>,
    pub import_map: ImportMap,
}

#[async_trait]
pub trait ExternalBundler: Send + Sync + 'static {
    /// Process-wide one-shot warm-up. Must be idempotent and safe to call
    /// before any concurrent `bundle` call (§4.2.5: concurrent first-time
    /// downloads corrupt the shared package cache).
    async fn precache(&self) -> anyhow::Result<()>;
    async fn bundle(&self, request: ExternalBundleRequest) -> Result<String, EdgeError>;
}

/// Subprocess-backed bundler. The binary name is configurable so tests and
/// deployments can point at a vendored wrapper without code changes.
pub struct DenoBundleExternalBundler {
    binary: String,
    precache_cell: tokio::sync::OnceCell<()>,
}

impl DenoBundleExternalBundler {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            precache_cell: tokio::sync::OnceCell::new(),
        }
    }

    async fn ensure_precached(&self) -> anyhow::Result<()> {
        self.precache_cell
            .get_or_try_init(|| async {
                tracing::info!(binary = %self.binary, "pre-caching external bundler");
                let status = Command::new(&self.binary)
                    .arg("--version")
                    .kill_on_drop(true)
                    .status()
                    .await?;
                anyhow::ensure!(status.success(), "failed to pre-cache {}", self.binary);
                Ok(())
            })
            .await
            .copied()
    }

    async fn materialize(
        &self,
        dir: &Path,
        request: &ExternalBundleRequest,
    ) -> std::io::Result<()> {
        tokio::fs::write(dir.join("index.ts"), &request.main_code).await?;
        for (path, content) in &request.supporting_files {
            let target = dir.join(path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(target, content).await?;
        }
        for (path, content) in &request.shared_modules {
            let target = dir.join("_shared").join(path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(target, content).await?;
        }
        let mut import_map_file = tokio::fs::File::create(dir.join("deno.json")).await?;
        import_map_file
            .write_all(request.import_map.to_json().to_string().as_bytes())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ExternalBundler for DenoBundleExternalBundler {
    async fn precache(&self) -> anyhow::Result<()> {
        self.ensure_precached().await
    }

    async fn bundle(&self, request: ExternalBundleRequest) -> Result<String, EdgeError> {
        self.ensure_precached()
            .await
            .map_err(|e| EdgeError::bundle_error(format!("bundler unavailable: {e}")))?;

        let scratch = tempfile::tempdir()
            .map_err(|e| EdgeError::bundle_error(format!("failed to create scratch dir: {e}")))?;
        self.materialize(scratch.path(), &request)
            .await
            .map_err(|e| EdgeError::bundle_error(format!("failed to materialise inputs: {e}")))?;

        let output_path = scratch.path().join("__bundled_output.mjs");
        let mut cmd = Command::new(&self.binary);
        cmd.arg("bundle")
            .arg("--config")
            .arg(scratch.path().join("deno.json"))
            .arg("--no-check")
            // (b) a single ES-module output file, not a CJS/IIFE blob.
            .arg("--format=esm")
            // (c) the latest JS language level, so the sandbox's own
            // runtime (always current) never has to down-level anything.
            .arg("--target=esnext");
        for prefix in EXTERNAL_SPECIFIER_PREFIXES {
            // (d) never attempt to inline a remote/package specifier; the
            // generated import map only covers the ones it knows about
            // (§4.2.4's local aliases), everything else still needs to
            // resolve against the sandbox's own module cache at runtime.
            cmd.arg(format!("--external:{prefix}*"));
        }
        cmd
            // (e) `.geojson` is data, not code; treat it the same as a
            // plain `.json` import instead of trying to parse it as JS.
            .arg("--loader:.geojson=json")
            .arg(scratch.path().join("index.ts"))
            .arg(&output_path)
            .current_dir(scratch.path())
            .env_clear()
            .envs(curated_bundler_env())
            .kill_on_drop(true)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| EdgeError::bundle_error(format!("failed to spawn bundler: {e}")))?;

        let result = tokio::time::timeout(BUNDLE_TIMEOUT, child.wait()).await;
        let status = match result {
            Ok(status) => status.map_err(|e| EdgeError::bundle_error(format!("bundler I/O error: {e}")))?,
            Err(_) => {
                let _ = child.kill().await;
                return Err(EdgeError::bundle_timeout());
            }
        };

        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                use tokio::io::AsyncReadExt;
                let _ = pipe.read_to_string(&mut stderr).await;
            }
            let cleaned = clean_diagnostic(&stderr, scratch.path());
            return Err(EdgeError::bundle_error(cleaned));
        }

        let artifact = tokio::fs::read_to_string(&output_path)
            .await
            .map_err(|e| EdgeError::bundle_error(format!("failed to read bundler output: {e}")))?;
        if artifact.len() > ARTIFACT_SIZE_CEILING {
            return Err(EdgeError::bundle_size(artifact.len(), ARTIFACT_SIZE_CEILING));
        }
        Ok(artifact)
    }
}

/// Only the system's own namespace is forwarded to the bundler subprocess,
/// matching §5's curated-environment rule for the invoker; the bundler
/// itself needs even less than the sandbox does.
fn curated_bundler_env() -> Vec<(String, String)> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("EDGEFN_"))
        .collect()
}

/// Test double that performs the §4.2.2-level strategy decision (external
/// bundling was selected) without shelling out, mirroring the teacher's
/// `node_executor::noop` stub.
pub struct NoopExternalBundler;

#[async_trait]
impl ExternalBundler for NoopExternalBundler {
    async fn precache(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn bundle(&self, request: ExternalBundleRequest) -> Result<String, EdgeError> {
        Ok(request.main_code)
    }
}
