//! Ambient configuration for the edge-function core: admin-configured caps,
//! global CORS defaults, and the handful of paths/binaries the bundler (C2),
//! invoker (C3), and scheduler (C4) need but don't own themselves.
//!
//! Spec §1 explicitly keeps "the configuration loader" out of scope; this
//! crate is the interface the core consumes, not a general-purpose hot-reload
//! loader. Every field is loaded once, from environment variables, at
//! process start.

use std::{path::PathBuf, time::Duration};

use edgefn_common::model::CorsOverrides;
use serde::{Deserialize, Serialize};

/// Environment variables read by [`GlobalConfig::from_env`] all begin with
/// this prefix, the same prefix the invoker's curated-environment rule
/// (§4.3.1, §5) forwards into the sandbox subprocess.
pub const ENV_PREFIX: &str = "EDGEFN_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Upper bound on any function's `timeout_seconds` (spec §3 invariant).
    pub max_timeout_seconds: u32,
    /// §4.4.2 scheduled-execution concurrency ceiling, default 10.
    pub scheduler_concurrency_ceiling: usize,
    /// §4.4.4 shut-down drain budget, default 30s.
    pub scheduler_drain_budget: Duration,
    /// Five back-off attempts starting here, doubling (§4.4.1).
    pub scheduler_bootstrap_initial_backoff: Duration,
    pub scheduler_bootstrap_attempts: u32,

    /// Global CORS defaults a function's own overrides take priority over
    /// (spec §6 "CORS").
    pub cors_defaults: CorsOverrides,

    /// Path to the SQLite database file backing C1.
    pub database_path: PathBuf,
    /// Directory scanned by `/admin/functions/reload` and the flat/directory
    /// filesystem layout convention of spec §6.
    pub functions_dir: Option<PathBuf>,

    /// External bundler binary (§4.2.5), e.g. `deno`.
    pub bundler_binary: String,
    /// Sandbox runtime binary (§4.3.1), e.g. `deno`.
    pub sandbox_binary: String,

    /// Stand-in bearer token for management endpoints (spec §6: "elevated
    /// role required"). The real authentication middleware is out of scope
    /// per spec §1; this is intentionally thin.
    pub admin_bearer_token: Option<String>,

    /// Address the HTTP surface binds to.
    pub bind_addr: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            max_timeout_seconds: 300,
            scheduler_concurrency_ceiling: 10,
            scheduler_drain_budget: Duration::from_secs(30),
            scheduler_bootstrap_initial_backoff: Duration::from_millis(100),
            scheduler_bootstrap_attempts: 5,
            cors_defaults: CorsOverrides::default(),
            database_path: PathBuf::from("edgefn.sqlite3"),
            functions_dir: None,
            bundler_binary: "deno".to_string(),
            sandbox_binary: "deno".to_string(),
            admin_bearer_token: None,
            bind_addr: "0.0.0.0:8787".to_string(),
        }
    }
}

impl GlobalConfig {
    /// Loads overrides from `EDGEFN_*` environment variables on top of
    /// [`Default::default`]. Missing or unparsable variables keep the
    /// default; a malformed *present* variable is logged and ignored rather
    /// than failing startup, since none of these knobs are safety-critical
    /// enough to block the process from serving traffic with sane defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_u32("MAX_TIMEOUT_SECONDS") {
            config.max_timeout_seconds = v;
        }
        if let Some(v) = env_usize("SCHEDULER_CONCURRENCY_CEILING") {
            config.scheduler_concurrency_ceiling = v;
        }
        if let Some(v) = env_u64("SCHEDULER_DRAIN_BUDGET_SECONDS") {
            config.scheduler_drain_budget = Duration::from_secs(v);
        }
        if let Ok(v) = std::env::var(env_key("DATABASE_PATH")) {
            config.database_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var(env_key("FUNCTIONS_DIR")) {
            config.functions_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var(env_key("BUNDLER_BINARY")) {
            config.bundler_binary = v;
        }
        if let Ok(v) = std::env::var(env_key("SANDBOX_BINARY")) {
            config.sandbox_binary = v;
        }
        if let Ok(v) = std::env::var(env_key("ADMIN_BEARER_TOKEN")) {
            config.admin_bearer_token = Some(v);
        }
        if let Ok(v) = std::env::var(env_key("BIND_ADDR")) {
            config.bind_addr = v;
        }
        if let Ok(v) = std::env::var(env_key("CORS_ALLOW_ORIGIN")) {
            config.cors_defaults.allow_origin = Some(v);
        }
        if let Ok(v) = std::env::var(env_key("CORS_ALLOW_METHODS")) {
            config.cors_defaults.allow_methods = Some(v);
        }
        if let Ok(v) = std::env::var(env_key("CORS_ALLOW_HEADERS")) {
            config.cors_defaults.allow_headers = Some(v);
        }
        if let Ok(v) = std::env::var(env_key("CORS_EXPOSE_HEADERS")) {
            config.cors_defaults.expose_headers = Some(v);
        }
        if let Some(v) = env_u32("CORS_MAX_AGE_SECONDS") {
            config.cors_defaults.max_age_seconds = Some(v);
        }

        config
    }

    /// Clamps a requested function timeout to the admin cap (spec §3
    /// invariant: "`timeout` > 0 and ≤ the admin cap").
    pub fn clamp_timeout(&self, requested_seconds: u32) -> u32 {
        requested_seconds.clamp(1, self.max_timeout_seconds)
    }
}

fn env_key(suffix: &str) -> String {
    format!("{ENV_PREFIX}{suffix}")
}

fn env_u32(suffix: &str) -> Option<u32> {
    std::env::var(env_key(suffix)).ok().and_then(|v| match v.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(var = %env_key(suffix), value = %v, "ignoring unparsable config override");
            None
        }
    })
}

fn env_u64(suffix: &str) -> Option<u64> {
    std::env::var(env_key(suffix)).ok().and_then(|v| match v.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(var = %env_key(suffix), value = %v, "ignoring unparsable config override");
            None
        }
    })
}

fn env_usize(suffix: &str) -> Option<usize> {
    std::env::var(env_key(suffix)).ok().and_then(|v| match v.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(var = %env_key(suffix), value = %v, "ignoring unparsable config override");
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = GlobalConfig::default();
        assert_eq!(config.scheduler_concurrency_ceiling, 10);
        assert_eq!(config.scheduler_drain_budget, Duration::from_secs(30));
    }

    #[test]
    fn clamp_timeout_respects_cap_and_floor() {
        let config = GlobalConfig {
            max_timeout_seconds: 60,
            ..Default::default()
        };
        assert_eq!(config.clamp_timeout(0), 1);
        assert_eq!(config.clamp_timeout(30), 30);
        assert_eq!(config.clamp_timeout(999), 60);
    }
}
