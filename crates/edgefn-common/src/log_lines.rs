//! Log line types shared between the invoker (C3), the demultiplexer (C5),
//! and the catalogue store (C1). Mirrors the `level`/`message` split the
//! teacher's `common::log_lines::LogLevel` uses, trimmed to the four levels
//! spec §3 names.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::timestamp::UnixNanos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => anyhow::bail!("unknown log level {other:?}"),
        }
    }
}

/// A single emitted log line, not yet assigned a `line_number`. C5 attaches
/// the line number at persistence time (§4.5).
#[derive(Debug, Clone)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: UnixNanos,
}

impl LogLine {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: UnixNanos::now(),
        }
    }
}

/// A log line after C5 has assigned it a monotonic `line_number` and it is
/// ready to be persisted to / read from the store (§3 Execution-Log Line).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogLine {
    pub line_number: u32,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: UnixNanos,
}
