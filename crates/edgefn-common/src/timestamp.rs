//! A monotonic-enough wall-clock timestamp, stored as nanoseconds since the
//! Unix epoch. Using an integer rather than `SystemTime` keeps rows
//! comparable and serializable without format ambiguity, matching the
//! teacher's `sync_types::Timestamp` convention.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixNanos(pub i64);

impl UnixNanos {
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_nanos();
        Self(nanos as i64)
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }

    pub fn from_i64(nanos: i64) -> Self {
        Self(nanos)
    }
}

impl std::fmt::Display for UnixNanos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
