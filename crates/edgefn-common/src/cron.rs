//! Cron schedule parsing and fire-time computation, grounded on the
//! teacher's `model::cron_jobs::next_ts` module: `saffron::Cron` natively
//! accepts both standard 5-field and seconds-extended 6-field expressions,
//! which satisfies the boundary case in spec §8.

use std::str::FromStr;

use chrono::{TimeZone, Utc};
use saffron::Cron;
use serde::{Deserialize, Serialize};

use crate::timestamp::UnixNanos;

/// A validated cron expression. We store the raw string and reparse on
/// demand rather than caching the parsed `saffron::Cron` (which has no
/// `Clone`/`PartialEq`); parsing a handful of fields is cheap relative to
/// the once-a-fire cadence this type is used at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CronSpec {
    raw: String,
}

impl CronSpec {
    pub fn parse(raw: impl Into<String>) -> anyhow::Result<Self> {
        let raw = raw.into();
        let _: Cron = raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid cron expression {raw:?}: {e}"))?;
        Ok(Self { raw })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn parsed(&self) -> Cron {
        self.raw
            .parse()
            .expect("CronSpec::raw was validated at construction time")
    }

    /// Next fire time strictly after `prev` (or `now` if there was none yet).
    pub fn next_after(&self, prev: Option<UnixNanos>, now: UnixNanos) -> anyhow::Result<UnixNanos> {
        let prev = prev.unwrap_or(now);
        let prev_utc = Utc.timestamp_nanos(prev.as_i64());
        let next_utc = self
            .parsed()
            .next_after(prev_utc)
            .ok_or_else(|| anyhow::anyhow!("cron expression {:?} never fires again", self.raw))?;
        let next_nanos = next_utc
            .timestamp_nanos_opt()
            .ok_or_else(|| anyhow::anyhow!("computed fire time out of range"))?;
        Ok(UnixNanos::from_i64(next_nanos))
    }
}

impl FromStr for CronSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CronSpec {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CronSpec> for String {
    fn from(value: CronSpec) -> Self {
        value.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_five_field() {
        assert!(CronSpec::parse("*/5 * * * *").is_ok());
    }

    #[test]
    fn accepts_six_field_with_seconds() {
        assert!(CronSpec::parse("*/30 * * * * *").is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(CronSpec::parse("not a cron expression").is_err());
    }

    #[test]
    fn next_after_advances() {
        let spec = CronSpec::parse("* * * * *").unwrap();
        // 2023-03-01T08:35:00Z
        let now = UnixNanos::from_i64(1_677_659_700 * 1_000_000_000);
        let next = spec.next_after(None, now).unwrap();
        assert!(next.as_i64() >= now.as_i64());
        let next2 = spec.next_after(Some(next), now).unwrap();
        assert!(next2.as_i64() > next.as_i64());
    }
}
