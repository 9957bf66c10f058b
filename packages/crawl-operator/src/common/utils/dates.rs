//! Kubernetes-style timestamps.
//!
//! Resources carry RFC 3339 timestamps with second precision and a literal
//! `Z` suffix (`2024-03-01T12:00:00Z`).

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Current time truncated to whole seconds, matching what round-trips
/// through a resource status.
pub fn dt_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

pub fn to_k8s_date(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses a resource timestamp; `None` for missing or unparseable values.
pub fn from_k8s_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
