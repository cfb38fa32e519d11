//! Conflict resolution strategies.

use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// How conflicting rows (same PK, different content) are decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Node A's row wins; B is updated.
    PreferNodeA,
    /// Node B's row wins; A is updated.
    PreferNodeB,
    /// The row with the later modification timestamp wins.
    LastModified,
    /// Surface conflicts for the operator; change nothing.
    Manual,
}

impl ConflictStrategy {
    /// Stable string form.
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictStrategy::PreferNodeA => "prefer-node-a",
            ConflictStrategy::PreferNodeB => "prefer-node-b",
            ConflictStrategy::LastModified => "last-modified",
            ConflictStrategy::Manual => "manual",
        }
    }
}

impl Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = steep_types::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prefer-node-a" => Ok(ConflictStrategy::PreferNodeA),
            "prefer-node-b" => Ok(ConflictStrategy::PreferNodeB),
            "last-modified" => Ok(ConflictStrategy::LastModified),
            "manual" => Ok(ConflictStrategy::Manual),
            other => Err(steep_types::Error::UnknownMethod(other.to_string())),
        }
    }
}

/// Outcome recorded for one merge decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Conflict decided for A; B updated.
    KeptA,
    /// Conflict decided for B; A updated.
    KeptB,
    /// Conflict left for the operator (manual strategy).
    Skipped,
    /// One-sided row copied A→B.
    TransferredAToB,
    /// One-sided row copied B→A.
    TransferredBToA,
}

impl Resolution {
    /// Stable string form recorded in the audit.
    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::KeptA => "kept_a",
            Resolution::KeptB => "kept_b",
            Resolution::Skipped => "skipped",
            Resolution::TransferredAToB => "transferred_a_to_b",
            Resolution::TransferredBToA => "transferred_b_to_a",
        }
    }
}

impl Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp columns probed by the `last-modified` strategy, in priority
/// order.
pub const TIMESTAMP_COLUMNS: [&str; 4] =
    ["updated_at", "modified_at", "last_modified", "timestamp"];

/// Picks the highest-priority timestamp column present on a table.
pub fn probe_timestamp_column(column_names: &[String]) -> Option<&'static str> {
    TIMESTAMP_COLUMNS
        .iter()
        .find(|candidate| column_names.iter().any(|c| c == *candidate))
        .copied()
}

/// Parses a timestamp in any of the formats the engine renders.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // `timestamptz::text` form: 2026-01-02 03:04:05.678+00
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, fmt) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    // Naive timestamps are taken as UTC.
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Decides a `last-modified` conflict from both sides' timestamps.
///
/// Later wins; a lone parseable side wins; a tie or two unparseable sides
/// fall back deterministically to A.
pub fn pick_last_modified(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Resolution {
    match (a, b) {
        (Some(a), Some(b)) if b > a => Resolution::KeptB,
        (Some(_), Some(_)) => Resolution::KeptA,
        (Some(_), None) => Resolution::KeptA,
        (None, Some(_)) => Resolution::KeptB,
        (None, None) => Resolution::KeptA,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn strategy_string_roundtrip() {
        for s in [
            ConflictStrategy::PreferNodeA,
            ConflictStrategy::PreferNodeB,
            ConflictStrategy::LastModified,
            ConflictStrategy::Manual,
        ] {
            assert_eq!(s.as_str().parse::<ConflictStrategy>().unwrap(), s);
        }
        assert!("newest".parse::<ConflictStrategy>().is_err());
    }

    #[test]
    fn probe_respects_priority() {
        let cols = vec![
            "id".to_string(),
            "last_modified".to_string(),
            "updated_at".to_string(),
        ];
        assert_eq!(probe_timestamp_column(&cols), Some("updated_at"));

        let cols = vec!["id".to_string(), "timestamp".to_string()];
        assert_eq!(probe_timestamp_column(&cols), Some("timestamp"));

        let cols = vec!["id".to_string(), "name".to_string()];
        assert_eq!(probe_timestamp_column(&cols), None);
    }

    #[test_case("2026-01-02T03:04:05Z")]
    #[test_case("2026-01-02T03:04:05.678+00:00")]
    #[test_case("2026-01-02 03:04:05.678+00")]
    #[test_case("2026-01-02 03:04:05+00")]
    #[test_case("2026-01-02 03:04:05.678")]
    #[test_case("2026-01-02 03:04:05")]
    #[test_case("2026-01-02")]
    fn parse_accepts_common_forms(raw: &str) {
        assert!(parse_timestamp(raw).is_some(), "failed to parse {raw}");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_timestamp("not a time").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn last_modified_later_wins() {
        let early = parse_timestamp("2026-01-01 00:00:00");
        let late = parse_timestamp("2026-06-01 00:00:00");
        assert_eq!(pick_last_modified(early, late), Resolution::KeptB);
        assert_eq!(pick_last_modified(late, early), Resolution::KeptA);
    }

    #[test]
    fn last_modified_lone_side_wins() {
        let ts = parse_timestamp("2026-01-01 00:00:00");
        assert_eq!(pick_last_modified(ts, None), Resolution::KeptA);
        assert_eq!(pick_last_modified(None, ts), Resolution::KeptB);
    }

    #[test]
    fn last_modified_ties_break_to_a() {
        let ts = parse_timestamp("2026-01-01 00:00:00");
        assert_eq!(pick_last_modified(ts, ts), Resolution::KeptA);
        assert_eq!(pick_last_modified(None, None), Resolution::KeptA);
    }
}
