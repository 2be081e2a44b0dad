use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Directory-name format: second resolution, UTC, fixed width. Fixed width
/// makes lexicographic directory-name order equal creation order.
const ID_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Identifier of one backup instance: its UTC creation time, truncated to
/// whole seconds. Unique per target; a same-second collision is a conflict
/// the caller must retry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(DateTime<Utc>);

impl InstanceId {
    /// Allocate an identifier for the current wall-clock second.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Truncate to second resolution so the identifier round-trips through
    /// its directory-name form.
    pub fn from_datetime(t: DateTime<Utc>) -> Self {
        let secs = t.timestamp();
        InstanceId(DateTime::from_timestamp(secs, 0).expect("timestamp in range"))
    }

    /// Parse a directory name like `20260214T083015Z`.
    pub fn parse(name: &str) -> std::result::Result<Self, String> {
        let naive = NaiveDateTime::parse_from_str(name, ID_FORMAT)
            .map_err(|e| format!("invalid instance id '{name}': {e}"))?;
        Ok(InstanceId(naive.and_utc()))
    }

    /// The directory-name form.
    pub fn dirname(&self) -> String {
        self.0.format(ID_FORMAT).to_string()
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.dirname())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dirname())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dirname_roundtrip() {
        let id = InstanceId::from_datetime(Utc.with_ymd_and_hms(2026, 2, 14, 8, 30, 15).unwrap());
        assert_eq!(id.dirname(), "20260214T083015Z");
        assert_eq!(InstanceId::parse("20260214T083015Z").unwrap(), id);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(InstanceId::parse("").is_err());
        assert!(InstanceId::parse("not-a-timestamp").is_err());
        assert!(InstanceId::parse("20260214T083015").is_err());
    }

    #[test]
    fn ordering_matches_dirname_ordering() {
        let a = InstanceId::from_datetime(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let b = InstanceId::from_datetime(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 1).unwrap());
        let c = InstanceId::from_datetime(Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap());
        assert!(a < b && b < c);
        assert!(a.dirname() < b.dirname() && b.dirname() < c.dirname());
    }

    #[test]
    fn subsecond_times_collapse_to_same_id() {
        let t = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let a = InstanceId::from_datetime(t);
        let b = InstanceId::from_datetime(t + chrono::Duration::milliseconds(750));
        assert_eq!(a, b);
    }
}
