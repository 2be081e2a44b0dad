use chrono::{DateTime, Duration, Utc};

use kerf_types::error::{KerfError, Result};
use kerf_types::instance_id::InstanceId;

use crate::instance::{InstanceInfo, InstanceState};

/// Parse a duration string like "2d", "48h", "1w", "6m", "1y".
/// Pure numeric values are treated as days.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(KerfError::Config("empty duration string".into()));
    }

    if let Ok(n) = s.parse::<i64>() {
        return Ok(Duration::days(n));
    }

    let (num_str, suffix) = s.split_at(
        s.find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| KerfError::Config(format!("invalid duration: '{s}'")))?,
    );
    let n: i64 = num_str
        .parse()
        .map_err(|_| KerfError::Config(format!("invalid duration number: '{num_str}'")))?;

    match suffix {
        "h" | "H" => Ok(Duration::hours(n)),
        "d" | "D" => Ok(Duration::days(n)),
        "w" | "W" => Ok(Duration::weeks(n)),
        "m" | "M" => Ok(Duration::days(n * 30)),
        "y" | "Y" => Ok(Duration::days(n * 365)),
        _ => Err(KerfError::Config(format!(
            "unknown duration suffix: '{suffix}'"
        ))),
    }
}

#[derive(Debug, Clone)]
pub enum PruneDecision {
    Keep { reason: String },
    Prune { reason: String },
}

#[derive(Debug, Clone)]
pub struct PrunePlanEntry {
    pub id: InstanceId,
    pub state: InstanceState,
    pub decision: PruneDecision,
}

/// Decide which instances of one target to remove. Complete instances:
/// the `keep` newest stay, the rest go, oldest first. Building instances
/// are never pruned by age unless `abandoned_after` is set, in which case
/// a building instance older than that is reclaimed as abandoned.
///
/// Returns one entry per instance, newest first.
pub fn plan(
    instances: &[InstanceInfo],
    keep: usize,
    abandoned_after: Option<Duration>,
    now: DateTime<Utc>,
) -> Vec<PrunePlanEntry> {
    let mut entries: Vec<PrunePlanEntry> = Vec::with_capacity(instances.len());

    // Newest first; instance ids order by creation time.
    let mut sorted: Vec<&InstanceInfo> = instances.iter().collect();
    sorted.sort_by(|a, b| b.id.cmp(&a.id));

    let mut complete_seen = 0usize;
    for info in sorted {
        let decision = match info.state {
            InstanceState::Complete => {
                complete_seen += 1;
                if complete_seen <= keep {
                    PruneDecision::Keep {
                        reason: format!("recent #{complete_seen}"),
                    }
                } else {
                    PruneDecision::Prune {
                        reason: "superseded".into(),
                    }
                }
            }
            InstanceState::Building => match abandoned_after {
                Some(max_age) if now.signed_duration_since(info.id.time()) > max_age => {
                    PruneDecision::Prune {
                        reason: "abandoned".into(),
                    }
                }
                _ => PruneDecision::Keep {
                    reason: "building".into(),
                },
            },
        };
        entries.push(PrunePlanEntry {
            id: info.id,
            state: info.state,
            decision,
        });
    }

    entries
}
