//! Statistics snapshot computed from persisted block events
//! (SPEC_FULL.md §4.F "Statistics").

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::types::{BucketCount, DcgStats, NamedCount, Trend};

/// A flat row read back from storage — just enough to compute stats
/// without re-deserialising the full `BlockEvent`.
#[derive(Debug, Clone)]
pub struct StatsRow {
    pub timestamp: DateTime<Utc>,
    pub pattern: String,
    pub agent_id: String,
    pub false_positive: bool,
}

fn count_since(rows: &[StatsRow], since: DateTime<Utc>) -> u64 {
    rows.iter().filter(|r| r.timestamp >= since).count() as u64
}

fn trend(rows: &[StatsRow], now: DateTime<Utc>, window: Duration) -> Trend {
    let current_since = now - window;
    let previous_since = now - window * 2;
    let current = count_since(rows, current_since);
    let previous = rows
        .iter()
        .filter(|r| r.timestamp >= previous_since && r.timestamp < current_since)
        .count() as u64;
    let percent_change = if previous == 0 {
        if current == 0 {
            0.0
        } else {
            100.0
        }
    } else {
        ((current as f64 - previous as f64) / previous as f64) * 100.0
    };
    Trend {
        current,
        previous,
        percent_change,
    }
}

fn top_n(counts: std::collections::HashMap<String, u64>, n: usize) -> Vec<NamedCount> {
    let mut items: Vec<NamedCount> = counts.into_iter().map(|(name, count)| NamedCount { name, count }).collect();
    items.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    items.truncate(n);
    items
}

fn series(rows: &[StatsRow], now: DateTime<Utc>, days: i64) -> Vec<BucketCount> {
    let mut buckets: std::collections::HashMap<NaiveDate, u64> = std::collections::HashMap::new();
    let start = (now - Duration::days(days - 1)).date_naive();
    for d in 0..days {
        buckets.insert(start + Duration::days(d), 0);
    }
    for row in rows {
        let day = row.timestamp.date_naive();
        if day >= start {
            *buckets.entry(day).or_insert(0) += 1;
        }
    }
    let mut out: Vec<BucketCount> = buckets.into_iter().map(|(day, count)| BucketCount { day, count }).collect();
    out.sort_by_key(|b| b.day);
    out
}

/// Compute the full stats snapshot given every non-expired persisted
/// block-event row, plus allowlist size and pending-exception count
/// (fetched separately since they're not per-event).
pub fn compute(rows: &[StatsRow], allowlist_size: usize, pending_exceptions_count: u64, now: DateTime<Utc>) -> DcgStats {
    let total_blocks = rows.len() as u64;
    let false_positive_count = rows.iter().filter(|r| r.false_positive).count() as u64;
    let false_positive_rate = if total_blocks == 0 {
        0.0
    } else {
        false_positive_count as f64 / total_blocks as f64
    };

    let mut pattern_counts = std::collections::HashMap::new();
    let mut agent_counts = std::collections::HashMap::new();
    for row in rows {
        *pattern_counts.entry(row.pattern.clone()).or_insert(0u64) += 1;
        *agent_counts.entry(row.agent_id.clone()).or_insert(0u64) += 1;
    }

    DcgStats {
        total_blocks,
        blocks_last_24h: count_since(rows, now - Duration::hours(24)),
        blocks_last_7d: count_since(rows, now - Duration::days(7)),
        blocks_last_30d: count_since(rows, now - Duration::days(30)),
        false_positive_count,
        false_positive_rate,
        allowlist_size,
        pending_exceptions_count,
        trend_24h: trend(rows, now, Duration::hours(24)),
        trend_7d: trend(rows, now, Duration::days(7)),
        trend_30d: trend(rows, now, Duration::days(30)),
        top_patterns: top_n(pattern_counts, 10),
        top_agents: top_n(agent_counts, 10),
        series_7d: series(rows, now, 7),
        series_30d: series(rows, now, 30),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(hours_ago: i64, pattern: &str, agent: &str, fp: bool) -> StatsRow {
        StatsRow {
            timestamp: Utc::now() - Duration::hours(hours_ago),
            pattern: pattern.to_string(),
            agent_id: agent.to_string(),
            false_positive: fp,
        }
    }

    #[test]
    fn counts_totals_and_windows() {
        let rows = vec![row(1, "a", "agent1", false), row(48, "a", "agent1", false), row(200, "b", "agent2", true)];
        let stats = compute(&rows, 2, 1, Utc::now());
        assert_eq!(stats.total_blocks, 3);
        assert_eq!(stats.blocks_last_24h, 1);
        assert_eq!(stats.blocks_last_7d, 2);
        assert_eq!(stats.false_positive_count, 1);
    }

    #[test]
    fn empty_rows_degrade_to_zeros() {
        let stats = compute(&[], 0, 0, Utc::now());
        assert_eq!(stats.total_blocks, 0);
        assert_eq!(stats.false_positive_rate, 0.0);
    }

    #[test]
    fn top_patterns_ordered_by_count_descending() {
        let rows = vec![row(1, "a", "agent1", false), row(1, "a", "agent1", false), row(1, "b", "agent1", false)];
        let stats = compute(&rows, 0, 0, Utc::now());
        assert_eq!(stats.top_patterns[0].name, "a");
        assert_eq!(stats.top_patterns[0].count, 2);
    }

    #[test]
    fn series_fills_missing_days_with_zero() {
        let stats = compute(&[], 0, 0, Utc::now());
        assert_eq!(stats.series_7d.len(), 7);
        assert!(stats.series_7d.iter().all(|b| b.count == 0));
    }
}
