//! Counter extraction from the payload's free-text log tail.

use regex::Regex;
use std::sync::LazyLock;

use super::types::StatsSnapshot;

static CONNECTIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Connections:\s*(\d+)").expect("valid regex"));
static VIEWERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Viewers:\s*(\d+)").expect("valid regex"));
static PINGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Pings:\s*(\d+)").expect("valid regex"));
static HEARTBEATS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Heartbeats:\s*(\d+)").expect("valid regex"));

/// Extract the four counters from `text`.
///
/// Returns `None` for empty input so callers can tell "nothing logged" from
/// "logged zeros". Each counter is matched independently; a missing label
/// (or a value too large for `u64`) reads as 0.
pub fn parse_stats(text: &str) -> Option<StatsSnapshot> {
    if text.trim().is_empty() {
        return None;
    }

    Some(StatsSnapshot {
        connections: first_count(&CONNECTIONS, text),
        viewers: first_count(&VIEWERS, text),
        pings: first_count(&PINGS, text),
        heartbeats: first_count(&HEARTBEATS, text),
    })
}

fn first_count(pattern: &Regex, text: &str) -> u64 {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_counters_default_to_zero() {
        let stats = parse_stats("Connections: 5\nViewers: 12").unwrap();
        assert_eq!(
            stats,
            StatsSnapshot {
                connections: 5,
                viewers: 12,
                pings: 0,
                heartbeats: 0,
            }
        );
    }

    #[test]
    fn empty_input_is_no_stats() {
        assert_eq!(parse_stats(""), None);
        assert_eq!(parse_stats("  \n\t"), None);
    }

    #[test]
    fn unrelated_text_is_a_zero_snapshot() {
        assert_eq!(parse_stats("starting up..."), Some(StatsSnapshot::default()));
    }

    #[test]
    fn all_counters_in_a_status_line() {
        let log = "[12:00:01] Connections: 40 | Viewers:38 | Pings: 120 | Heartbeats: 7\n";
        let stats = parse_stats(log).unwrap();
        assert_eq!(stats.connections, 40);
        assert_eq!(stats.viewers, 38);
        assert_eq!(stats.pings, 120);
        assert_eq!(stats.heartbeats, 7);
    }

    #[test]
    fn first_occurrence_wins() {
        let log = "Viewers: 3\nViewers: 9\n";
        assert_eq!(parse_stats(log).unwrap().viewers, 3);
    }

    #[test]
    fn overflowing_value_reads_as_zero() {
        let stats = parse_stats("Pings: 99999999999999999999999").unwrap();
        assert_eq!(stats.pings, 0);
    }
}
