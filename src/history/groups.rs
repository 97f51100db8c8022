use crate::history::types::HistoryEntry;
use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone};
use serde::Serialize;

/// History bucketed by calendar day relative to "now"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryGroups {
    /// Entries created today
    pub today: Vec<HistoryEntry>,
    /// Entries created yesterday
    pub yesterday: Vec<HistoryEntry>,
    /// Entries from the last seven days, excluding today and yesterday
    pub this_week: Vec<HistoryEntry>,
    /// Everything older
    pub older: Vec<HistoryEntry>,
}

impl HistoryGroups {
    /// Buckets paired with their display labels, in display order
    pub fn labelled(&self) -> [(&'static str, &[HistoryEntry]); 4] {
        [
            ("Today", self.today.as_slice()),
            ("Yesterday", self.yesterday.as_slice()),
            ("This Week", self.this_week.as_slice()),
            ("Older", self.older.as_slice()),
        ]
    }

    /// Total number of entries across all buckets
    pub fn len(&self) -> usize {
        self.today.len() + self.yesterday.len() + self.this_week.len() + self.older.len()
    }

    /// True when every bucket is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bucket entries by the local calendar day they were created on
///
/// Order within each bucket follows the input order.
pub fn group_by_day<Tz: TimeZone>(entries: Vec<HistoryEntry>, now: DateTime<Tz>) -> HistoryGroups {
    let today = now.date_naive();
    let yesterday = today - Duration::days(1);
    let week_ago = today - Duration::days(7);

    let mut groups = HistoryGroups::default();
    for entry in entries {
        let day = local_day(entry.timestamp, &now.timezone());
        if day == today {
            groups.today.push(entry);
        } else if day == yesterday {
            groups.yesterday.push(entry);
        } else if day > week_ago {
            groups.this_week.push(entry);
        } else {
            groups.older.push(entry);
        }
    }
    groups
}

fn local_day<Tz: TimeZone>(timestamp_ms: i64, tz: &Tz) -> NaiveDate {
    tz.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

/// Human-friendly age of a timestamp ("Just now", "5m ago", "3h ago", or a date)
pub fn format_relative(timestamp_ms: i64, now: DateTime<Local>) -> String {
    let diff_ms = now.timestamp_millis() - timestamp_ms;
    let minutes = diff_ms / (1000 * 60);
    let hours = diff_ms / (1000 * 60 * 60);

    if minutes < 1 {
        return "Just now".to_string();
    }
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }
    if hours < 24 {
        return format!("{}h ago", hours);
    }

    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%b %-d, %-I:%M %p").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry_at(id: &str, dt: DateTime<Utc>) -> HistoryEntry {
        let mut e = HistoryEntry::new(id);
        e.id = id.to_string();
        e.timestamp = dt.timestamp_millis();
        e
    }

    #[test]
    fn test_group_by_day_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let entries = vec![
            entry_at("today", now - Duration::hours(2)),
            entry_at("yesterday", now - Duration::days(1)),
            entry_at("week", now - Duration::days(4)),
            entry_at("edge", now - Duration::days(7)),
            entry_at("old", now - Duration::days(30)),
        ];

        let groups = group_by_day(entries, now);
        assert_eq!(groups.today[0].id, "today");
        assert_eq!(groups.yesterday[0].id, "yesterday");
        assert_eq!(groups.this_week[0].id, "week");
        let older: Vec<_> = groups.older.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(older, vec!["edge", "old"]);
        assert_eq!(groups.len(), 5);
    }

    #[test]
    fn test_labelled_order() {
        let labels: Vec<_> = HistoryGroups::default()
            .labelled()
            .iter()
            .map(|(label, _)| *label)
            .collect();
        assert_eq!(labels, vec!["Today", "Yesterday", "This Week", "Older"]);
    }

    #[test]
    fn test_format_relative() {
        let now = Local::now();
        let ms = now.timestamp_millis();
        assert_eq!(format_relative(ms - 10_000, now), "Just now");
        assert_eq!(format_relative(ms - 5 * 60_000, now), "5m ago");
        assert_eq!(format_relative(ms - 3 * 3_600_000, now), "3h ago");
        assert_ne!(format_relative(ms - 3 * 86_400_000, now), "-");
    }
}
