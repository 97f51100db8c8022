//! Shape checks and best-effort repair for persisted history entries
//!
//! Partitions may have been written by older clients or edited by hand, so
//! the store works on raw `serde_json::Value`s: strict validation first, then
//! a lenient repair that salvages whatever can be salvaged.

use crate::history::types::{default_workspace_id, HistoryEntry, SearchResult, Summary};
use chrono::DateTime;
use serde_json::{Map, Value};

/// Strict shape check for a persisted history entry
///
/// # Examples
///
/// ```
/// use researchflow::history::validation::is_valid_history_entry;
/// use serde_json::json;
///
/// let entry = json!({
///     "id": "01HX", "query": "rust", "timestamp": 1,
///     "results": [], "summary": {"summary": "", "keyPoints": []}, "questions": []
/// });
/// assert!(is_valid_history_entry(&entry));
/// assert!(!is_valid_history_entry(&json!({"id": "01HX"})));
/// ```
pub fn is_valid_history_entry(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };

    non_empty_str(obj, "id").is_some()
        && non_empty_str(obj, "query").is_some()
        && obj
            .get("timestamp")
            .and_then(Value::as_i64)
            .is_some_and(|ts| ts >= 0)
        && obj
            .get("results")
            .and_then(Value::as_array)
            .is_some_and(|results| results.iter().all(is_valid_result))
        && obj.get("summary").is_some_and(is_valid_summary)
        && obj
            .get("questions")
            .and_then(Value::as_array)
            .is_some_and(|qs| qs.iter().all(Value::is_string))
        && obj
            .get("workspaceId")
            .map_or(true, |ws| ws.is_string() || ws.is_null())
}

/// Best-effort repair of an entry that failed [`is_valid_history_entry`]
///
/// Returns `None` when the entry has no usable `id` or `query`. Otherwise
/// malformed results and questions are dropped, a missing summary becomes
/// empty, and an unusable timestamp becomes 0 so the entry sorts as oldest.
pub fn repair_entry(value: &Value) -> Option<HistoryEntry> {
    let obj = value.as_object()?;
    let id = non_empty_str(obj, "id")?.to_string();
    let query = non_empty_str(obj, "query")?.to_string();

    let results = obj
        .get("results")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(repair_result).collect())
        .unwrap_or_default();

    let questions = obj
        .get("questions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let workspace_id = non_empty_str(obj, "workspaceId")
        .map(str::to_string)
        .unwrap_or_else(default_workspace_id);

    Some(HistoryEntry {
        id,
        query,
        timestamp: repair_timestamp(obj.get("timestamp")),
        results,
        summary: repair_summary(obj.get("summary")),
        questions,
        workspace_id,
    })
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    obj.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn is_valid_result(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    ["title", "description", "url"]
        .iter()
        .all(|field| obj.get(*field).is_some_and(Value::is_string))
        && obj
            .get("snippet")
            .map_or(true, |s| s.is_string() || s.is_null())
}

fn is_valid_summary(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    obj.get("summary").is_some_and(Value::is_string)
        && obj
            .get("keyPoints")
            .and_then(Value::as_array)
            .is_some_and(|points| points.iter().all(Value::is_string))
}

fn repair_result(value: &Value) -> Option<SearchResult> {
    let obj = value.as_object()?;
    let url = non_empty_str(obj, "url")?.to_string();
    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| url.clone());
    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let snippet = obj
        .get("snippet")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(SearchResult {
        title,
        description,
        url,
        snippet,
    })
}

fn repair_summary(value: Option<&Value>) -> Summary {
    match value {
        Some(Value::String(text)) => Summary {
            summary: text.clone(),
            ..Summary::default()
        },
        Some(Value::Object(obj)) => Summary {
            summary: obj
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            key_points: obj
                .get("keyPoints")
                .and_then(Value::as_array)
                .map(|points| {
                    points
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            word_count: obj
                .get("wordCount")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok()),
        },
        _ => Summary::default(),
    }
}

fn repair_timestamp(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .filter(|ts| *ts >= 0)
            .unwrap_or(0),
        Some(Value::String(s)) => s
            .parse::<i64>()
            .ok()
            .or_else(|| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.timestamp_millis())
            })
            .filter(|ts| *ts >= 0)
            .unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_entry() -> Value {
        json!({
            "id": "entry-1",
            "query": "rust ownership",
            "timestamp": 1_700_000_000_000_i64,
            "results": [
                {"title": "The Book", "description": "Ownership chapter", "url": "https://doc.rust-lang.org"}
            ],
            "summary": {"summary": "Ownership rules", "keyPoints": ["one owner"]},
            "questions": ["What is borrowing?"],
            "workspaceId": "ws-1"
        })
    }

    #[test]
    fn test_valid_entry_passes() {
        assert!(is_valid_history_entry(&valid_entry()));
    }

    #[test]
    fn test_missing_workspace_is_still_valid() {
        let mut entry = valid_entry();
        entry.as_object_mut().unwrap().remove("workspaceId");
        assert!(is_valid_history_entry(&entry));
    }

    #[test]
    fn test_invalid_shapes_are_rejected() {
        let cases = [
            json!("not an object"),
            json!({"id": "", "query": "q"}),
            {
                let mut e = valid_entry();
                e["timestamp"] = json!(-1);
                e
            },
            {
                let mut e = valid_entry();
                e["results"] = json!([{"title": "t"}]);
                e
            },
            {
                let mut e = valid_entry();
                e["summary"] = json!("plain text");
                e
            },
            {
                let mut e = valid_entry();
                e["questions"] = json!([1, 2]);
                e
            },
        ];
        for case in cases.iter() {
            assert!(!is_valid_history_entry(case), "accepted {}", case);
        }
    }

    #[test]
    fn test_repair_requires_id_and_query() {
        assert!(repair_entry(&json!({"query": "q"})).is_none());
        assert!(repair_entry(&json!({"id": "x"})).is_none());
        assert!(repair_entry(&json!(42)).is_none());
    }

    #[test]
    fn test_repair_fills_defaults() {
        let repaired = repair_entry(&json!({"id": "x", "query": "q"})).unwrap();
        assert_eq!(repaired.timestamp, 0);
        assert!(repaired.results.is_empty());
        assert_eq!(repaired.summary, Summary::default());
        assert_eq!(repaired.workspace_id, "default");
    }

    #[test]
    fn test_repair_salvages_partial_data() {
        let repaired = repair_entry(&json!({
            "id": "x",
            "query": "q",
            "timestamp": "2024-01-01T00:00:00Z",
            "results": [
                {"url": "https://a.example"},
                {"title": "no url"},
                "garbage"
            ],
            "summary": "plain summary",
            "questions": ["keep", 7, null],
            "workspaceId": ""
        }))
        .unwrap();

        assert_eq!(repaired.timestamp, 1_704_067_200_000);
        assert_eq!(repaired.results.len(), 1);
        assert_eq!(repaired.results[0].title, "https://a.example");
        assert_eq!(repaired.summary.summary, "plain summary");
        assert_eq!(repaired.questions, vec!["keep".to_string()]);
        assert_eq!(repaired.workspace_id, "default");
    }

    #[test]
    fn test_repair_float_timestamp() {
        let repaired = repair_entry(&json!({"id": "x", "query": "q", "timestamp": 12.9})).unwrap();
        assert_eq!(repaired.timestamp, 12);
    }
}
