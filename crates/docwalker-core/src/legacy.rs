//! List column encoding.
//!
//! List-valued columns are stored as JSON arrays. Rows written by older
//! deployments used delimited text instead (`$12|$40|` for id lists,
//! `a|b|c` for string lists); those are still readable but never written.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a list column.
pub fn encode_list<T: Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a list of ids from a JSON array or the legacy `$1|$2|` form.
pub fn decode_ids(raw: &str) -> Vec<i64> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        return decode_json(raw);
    }
    raw.split('|')
        .filter_map(|s| s.trim().trim_start_matches('$').parse::<i64>().ok())
        .collect()
}

/// Decode a list of strings from a JSON array or the legacy `a|b|c` form.
pub fn decode_strings(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        return decode_json(raw);
    }
    raw.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn decode_json<T: DeserializeOwned>(raw: &str) -> Vec<T> {
    serde_json::from_str(raw).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_columns() {
        assert_eq!(encode_list(&[1i64, 2, 3]), "[1,2,3]");
        assert_eq!(decode_ids("[1,2,3]"), vec![1, 2, 3]);
        assert_eq!(
            decode_strings(r#"["fmt","net/http"]"#),
            vec!["fmt".to_string(), "net/http".to_string()]
        );
        assert!(decode_ids("").is_empty());
        assert!(decode_strings("").is_empty());
    }

    #[test]
    fn test_legacy_columns() {
        assert_eq!(decode_ids("$12|$40|"), vec![12, 40]);
        assert_eq!(decode_ids("$7|garbage|$8|"), vec![7, 8]);
        assert_eq!(decode_strings("fmt|net/http|"), vec!["fmt", "net/http"]);
    }

    #[test]
    fn test_malformed_json_is_empty() {
        assert!(decode_ids("[1,").is_empty());
    }
}
