//! Helpers for HTTP headers carrying `key=value` pairs.
//!
//! Correlation headers such as `Request-Context: appId=cid-v1:abc, roleName=api`
//! carry a list of `key=value` entries. These functions read and update such
//! lists without touching any shared header collection: updates return a new
//! list.

use crate::core::{CubeError, Result};
use std::collections::HashMap;

/// Split a raw header line into its trimmed, non-empty entries.
///
/// Both `,` and `;` separate entries.
pub fn split_header_list(raw: &str) -> Vec<&str> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Split one entry into trimmed key and value.
///
/// Entries without exactly one `=` are ignored.
fn parse_entry(entry: &str) -> Option<(&str, &str)> {
    let mut parts = entry.trim().split('=');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(key), Some(value), None) => Some((key.trim(), value.trim())),
        _ => None,
    }
}

/// Value of the first entry whose key equals `key_name` exactly.
pub fn get_header_key_value<'a, S: AsRef<str>>(
    header_values: &'a [S],
    key_name: &str,
) -> Option<&'a str> {
    header_values
        .iter()
        .filter_map(|entry| parse_entry(entry.as_ref()))
        .find(|(key, _)| *key == key_name)
        .map(|(_, value)| value)
}

/// Map every parsable entry's key to its value; the first occurrence of a key wins.
///
/// Returns `None` when no entry parses.
pub fn get_header_dictionary<S: AsRef<str>>(
    header_values: &[S],
) -> Option<HashMap<String, String>> {
    let mut dictionary = HashMap::new();
    for (key, value) in header_values.iter().filter_map(|entry| parse_entry(entry.as_ref())) {
        dictionary
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }

    if dictionary.is_empty() {
        None
    } else {
        Some(dictionary)
    }
}

/// Replace (or append) `key_name` in a list of header entries.
///
/// Every entry whose key matches `key_name`, ignoring surrounding whitespace
/// and ASCII case, is dropped and `key_name=key_value` is appended. The input
/// is left untouched.
pub fn update_header_with_key_value<S: AsRef<str>>(
    header_values: &[S],
    key_name: &str,
    key_value: &str,
) -> Vec<String> {
    let updated = format!("{}={}", key_name.trim(), key_value.trim());

    header_values
        .iter()
        .map(|entry| entry.as_ref())
        .filter(|entry| !header_matches_key(entry, key_name))
        .map(str::to_string)
        .chain(std::iter::once(updated))
        .collect()
}

/// Like [`update_header_with_key_value`], rejecting keys and values that
/// would produce an unparsable entry.
pub fn try_update_header_with_key_value<S: AsRef<str>>(
    header_values: &[S],
    key_name: &str,
    key_value: &str,
) -> Result<Vec<String>> {
    if key_name.trim().is_empty() {
        return Err(CubeError::header("key must not be empty"));
    }
    if let Some(bad) = [key_name, key_value]
        .into_iter()
        .find(|part| part.contains(['=', ',', ';']))
    {
        return Err(CubeError::header(format!(
            "'{}' contains a reserved separator",
            bad
        )));
    }
    Ok(update_header_with_key_value(header_values, key_name, key_value))
}

fn header_matches_key(entry: &str, key: &str) -> bool {
    match entry.split_once('=') {
        Some((entry_key, _)) => entry_key.trim().eq_ignore_ascii_case(key.trim()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_get_key_value() {
        let headers = ["appId = cid-v1:abc", "roleName=api"];
        assert_eq!(get_header_key_value(&headers, "appId"), Some("cid-v1:abc"));
        assert_eq!(get_header_key_value(&headers, "roleName"), Some("api"));
        assert_eq!(get_header_key_value(&headers, "missing"), None);
    }

    #[test]
    fn test_get_key_value_is_case_sensitive() {
        let headers = ["AppId=1"];
        assert_eq!(get_header_key_value(&headers, "appid"), None);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let headers = ["novalue", "a=b=c", "k=v"];
        assert_eq!(get_header_key_value(&headers, "a"), None);
        assert_eq!(get_header_key_value(&headers, "k"), Some("v"));
        assert_eq!(get_header_dictionary(&headers).unwrap().len(), 1);
    }

    #[test]
    fn test_dictionary_first_occurrence_wins() {
        let dictionary = get_header_dictionary(&["a=1", "a=2", "b=3"]).unwrap();

        let mut expected = HashMap::new();
        expected.insert("a".to_string(), "1".to_string());
        expected.insert("b".to_string(), "3".to_string());
        assert_eq!(dictionary, expected);
    }

    #[test]
    fn test_dictionary_empty_is_none() {
        let empty: [&str; 0] = [];
        assert_eq!(get_header_dictionary(&empty), None);
        assert_eq!(get_header_dictionary(&["garbage", ""]), None);
    }

    #[test]
    fn test_update_replaces_key() {
        let updated = update_header_with_key_value(&["a=1", "b=2"], "a", "9");

        assert_eq!(updated, vec!["b=2".to_string(), "a=9".to_string()]);
        assert_eq!(get_header_key_value(&updated, "a"), Some("9"));
    }

    #[test]
    fn test_update_matches_key_loosely() {
        let updated = update_header_with_key_value(&["  A =1", "ab=2"], "a", " 9 ");
        assert_eq!(updated, vec!["ab=2".to_string(), "a=9".to_string()]);
    }

    #[test]
    fn test_update_appends_to_empty() {
        let empty: Vec<String> = Vec::new();
        assert_eq!(update_header_with_key_value(&empty, " k ", "v"), vec!["k=v".to_string()]);
    }

    #[test]
    fn test_try_update_rejects_separators() {
        assert!(try_update_header_with_key_value(&["a=1"], "", "v").is_err());
        assert!(try_update_header_with_key_value(&["a=1"], "a", "x,y").is_err());
        assert_eq!(
            try_update_header_with_key_value(&["a=1"], "a", "2").unwrap(),
            vec!["a=2".to_string()]
        );
    }

    #[test]
    fn test_split_header_list() {
        assert_eq!(
            split_header_list(" appId=1, roleName=api;; x=y ,"),
            vec!["appId=1", "roleName=api", "x=y"]
        );
        assert!(split_header_list("  ").is_empty());
    }
}
