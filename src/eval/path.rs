//! Dotted/indexed variable paths such as `row.accounts[0].balance`.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Split a path into its root variable name and the remaining segments.
/// Returns `None` for anything that is not a well-formed path.
pub fn parse_path(path: &str) -> Option<(String, Vec<PathSegment>)> {
    let path = path.trim();
    let mut chars = path.chars().peekable();
    let mut root = String::new();
    while let Some(&c) = chars.peek() {
        if c == '.' || c == '[' {
            break;
        }
        root.push(c);
        chars.next();
    }
    if !is_identifier(&root) {
        return None;
    }

    let mut segments = Vec::new();
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                let mut key = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '.' || c == '[' {
                        break;
                    }
                    key.push(c);
                    chars.next();
                }
                if key.is_empty() || !key.chars().all(is_identifier_char) {
                    return None;
                }
                segments.push(PathSegment::Key(key));
            }
            '[' => {
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(d) if d.is_ascii_digit() => digits.push(d),
                        _ => return None,
                    }
                }
                segments.push(PathSegment::Index(digits.parse().ok()?));
            }
            _ => return None,
        }
    }
    Some((root, segments))
}

/// Whether `text` is a plain variable path (as opposed to an expression).
pub fn is_path(text: &str) -> bool {
    parse_path(text).is_some()
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(is_identifier_char)
}

pub(crate) fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Walk `segments` down from `value`. Numeric keys index into arrays so
/// that `items.0` and `items[0]` are equivalent.
pub fn get_path<'a>(value: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key)?,
            (PathSegment::Key(key), Value::Array(items)) => items.get(key.parse::<usize>().ok()?)?,
            (PathSegment::Index(idx), Value::Array(items)) => items.get(*idx)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_path() {
        assert_eq!(
            parse_path("row.accounts[1].id"),
            Some((
                "row".to_string(),
                vec![
                    PathSegment::Key("accounts".to_string()),
                    PathSegment::Index(1),
                    PathSegment::Key("id".to_string()),
                ]
            ))
        );
        assert_eq!(parse_path("x"), Some(("x".to_string(), vec![])));
        assert!(parse_path("x + 1").is_none());
        assert!(parse_path("1abc").is_none());
        assert!(parse_path("a..b").is_none());
        assert!(parse_path("a[x]").is_none());
    }

    #[test]
    fn test_get_path() {
        let value = json!({"accounts": [{"id": "a"}, {"id": "b"}]});
        let (_, segments) = parse_path("row.accounts[1].id").unwrap();
        assert_eq!(get_path(&value, &segments), Some(&json!("b")));

        let (_, segments) = parse_path("row.accounts.0.id").unwrap();
        assert_eq!(get_path(&value, &segments), Some(&json!("a")));

        let (_, segments) = parse_path("row.missing").unwrap();
        assert_eq!(get_path(&value, &segments), None);
    }
}
