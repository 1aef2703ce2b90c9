//! Shared "is this JSON value empty" rule used by the merger (and by the citation
//! graph's normalisation step): null, an empty array, an object whose `data` key is
//! an empty array, or a whitespace-only string all count as empty.

use serde_json::Value;

pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => match o.get("data") {
            Some(Value::Array(a)) => a.is_empty(),
            _ => false,
        },
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_is_empty() {
        assert!(is_empty_value(Some(&Value::Null)));
        assert!(is_empty_value(None));
    }

    #[test]
    fn empty_array_is_empty() {
        assert!(is_empty_value(Some(&json!([]))));
    }

    #[test]
    fn non_empty_array_is_not_empty() {
        assert!(!is_empty_value(Some(&json!([1]))));
    }

    #[test]
    fn object_with_empty_data_is_empty() {
        assert!(is_empty_value(Some(&json!({"data": []}))));
    }

    #[test]
    fn object_with_nonempty_data_is_not_empty() {
        assert!(!is_empty_value(Some(&json!({"data": [1]}))));
    }

    #[test]
    fn object_without_data_is_not_empty() {
        assert!(!is_empty_value(Some(&json!({"other": 1}))));
    }

    #[test]
    fn whitespace_string_is_empty() {
        assert!(is_empty_value(Some(&json!("   "))));
        assert!(is_empty_value(Some(&json!(""))));
    }

    #[test]
    fn non_empty_string_is_not_empty() {
        assert!(!is_empty_value(Some(&json!("hello"))));
    }

    #[test]
    fn number_is_not_empty() {
        assert!(!is_empty_value(Some(&json!(42))));
    }
}
