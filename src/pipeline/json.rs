//! Lenient parsing of model verdicts.
//!
//! Models occasionally wrap JSON in prose or code fences; we salvage the
//! outermost object rather than failing the stage.

use serde_json::Value;

/// Extracts the first JSON object from raw model output.
pub fn extract_object(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if v.is_object() {
            return Some(v);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// First present boolean among alternative key spellings.
pub fn bool_field(obj: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| obj.get(k).and_then(Value::as_bool))
}

/// First present string among alternative key spellings.
pub fn str_field<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(k).and_then(Value::as_str))
}

/// First present number among alternative key spellings.
pub fn f64_field(obj: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| obj.get(k).and_then(Value::as_f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_object_parses() {
        let v = extract_object(r#"{"is_spam": true}"#).unwrap();
        assert_eq!(bool_field(&v, &["is_spam"]), Some(true));
    }

    #[test]
    fn fenced_object_is_salvaged() {
        let raw = "Here is the verdict:\n```json\n{\"isValid\": false, \"reason\": \"off topic\"}\n```";
        let v = extract_object(raw).unwrap();
        assert_eq!(bool_field(&v, &["is_valid", "isValid"]), Some(false));
        assert_eq!(str_field(&v, &["reason"]), Some("off topic"));
    }

    #[test]
    fn garbage_yields_none() {
        assert!(extract_object("not json at all").is_none());
        assert!(extract_object("[1, 2, 3]").is_none());
    }
}
