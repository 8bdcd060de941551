//! Pulls one JSON object out of free-form oracle text.
//!
//! Oracle replies routinely wrap the object in prose or Markdown fences, so
//! the first balanced `{ ... }` span wins. Braces inside string literals are
//! ignored while balancing.

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extracts and deserializes the object, mapping every failure to
/// [`Error::Interpretation`].
pub fn parse_object<T: DeserializeOwned>(text: &str) -> Result<T> {
    let raw = extract_json_object(text)
        .ok_or_else(|| Error::Interpretation("no JSON object found in response".to_owned()))?;
    serde_json::from_str(raw).map_err(|err| Error::Interpretation(format!("malformed JSON: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_wrapped_in_prose_and_fences() {
        let text = "Sure! Here it is:\n```json\n{\"a\": {\"b\": 1}}\n```\nAnything else?";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": 1}}"));
    }

    #[test]
    fn ignores_braces_inside_strings() {
        let text = r#"{"content": "he said \"}{\" and left", "n": 1} trailing }"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"content": "he said \"}{\" and left", "n": 1}"#)
        );
    }

    #[test]
    fn stops_at_first_complete_object() {
        assert_eq!(extract_json_object("{\"a\":1} {\"b\":2}"), Some("{\"a\":1}"));
    }

    #[test]
    fn unbalanced_or_missing_braces_yield_none() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{\"a\": {\"b\": 1}"), None);
        assert_eq!(extract_json_object("} only closing"), None);
    }

    #[test]
    fn parse_object_reports_interpretation_errors() {
        #[derive(Debug, serde::Deserialize)]
        struct Shape {
            #[allow(dead_code)]
            exists: bool,
        }

        let err = parse_object::<Shape>("nothing").unwrap_err();
        assert!(matches!(err, Error::Interpretation(_)));

        let err = parse_object::<Shape>("{\"exists\": \"maybe\"}").unwrap_err();
        assert!(matches!(err, Error::Interpretation(_)));

        assert!(parse_object::<Shape>("{\"exists\": true}").is_ok());
    }
}
