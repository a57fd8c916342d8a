// src/ai/parse.rs

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::ai::client::AiError;

/// Pulls the JSON payload out of a model reply. Providers in json_object mode
/// usually return bare JSON, but models still wrap payloads in markdown
/// fences often enough that both shapes have to be handled.
///
/// Order: fenced ```json block, then any fenced block, then the outermost
/// brace-delimited slice.
pub fn extract_json_block(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(re) = Regex::new(r"(?s)```(?:json)?\s*(.+?)\s*```") {
        if let Some(caps) = re.captures(trimmed) {
            if let Some(inner) = caps.get(1) {
                return Some(inner.as_str().to_string());
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(trimmed[start..=end].to_string())
}

/// Extracts and strictly decodes a typed payload from a model reply.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, AiError> {
    let block = extract_json_block(raw)
        .ok_or_else(|| AiError::Malformed("no JSON found in response".to_string()))?;
    serde_json::from_str(&block).map_err(|e| AiError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Payload {
        value: i32,
    }

    #[test]
    fn test_bare_json() {
        let decoded: Payload = decode(r#"{"value": 3}"#).unwrap();
        assert_eq!(decoded, Payload { value: 3 });
    }

    #[test]
    fn test_fenced_json() {
        let raw = "Here you go:\n```json\n{\"value\": 5}\n```\nanything else?";
        let decoded: Payload = decode(raw).unwrap();
        assert_eq!(decoded, Payload { value: 5 });
    }

    #[test]
    fn test_plain_fence() {
        let raw = "```\n{\"value\": 9}\n```";
        let decoded: Payload = decode(raw).unwrap();
        assert_eq!(decoded, Payload { value: 9 });
    }

    #[test]
    fn test_prose_wrapped_json() {
        let raw = "Sure! The result is {\"value\": 7} as requested.";
        let decoded: Payload = decode(raw).unwrap();
        assert_eq!(decoded, Payload { value: 7 });
    }

    #[test]
    fn test_no_json_is_malformed() {
        let result: Result<Payload, _> = decode("I cannot help with that.");
        assert!(matches!(result, Err(AiError::Malformed(_))));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let result: Result<Payload, _> = decode(r#"{"value": }"#);
        assert!(matches!(result, Err(AiError::Malformed(_))));
    }
}
