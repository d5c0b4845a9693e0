// Human-readable rendering of tool output
use serde_json::Value;

use crate::protocol::CallToolResult;

/// Text blocks joined by newlines.
///
/// When the result has no text block the structured content is rendered
/// instead, and failing that the whole result as JSON.
pub fn format_call_result(result: &CallToolResult) -> String {
    let texts: Vec<&str> = result.text_blocks().collect();
    if !texts.is_empty() {
        return texts.join("\n");
    }
    if let Some(structured) = &result.structured_content {
        return format_value(structured);
    }
    match serde_json::to_value(result) {
        Ok(value) => format_value(&value),
        Err(_) => format!("{result:?}"),
    }
}

/// Objects and arrays as indented JSON, strings verbatim, everything else in
/// its JSON form.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ContentBlock;
    use serde_json::json;

    #[test]
    fn joins_text_blocks_and_skips_others() {
        let result = CallToolResult {
            content: vec![
                ContentBlock::Text { text: "AAPL".into() },
                ContentBlock::Other(json!({"type": "image", "data": "xx"})),
                ContentBlock::Text { text: "189.3".into() },
            ],
            is_error: false,
            structured_content: None,
        };
        assert_eq!(format_call_result(&result), "AAPL\n189.3");
    }

    #[test]
    fn falls_back_without_text() {
        let structured = CallToolResult {
            content: vec![],
            is_error: false,
            structured_content: Some(json!({"price": 1})),
        };
        assert_eq!(format_call_result(&structured), "{\n  \"price\": 1\n}");

        let image_only = CallToolResult {
            content: vec![ContentBlock::Other(json!({"type": "image"}))],
            is_error: false,
            structured_content: None,
        };
        let rendered = format_call_result(&image_only);
        assert!(rendered.contains("\"image\""));
        assert!(rendered.contains("\"content\""));
    }

    #[test]
    fn formats_plain_values() {
        assert_eq!(format_value(&json!("plain")), "plain");
        assert_eq!(format_value(&json!(42)), "42");
        assert_eq!(format_value(&json!(null)), "null");
        assert_eq!(format_value(&json!([1, 2])), "[\n  1,\n  2\n]");
    }
}
