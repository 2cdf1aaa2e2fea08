//! Tool results and wire framing.

use serde::{Deserialize, Serialize};

use crate::ErrorKind;

/// Maximum framed payload size in bytes; larger payloads are truncated and
/// marked as such.
pub const FRAME_PAYLOAD_LIMIT: usize = 50_000;

/// The outcome of one tool invocation.
///
/// Failures are values, not exceptions: an `ok=false` result is framed and
/// reinjected so the model can adapt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Human-readable detail (offending argument, exit status, …).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_read: Option<u64>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolResult {
    #[must_use]
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error_kind: None,
            detail: None,
            truncated: false,
            bytes_read: None,
        }
    }

    #[must_use]
    pub fn failure(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error_kind: Some(kind),
            detail: Some(detail.into()),
            truncated: false,
            bytes_read: None,
        }
    }

    #[must_use]
    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    #[must_use]
    pub fn with_bytes_read(mut self, bytes: u64) -> Self {
        self.bytes_read = Some(bytes);
        self
    }

    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }
}

/// Frame a result for reinjection into the model context.
///
/// `[TOOL_RESULT name]\n<json>\n[/TOOL_RESULT]`. Payloads exceeding
/// [`FRAME_PAYLOAD_LIMIT`] are re-serialized with the oversized `data`
/// replaced by a truncated string form and `truncated=true`.
#[must_use]
pub fn frame_result(name: &str, result: &ToolResult) -> String {
    let json = serde_json::to_string(result).unwrap_or_else(|_| "{\"ok\":false}".to_string());
    let json = if json.len() > FRAME_PAYLOAD_LIMIT {
        let mut clipped = result.clone();
        clipped.truncated = true;
        clipped.data = clipped.data.map(|v| {
            let text = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            let mut end = FRAME_PAYLOAD_LIMIT.min(text.len());
            while end > 0 && !text.is_char_boundary(end) {
                end -= 1;
            }
            serde_json::Value::String(text[..end].to_string())
        });
        serde_json::to_string(&clipped).unwrap_or_else(|_| "{\"ok\":false}".to_string())
    } else {
        json
    };
    format!("[TOOL_RESULT {name}]\n{json}\n[/TOOL_RESULT]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_has_no_error_kind() {
        let result = ToolResult::success(json!({"lines": 3}));
        assert!(result.ok);
        assert!(result.error_kind.is_none());
    }

    #[test]
    fn failure_serializes_canonical_kind() {
        let result = ToolResult::failure(ErrorKind::BlockedMetacharacter, "&&");
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"error_kind\":\"blocked_metacharacter\""));
        assert!(json.contains("\"ok\":false"));
    }

    #[test]
    fn frame_wraps_with_markers() {
        let result = ToolResult::success(json!("hello"));
        let framed = frame_result("file_read", &result);
        assert!(framed.starts_with("[TOOL_RESULT file_read]\n"));
        assert!(framed.ends_with("\n[/TOOL_RESULT]"));
    }

    #[test]
    fn frame_truncates_oversized_payload() {
        let big = "x".repeat(FRAME_PAYLOAD_LIMIT * 2);
        let result = ToolResult::success(json!(big));
        let framed = frame_result("file_read", &result);
        assert!(framed.len() < FRAME_PAYLOAD_LIMIT + 200);
        let body = framed
            .strip_prefix("[TOOL_RESULT file_read]\n")
            .and_then(|s| s.strip_suffix("\n[/TOOL_RESULT]"))
            .unwrap();
        let parsed: ToolResult = serde_json::from_str(body).unwrap();
        assert!(parsed.truncated);
        assert!(parsed.ok);
    }

    #[test]
    fn truncation_flag_survives_roundtrip() {
        let result = ToolResult::success(json!("out")).with_truncated(true);
        let json = serde_json::to_string(&result).unwrap();
        let back: ToolResult = serde_json::from_str(&json).unwrap();
        assert!(back.truncated);
    }
}
