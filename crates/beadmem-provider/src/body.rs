//! Issue description codec.
//!
//! Memory content is stored verbatim, followed by one trailer line carrying
//! the fields the engine has no column for:
//!
//! ```text
//! <content>
//!
//! <!-- beadmem:meta {"accessed_at":"...","parent_id":"bd-3"} -->
//! ```
//!
//! Descriptions without a well-formed trailer decode as plain content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const TRAILER_OPEN: &str = "<!-- beadmem:meta ";
const TRAILER_CLOSE: &str = " -->";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyMeta {
    #[serde(default, skip_serializing_if = "is_empty_value")]
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

impl BodyMeta {
    pub fn is_empty(&self) -> bool {
        is_empty_value(&self.metadata)
            && self.created_at.is_none()
            && self.accessed_at.is_none()
            && self.parent_id.is_none()
    }
}

pub fn encode_body(content: &str, meta: &BodyMeta) -> String {
    if meta.is_empty() {
        return content.to_string();
    }
    // Compact JSON never contains a raw newline, so the trailer stays one line.
    let json = serde_json::to_string(meta).unwrap_or_else(|_| "{}".to_string());
    format!("{content}\n\n{TRAILER_OPEN}{json}{TRAILER_CLOSE}")
}

pub fn decode_body(description: &str) -> (String, BodyMeta) {
    let (head, last) = match description.rsplit_once('\n') {
        Some((head, last)) => (Some(head), last),
        None => (None, description),
    };
    let Some(meta) = parse_trailer(last) else {
        return (description.to_string(), BodyMeta::default());
    };
    let content = head
        .map(|h| h.strip_suffix('\n').unwrap_or(h))
        .unwrap_or_default();
    (content.to_string(), meta)
}

fn parse_trailer(line: &str) -> Option<BodyMeta> {
    let json = line
        .strip_prefix(TRAILER_OPEN)?
        .strip_suffix(TRAILER_CLOSE)?;
    serde_json::from_str(json).ok()
}
