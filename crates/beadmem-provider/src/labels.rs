//! Reserved-prefix label codec.
//!
//! The engine indexes labels, not metadata, so session, agent and category
//! travel as `session:<id>`, `agent:<id>` and `memory:<category>`. Any other
//! label is a free tag. Reserved prefixes always win over user tags.

use beadmem_bd::MemoryCategory;

pub const SESSION_PREFIX: &str = "session:";
pub const AGENT_PREFIX: &str = "agent:";
pub const CATEGORY_PREFIX: &str = "memory:";

const RESERVED: [&str; 3] = [SESSION_PREFIX, AGENT_PREFIX, CATEGORY_PREFIX];

/// Structured view of an issue's labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryLabels {
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub category: Option<MemoryCategory>,
    pub tags: Vec<String>,
}

pub fn session_label(session_id: &str) -> String {
    format!("{SESSION_PREFIX}{session_id}")
}

pub fn agent_label(agent_id: &str) -> String {
    format!("{AGENT_PREFIX}{agent_id}")
}

pub fn category_label(category: MemoryCategory) -> String {
    format!("{CATEGORY_PREFIX}{category}")
}

pub fn is_reserved(label: &str) -> bool {
    RESERVED.iter().any(|prefix| label.starts_with(prefix))
}

/// Reserved labels first (session, agent, category), then free tags.
///
/// Tags that carry a reserved prefix are dropped; duplicate tags keep their
/// first position.
pub fn encode_labels(labels: &MemoryLabels) -> Vec<String> {
    let mut out = Vec::with_capacity(3 + labels.tags.len());
    if let Some(session_id) = &labels.session_id {
        out.push(session_label(session_id));
    }
    if let Some(agent_id) = &labels.agent_id {
        out.push(agent_label(agent_id));
    }
    if let Some(category) = labels.category {
        out.push(category_label(category));
    }
    for tag in &labels.tags {
        if tag.is_empty() || is_reserved(tag) || out.contains(tag) {
            continue;
        }
        out.push(tag.clone());
    }
    out
}

/// Inverse of [`encode_labels`].
///
/// The first label of each reserved prefix is taken and later ones are
/// ignored. A `memory:` label that names no known category is kept as a
/// free tag.
pub fn decode_labels(labels: &[String]) -> MemoryLabels {
    let mut decoded = MemoryLabels::default();
    for label in labels {
        if let Some(session_id) = label.strip_prefix(SESSION_PREFIX) {
            decoded.session_id.get_or_insert_with(|| session_id.to_string());
        } else if let Some(agent_id) = label.strip_prefix(AGENT_PREFIX) {
            decoded.agent_id.get_or_insert_with(|| agent_id.to_string());
        } else if let Some(raw) = label.strip_prefix(CATEGORY_PREFIX) {
            match raw.parse::<MemoryCategory>() {
                Ok(category) => {
                    decoded.category.get_or_insert(category);
                }
                Err(_) => push_tag(&mut decoded.tags, label),
            }
        } else {
            push_tag(&mut decoded.tags, label);
        }
    }
    decoded
}

fn push_tag(tags: &mut Vec<String>, tag: &str) {
    if !tags.iter().any(|t| t == tag) {
        tags.push(tag.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn encode_places_reserved_labels_first() {
        let labels = MemoryLabels {
            session_id: Some("s-1".to_string()),
            agent_id: Some("planner".to_string()),
            category: Some(MemoryCategory::Decision),
            tags: strings(&["db", "infra"]),
        };
        assert_eq!(
            encode_labels(&labels),
            strings(&[
                "session:s-1",
                "agent:planner",
                "memory:decision",
                "db",
                "infra"
            ])
        );
    }

    #[test]
    fn reserved_prefixes_win_over_user_tags() {
        let labels = MemoryLabels {
            session_id: Some("real".to_string()),
            agent_id: None,
            category: Some(MemoryCategory::Pattern),
            tags: strings(&["session:spoofed", "memory:decision", "agent:x", "ok", "ok"]),
        };
        let encoded = encode_labels(&labels);
        assert_eq!(encoded, strings(&["session:real", "memory:pattern", "ok"]));

        let decoded = decode_labels(&encoded);
        assert_eq!(decoded, MemoryLabels {
            tags: strings(&["ok"]),
            ..labels
        });
    }

    #[test]
    fn decode_takes_first_reserved_label() {
        let decoded = decode_labels(&strings(&[
            "free",
            "session:first",
            "session:second",
            "memory:learning",
            "memory:context",
        ]));
        assert_eq!(decoded.session_id.as_deref(), Some("first"));
        assert_eq!(decoded.category, Some(MemoryCategory::Learning));
        assert_eq!(decoded.tags, strings(&["free"]));
    }

    #[test]
    fn unknown_category_label_is_a_free_tag() {
        let decoded = decode_labels(&strings(&["memory:gossip"]));
        assert_eq!(decoded.category, None);
        assert_eq!(decoded.tags, strings(&["memory:gossip"]));
    }

    #[test]
    fn plain_labels_round_trip() {
        let decoded = decode_labels(&strings(&["a", "b:c", "sessionx"]));
        assert!(decoded.session_id.is_none());
        assert_eq!(decoded.tags, strings(&["a", "b:c", "sessionx"]));
    }
}
