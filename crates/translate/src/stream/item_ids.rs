//! Canonical item-id tracking for Responses streams.
//!
//! The upstream emits different `id` values for the same logical output
//! item across `response.output_item.added` and `.done` events, which
//! breaks downstream parsers that assume id stability. The tracker pins
//! the id seen (or synthesized) at `added` time as canonical for that
//! `output_index` and rewrites every later event to match.

use rand::Rng;
use serde_json::Value;

use crate::TranslateError;

/// Per-stream table of `output_index` → canonical item id.
///
/// One instance belongs to one response stream; call
/// [`ItemIdTracker::clear`] before reusing it for another.
#[derive(Debug, Default)]
pub struct ItemIdTracker {
    ids: Vec<(u64, String)>,
}

impl ItemIdTracker {
    /// A fresh tracker with no recorded ids.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every recorded id. Must run between response streams.
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Rewrite one `data:` payload for consistency.
    ///
    /// - `response.output_item.added`: record the item id for its
    ///   `output_index`, synthesizing one when the upstream omitted it,
    ///   and write it back into the item. A second `added` for the same
    ///   index keeps the first id.
    /// - `response.output_item.done`: overwrite the item id with the
    ///   canonical one when known.
    /// - any other event carrying `output_index`: inject `item_id`.
    ///
    /// Empty payloads pass through untouched. Malformed JSON is an error.
    pub fn fix(&mut self, data: &str, event_type: &str) -> Result<String, TranslateError> {
        if data.trim().is_empty() {
            return Ok(data.to_string());
        }

        let mut value: Value = serde_json::from_str(data)?;

        match event_type {
            "response.output_item.added" => self.fix_added(&mut value),
            "response.output_item.done" => self.fix_done(&mut value),
            _ => self.inject_item_id(&mut value),
        }

        Ok(value.to_string())
    }

    /// The canonical id recorded for an output index, if any.
    pub fn canonical(&self, output_index: u64) -> Option<&str> {
        self.ids
            .iter()
            .find(|(index, _)| *index == output_index)
            .map(|(_, id)| id.as_str())
    }

    fn fix_added(&mut self, value: &mut Value) {
        let Some(output_index) = value.get("output_index").and_then(Value::as_u64) else {
            return;
        };

        let id = match self.canonical(output_index) {
            Some(existing) => existing.to_string(),
            None => {
                let id = value
                    .get("item")
                    .and_then(|item| item.get("id"))
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| synthesize_id(output_index));

                self.ids.push((output_index, id.clone()));
                id
            }
        };

        if let Some(item) = value.get_mut("item").and_then(Value::as_object_mut) {
            item.insert("id".to_string(), Value::String(id));
        }
    }

    fn fix_done(&mut self, value: &mut Value) {
        let Some(output_index) = value.get("output_index").and_then(Value::as_u64) else {
            return;
        };

        let Some(canonical) = self.canonical(output_index) else {
            return;
        };
        let canonical = canonical.to_string();

        if let Some(item) = value.get_mut("item").and_then(Value::as_object_mut) {
            item.insert("id".to_string(), Value::String(canonical));
        }
    }

    fn inject_item_id(&mut self, value: &mut Value) {
        let Some(output_index) = value.get("output_index").and_then(Value::as_u64) else {
            return;
        };

        let Some(canonical) = self.canonical(output_index) else {
            return;
        };
        let canonical = canonical.to_string();

        if let Some(object) = value.as_object_mut() {
            object.insert("item_id".to_string(), Value::String(canonical));
        }
    }
}

/// Deterministic-format synthesized id: `oi_<index>_<16 alnum chars>`.
fn synthesize_id(output_index: u64) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

    let mut rng = rand::rng();
    let suffix: String = (0..16)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect();

    format!("oi_{output_index}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixed(tracker: &mut ItemIdTracker, data: Value, event_type: &str) -> Value {
        let out = tracker.fix(&data.to_string(), event_type).unwrap();
        serde_json::from_str(&out).unwrap()
    }

    #[test]
    fn done_inherits_the_added_id() {
        let mut tracker = ItemIdTracker::new();

        let added = fixed(
            &mut tracker,
            json!({ "output_index": 0, "item": { "id": "canonical_123", "type": "message" } }),
            "response.output_item.added",
        );
        assert_eq!(added["item"]["id"], "canonical_123");

        let done = fixed(
            &mut tracker,
            json!({ "output_index": 0, "item": { "id": "different_456", "type": "message" } }),
            "response.output_item.done",
        );
        assert_eq!(done["item"]["id"], "canonical_123");
    }

    #[test]
    fn missing_id_is_synthesized_with_stable_format() {
        let mut tracker = ItemIdTracker::new();

        let added = fixed(
            &mut tracker,
            json!({ "output_index": 3, "item": { "type": "function_call" } }),
            "response.output_item.added",
        );

        let id = added["item"]["id"].as_str().unwrap();
        assert!(id.starts_with("oi_3_"));
        assert_eq!(id.len(), "oi_3_".len() + 16);
        assert!(
            id["oi_3_".len()..]
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );

        // Every later event for the index sees the same id.
        assert_eq!(tracker.canonical(3), Some(id));
    }

    #[test]
    fn repeated_added_keeps_the_first_id() {
        let mut tracker = ItemIdTracker::new();

        fixed(
            &mut tracker,
            json!({ "output_index": 1, "item": { "id": "first" } }),
            "response.output_item.added",
        );
        let second = fixed(
            &mut tracker,
            json!({ "output_index": 1, "item": { "id": "second" } }),
            "response.output_item.added",
        );

        assert_eq!(second["item"]["id"], "first");
        assert_eq!(tracker.canonical(1), Some("first"));
    }

    #[test]
    fn other_events_get_item_id_injected() {
        let mut tracker = ItemIdTracker::new();

        fixed(
            &mut tracker,
            json!({ "output_index": 0, "item": { "id": "id_0" } }),
            "response.output_item.added",
        );

        let delta = fixed(
            &mut tracker,
            json!({ "output_index": 0, "delta": "hel" }),
            "response.output_text.delta",
        );
        assert_eq!(delta["item_id"], "id_0");

        // Unknown index passes through untouched.
        let other = fixed(
            &mut tracker,
            json!({ "output_index": 9, "delta": "lo" }),
            "response.output_text.delta",
        );
        assert!(other.get("item_id").is_none());
    }

    #[test]
    fn empty_data_passes_through_and_malformed_errors() {
        let mut tracker = ItemIdTracker::new();

        assert_eq!(tracker.fix("", "response.created").unwrap(), "");
        assert!(tracker.fix("{not json", "response.created").is_err());
    }

    #[test]
    fn clear_resets_the_table() {
        let mut tracker = ItemIdTracker::new();

        fixed(
            &mut tracker,
            json!({ "output_index": 0, "item": { "id": "id_0" } }),
            "response.output_item.added",
        );
        tracker.clear();

        assert_eq!(tracker.canonical(0), None);
    }
}
