//! Preloadable content and priority ordering
//!
//! Items are dispatched by priority tier (lower tier loads first), with FIFO
//! ordering among items of the same tier.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Media kind of a preloadable item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentKind {
    Image,
    Video,
    Audio,
    Font,
    /// Inline or remote SVG
    Vector,
}

/// A single item to preload
///
/// Immutable once handed to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadableContent {
    /// Unique identifier, used as the key of its [`crate::PreloadResult`]
    pub id: String,

    pub kind: ContentKind,

    pub url: String,

    /// Lower values load earlier
    #[serde(default)]
    pub priority_tier: i32,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl PreloadableContent {
    /// Create an item in tier 0 with no metadata
    pub fn new(id: impl Into<String>, kind: ContentKind, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            url: url.into(),
            priority_tier: 0,
            metadata: Map::new(),
        }
    }

    /// Set the priority tier
    pub fn with_tier(mut self, tier: i32) -> Self {
        self.priority_tier = tier;
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// String metadata value for `key`, if present
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// A queued item with its insertion order
#[derive(Debug)]
struct QueuedItem {
    item: PreloadableContent,
    insertion_order: usize,
}

impl PartialEq for QueuedItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedItem {}

impl PartialOrd for QueuedItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap: the lowest tier, then the earliest
        // insertion, must compare greatest
        other
            .item
            .priority_tier
            .cmp(&self.item.priority_tier)
            .then_with(|| other.insertion_order.cmp(&self.insertion_order))
    }
}

/// Dispatch queue for one stage
///
/// Pops items in ascending priority tier, preserving input order within a
/// tier (a stable sort by tier).
#[derive(Debug, Default)]
pub struct DispatchQueue {
    heap: BinaryHeap<QueuedItem>,
}

impl DispatchQueue {
    /// Build a queue from a batch of items
    pub fn new(items: impl IntoIterator<Item = PreloadableContent>) -> Self {
        let heap = items
            .into_iter()
            .enumerate()
            .map(|(insertion_order, item)| QueuedItem {
                item,
                insertion_order,
            })
            .collect();
        Self { heap }
    }

    /// Pop the most urgent item
    pub fn pop(&mut self) -> Option<PreloadableContent> {
        self.heap.pop().map(|queued| queued.item)
    }

    /// Number of items still queued
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drain the remaining items in dispatch order
    pub fn drain_ordered(&mut self) -> Vec<PreloadableContent> {
        std::iter::from_fn(|| self.pop()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, tier: i32) -> PreloadableContent {
        PreloadableContent::new(id, ContentKind::Image, format!("https://cdn.test/{id}.jpg"))
            .with_tier(tier)
    }

    #[test]
    fn test_pops_lowest_tier_first() {
        let mut queue = DispatchQueue::new(vec![item("c", 2), item("a", 0), item("b", 1)]);

        assert_eq!(queue.pop().unwrap().id, "a");
        assert_eq!(queue.pop().unwrap().id, "b");
        assert_eq!(queue.pop().unwrap().id, "c");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_equal_tiers_keep_input_order() {
        let mut queue = DispatchQueue::new(vec![
            item("first", 1),
            item("urgent", 0),
            item("second", 1),
            item("third", 1),
        ]);

        let order: Vec<String> = queue.drain_ordered().into_iter().map(|i| i.id).collect();
        assert_eq!(order, vec!["urgent", "first", "second", "third"]);
    }

    #[test]
    fn test_negative_tiers_are_more_urgent() {
        let mut queue = DispatchQueue::new(vec![item("zero", 0), item("minus", -1)]);
        assert_eq!(queue.pop().unwrap().id, "minus");
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{"id":"hero","kind":"video","url":"https://cdn.test/hero.mp4"}"#;
        let parsed: PreloadableContent = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.kind, ContentKind::Video);
        assert_eq!(parsed.priority_tier, 0);
        assert!(parsed.metadata.is_empty());
    }

    #[test]
    fn test_metadata_str() {
        let font = PreloadableContent::new("f", ContentKind::Font, "https://cdn.test/a.woff2")
            .with_metadata("family", "Great Vibes");

        assert_eq!(font.metadata_str("family"), Some("Great Vibes"));
        assert_eq!(font.metadata_str("missing"), None);
    }
}
