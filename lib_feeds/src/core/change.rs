//! # Change Detection
//!
//! Polling the same endpoint usually returns the same document. Delivering it
//! again would re-render consumers and, worse, re-run the alerting side effects
//! of the domain monitors. The [`ChangeDetector`] compares each new payload with
//! the last one delivered for the feed using structural equality of
//! `serde_json::Value`: objects compare by key set and values (key order is
//! irrelevant), arrays element-wise in order, scalars by value.

use serde_json::Value;

/// Stateless structural comparison of feed payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    /// `true` when `next` must be delivered: there is no previous payload, or the
    /// two payloads differ structurally.
    pub fn has_changed(previous: Option<&Value>, next: &Value) -> bool {
        match previous {
            None => true,
            Some(previous) => previous != next,
        }
    }
}
