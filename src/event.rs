// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! The event type shared by every component.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single timestamped event.
///
/// Immutable once created; its JSON form is the unit of durability, so the
/// field names below are part of the on-disk shard format and must not
/// change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    #[serde(rename = "event_type")]
    pub event_type: String,
    /// Unix seconds. Wall-clock time supplied by the producer, not required
    /// to be monotonic across events.
    #[serde(rename = "ts")]
    pub time: i64,
    pub params: HashMap<String, serde_json::Value>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, time: i64) -> Self {
        Self {
            event_type: event_type.into(),
            time,
            params: HashMap::new(),
        }
    }
}
