// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Live in-memory rollup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AggregatorConfig, Collector, Param, Result, View, ViewOutput};
use crate::event::Event;

/// Registry name of the live rollup.
pub const NAME: &str = "realtime_count";

/// Query parameter selecting a single event type.
pub const KEY_EVENT_TYPE: &str = "event_type";

/// Counts events per type as they arrive. O(1) to query, approximate only
/// in the sense that it observes whatever reached the queue so far.
pub struct CountAggregator {
    counts: Mutex<HashMap<String, i64>>,
}

pub fn new_count_aggregator(_cfg: &AggregatorConfig) -> Result<Arc<dyn super::Aggregator>> {
    Ok(Arc::new(CountAggregator::new()))
}

impl CountAggregator {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Synchronous ingest path, shared with the replay aggregator which
    /// feeds a transient instance of this rollup from disk.
    pub(crate) fn record(&self, event_type: &str) {
        let mut counts = self.counts.lock();
        *counts.entry(event_type.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn counts(&self) -> HashMap<String, i64> {
        self.counts.lock().clone()
    }
}

impl Default for CountAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for CountAggregator {
    async fn add(&self, ev: Arc<Event>) -> Result<()> {
        self.record(&ev.event_type);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // no external resources
        Ok(())
    }
}

#[async_trait]
impl View for CountAggregator {
    async fn view(&self, params: &[Param]) -> Result<ViewOutput> {
        for param in params {
            if param.key == KEY_EVENT_TYPE {
                let counts = self.counts.lock();
                return Ok(ViewOutput::Count(
                    counts.get(&param.value).copied().unwrap_or(0),
                ));
            }
        }
        Ok(ViewOutput::Counts(self.counts()))
    }
}
