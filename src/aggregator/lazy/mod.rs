// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Replay aggregator over the persisted shards.
//!
//! Stateless between queries: every `view` re-scans the shard directories
//! for the requested time window, replays the matching events into a
//! transient live rollup per shard and merges the partial rollups by
//! summing counts. No ordering across shards is provided.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use tokio::task::JoinSet;

use super::realtime::CountAggregator;
use super::{
    Aggregator, AggregatorConfig, AggregatorError, Collector, Param, Result, View, ViewOutput,
};
use crate::event::Event;

mod range_reader;
mod triplet;

pub use range_reader::{find_time_range, RangeError, TimeRangeReader};

/// Registry name of the replay rollup.
pub const NAME: &str = "lazy_persistence_range_count";

pub const KEY_TIME_RANGE_AFTER: &str = "after";
pub const KEY_TIME_RANGE_BEFORE: &str = "before";
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Counts persisted events per type within an arbitrary time window.
///
/// Constructed from the static list of shard directories found under
/// `data_dir`; ingestion is a no-op because the sharded persistence layer
/// owns the write path.
pub struct RangeCountAggregator {
    shard_dirs: Vec<PathBuf>,
    query_timeout: Duration,
}

pub fn new_range_count_aggregator(cfg: &AggregatorConfig) -> Result<Arc<dyn Aggregator>> {
    let dir = cfg
        .get("data_dir")
        .ok_or_else(|| {
            AggregatorError::InvalidConfig(
                "data directory not given for persistence based aggregator".to_string(),
            )
        })?
        .as_str()
        .ok_or_else(|| {
            AggregatorError::InvalidConfig("data directory should be a string".to_string())
        })?;

    let mut shard_dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            shard_dirs.push(entry.path());
        }
    }
    shard_dirs.sort();

    let query_timeout = cfg
        .get("query_timeout_secs")
        .and_then(|v| v.as_u64())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_QUERY_TIMEOUT);

    Ok(Arc::new(RangeCountAggregator {
        shard_dirs,
        query_timeout,
    }))
}

fn parse_bound(key: &'static str, value: &str) -> Result<i64> {
    let parsed = NaiveDateTime::parse_from_str(value, TIME_FORMAT)
        .map_err(|source| AggregatorError::TimeParse { key, source })?;
    Ok(parsed.and_utc().timestamp())
}

/// Replay one shard into a transient live rollup.
///
/// Runs on the blocking pool; the reads are plain file IO. A corrupt event
/// body ends the stream early instead of failing the shard, because the
/// JSON stream cannot resynchronize past bad bytes.
fn scan_shard(dir: &Path, after_ts: i64, before_ts: i64) -> Result<HashMap<String, i64>> {
    let reader = TimeRangeReader::open(dir, after_ts, before_ts)?;
    let rollup = CountAggregator::new();

    let mut stream = serde_json::Deserializer::from_reader(reader).into_iter::<Event>();
    for next in &mut stream {
        match next {
            Ok(ev) => rollup.record(&ev.event_type),
            Err(err) if err.is_eof() => break,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), %err, "skipping undecodable event data");
                break;
            }
        }
    }

    Ok(rollup.counts())
}

#[async_trait]
impl Collector for RangeCountAggregator {
    async fn add(&self, _ev: Arc<Event>) -> Result<()> {
        // replay variant never ingests; the write path feeds the shards
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl View for RangeCountAggregator {
    /// `after`/`before` default to epoch zero and now. One blocking task
    /// per shard directory, merged by summing counts per type. A failed
    /// shard is logged and dropped from the merge (best effort); the whole
    /// collection is bounded by the query deadline.
    async fn view(&self, params: &[Param]) -> Result<ViewOutput> {
        let mut after_ts = 0i64;
        let mut before_ts = Utc::now().timestamp();
        for param in params {
            match param.key.as_str() {
                KEY_TIME_RANGE_AFTER => {
                    after_ts = parse_bound(KEY_TIME_RANGE_AFTER, &param.value)?;
                }
                KEY_TIME_RANGE_BEFORE => {
                    before_ts = parse_bound(KEY_TIME_RANGE_BEFORE, &param.value)?;
                }
                _ => {}
            }
        }

        let mut scans = JoinSet::new();
        for dir in self.shard_dirs.clone() {
            scans.spawn_blocking(move || scan_shard(&dir, after_ts, before_ts));
        }

        let collect = async {
            let mut merged: HashMap<String, i64> = HashMap::new();
            while let Some(joined) = scans.join_next().await {
                match joined {
                    Ok(Ok(counts)) => {
                        for (event_type, count) in counts {
                            *merged.entry(event_type).or_insert(0) += count;
                        }
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(%err, "shard replay failed, result is partial");
                    }
                    Err(err) => {
                        tracing::warn!(%err, "shard replay task aborted, result is partial");
                    }
                }
            }
            merged
        };

        let merged = tokio::time::timeout(self.query_timeout, collect)
            .await
            .map_err(|_| AggregatorError::Timeout)?;
        Ok(ViewOutput::Counts(merged))
    }
}
