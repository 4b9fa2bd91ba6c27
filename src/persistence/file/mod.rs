// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Sharded file persistence.
//!
//! Owns a fixed-size pool of shard writers. Every incoming event is routed
//! to exactly one shard by the round-robin router; one drain task per shard
//! applies its events strictly sequentially, so write order within a shard
//! is exactly router delivery order. There is no cross-shard ordering.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::aggregator::{self, Collector};
use crate::event::Event;

mod fanout;
mod worker;

pub(crate) use fanout::fanout_round_robin;
pub use worker::{data_file_path, index_file_path, ShardWriter};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("shard writer is closed")]
    WriterClosed,

    #[error("already closed")]
    AlreadyClosed,

    #[error("persistence input is closed")]
    Closed,

    #[error("invalid type for data dir: {0}")]
    NotADirectory(PathBuf),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Number of shards. Fixed for the lifetime of the data directory;
    /// shards are never merged or split.
    pub count: usize,
}

/// Deterministic directory of shard `idx` under the persistence root.
pub fn shard_path(dir: &Path, idx: usize) -> PathBuf {
    dir.join(format!("shard-{idx:06}"))
}

/// Event sink writing to a pool of [`ShardWriter`]s through the round-robin
/// router. Closing drops the input channel, which cascades: router flush,
/// shard channels close, each drain task closes its writer.
pub struct FilePersistence {
    input: Mutex<Option<mpsc::Sender<Arc<Event>>>>,
}

impl FilePersistence {
    /// Validates the data directory, opens (or reuses) every shard and
    /// spawns the drain tasks. If any shard fails to open, the shards
    /// already opened are closed before the error is returned; no
    /// partial-success state escapes construction.
    ///
    /// Must run inside a tokio runtime.
    pub fn new(cfg: Config) -> Result<Self> {
        let meta = fs::metadata(&cfg.data_dir)?;
        if !meta.is_dir() {
            return Err(PersistenceError::NotADirectory(cfg.data_dir));
        }

        let mut writers = Vec::with_capacity(cfg.count);
        for idx in 0..cfg.count {
            match ShardWriter::open(&shard_path(&cfg.data_dir, idx)) {
                Ok(writer) => writers.push(writer),
                Err(err) => {
                    for mut opened in writers {
                        if let Err(close_err) = opened.close() {
                            tracing::warn!(%close_err, "rollback close of shard failed");
                        }
                    }
                    return Err(err);
                }
            }
        }

        let (input_tx, input_rx) = mpsc::channel(cfg.count.max(1) * 10);
        let mut shard_channels = Vec::with_capacity(cfg.count);
        for (idx, mut writer) in writers.into_iter().enumerate() {
            let (shard_tx, mut shard_rx) = mpsc::channel::<Arc<Event>>(1);
            shard_channels.push(shard_tx);
            tokio::spawn(async move {
                while let Some(ev) = shard_rx.recv().await {
                    if let Err(err) = writer.append(&ev) {
                        tracing::warn!(shard = idx, %err, "failed to persist event");
                    }
                }
                if let Err(err) = writer.close() {
                    tracing::warn!(shard = idx, %err, "failed to close shard writer");
                }
            });
        }
        fanout_round_robin(input_rx, shard_channels);

        Ok(Self {
            input: Mutex::new(Some(input_tx)),
        })
    }
}

#[async_trait]
impl Collector for FilePersistence {
    async fn add(&self, ev: Arc<Event>) -> aggregator::Result<()> {
        let input = self.input.lock().clone();
        let Some(input) = input else {
            return Err(PersistenceError::Closed.into());
        };
        input
            .send(ev)
            .await
            .map_err(|_| PersistenceError::Closed.into())
    }

    async fn close(&self) -> aggregator::Result<()> {
        self.input.lock().take();
        Ok(())
    }
}
