// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Append-only shard writer.
//!
//! One shard is a directory with exactly two files:
//! - `data.out`: serialized event bodies back-to-back, no delimiters;
//!   record boundaries exist only in the index file
//! - `data.idx`: one ASCII line `begin,end,ts` per record, byte offsets
//!   into `data.out`, timestamp in unix seconds

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use super::{PersistenceError, Result};
use crate::event::Event;

pub fn data_file_path(dir: &Path) -> PathBuf {
    dir.join("data.out")
}

pub fn index_file_path(dir: &Path) -> PathBuf {
    dir.join("data.idx")
}

/// Owns one data file and one index file, tracking the durable write
/// cursor. Create-or-reuse: reopening a shard directory appends after the
/// existing data.
pub struct ShardWriter {
    open: AtomicBool,
    cursor: u64,
    data: File,
    index: File,
}

impl ShardWriter {
    pub fn open(dir: &Path) -> Result<Self> {
        match fs::metadata(dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(PersistenceError::NotADirectory(dir.to_path_buf())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(dir)?;
            }
            Err(err) => return Err(err.into()),
        }

        let data = OpenOptions::new()
            .create(true)
            .append(true)
            .open(data_file_path(dir))?;
        let cursor = data.metadata()?.len();
        let index = OpenOptions::new()
            .create(true)
            .append(true)
            .open(index_file_path(dir))?;

        Ok(Self {
            open: AtomicBool::new(true),
            cursor,
            data,
            index,
        })
    }

    /// Serialize the event, append its body to the data file and the
    /// matching `begin,end,ts` triplet to the index file.
    pub fn append(&mut self, ev: &Event) -> Result<()> {
        if !self.is_open() {
            return Err(PersistenceError::WriterClosed);
        }

        let body = serde_json::to_vec(ev)?;
        self.data.write_all(&body)?;

        let begin = self.cursor;
        let end = begin + body.len() as u64;
        writeln!(self.index, "{},{},{}", begin, end, ev.time)?;
        self.cursor = end;

        Ok(())
    }

    /// Flush both files to stable storage and release the shard. The second
    /// call fails with [`PersistenceError::AlreadyClosed`].
    pub fn close(&mut self) -> Result<()> {
        if self
            .open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PersistenceError::AlreadyClosed);
        }

        self.index.sync_all()?;
        self.data.sync_all()?;
        Ok(())
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}
