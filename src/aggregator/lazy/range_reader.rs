// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Time-range lookup over a shard index, plus the bounded data reader.
//!
//! The index maps byte spans of the data file to timestamps, one ASCII line
//! per record. Lines are appended in write order, so `begin` is
//! non-decreasing, but timestamps are wall-clock and may be locally
//! out of order; both binary searches therefore track the closest candidate
//! seen instead of assuming strict monotonicity.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use thiserror::Error;

use super::triplet::{Triplet, TripletError};
use crate::persistence::file::{data_file_path, index_file_path};

#[derive(Debug, Error)]
pub enum RangeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// An index line had three fields that failed integer parsing. Unlike a
    /// partially flushed short line this cannot be skipped safely.
    #[error("corrupt index line")]
    CorruptIndex,
}

pub type Result<T> = std::result::Result<T, RangeError>;

/// Read the full index line covering byte `pos`.
///
/// Binary search probes arbitrary mid-byte positions, so this scans
/// backward to the preceding newline and then reads forward. If `pos`
/// lands exactly on a newline the following line is returned; a probe past
/// the last byte yields an empty line, which the caller treats as absent.
fn line_at<R: Read + Seek>(reader: &mut R, pos: u64) -> io::Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(pos))?;

    let mut scan = pos as i64;
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte)? {
            0 => return Ok(Vec::new()),
            _ if byte[0] == b'\n' => break,
            _ => {}
        }
        scan -= 1;
        if scan > -1 {
            // one back for the byte just read, one more to step backward
            reader.seek(SeekFrom::Current(-2))?;
        } else {
            break;
        }
    }
    if scan < 0 {
        reader.seek(SeekFrom::Start(0))?;
    }

    let mut line = Vec::new();
    let mut buffered = BufReader::new(reader);
    buffered.read_until(b'\n', &mut line)?;
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    Ok(line)
}

/// Locate the data-file byte span covering the time window
/// `[after_ts, before_ts]`.
///
/// Two independent binary searches over index byte positions: the lower
/// bound keeps the triplet with the smallest timestamp >= `after_ts`
/// (ties toward the earlier write), the upper bound the largest timestamp
/// <= `before_ts` (ties toward the later write). A window entirely outside
/// the indexed data returns the zero span `(0, 0)`; callers treat that as
/// "no data", not an error. Short lines from unflushed writes are skipped
/// by narrowing the window.
pub fn find_time_range<R: Read + Seek>(
    index: &mut R,
    after_ts: i64,
    before_ts: i64,
    index_len: u64,
) -> Result<(u64, u64)> {
    let mut lower: Option<Triplet> = None;
    let mut smallest_diff = i64::MAX;

    let mut begin = 0i64;
    let mut end = index_len as i64;
    while begin < end {
        let mid = begin + (end - begin) / 2;
        let line = line_at(index, mid as u64)?;
        let t = match Triplet::parse(&line) {
            Ok(t) => t,
            Err(TripletError::NotATriplet) => {
                end -= 1;
                continue;
            }
            Err(TripletError::Invalid) => return Err(RangeError::CorruptIndex),
        };

        if t.ts < after_ts {
            begin = mid + 1;
            continue;
        }

        let diff = (t.ts - after_ts).abs();
        if diff <= smallest_diff {
            smallest_diff = diff;
            if lower.map_or(true, |current| t.is_before(&current)) {
                lower = Some(t);
            }
            end = mid - 1;
        } else {
            begin = mid + 1;
        }
    }
    let Some(lower) = lower else {
        // everything in the index is older than the window
        return Ok((0, 0));
    };

    let mut upper: Option<Triplet> = None;
    smallest_diff = i64::MAX;
    end = index_len as i64;
    while begin < end {
        let mid = begin + (end - begin) / 2;
        let line = line_at(index, mid as u64)?;
        let t = match Triplet::parse(&line) {
            Ok(t) => t,
            Err(TripletError::NotATriplet) => {
                end -= 1;
                continue;
            }
            Err(TripletError::Invalid) => return Err(RangeError::CorruptIndex),
        };

        if t.ts > before_ts {
            end = mid - 1;
            continue;
        }

        let diff = (before_ts - t.ts).abs();
        if diff <= smallest_diff {
            smallest_diff = diff;
            if upper.map_or(true, |current| t.is_after(&current)) {
                upper = Some(t);
            }
            begin = mid + 1;
        } else {
            end = mid - 1;
        }
    }
    let Some(upper) = upper else {
        // everything in the index is newer than the window
        return Ok((0, 0));
    };

    Ok((lower.begin as u64, upper.end as u64))
}

/// Sequential byte source over one shard's data file, clamped to the span
/// covering a time window. Returns end-of-stream exactly at the span
/// boundary; the caller re-decodes serialized events from the stream.
pub struct TimeRangeReader {
    data: File,
    begin: u64,
    end: u64,
}

impl TimeRangeReader {
    pub fn open(shard_dir: &Path, after_ts: i64, before_ts: i64) -> Result<Self> {
        let mut data = File::open(data_file_path(shard_dir))?;
        let mut index = File::open(index_file_path(shard_dir))?;
        let index_len = index.metadata()?.len();

        let (begin, end) = find_time_range(&mut index, after_ts, before_ts, index_len)?;
        if begin < end {
            data.seek(SeekFrom::Start(begin))?;
        }

        Ok(Self { data, begin, end })
    }

    pub fn span(&self) -> (u64, u64) {
        (self.begin, self.end)
    }
}

impl Read for TimeRangeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.begin >= self.end {
            return Ok(0);
        }
        let cap = ((self.end - self.begin) as usize).min(buf.len());
        let n = self.data.read(&mut buf[..cap])?;
        self.begin += n as u64;
        Ok(n)
    }
}
