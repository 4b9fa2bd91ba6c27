// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Index triplet parsing and ordering.

use thiserror::Error;

/// One index record: the byte span `[begin, end)` of a serialized event in
/// the shard data file, plus that event's timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Triplet {
    pub begin: i64,
    pub end: i64,
    pub ts: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum TripletError {
    /// Not three comma-separated fields. Happens on a partially flushed
    /// trailing line; the caller skips it.
    #[error("not a triplet")]
    NotATriplet,

    /// Three fields, but not integers. This is real corruption.
    #[error("invalid triplet format")]
    Invalid,
}

impl Triplet {
    pub fn parse(line: &[u8]) -> Result<Self, TripletError> {
        let fields: Vec<&[u8]> = line.split(|b| *b == b',').collect();
        if fields.len() != 3 {
            return Err(TripletError::NotATriplet);
        }

        let parse_field = |field: &[u8]| -> Result<i64, TripletError> {
            std::str::from_utf8(field)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(TripletError::Invalid)
        };

        Ok(Self {
            begin: parse_field(fields[0])?,
            end: parse_field(fields[1])?,
            ts: parse_field(fields[2])?,
        })
    }

    /// Ordering by timestamp, ties broken by `begin`. Used to keep the
    /// earliest candidate while searching for the lower bound.
    pub fn is_before(&self, other: &Triplet) -> bool {
        if self.ts == other.ts {
            return self.begin < other.begin;
        }
        self.ts < other.ts
    }

    /// Mirror of [`Triplet::is_before`] for the upper bound: later
    /// timestamp wins, ties broken toward the larger `begin`.
    pub fn is_after(&self, other: &Triplet) -> bool {
        if self.ts == other.ts {
            return self.begin > other.begin;
        }
        self.ts > other.ts
    }
}
