// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Event aggregation core.
//!
//! Ingested events flow through an in-process dispatch queue and fan out to
//! every registered collector: a sharded append-only file log plus any number
//! of live in-memory rollups. Historical queries bypass the queue and replay
//! the persisted shards for an arbitrary time window.
//!
//! # Modules
//! - `event`: the wire-level [`Event`] type
//! - `mq`: the single-consumer dispatch queue
//! - `persistence`: sharded append-only log with a parallel time index
//! - `aggregator`: the Add/View/Close contract, registry and the live and
//!   replay aggregator implementations

pub mod aggregator;
pub mod event;
pub mod mq;
pub mod persistence;

pub use event::Event;
