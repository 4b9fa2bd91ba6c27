// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! In-process message queues.

pub mod local;

pub use local::{Queue, QueueError};
