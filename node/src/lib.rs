// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! HTTP node wrapping the event aggregation core.

pub mod config;
pub mod errors;
pub mod server;
pub mod telemetry;
