// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Durable event persistence backends.

pub mod file;
