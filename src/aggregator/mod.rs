// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Aggregator contract and registry.
//!
//! An aggregator is anything that can take events (`add`), answer a query
//! (`view`) and release its resources (`close`). Two lifecycles exist: a
//! *live* aggregator is created once at startup and rolls events up as they
//! arrive; a *replay* aggregator is stateless and re-scans the persisted
//! shards per query. Both are produced by name through a [`Registry`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::event::Event;
use crate::persistence::file::PersistenceError;

pub mod lazy;
pub mod realtime;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("no aggregator registered under {0:?}")]
    NotFound(String),

    /// Registering the same name twice is a startup defect; construction
    /// must abort before queries are served.
    #[error("aggregator {0:?} is already registered")]
    DuplicateRegistration(String),

    #[error("invalid aggregator config: {0}")]
    InvalidConfig(String),

    #[error("failed to parse {key:?} time bound: {source}")]
    TimeParse {
        key: &'static str,
        source: chrono::ParseError,
    },

    #[error("query deadline exceeded")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Range(#[from] lazy::RangeError),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;

/// One ordered key/value query parameter, as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub value: String,
}

impl Param {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The result of a view. Serialized untagged, so a single count renders as
/// a bare number and a rollup as a type-to-count object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ViewOutput {
    Count(i64),
    Counts(HashMap<String, i64>),
}

/// Event sink half of the aggregator contract.
///
/// The sharded persistence layer implements only this half; it has no view.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn add(&self, ev: Arc<Event>) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// Query half of the aggregator contract.
#[async_trait]
pub trait View: Send + Sync {
    async fn view(&self, params: &[Param]) -> Result<ViewOutput>;
}

pub trait Aggregator: Collector + View {}

impl<T: Collector + View> Aggregator for T {}

/// Free-form per-aggregator configuration (mirrors the node config file).
pub type AggregatorConfig = HashMap<String, serde_json::Value>;

pub type Factory = fn(&AggregatorConfig) -> Result<Arc<dyn Aggregator>>;

/// Name-keyed aggregator factory registry.
///
/// Built explicitly at process start and passed by reference to whatever
/// needs it; there is deliberately no process-global registry.
pub struct Registry {
    factories: HashMap<String, Factory>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with every built-in aggregator registered.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(realtime::NAME, realtime::new_count_aggregator)?;
        registry.register(lazy::NAME, lazy::new_range_count_aggregator)?;
        Ok(registry)
    }

    pub fn register(&mut self, name: &str, factory: Factory) -> Result<()> {
        if self.factories.contains_key(name) {
            return Err(AggregatorError::DuplicateRegistration(name.to_string()));
        }
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    pub fn create(&self, name: &str, cfg: &AggregatorConfig) -> Result<Arc<dyn Aggregator>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| AggregatorError::NotFound(name.to_string()))?;
        factory(cfg)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
