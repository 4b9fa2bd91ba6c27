use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use eventagg::aggregator::{lazy, realtime, AggregatorConfig};
use serde_json::json;

/// One aggregator to instantiate at startup: the registry `name`, the
/// `alias` it is served under, and its free-form params.
#[derive(Debug, Clone)]
pub struct AggregatorSpec {
    pub name: String,
    pub alias: String,
    pub params: AggregatorConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub shard_count: usize,
    pub aggregators: Vec<AggregatorSpec>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            data_dir: PathBuf::from("data"),
            shard_count: 4,
            aggregators: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Defaults plus `EVENTAGG_BIND_ADDR`, `EVENTAGG_DATA_DIR` and
    /// `EVENTAGG_SHARD_COUNT` overrides, with both built-in aggregators
    /// wired to the resolved data directory.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(addr) = std::env::var("EVENTAGG_BIND_ADDR") {
            if let Ok(addr) = addr.parse() {
                cfg.bind_addr = addr;
            }
        }
        if let Ok(dir) = std::env::var("EVENTAGG_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(count) = std::env::var("EVENTAGG_SHARD_COUNT") {
            if let Ok(count) = count.parse() {
                cfg.shard_count = count;
            }
        }
        cfg.aggregators = Self::default_aggregators(&cfg.data_dir);
        cfg
    }

    pub fn default_aggregators(data_dir: &Path) -> Vec<AggregatorSpec> {
        let mut lazy_params = AggregatorConfig::new();
        lazy_params.insert(
            "data_dir".to_string(),
            json!(data_dir.to_string_lossy().to_string()),
        );
        vec![
            AggregatorSpec {
                name: realtime::NAME.to_string(),
                alias: "realtime_count".to_string(),
                params: AggregatorConfig::new(),
            },
            AggregatorSpec {
                name: lazy::NAME.to_string(),
                alias: "range_count".to_string(),
                params: lazy_params,
            },
        ]
    }
}
