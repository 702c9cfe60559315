use clap::{Arg, Command};
use dotenvy::dotenv;
use std::env;
use std::fmt;

use crate::chain::EARLIEST_BLOCK;

pub struct IndexerConfig {
    pub enable_indexer_env: bool,
    pub bridge_rpc_url: String,
    pub bridge_fallback_rpc_url: String,
    pub eth_rpc_urls: Vec<String>,
    pub price_api_url: String,
    pub initial_block: u64,
    pub final_block: u64,
    pub database_url: String,
    pub rpc_timeout_ms: u64,
    pub requeue_sleep: u64,
}

impl IndexerConfig {
    pub fn with_clap(app: Command) -> Self {
        let matches = app
            .arg(
                Arg::new("config")
                    .required(false)
                    .long("config")
                    .takes_value(true)
                    .help("Optionally sets a config file to use"),
            )
            .arg(
                Arg::new("database-url")
                    .required(false)
                    .long("database-url")
                    .takes_value(true)
                    .help("Postgres connection URL"),
            )
            .arg(
                Arg::new("initial-block")
                    .required(false)
                    .long("initial-block")
                    .takes_value(true)
                    .help("First block height to scan"),
            )
            .get_matches();

        let input_file = matches.value_of("config").unwrap_or("");
        if !input_file.is_empty() {
            dotenvy::from_filename(input_file).ok();
        } else {
            dotenv().ok();
        }
        let mut config = Self::init();
        if let Some(url) = matches.value_of("database-url") {
            config.database_url = url.to_string();
        }
        if let Some(height) = matches.value_of("initial-block") {
            config.initial_block = height.parse::<u64>().unwrap_or(config.initial_block);
        }
        config
    }

    pub fn new() -> Self {
        dotenv().ok();
        Self::init()
    }

    fn init() -> Self {
        let enable_indexer_env = env::var("ENABLE_INDEXER")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);
        let bridge_rpc_url = env::var("THETA_BRIDGE_RPC_URL")
            .unwrap_or_else(|_| "https://theta-bridge-rpc.thetatoken.org/rpc".to_string());
        let bridge_fallback_rpc_url = env::var("THETA_BRIDGE_FALLBACK_RPC_URL")
            .unwrap_or_else(|_| "https://theta-bridge-rpc-2.thetatoken.org/rpc".to_string());
        let eth_rpc_urls: Vec<String> = env::var("ETH_RPC_URLS")
            .unwrap_or_else(|_| "https://eth-rpc-api.thetatoken.org/rpc".to_string())
            .split(',')
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();
        let price_api_url = env::var("PRICE_API_URL")
            .unwrap_or_else(|_| "https://explorer-api.thetatoken.org/api/price/all".to_string());
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://user@localhost:5432/v4rindexer".to_string());
        let initial_block = env::var("INITIAL_BLOCK_HEIGHT")
            .unwrap_or_else(|_| EARLIEST_BLOCK.to_string())
            .parse::<u64>()
            .unwrap_or(EARLIEST_BLOCK);
        let final_block = env::var("FINAL_BLOCK_HEIGHT")
            .unwrap_or_else(|_| "0".to_string())
            .parse::<u64>()
            .unwrap_or(0);
        let rpc_timeout_ms = env::var("RPC_TIMEOUT_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse::<u64>()
            .unwrap_or(2000);
        let requeue_sleep = env::var("REQUEUE_SLEEP")
            .unwrap_or_else(|_| "6".to_string())
            .parse::<u64>()
            .unwrap_or(6);

        IndexerConfig {
            enable_indexer_env,
            bridge_rpc_url,
            bridge_fallback_rpc_url,
            eth_rpc_urls,
            price_api_url,
            initial_block,
            final_block,
            database_url,
            rpc_timeout_ms,
            requeue_sleep,
        }
    }
}

impl fmt::Display for IndexerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IndexerConfig: bridge_rpc_url: {}\n\
        bridge_fallback_rpc_url: {}\n\
        eth_rpc_urls: {}\n\
        price_api_url: {}\n\
        initial_block: {}\n\
        final_block: {}\n\
        database_url: {}\n\
        enable_indexer_env: {}\n\
        rpc_timeout_ms: {}\n\
        requeue_sleep: {}\n",
            self.bridge_rpc_url,
            self.bridge_fallback_rpc_url,
            self.eth_rpc_urls.join(","),
            self.price_api_url,
            self.initial_block,
            self.final_block,
            self.database_url,
            self.enable_indexer_env,
            self.rpc_timeout_ms,
            self.requeue_sleep
        )
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self::new()
    }
}
