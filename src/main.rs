use clap::Command;
use env_logger::Env;
use log::{debug, error, info, warn};
use tokio::time::{sleep, Duration};

use v4r_indexer::chain::{ChainError, ChainReader, ThetaClient};
use v4r_indexer::config::IndexerConfig;
use v4r_indexer::db::connection::establish_connection;
use v4r_indexer::db::setup::create_tables;
use v4r_indexer::db::DatabasePersister;
use v4r_indexer::events::contracts::watched_contracts;
use v4r_indexer::scanner::Scanner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = Command::new("V4R Indexer")
        .version("0.1.0")
        .about("Theta chain voting indexer");
    let config = IndexerConfig::with_clap(app);

    let env = Env::default()
        .filter_or("INDEXER_LOG_LEVEL", "info")
        .write_style_or("INDEXER_LOG_STYLE", "always");
    env_logger::init_from_env(env);

    info!("{}", config);
    if !config.enable_indexer_env {
        warn!("indexing is disabled by configuration, exiting");
        return Ok(());
    }

    let conn = establish_connection(&config.database_url)?;
    create_tables(&conn)?;

    let client = ThetaClient::new(&config)?;
    match client.tfuel_price_usd().await {
        Ok(price) => info!("TFUEL price: ${}", price),
        Err(err) => warn!("price feed unavailable: {}", err),
    }

    let persister = DatabasePersister::new(conn);
    let mut scanner = Scanner::new(client, persister, watched_contracts())?;

    let mut height = scanner.next_height(config.initial_block).await?;
    info!("starting scan at block {}", height);
    loop {
        if config.final_block > 0 && height > config.final_block {
            info!("reached final block {}, stopping", config.final_block);
            return Ok(());
        }
        match scanner.scan_block(height).await {
            Ok(()) => {
                scanner.mark_scanned(height).await?;
                height += 1;
            }
            Err(err) => match err.downcast_ref::<ChainError>() {
                Some(ChainError::BlockOutOfRange { .. }) => {
                    debug!("block {} not available yet, waiting", height);
                    sleep(Duration::from_secs(config.requeue_sleep)).await;
                }
                _ => {
                    error!("scan of block {} failed: {}", height, err);
                    sleep(Duration::from_secs(config.requeue_sleep)).await;
                }
            },
        }
    }
}
