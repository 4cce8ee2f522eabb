use clap::Parser;
use flowmeter::{
    config::{BinanceConfig, PipelineConfig},
    error::PipelineError,
    exchange::{
        ExchangeId,
        binance::{historical::BinanceHistoricalFeed, live::BinanceLiveFeed},
    },
    pipeline::Pipeline,
    store::SqliteStore,
    trade::Market,
};
use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Capture trades for one market, backfill downtime and log buy/sell flow analysis.
#[derive(Parser, Debug)]
#[command(name = "flowmeter-server", version)]
struct Args {
    /// Exchange to capture trades from.
    #[arg(long, env = "FLOWMETER_EXCHANGE", default_value = "binance")]
    exchange: ExchangeId,

    /// Market symbol, eg/ XLMBTC.
    #[arg(long, env = "FLOWMETER_MARKET")]
    market: String,

    /// Analysis window length, eg/ "1 hour", "15m" or "2 days".
    #[arg(long, env = "FLOWMETER_BACKTEST")]
    backtest: String,

    /// Seconds between two analysis ticks.
    #[arg(long, env = "FLOWMETER_LOOP_INTERVAL", default_value_t = 10)]
    loop_interval: u64,

    /// Delete every stored trade of the market before starting.
    #[arg(long, env = "FLOWMETER_CLEAR")]
    clear: bool,

    /// Backfill downtime with a rolling window instead of continuing from the last id.
    #[arg(long, env = "FLOWMETER_NO_CONTINUATION")]
    no_continuation: bool,

    /// Seed a rolling window of history when the market has no stored trades.
    #[arg(long, env = "FLOWMETER_SEED_HISTORY")]
    seed_history: bool,

    /// SQLite database file.
    #[arg(long, env = "FLOWMETER_DATABASE", default_value = "flowmeter.db")]
    database: PathBuf,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, env = "FLOWMETER_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.debug);

    match run(args).await {
        Ok(()) => {
            info!("Exiting");
            ExitCode::SUCCESS
        }
        Err(error) => {
            error!(%error, "flowmeter stopped");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, Error)]
enum ServerError {
    #[error("setup failed: {0}")]
    Setup(String),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),
}

async fn run(args: Args) -> Result<(), ServerError> {
    let market = Market::new(args.exchange, &args.market);

    let config = PipelineConfig::new(market.clone(), args.backtest)
        .with_loop_interval(Duration::from_secs(args.loop_interval.max(1)))
        .with_clear_existing(args.clear)
        .with_continuation(!args.no_continuation)
        .with_seed_history(args.seed_history);

    let store = SqliteStore::open(&args.database)
        .map(Arc::new)
        .map_err(|error| ServerError::Setup(format!("{}: {error}", args.database.display())))?;

    info!(
        %market,
        interval = %config.interval,
        database = %args.database.display(),
        "Starting flowmeter"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Exit signal received"),
            Err(error) => warn!(%error, "failed to listen for exit signal"),
        }
        let _ = shutdown_tx.send(true);
    });

    let summary = match args.exchange {
        ExchangeId::Binance => {
            let binance = BinanceConfig::default();
            let historical = BinanceHistoricalFeed::new(&binance)
                .map_err(|error| ServerError::Setup(error.to_string()))?;

            Pipeline::new(
                config,
                store,
                Arc::new(BinanceLiveFeed::new(binance)),
                Arc::new(historical),
            )
            .run(shutdown_rx)
            .await?
        }
    };

    info!(
        %market,
        backfilled = summary.backfill.inserted,
        live_inserted = summary.ingest.inserted,
        snapshots = summary.scheduler.map(|stats| stats.persisted).unwrap_or_default(),
        "Flowmeter stopped"
    );

    Ok(())
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}
