//! `one-limit` binary entrypoint.

use anyhow::{bail, Context};
use auth::{EnvWalletSource, FileWalletSource, WalletSource};
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use limit_order_core::api::{decode_fill_order, ChainRpc, JsonRpcClient};
use limit_order_core::config::{Config, NetworkConfig};
use limit_order_core::db::{
    create_pool, run_migrations, MemoryTransactionStore, PgTransactionStore, TransactionQuery,
    TransactionStore,
};
use limit_order_core::signing::OrderSigner;
use limit_order_core::types::{
    format_native, to_base_units, to_decimal, StaticPriceSource, TransactionStatus,
};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;
use trading_engine::{ConfirmationOutcome, EngineConfig, OrderPipeline, OrderRequest};

#[derive(Parser)]
#[command(name = "one-limit")]
#[command(about = "Sign and fill 1inch limit orders on Polygon")]
#[command(version)]
struct Cli {
    /// TOML configuration file, layered with ONE_LIMIT__* variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of SQL migrations applied when DATABASE_URL is set
    #[arg(long, global = true, default_value = "migrations")]
    migrations: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create, sign and fill one order
    Submit {
        /// Token the maker gives, by symbol or address
        #[arg(long, default_value = "WMATIC")]
        sell: String,
        /// Amount given, in token units (e.g. 0.01)
        #[arg(long)]
        amount: Decimal,
        /// Token the maker receives, by symbol or address
        #[arg(long, default_value = "USDC")]
        buy: String,
        /// Amount received, in token units
        #[arg(long)]
        receive: Decimal,
        /// Seconds until the order expires
        #[arg(long, default_value_t = 3600)]
        expiry_secs: u64,
        /// Wallet JSON file; the key is read from WALLET_PRIVATE_KEY otherwise
        #[arg(long)]
        wallet_file: Option<PathBuf>,
        /// USD price of the sold token, for the record's display value
        #[arg(long)]
        usd_price: Option<Decimal>,
        /// Keep polling for confirmation after the initial wait
        #[arg(long)]
        follow: bool,
    },
    /// List stored transaction records, newest first
    History {
        #[arg(long)]
        status: Option<TransactionStatus>,
        /// Only records created in the last N minutes
        #[arg(long)]
        since_mins: Option<i64>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Poll pending records until interrupted
    Poll,
    /// Decode fillOrder call data and recover the order signer
    Inspect {
        /// Hex call data, with or without 0x
        calldata: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "one_limit=info,trading_engine=info,limit_order_core=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(Some(path.as_path())),
        None => Config::from_env(),
    }
    .context("Failed to load configuration")?;

    match cli.command {
        Command::Submit {
            sell,
            amount,
            buy,
            receive,
            expiry_secs,
            wallet_file,
            usd_price,
            follow,
        } => {
            let wallets: Arc<dyn WalletSource> = match wallet_file {
                Some(path) => Arc::new(FileWalletSource::new(path)),
                None => Arc::new(EnvWalletSource::default()),
            };
            submit(
                &config,
                &cli.migrations,
                wallets,
                SubmitArgs {
                    sell,
                    amount,
                    buy,
                    receive,
                    expiry_secs,
                    usd_price,
                    follow,
                },
            )
            .await
        }
        Command::History {
            status,
            since_mins,
            limit,
        } => history(&config, &cli.migrations, status, since_mins, limit).await,
        Command::Poll => poll(&config, &cli.migrations).await,
        Command::Inspect { calldata } => inspect(&config.network, &calldata),
    }
}

struct SubmitArgs {
    sell: String,
    amount: Decimal,
    buy: String,
    receive: Decimal,
    expiry_secs: u64,
    usd_price: Option<Decimal>,
    follow: bool,
}

async fn open_store(config: &Config, migrations: &Path) -> anyhow::Result<Arc<dyn TransactionStore>> {
    match &config.database {
        Some(db) => {
            let pool = create_pool(db).await.context("Failed to connect to database")?;
            run_migrations(&pool, migrations)
                .await
                .context("Failed to run migrations")?;
            Ok(Arc::new(PgTransactionStore::new(pool)))
        }
        None => {
            warn!("DATABASE_URL not set; records are kept in memory for this run only");
            Ok(Arc::new(MemoryTransactionStore::new()))
        }
    }
}

fn rpc_client(config: &Config) -> anyhow::Result<Arc<dyn ChainRpc>> {
    let client = JsonRpcClient::from_network(
        &config.network,
        Duration::from_secs(config.rpc.timeout_secs),
    )?;
    Ok(Arc::new(client))
}

fn resolve_token<'a>(
    network: &'a NetworkConfig,
    token: &str,
) -> anyhow::Result<&'a limit_order_core::config::TokenInfo> {
    let found = match token.parse() {
        Ok(address) => network.token_by_address(address),
        Err(_) => network.token_by_symbol(token),
    };
    match found {
        Some(info) => Ok(info),
        None => bail!(
            "unknown token '{}' (known: {}, {})",
            token,
            network.token_a.symbol,
            network.token_b.symbol
        ),
    }
}

async fn submit(
    config: &Config,
    migrations: &Path,
    wallets: Arc<dyn WalletSource>,
    args: SubmitArgs,
) -> anyhow::Result<()> {
    let network = &config.network;
    let maker_token = resolve_token(network, &args.sell)?;
    let taker_token = resolve_token(network, &args.buy)?;
    let request = OrderRequest {
        maker_asset: maker_token.address,
        taker_asset: taker_token.address,
        making_amount: to_base_units(args.amount, maker_token.decimals)?,
        taking_amount: to_base_units(args.receive, taker_token.decimals)?,
        expiry_seconds: args.expiry_secs,
    };

    let rpc = rpc_client(config)?;
    let store = open_store(config, migrations).await?;
    let engine = EngineConfig::from_rpc(&config.rpc);
    let follow_window = engine.poller.window.to_std().unwrap_or(Duration::ZERO);
    let follow_tick = engine.poller.tick;

    let mut pipeline = OrderPipeline::new(network.clone(), rpc, wallets, store.clone(), engine)?;
    if let Some(usd) = args.usd_price {
        pipeline = pipeline.with_price_source(Arc::new(
            StaticPriceSource::new().with_price(&maker_token.symbol, usd),
        ));
    }
    let handle = if args.follow {
        let handle = Arc::new(pipeline.build_poller()).spawn();
        pipeline = pipeline.with_poller(handle.tracker());
        Some(handle)
    } else {
        None
    };

    let result = pipeline.create_and_submit_order(request).await;
    for (i, step) in pipeline.execution_log().await.iter().enumerate() {
        println!("{:>2}. {}", i + 1, step);
    }
    let receipt = match result {
        Ok(receipt) => receipt,
        Err(e) => {
            if let Some(handle) = handle {
                handle.stop().await;
            }
            return Err(e).context("Order submission failed");
        }
    };

    println!("tx hash:    {}", receipt.tx_hash);
    println!("order hash: {}", receipt.order_hash);
    println!("record:     {}", receipt.record_id);

    if let Some(handle) = handle {
        if matches!(receipt.confirmation, ConfirmationOutcome::TimedOut { .. }) {
            info!(record_id = %receipt.record_id, "Following pending transaction; Ctrl-C to stop");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = tokio::time::sleep(follow_window) => {}
                _ = wait_until_settled(store.as_ref(), receipt.record_id, follow_tick) => {}
            }
            if let Some(record) = store.get(receipt.record_id).await? {
                println!("status:     {}", record.status);
            }
        }
        handle.stop().await;
    }
    Ok(())
}

/// Return once the record has left pending or can no longer be read.
async fn wait_until_settled(store: &dyn TransactionStore, id: Uuid, tick: Duration) {
    let mut ticker = tokio::time::interval(tick);
    loop {
        ticker.tick().await;
        match store.get(id).await {
            Ok(Some(record)) if record.is_pending() => {}
            Ok(_) => return,
            Err(e) => {
                warn!(record_id = %id, error = %e, "Failed to read record while following");
                return;
            }
        }
    }
}

async fn history(
    config: &Config,
    migrations: &Path,
    status: Option<TransactionStatus>,
    since_mins: Option<i64>,
    limit: u32,
) -> anyhow::Result<()> {
    let store = open_store(config, migrations).await?;

    let mut query = TransactionQuery::new().limit(limit);
    if let Some(status) = status {
        query = query.status(status);
    }
    if let Some(mins) = since_mins {
        query = query.since(Utc::now() - ChronoDuration::minutes(mins));
    }

    let records = store.query(&query).await?;
    if records.is_empty() {
        println!("No transactions found");
        return Ok(());
    }
    for record in records {
        let fee = match record.fee_paid() {
            Some(wei) => format!("{} {}", format_native(wei)?, config.network.native_symbol),
            None => "-".to_string(),
        };
        println!(
            "{}  {:<9}  {} {} -> {} {}  price {}  tx {}  fee {}",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.status,
            record.making_amount,
            record.maker_symbol,
            record.taking_amount,
            record.taker_symbol,
            record
                .limit_price
                .map_or("-".to_string(), |p| p.normalize().to_string()),
            record.tx_hash.map_or("-".to_string(), |h| h.to_string()),
            fee
        );
    }
    Ok(())
}

async fn poll(config: &Config, migrations: &Path) -> anyhow::Result<()> {
    let rpc = rpc_client(config)?;
    let store = open_store(config, migrations).await?;
    let engine = EngineConfig::from_rpc(&config.rpc);
    let poller = Arc::new(trading_engine::TransactionPoller::new(
        rpc,
        store,
        engine.poller,
        trading_engine::RecordClaims::new(),
    ));

    let handle = poller.spawn();
    info!("Polling pending transactions; Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    handle.stop().await;
    Ok(())
}

fn inspect(network: &NetworkConfig, calldata: &str) -> anyhow::Result<()> {
    let bytes = hex::decode(calldata.trim().trim_start_matches("0x")).context("Call data is not hex")?;
    let call = decode_fill_order(&bytes)?;
    let order = &call.order;
    let traits = order.traits()?;

    let maker_token = network.token_by_address(order.maker_asset);
    let taker_token = network.token_by_address(order.taker_asset);

    println!("salt:          {}", order.salt);
    println!("maker:         {}", order.maker);
    println!("receiver:      {}", order.receiver);
    match (maker_token, taker_token) {
        (Some(m), Some(t)) => {
            println!(
                "making:        {} {}",
                to_decimal(order.making_amount, m.decimals)?,
                m.symbol
            );
            println!(
                "taking:        {} {}",
                to_decimal(order.taking_amount, t.decimals)?,
                t.symbol
            );
        }
        _ => {
            println!("making:        {} of {}", order.making_amount, order.maker_asset);
            println!("taking:        {} of {}", order.taking_amount, order.taker_asset);
        }
    }
    println!("nonce:         {}", traits.nonce);
    println!("expiry:        {}", traits.expiry);
    println!("amount:        {}", call.amount);
    println!("taker traits:  {}", call.taker_traits);
    println!("r:             {}", call.signature.r);
    println!("vs:            {}", call.signature.vs);

    let signer = OrderSigner::new(network.eip712_domain())?;
    let digest = signer.order_digest(order)?;
    println!("order hash:    {}", digest.digest);
    match call.signature.recover(digest.digest) {
        Ok(address) if address == order.maker => println!("signature:     valid (maker)"),
        Ok(address) => println!("signature:     signed by {}, not the maker", address),
        Err(e) => println!("signature:     unrecoverable ({})", e),
    }

    let issues = order.validate();
    if !issues.is_empty() {
        println!("issues:        {}", issues.join("; "));
    }
    Ok(())
}
