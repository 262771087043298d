//! Custodial wallet ledger daemon: seeds the currency registry from config,
//! then runs the periodic settlement tasks (since-block scan, withdrawal
//! drain, address-pool refill) per currency against that currency's node.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use custodia_common::logging;
use custodia_db::MemDb;
use custodia_ledger::Ledger;
use custodia_nodeio::addresses::refill_addresses_queue;
use custodia_nodeio::config::{Config, CurrencyConfig, NodeSettings};
use custodia_nodeio::rpc::CoindClient;
use custodia_nodeio::scanner::ChainScanner;
use custodia_nodeio::sender::WithdrawalSender;
use tracing::*;

use crate::args::Args;

mod args;

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args) {
        eprintln!("FATAL ERROR: {e}");
        return Err(e);
    }
    Ok(())
}

fn main_inner(args: Args) -> anyhow::Result<()> {
    let config_text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))?;
    let config: Config = toml::from_str(&config_text).context("parsing configuration")?;

    logging::init(logging::LoggerConfig::new("custodiad".to_owned()));

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building runtime")?;
    rt.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let db = Arc::new(MemDb::new());
    let ledger = Ledger::new(db);

    let sender = Arc::new(WithdrawalSender::new(
        ledger.clone(),
        &config.node.account_label,
    ));
    let scanner = Arc::new(ChainScanner::new(ledger.clone()));

    for currency in &config.currencies {
        ledger.upsert_currency(currency.currency_entry())?;
        let client = Arc::new(CoindClient::new(
            &currency.rpc_url,
            &currency.rpc_user,
            &currency.rpc_password,
            currency.rpc_timeout(),
            currency.rpc_retries,
        )?);
        spawn_currency_tasks(
            &config.node,
            currency,
            client,
            ledger.clone(),
            sender.clone(),
            scanner.clone(),
        );
        info!(ticker = %currency.ticker, "currency registered");
    }

    let registry = ledger.currencies()?;
    info!(currencies = registry.len(), "custodiad running");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    logging::finalize();
    Ok(())
}

/// Spawns the three periodic loops for one currency. RPC failures inside a
/// tick are logged and retried on the next tick; they never take the task
/// down.
fn spawn_currency_tasks(
    settings: &NodeSettings,
    currency: &CurrencyConfig,
    client: Arc<CoindClient>,
    ledger: Ledger<MemDb>,
    sender: Arc<WithdrawalSender<MemDb>>,
    scanner: Arc<ChainScanner<MemDb>>,
) {
    let ticker = currency.ticker.clone();
    let scan_client = client.clone();
    let scan_every = Duration::from_secs(settings.scan_poll_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(scan_every);
        loop {
            interval.tick().await;
            if let Err(err) = scanner.query_transactions(&ticker, scan_client.as_ref()).await {
                warn!(%ticker, %err, "since-block scan failed");
            }
        }
    });

    let ticker = currency.ticker.clone();
    let send_client = client.clone();
    let send_every = Duration::from_secs(settings.send_poll_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(send_every);
        loop {
            interval.tick().await;
            match sender.process_withdrawals(&ticker, send_client.as_ref()).await {
                Ok(Some(txid)) => info!(%ticker, %txid, "withdrawal batch sent"),
                Ok(None) => {}
                Err(err) => error!(%ticker, %err, "withdrawal drain failed"),
            }
        }
    });

    let ticker = currency.ticker.clone();
    let account = settings.account_label.clone();
    let target = currency.address_queue_target;
    let refill_every = Duration::from_secs(settings.refill_poll_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(refill_every);
        loop {
            interval.tick().await;
            if let Err(err) =
                refill_addresses_queue(&ledger, &ticker, target, &account, client.as_ref()).await
            {
                warn!(%ticker, %err, "address refill failed");
            }
        }
    });
}
