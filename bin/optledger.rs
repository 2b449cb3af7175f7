use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use optledger::{
    CronScheduler, CronSettings, Database, LedgerContext, RedpandaPublisher, RpcChainSource,
    Scanner, ScannerSettings, Settings, SubscriptionRegistry,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .context("Failed to initialize logger")?;

    // Load configuration
    let settings = Arc::new(
        Settings::new()
            .context("Failed to load config.yaml. Please ensure it exists and is valid")?,
    );

    let db = Arc::new(
        Database::new(settings.clone())
            .await
            .context("Failed to initialize database connection")?,
    );

    let publisher = settings
        .redpanda
        .as_ref()
        .and_then(RedpandaPublisher::new)
        .map(Arc::new);

    run_ledger(settings, db, publisher, CancellationToken::new()).await
}

async fn run_ledger(
    settings: Arc<Settings>,
    db: Arc<Database>,
    publisher: Option<Arc<RedpandaPublisher>>,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    let registry = SubscriptionRegistry::from_contracts(&settings.contracts)
        .context("Failed to build subscription registry")?;
    let ctx = LedgerContext::from_settings(&settings).context("Failed to load protocol config")?;
    let source = Arc::new(
        RpcChainSource::new(&settings.chain.rpc_url).context("Failed to create RPC provider")?,
    );

    let scanner = Scanner::new(
        source,
        db.postgres.clone(),
        registry,
        ctx,
        ScannerSettings::from(&settings.chain),
    )
    .with_publisher(publisher.clone());

    let scanner_token = cancellation_token.child_token();
    let scanner_handle = tokio::spawn(async move {
        if let Err(e) = scanner.run(scanner_token).await {
            error!("Scanner failed: {:#}", e);
        }
    });

    info!("Scanner started");

    // Counter outbox drain
    let cron_scheduler = CronScheduler::new(
        db.clone(),
        publisher,
        CronSettings::from(settings.outbox.clone()),
    );

    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    // Set up graceful shutdown signal handler
    info!("Ledger running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    info!("Finishing all tasks...");

    cancellation_token.cancel();

    // An in-flight range is dropped uncommitted and re-run on next start
    info!("Waiting for scanner to stop...");
    let _ = scanner_handle.await;

    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    info!("Shutdown complete");
    Ok(())
}
