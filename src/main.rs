use anyhow::Result;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

use trustbridge::{
    config::redact_url, Clock, DatabasePool, EngagementWorkflow, LogTransport, MemoryStore,
    NotificationQueue, Notifier, PortfolioAggregator, ReviewerRouter, Store, SystemClock,
    TrustBridgeConfig, TrustScoreManager, VerificationGate,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = TrustBridgeConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {:#}", e);
        eprintln!("Please check TRUSTBRIDGE_* environment variables.");
        e
    })?;

    init_logging(&config)?;

    info!("Starting TrustBridge trust & verification engine");

    let store = open_store(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (queue, dispatcher) = NotificationQueue::spawn(
        config.notifications.queue_capacity,
        Arc::new(LogTransport),
    );
    let notifier: Arc<dyn Notifier> = Arc::new(queue);

    let verification = VerificationGate::new(store.clone(), notifier.clone(), clock.clone());
    let trust = TrustScoreManager::new(store.clone(), config.scoring.to_params(), clock.clone());
    info!(
        volume_ceiling = config.scoring.volume_ceiling,
        dispute_penalty = config.scoring.dispute_penalty,
        "Farmer trust system initialized"
    );

    let portfolio = Arc::new(PortfolioAggregator::new(
        store.clone(),
        config.portfolio.to_thresholds(),
        clock.clone(),
    ));
    let router = ReviewerRouter::new(store.clone(), config.review.peer_sample_size);
    let workflow = EngagementWorkflow::new(store.clone(), router, portfolio, notifier, clock)
        .with_min_comment_words(config.review.min_rubric_comment_words);
    info!(
        peer_sample_size = config.review.peer_sample_size,
        min_rubric_comment_words = config.review.min_rubric_comment_words,
        "Engagement review workflow initialized"
    );

    let engines = Engines {
        verification,
        trust,
        workflow,
    };

    // No request surface is bundled. Library callers drive the engines and
    // this process keeps storage and the notification dispatcher up.
    info!(
        store = if config.database.postgres_enabled { "postgres" } else { "memory" },
        "TrustBridge engines wired, no request surface is bundled; press Ctrl+C to stop"
    );
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received");
    drop(engines);
    dispatcher.abort();
    Ok(())
}

/// Engines held for the lifetime of the process
#[allow(dead_code)]
struct Engines {
    verification: VerificationGate,
    trust: TrustScoreManager,
    workflow: EngagementWorkflow,
}

/// Initialize logging from the logging config section
fn init_logging(config: &TrustBridgeConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}

/// PostgreSQL when enabled, in-memory otherwise
async fn open_store(config: &TrustBridgeConfig) -> Result<Arc<dyn Store>> {
    if !config.database.postgres_enabled {
        info!("PostgreSQL disabled, using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    info!(
        url = %redact_url(&config.database.postgres_url),
        "Opening PostgreSQL store"
    );
    let db = DatabasePool::new(&config.database).await?;
    db.init_schema().await?;
    Ok(Arc::new(db))
}
