use std::sync::Arc;

use tracing::{info, warn};

use tokenpulse_backend::config::EngineConfig;
use tokenpulse_backend::listings::{
    BirdeyeAdapter, DexScreenerAdapter, FeedAdapter, GeckoTerminalAdapter,
    HttpVettingCollaborator, RefreshEngine, RefreshScheduler, RotationStore, VettingDispatcher,
    WipeScheduler,
};
use tokenpulse_backend::notifier::BroadcastNotifier;
use tokenpulse_backend::persistence::{MemoryPersistence, Persistence, RecordFilter};

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = EngineConfig::default();
    info!(
        capacity = config.capacity,
        interval_secs = config.cycle_interval.as_secs(),
        "starting tokenpulse backend"
    );

    let dexscreener_url = env_or("DEXSCREENER_FEED_URL", "https://feeds.tokenpulse.internal/dexscreener");
    let birdeye_url = env_or("BIRDEYE_FEED_URL", "https://feeds.tokenpulse.internal/birdeye");
    let gecko_url = env_or("GECKOTERMINAL_FEED_URL", "https://feeds.tokenpulse.internal/geckoterminal");
    let vetting_url = env_or("VETTING_URL", "https://vetting.tokenpulse.internal");

    let adapters: Vec<Arc<dyn FeedAdapter>> = vec![
        Arc::new(DexScreenerAdapter::new(dexscreener_url, config.feed_timeout)),
        Arc::new(BirdeyeAdapter::new(birdeye_url, config.feed_timeout)),
        Arc::new(GeckoTerminalAdapter::new(gecko_url, config.feed_timeout)),
    ];

    let persistence: Arc<dyn Persistence> = Arc::new(MemoryPersistence::new());
    let store = Arc::new(RotationStore::new(config.capacity));

    // Warm the store from whatever the backing store already holds, so a
    // restart does not re-announce every listing as new.
    for record in persistence.find_many(RecordFilter::default()).await? {
        store.seed(record).await;
    }
    info!(
        warmed = store.len().await,
        persisted = persistence.count().await?,
        "rotation store warmed from persistence"
    );

    let collaborator = Arc::new(HttpVettingCollaborator::new(
        vetting_url,
        config.feed_timeout,
    ));
    let dispatcher = VettingDispatcher::new(
        Arc::clone(&store),
        collaborator,
        Arc::clone(&persistence),
        config.vetting_dispatch_delay,
    );

    let notifier = Arc::new(BroadcastNotifier::new(256));
    let mut notifications = notifier.subscribe();
    tokio::spawn(async move {
        while let Ok(notification) = notifications.recv().await {
            info!(
                event = ?notification.event,
                key = %notification.record.key(),
                symbol = %notification.record.symbol,
                "listing notification"
            );
        }
    });

    let engine = Arc::new(RefreshEngine::new(
        config.clone(),
        adapters,
        store,
        persistence,
        notifier,
        dispatcher,
    ));

    let refresh_scheduler = RefreshScheduler::new(Arc::clone(&engine), config.cycle_interval);
    refresh_scheduler.trigger_immediate_run().await;
    refresh_scheduler.start().await;

    let wipe_scheduler = match &config.wipe_schedule {
        Some(expr) => {
            let scheduler = WipeScheduler::new(Arc::clone(&engine), expr)?;
            scheduler.start().await;
            Some(scheduler)
        }
        None => {
            warn!("wipe rotation disabled by configuration");
            None
        }
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    refresh_scheduler.stop().await;
    if let Some(scheduler) = wipe_scheduler {
        scheduler.stop().await;
    }

    Ok(())
}
