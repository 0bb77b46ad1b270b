use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use tokenpulse_backend::config::EngineConfig;
use tokenpulse_backend::listings::feeds::{BirdeyeOverview, DexScreenerPair};
use tokenpulse_backend::listings::{
    CycleOutcome, FeedAdapter, FeedError, Provider, ProviderPayload, RawProviderRecord,
    RefreshEngine, VettingCollaborator, VettingDispatcher, VettingError,
};
use tokenpulse_backend::listings::rotation_store::RotationStore;
use tokenpulse_backend::notifier::{ListingEvent, Notifier};
use tokenpulse_backend::persistence::{MemoryPersistence, Persistence};
use tokenpulse_backend::types::{
    Chain, ComponentScores, Tier, TokenKey, TokenRecord, TxCount, VettingResult,
};

const ADDR_ONE: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

enum AdapterMode {
    Records(Vec<RawProviderRecord>),
    Unavailable,
    Broken,
    Slow(Vec<RawProviderRecord>, Duration),
}

struct StaticAdapter {
    provider: Provider,
    mode: AdapterMode,
}

#[async_trait]
impl FeedAdapter for StaticAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn supported_chains(&self) -> Vec<Chain> {
        vec![Chain::Solana]
    }

    async fn fetch(&self, _chain: Chain) -> Result<Option<Vec<RawProviderRecord>>, FeedError> {
        match &self.mode {
            AdapterMode::Records(records) => Ok(Some(records.clone())),
            AdapterMode::Unavailable => Ok(None),
            AdapterMode::Broken => Err(FeedError::ApiError("synthetic failure".to_string())),
            AdapterMode::Slow(records, delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Some(records.clone()))
            }
        }
    }
}

struct RecordingNotifier {
    events: Mutex<Vec<(ListingEvent, TokenKey)>>,
}

impl RecordingNotifier {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    async fn events(&self) -> Vec<(ListingEvent, TokenKey)> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, event: ListingEvent, record: &TokenRecord) {
        self.events.lock().await.push((event, record.key()));
    }
}

struct OkCollaborator;

#[async_trait]
impl VettingCollaborator for OkCollaborator {
    async fn vet(
        &self,
        _key: &TokenKey,
        _snapshot: &TokenRecord,
    ) -> Result<VettingResult, VettingError> {
        Ok(VettingResult {
            risk_score: 60.0,
            tier: Tier::Caution,
            component_scores: ComponentScores::default(),
            flags: Vec::new(),
        })
    }
}

fn dexscreener_record(address: &str) -> RawProviderRecord {
    RawProviderRecord {
        provider: Provider::DexScreener,
        chain: Chain::Solana,
        address: address.to_string(),
        payload: ProviderPayload::DexScreener(DexScreenerPair {
            base_symbol: Some("TPX".to_string()),
            base_name: Some("TokenPulse Example".to_string()),
            price_usd: Some(1.0),
            liquidity_usd: Some(50_000.0),
            volume_h24: Some(20_000.0),
            txns_h24: Some(TxCount { buys: 5, sells: 3 }),
            ..Default::default()
        }),
        received_at: Utc::now(),
    }
}

fn birdeye_record(address: &str) -> RawProviderRecord {
    RawProviderRecord {
        provider: Provider::Birdeye,
        chain: Chain::Solana,
        address: address.to_string(),
        payload: ProviderPayload::Birdeye(BirdeyeOverview {
            holders: Some(120),
            ..Default::default()
        }),
        received_at: Utc::now(),
    }
}

struct Harness {
    engine: Arc<RefreshEngine>,
    store: Arc<RotationStore>,
    notifier: Arc<RecordingNotifier>,
    persistence: Arc<MemoryPersistence>,
}

fn build_engine(adapters: Vec<Arc<dyn FeedAdapter>>, capacity: usize) -> Harness {
    let config = EngineConfig {
        capacity,
        chains: vec![Chain::Solana],
        vetting_dispatch_delay: Duration::ZERO,
        ..Default::default()
    };
    let store = Arc::new(RotationStore::new(capacity));
    let persistence = Arc::new(MemoryPersistence::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let dispatcher = VettingDispatcher::new(
        Arc::clone(&store),
        Arc::new(OkCollaborator),
        persistence.clone() as Arc<dyn Persistence>,
        Duration::ZERO,
    );
    let engine = Arc::new(RefreshEngine::new(
        config,
        adapters,
        Arc::clone(&store),
        persistence.clone() as Arc<dyn Persistence>,
        notifier.clone() as Arc<dyn Notifier>,
        dispatcher,
    ));
    Harness {
        engine,
        store,
        notifier,
        persistence,
    }
}

#[tokio::test]
async fn first_cycle_publishes_merged_record_as_new() {
    let harness = build_engine(
        vec![
            Arc::new(StaticAdapter {
                provider: Provider::DexScreener,
                mode: AdapterMode::Records(vec![dexscreener_record(ADDR_ONE)]),
            }),
            Arc::new(StaticAdapter {
                provider: Provider::Birdeye,
                mode: AdapterMode::Records(vec![birdeye_record(ADDR_ONE)]),
            }),
        ],
        10,
    );

    let outcome = harness.engine.run_cycle().await;
    let report = match outcome {
        CycleOutcome::Completed(report) => report,
        other => panic!("expected completed cycle, got {other:?}"),
    };
    assert_eq!(report.new, 1);
    assert_eq!(report.gated_out, 0);

    let key = TokenKey::new(Chain::Solana, ADDR_ONE);
    let record = harness.store.get(&key).await.unwrap();
    assert_eq!(record.market.price_usd, Some(1.0));
    assert_eq!(record.market.liquidity_usd, Some(50_000.0));
    assert_eq!(record.market.volume_24h, Some(20_000.0));
    assert_eq!(record.market.holders, Some(120));
    assert_eq!(record.market.tx_h24.unwrap().total(), 8);

    let events = harness.notifier.events().await;
    assert_eq!(events, vec![(ListingEvent::New, key.clone())]);
    assert!(harness.persistence.find_one(&key).await.unwrap().is_some());
}

#[tokio::test]
async fn second_identical_cycle_produces_empty_delta() {
    let adapters: Vec<Arc<dyn FeedAdapter>> = vec![Arc::new(StaticAdapter {
        provider: Provider::DexScreener,
        mode: AdapterMode::Records(vec![dexscreener_record(ADDR_ONE)]),
    })];
    let harness = build_engine(adapters, 10);

    harness.engine.run_cycle().await;
    let outcome = harness.engine.run_cycle().await;
    let report = match outcome {
        CycleOutcome::Completed(report) => report,
        other => panic!("expected completed cycle, got {other:?}"),
    };

    assert_eq!(report.new, 0);
    assert_eq!(report.updated, 0);
    assert_eq!(harness.notifier.events().await.len(), 1);
}

#[tokio::test]
async fn cycle_survives_partial_feed_degradation() {
    let harness = build_engine(
        vec![
            Arc::new(StaticAdapter {
                provider: Provider::DexScreener,
                mode: AdapterMode::Records(vec![dexscreener_record(ADDR_ONE)]),
            }),
            Arc::new(StaticAdapter {
                provider: Provider::Birdeye,
                mode: AdapterMode::Broken,
            }),
            Arc::new(StaticAdapter {
                provider: Provider::GeckoTerminal,
                mode: AdapterMode::Unavailable,
            }),
        ],
        10,
    );

    let outcome = harness.engine.run_cycle().await;
    let report = match outcome {
        CycleOutcome::Completed(report) => report,
        other => panic!("expected completed cycle, got {other:?}"),
    };
    assert_eq!(report.providers_ok, 1);
    assert_eq!(report.providers_failed, 2);
    assert_eq!(report.new, 1);
}

#[tokio::test]
async fn cycle_with_zero_usable_feeds_mutates_nothing() {
    let harness = build_engine(
        vec![
            Arc::new(StaticAdapter {
                provider: Provider::DexScreener,
                mode: AdapterMode::Broken,
            }),
            Arc::new(StaticAdapter {
                provider: Provider::Birdeye,
                mode: AdapterMode::Unavailable,
            }),
        ],
        10,
    );

    let outcome = harness.engine.run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::NoUsableFeeds));
    assert!(harness.store.is_empty().await);
    assert!(harness.notifier.events().await.is_empty());

    let stats = harness.engine.stats().await;
    assert_eq!(stats.cycle_failures, 1);
    assert_eq!(stats.cycles_completed, 0);
}

#[tokio::test]
async fn malformed_addresses_are_rejected_without_aborting_the_cycle() {
    let harness = build_engine(
        vec![Arc::new(StaticAdapter {
            provider: Provider::DexScreener,
            mode: AdapterMode::Records(vec![
                dexscreener_record(ADDR_ONE),
                // EVM-shaped address leaking into the Solana feed.
                dexscreener_record("0x6b175474e89094c44da98b954eedeac495271d0f"),
            ]),
        })],
        10,
    );

    let outcome = harness.engine.run_cycle().await;
    let report = match outcome {
        CycleOutcome::Completed(report) => report,
        other => panic!("expected completed cycle, got {other:?}"),
    };
    assert_eq!(report.fetched, 2);
    assert_eq!(report.rejected_addresses, 1);
    assert_eq!(report.new, 1);
    assert_eq!(harness.store.len().await, 1);
}

#[tokio::test]
async fn overlapping_trigger_is_dropped() {
    let harness = build_engine(
        vec![Arc::new(StaticAdapter {
            provider: Provider::DexScreener,
            mode: AdapterMode::Slow(
                vec![dexscreener_record(ADDR_ONE)],
                Duration::from_millis(100),
            ),
        })],
        10,
    );

    let engine = Arc::clone(&harness.engine);
    let racing = tokio::spawn(async move { engine.run_cycle().await });
    // Give the first cycle time to take the guard.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = harness.engine.run_cycle().await;
    assert!(matches!(second, CycleOutcome::Skipped));

    let first = racing.await.unwrap();
    assert!(matches!(first, CycleOutcome::Completed(_)));
    assert_eq!(harness.engine.stats().await.cycles_skipped, 1);
}

#[tokio::test]
async fn wipe_and_refresh_repopulates_the_store() {
    let harness = build_engine(
        vec![Arc::new(StaticAdapter {
            provider: Provider::DexScreener,
            mode: AdapterMode::Records(vec![dexscreener_record(ADDR_ONE)]),
        })],
        10,
    );

    harness.engine.run_cycle().await;
    assert_eq!(harness.store.len().await, 1);

    let outcome = harness.engine.wipe_and_refresh().await;
    let report = match outcome {
        CycleOutcome::Completed(report) => report,
        other => panic!("expected completed cycle, got {other:?}"),
    };

    // The wipe cleared everything, so repopulation reports the record as new.
    assert_eq!(report.new, 1);
    assert_eq!(harness.store.len().await, 1);

    let key = TokenKey::new(Chain::Solana, ADDR_ONE);
    assert!(harness.persistence.find_one(&key).await.unwrap().is_some());
}

#[tokio::test]
async fn wipe_issued_mid_cycle_waits_instead_of_interleaving() {
    let harness = build_engine(
        vec![Arc::new(StaticAdapter {
            provider: Provider::DexScreener,
            mode: AdapterMode::Slow(
                vec![dexscreener_record(ADDR_ONE)],
                Duration::from_millis(100),
            ),
        })],
        10,
    );

    let engine = Arc::clone(&harness.engine);
    let racing = tokio::spawn(async move { engine.run_cycle().await });
    // Give the first cycle time to take the guard.
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The wipe must wait for the active cycle, then run its repopulating
    // cycle rather than being dropped.
    let outcome = harness.engine.wipe_and_refresh().await;
    let report = match outcome {
        CycleOutcome::Completed(report) => report,
        other => panic!("wipe repopulation must run, got {other:?}"),
    };
    assert_eq!(report.new, 1);
    assert!(matches!(racing.await.unwrap(), CycleOutcome::Completed(_)));

    // Store and backing store agree once the rotation settles.
    assert_eq!(harness.store.len().await, 1);
    assert_eq!(harness.persistence.count().await.unwrap(), 1);
}

#[tokio::test]
async fn cycle_dispatches_vetting_for_unvetted_records() {
    let harness = build_engine(
        vec![Arc::new(StaticAdapter {
            provider: Provider::DexScreener,
            mode: AdapterMode::Records(vec![dexscreener_record(ADDR_ONE)]),
        })],
        10,
    );

    let outcome = harness.engine.run_cycle().await;
    let report = match outcome {
        CycleOutcome::Completed(report) => report,
        other => panic!("expected completed cycle, got {other:?}"),
    };
    assert_eq!(report.vetting_dispatched, 1);

    // Let the spawned evaluation land.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let key = TokenKey::new(Chain::Solana, ADDR_ONE);
    let record = harness.store.get(&key).await.unwrap();
    assert_eq!(record.tier, Some(Tier::Caution));
    assert_eq!(record.risk_score, Some(60.0));
}
