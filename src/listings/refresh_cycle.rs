use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::notifier::{ListingEvent, Notifier};
use crate::persistence::Persistence;
use super::feeds::{FeedAdapter, RawProviderRecord};
use super::normalizer;
use super::reconciler;
use super::rotation_store::RotationStore;
use super::vetting::VettingDispatcher;

/// Counters for one completed refresh cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub providers_ok: usize,
    pub providers_failed: usize,
    pub fetched: usize,
    pub rejected_addresses: usize,
    pub gated_out: usize,
    pub new: usize,
    pub updated: usize,
    pub evicted: usize,
    pub vetting_dispatched: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// A cycle was already running; this trigger was dropped.
    Skipped,
    /// No provider produced a usable result; the store was not touched.
    NoUsableFeeds,
}

/// Engine-lifetime counters, in the spirit of the teacher's stats structs.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    pub cycle_failures: u64,
    pub total_gated_out: u64,
    pub total_rejected_addresses: u64,
    pub total_evicted: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

/// Runs the periodic fetch -> normalize -> reconcile -> score -> rotate
/// pipeline. At most one cycle is active at a time; overlapping triggers
/// are dropped, which keeps precedence application and eviction ordering
/// deterministic without further locking.
pub struct RefreshEngine {
    config: EngineConfig,
    adapters: Vec<Arc<dyn FeedAdapter>>,
    store: Arc<RotationStore>,
    persistence: Arc<dyn Persistence>,
    notifier: Arc<dyn Notifier>,
    dispatcher: VettingDispatcher,
    cycle_guard: Mutex<()>,
    stats: RwLock<EngineStats>,
}

impl RefreshEngine {
    pub fn new(
        config: EngineConfig,
        adapters: Vec<Arc<dyn FeedAdapter>>,
        store: Arc<RotationStore>,
        persistence: Arc<dyn Persistence>,
        notifier: Arc<dyn Notifier>,
        dispatcher: VettingDispatcher,
    ) -> Self {
        Self {
            config,
            adapters,
            store,
            persistence,
            notifier,
            dispatcher,
            cycle_guard: Mutex::new(()),
            stats: RwLock::new(EngineStats::default()),
        }
    }

    pub fn store(&self) -> &Arc<RotationStore> {
        &self.store
    }

    pub async fn stats(&self) -> EngineStats {
        self.stats.read().await.clone()
    }

    /// Run one reconciliation cycle. A trigger arriving while a cycle is
    /// still running is a no-op.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let _guard = match self.cycle_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("refresh cycle still running, dropping trigger");
                self.stats.write().await.cycles_skipped += 1;
                return CycleOutcome::Skipped;
            }
        };
        self.run_cycle_locked().await
    }

    /// Cycle body. The caller holds `cycle_guard`.
    async fn run_cycle_locked(&self) -> CycleOutcome {
        let started = std::time::Instant::now();
        let mut report = CycleReport::default();

        let raw = self.fetch_all(&mut report).await;
        if report.providers_ok == 0 {
            error!("cycle failed: no usable provider results");
            self.stats.write().await.cycle_failures += 1;
            return CycleOutcome::NoUsableFeeds;
        }
        report.fetched = raw.len();

        // Normalize; malformed addresses cost only their own record.
        let partials: Vec<_> = raw.into_iter().filter_map(normalizer::normalize).collect();
        report.rejected_addresses = report.fetched - partials.len();

        let reconciled = reconciler::reconcile(partials);
        report.gated_out = reconciled.gated_out;

        let now = Utc::now();
        let application = self.store.apply_cycle(reconciled.candidates, now).await;
        report.new = application.delta.new.len();
        report.updated = application.delta.updated.len();
        report.evicted = application.evicted.len();

        if !application.evicted.is_empty() {
            if let Err(e) = self.persistence.delete_many(&application.evicted).await {
                warn!("failed to delete evicted records: {e:#}");
            }
        }
        for record in application
            .delta
            .new
            .iter()
            .chain(application.delta.updated.iter())
        {
            if let Err(e) = self.persistence.upsert(record).await {
                warn!(key = %record.key(), "failed to persist record: {e:#}");
            }
        }

        for record in &application.delta.new {
            self.notifier.publish(ListingEvent::New, record).await;
        }
        for record in &application.delta.updated {
            self.notifier.publish(ListingEvent::Update, record).await;
        }

        report.vetting_dispatched = self.dispatcher.dispatch_pending().await;
        report.duration_ms = started.elapsed().as_millis() as u64;

        {
            let mut stats = self.stats.write().await;
            stats.cycles_completed += 1;
            stats.total_gated_out += report.gated_out as u64;
            stats.total_rejected_addresses += report.rejected_addresses as u64;
            stats.total_evicted += report.evicted as u64;
            stats.last_cycle_at = Some(now);
        }

        info!(
            fetched = report.fetched,
            rejected = report.rejected_addresses,
            gated_out = report.gated_out,
            new = report.new,
            updated = report.updated,
            evicted = report.evicted,
            duration_ms = report.duration_ms,
            "refresh cycle complete"
        );

        CycleOutcome::Completed(report)
    }

    /// Full-wipe rotation: clear everything, then immediately repopulate.
    /// Takes the cycle guard with a blocking acquire: the wipe waits for any
    /// active cycle to finish instead of interleaving with its persistence
    /// phase, and its repopulating cycle is never dropped.
    pub async fn wipe_and_refresh(&self) -> CycleOutcome {
        let _guard = self.cycle_guard.lock().await;

        let cleared = self.store.wipe().await;
        if !cleared.is_empty() {
            if let Err(e) = self.persistence.delete_many(&cleared).await {
                warn!("failed to clear persisted records on wipe: {e:#}");
            }
        }
        self.run_cycle_locked().await
    }

    /// Fetch every (adapter, chain) pair concurrently and join before the
    /// reconciler runs. Each provider failure is isolated: the cycle
    /// proceeds with whatever subset succeeded.
    async fn fetch_all(&self, report: &mut CycleReport) -> Vec<RawProviderRecord> {
        let mut fetches = Vec::new();
        for adapter in &self.adapters {
            for &chain in &self.config.chains {
                if !adapter.supported_chains().contains(&chain) {
                    continue;
                }
                let adapter = Arc::clone(adapter);
                fetches.push(async move {
                    let provider = adapter.provider();
                    (provider, chain, adapter.fetch(chain).await)
                });
            }
        }

        let mut records = Vec::new();
        for (provider, chain, result) in join_all(fetches).await {
            match result {
                Ok(Some(batch)) => {
                    report.providers_ok += 1;
                    records.extend(batch);
                }
                Ok(None) => {
                    report.providers_failed += 1;
                    warn!(
                        provider = provider.as_str(),
                        chain = chain.as_str(),
                        "feed unavailable this cycle"
                    );
                }
                Err(e) => {
                    report.providers_failed += 1;
                    warn!(
                        provider = provider.as_str(),
                        chain = chain.as_str(),
                        "feed fetch failed: {e}"
                    );
                }
            }
        }
        records
    }
}
