pub mod feeds;
pub mod normalizer;
pub mod reconciler;
pub mod refresh_cycle;
pub mod rotation_store;
pub mod scheduler;
pub mod scoring;
pub mod vetting;

pub use feeds::{
    BirdeyeAdapter, DexScreenerAdapter, FeedAdapter, FeedError, GeckoTerminalAdapter, Provider,
    ProviderPayload, RawProviderRecord,
};
pub use normalizer::{normalize, PartialListing};
pub use reconciler::{reconcile, MergedCandidate, ReconcileOutcome};
pub use refresh_cycle::{CycleOutcome, CycleReport, EngineStats, RefreshEngine};
pub use rotation_store::{CycleApplication, RotationStore};
pub use scheduler::{RefreshScheduler, WipeScheduler};
pub use vetting::{
    DispatchOutcome, HttpVettingCollaborator, VettingCollaborator, VettingDispatcher,
    VettingError,
};
