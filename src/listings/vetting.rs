use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::persistence::Persistence;
use crate::types::{TokenKey, TokenRecord, VettingResult};

use super::rotation_store::RotationStore;

#[derive(Debug, thiserror::Error)]
pub enum VettingError {
    #[error("vetting upstream failed: {0}")]
    Upstream(String),
    #[error("vetting upstream timed out")]
    Timeout,
    #[error("token not recognized by vetting upstream")]
    UnknownToken,
}

/// The secondary, possibly slow, risk evaluation. Its own interface bounds
/// how long a call may hang; the dispatcher never cancels it.
#[async_trait]
pub trait VettingCollaborator: Send + Sync {
    async fn vet(
        &self,
        key: &TokenKey,
        snapshot: &TokenRecord,
    ) -> Result<VettingResult, VettingError>;
}

/// Vetting over HTTP against an external risk-evaluation endpoint. The
/// endpoint's own timeout bounds a stuck call; the dispatcher never cancels.
pub struct HttpVettingCollaborator {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpVettingCollaborator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl VettingCollaborator for HttpVettingCollaborator {
    async fn vet(
        &self,
        key: &TokenKey,
        snapshot: &TokenRecord,
    ) -> Result<VettingResult, VettingError> {
        let url = format!(
            "{}/vet/{}/{}",
            self.base_url,
            key.chain.as_str(),
            key.address
        );
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(snapshot)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VettingError::Timeout
                } else {
                    VettingError::Upstream(e.to_string())
                }
            })?;

        match response.status().as_u16() {
            404 => Err(VettingError::UnknownToken),
            s if s >= 400 => Err(VettingError::Upstream(format!("HTTP {s}"))),
            _ => response
                .json::<VettingResult>()
                .await
                .map_err(|e| VettingError::Upstream(e.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// This call won the in-flight flag and the evaluation succeeded.
    Completed,
    /// This call won the in-flight flag but the evaluation failed; the
    /// record is back in the unvetted state for retry next cycle.
    Failed,
    /// Another dispatch already holds the in-flight flag, or the record is
    /// already vetted or gone. No collaborator call was made.
    Skipped,
}

/// Schedules at most one in-flight vetting evaluation per token and
/// persists the result. Collaborator failures never propagate into the
/// reconciliation path.
#[derive(Clone)]
pub struct VettingDispatcher {
    store: Arc<RotationStore>,
    collaborator: Arc<dyn VettingCollaborator>,
    persistence: Arc<dyn Persistence>,
    dispatch_delay: Duration,
}

impl VettingDispatcher {
    pub fn new(
        store: Arc<RotationStore>,
        collaborator: Arc<dyn VettingCollaborator>,
        persistence: Arc<dyn Persistence>,
        dispatch_delay: Duration,
    ) -> Self {
        Self {
            store,
            collaborator,
            persistence,
            dispatch_delay,
        }
    }

    /// Dispatch an evaluation for every record lacking a finalized tier.
    /// Evaluations run concurrently, one per distinct token; a small delay
    /// between spawns keeps the upstream rate limit happy. Returns how many
    /// evaluations were dispatched.
    pub async fn dispatch_pending(&self) -> usize {
        let pending = self.store.pending_vetting().await;
        if pending.is_empty() {
            return 0;
        }
        debug!(count = pending.len(), "dispatching vetting evaluations");

        let mut dispatched = 0;
        for key in pending {
            let dispatcher = self.clone();
            tokio::spawn(async move {
                dispatcher.dispatch(&key).await;
            });
            dispatched += 1;
            if !self.dispatch_delay.is_zero() {
                sleep(self.dispatch_delay).await;
            }
        }
        dispatched
    }

    /// Run one evaluation for `key`, guarded by the per-record in-flight
    /// flag. Concurrent or overlapping attempts for the same key observe
    /// the flag and no-op.
    pub async fn dispatch(&self, key: &TokenKey) -> DispatchOutcome {
        if !self.store.try_begin_vetting(key).await {
            return DispatchOutcome::Skipped;
        }

        // Snapshot taken after winning the flag, so the collaborator sees
        // the state the flag protects.
        let snapshot = match self.store.get(key).await {
            Some(record) => record,
            None => {
                // Evicted between flag and snapshot; nothing left to vet.
                return DispatchOutcome::Skipped;
            }
        };

        match self.collaborator.vet(key, &snapshot).await {
            Ok(result) => {
                let now = Utc::now();
                if let Some(updated) = self.store.complete_vetting(key, result, now).await {
                    if let Err(e) = self.persistence.upsert(&updated).await {
                        warn!(key = %key, "failed to persist vetting result: {e:#}");
                    }
                    info!(
                        key = %key,
                        risk = ?updated.risk_score,
                        tier = ?updated.tier,
                        "vetting completed"
                    );
                }
                DispatchOutcome::Completed
            }
            Err(e) => {
                self.store.fail_vetting(key).await;
                warn!(key = %key, "vetting failed, will retry next cycle: {e}");
                DispatchOutcome::Failed
            }
        }
    }
}
