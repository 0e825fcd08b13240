//! Optimistic-concurrency publisher.
//!
//! Each attempt re-reads the branch tip, builds a fresh [`ChangeSet`]
//! against it and submits one atomic push. A conflict means another writer
//! advanced the branch between the read and the push; the publisher backs
//! off and retries against the new tip, a bounded number of times. All
//! other remote failures are structural and terminal on the first hit.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::change::{BranchTip, ChangeSet, PublishTarget};
use crate::error::{PublishError, RemoteError};
use crate::remote::GitRemote;

/// Retries after the first attempt (3 retries, 4 attempts total).
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base of the exponential backoff: 1s, 2s, 4s. Unjittered, which is fine
/// for a human-triggered tool with at most a handful of concurrent writers.
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Successful publish: the new branch tip and how many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub tip: BranchTip,
    pub attempts: u32,
}

/// Publishes one document into one branch with bounded conflict retry.
pub struct Publisher {
    remote: Arc<dyn GitRemote>,
    max_retries: u32,
    backoff_base: Duration,
}

impl Publisher {
    pub fn new(remote: Arc<dyn GitRemote>) -> Self {
        Self {
            remote,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the backoff base. Tests use a millisecond base to keep the
    /// retry schedule fast.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Publish `content` to the target, committing with `message`.
    ///
    /// At most one commit lands per call; the branch tip advances by
    /// exactly one commit on success.
    pub async fn publish(
        &self,
        target: &PublishTarget,
        content: &str,
        message: &str,
    ) -> Result<PublishReceipt, PublishError> {
        let mut attempt = 0u32;
        loop {
            // Fresh tip every attempt; a cached one is exactly the
            // staleness this protocol exists to avoid.
            let tip = self
                .remote
                .branch_tip(target.repository_id(), target.branch())
                .await?;
            let change = ChangeSet::new(tip, target.clone(), content, message);

            match self.remote.push(&change).await {
                Ok(new_tip) => {
                    info!(
                        branch = target.branch(),
                        path = target.path(),
                        commit = %new_tip.commit_id,
                        attempts = attempt + 1,
                        "published pipeline document"
                    );
                    return Ok(PublishReceipt {
                        tip: new_tip,
                        attempts: attempt + 1,
                    });
                }
                Err(RemoteError::Conflict(reason)) => {
                    if attempt >= self.max_retries {
                        return Err(PublishError::ConflictExhausted {
                            attempts: attempt + 1,
                        });
                    }
                    // Saturate so a caller raising the retry bound past 31
                    // cannot overflow the multiplier.
                    let delay = self
                        .backoff_base
                        .saturating_mul(2u32.saturating_pow(attempt.min(16)));
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "branch head moved during publish; backing off and retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(other) => return Err(PublishError::Remote(other)),
            }
        }
    }
}
