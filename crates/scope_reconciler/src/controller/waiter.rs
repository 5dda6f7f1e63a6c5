//! Convergence Waiter - polls until the directory reports the declared state
//!
//! The directory applies attach/detach asynchronously to its read endpoint,
//! so a successful reconcile may still read stale data for a while.

use std::sync::Arc;
use std::time::Duration;

use scopesync_config::ConvergenceConfig;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::controller::fetch_attached;
use crate::state::DeclaredSet;
use crate::{Directory, ParentKey, ReconcileError};

/// How a wait ended without a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The attached names equal the declared set
    Converged { attempts: u32 },
    /// The polling budget ran out first
    Exhausted { attempts: u32 },
}

impl WaitOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

/// Polls a parent until its attached names equal the declared set.
pub struct ConvergenceWaiter<D: Directory> {
    directory: Arc<D>,
    poll_interval: Duration,
    fail_on_exhausted: bool,
}

impl<D: Directory> ConvergenceWaiter<D> {
    pub fn new(directory: Arc<D>) -> Self {
        Self::with_config(directory, &ConvergenceConfig::default())
    }

    pub fn with_config(directory: Arc<D>, config: &ConvergenceConfig) -> Self {
        Self {
            directory,
            poll_interval: config.poll_interval(),
            fail_on_exhausted: config.fail_on_exhausted,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Return `ConvergenceExhausted` instead of `WaitOutcome::Exhausted`.
    pub fn fail_on_exhausted(mut self, fail: bool) -> Self {
        self.fail_on_exhausted = fail;
        self
    }

    /// Polls `parent` at most `max_attempts` times.
    ///
    /// A missing parent or a failing fetch ends the wait immediately; only the
    /// "not converged yet" condition is retried. Cancelling `cancel` stops the
    /// wait with `ReconcileError::Cancelled`.
    pub async fn wait_for_convergence(
        &self,
        parent: &ParentKey,
        declared: &DeclaredSet,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome, ReconcileError> {
        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(ReconcileError::Cancelled { parent: parent.clone() });
            }

            let attached = fetch_attached(self.directory.as_ref(), parent).await?;
            if attached.matches(declared) {
                debug!(%parent, attempt, "converged");
                return Ok(WaitOutcome::Converged { attempts: attempt });
            }

            if attempt == max_attempts {
                break;
            }

            debug!(%parent, attempt, max_attempts, "not converged yet, waiting");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ReconcileError::Cancelled { parent: parent.clone() });
                }
                _ = sleep(self.poll_interval) => {}
            }
        }

        warn!(%parent, attempts = max_attempts, "directory did not converge");
        if self.fail_on_exhausted {
            return Err(ReconcileError::ConvergenceExhausted {
                parent: parent.clone(),
                attempts: max_attempts,
            });
        }
        Ok(WaitOutcome::Exhausted { attempts: max_attempts })
    }
}
