//! Controller Module - drives the directory towards the declared state
//!
//! 1. Fetch the attached state (`Reconciler`)
//! 2. Compute the delta (`compute_delta`)
//! 3. Apply detaches, then attaches
//! 4. Poll until the directory reports the declared state (`ConvergenceWaiter`)
//!
//! `DriftReporter` covers the read side used by refresh and import.

pub mod drift;
pub mod reconciler;
pub mod waiter;

pub use drift::{Drift, DriftReporter};
pub use reconciler::Reconciler;
pub use waiter::{ConvergenceWaiter, WaitOutcome};

use tracing::debug;

use crate::state::AttachedSet;
use crate::{Directory, ParentKey, ReconcileError};

/// Fetches the attached set of `parent`, never from a cache.
pub(crate) async fn fetch_attached<D: Directory + ?Sized>(
    directory: &D,
    parent: &ParentKey,
) -> Result<AttachedSet, ReconcileError> {
    let items = directory
        .list(parent)
        .await
        .map_err(|e| ReconcileError::from_fetch(parent, e))?;
    debug!(%parent, attached = items.len(), "fetched attached scopes");
    Ok(AttachedSet::from_items(items))
}
