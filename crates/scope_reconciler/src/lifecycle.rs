//! Lifecycle adapter for resource hosts
//!
//! Translates host state (a parent plus a list or set of scope names) into
//! calls on the reconciler, waiter and drift reporter. Create and update
//! share one path; delete is a teardown; read and import go through the
//! drift reporter.

use std::collections::BTreeSet;
use std::sync::Arc;

use scopesync_config::{BindingKind, ConvergenceConfig};
use tokio_util::sync::CancellationToken;

use crate::controller::{ConvergenceWaiter, Drift, DriftReporter, Reconciler, WaitOutcome};
use crate::state::DeclaredSet;
use crate::{Directory, ParentKey, ReconcileError};

/// Declared scopes as the host stores them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredScopes {
    /// Ordered, may contain duplicates; order is kept on refresh
    List(Vec<String>),
    Set(BTreeSet<String>),
}

impl DeclaredScopes {
    pub fn to_declared(&self) -> DeclaredSet {
        match self {
            Self::List(names) => DeclaredSet::from_list(names.iter().cloned()),
            Self::Set(names) => DeclaredSet::from(names.clone()),
        }
    }

    /// Re-expresses `current` in the shape of `self`.
    ///
    /// Lists keep their order for names that are still attached; new names
    /// are appended in sorted order. This keeps a refresh from reporting a
    /// reordering as a change.
    pub fn refreshed(&self, current: DeclaredSet) -> Self {
        match self {
            Self::Set(_) => Self::Set(current.as_set().clone()),
            Self::List(previous) => {
                let mut names: Vec<String> = Vec::with_capacity(current.len());
                for name in previous {
                    if current.contains(name) && !names.contains(name) {
                        names.push(name.clone());
                    }
                }
                for name in current.iter() {
                    if !names.iter().any(|n| n == name) {
                        names.push(name.to_string());
                    }
                }
                Self::List(names)
            }
        }
    }
}

/// Host-side state of one scope binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingState {
    pub parent: ParentKey,
    pub scopes: DeclaredScopes,
}

impl BindingState {
    /// Id the host records for this resource.
    pub fn id(&self) -> String {
        self.parent.resource_id()
    }
}

/// Create/read/update/delete/import for scope bindings.
pub struct BindingResource<D: Directory> {
    reconciler: Reconciler<D>,
    waiter: ConvergenceWaiter<D>,
    drift: DriftReporter<D>,
    max_attempts: u32,
}

impl<D: Directory> BindingResource<D> {
    pub fn new(directory: Arc<D>, config: &ConvergenceConfig) -> Self {
        Self {
            reconciler: Reconciler::new(directory.clone()),
            waiter: ConvergenceWaiter::with_config(directory.clone(), config),
            drift: DriftReporter::new(directory),
            max_attempts: config.max_attempts,
        }
    }

    pub async fn create(&self, state: &BindingState, cancel: &CancellationToken) -> Result<BindingState, ReconcileError> {
        self.converge(state, cancel).await
    }

    pub async fn update(&self, state: &BindingState, cancel: &CancellationToken) -> Result<BindingState, ReconcileError> {
        self.converge(state, cancel).await
    }

    /// Refreshes `state` from the directory. `None` means the resource is gone.
    pub async fn read(&self, state: &BindingState) -> Result<Option<BindingState>, ReconcileError> {
        match self.drift.current_declared_equivalent(&state.parent).await? {
            Drift::Present(current) => Ok(Some(BindingState {
                parent: state.parent.clone(),
                scopes: state.scopes.refreshed(current),
            })),
            Drift::Gone => Ok(None),
        }
    }

    pub async fn delete(&self, state: &BindingState) -> Result<(), ReconcileError> {
        self.reconciler.teardown(&state.parent).await.map(|_| ())
    }

    /// Builds state for an existing binding from its import id.
    pub async fn import(&self, kind: BindingKind, id: &str) -> Result<BindingState, ReconcileError> {
        let parent = ParentKey::from_import_id(kind, id)?;
        match self.drift.current_declared_equivalent(&parent).await? {
            Drift::Present(current) => Ok(BindingState {
                parent,
                scopes: DeclaredScopes::List(current.into_sorted_vec()),
            }),
            Drift::Gone => Err(ReconcileError::ParentNotFound { parent }),
        }
    }

    async fn converge(&self, state: &BindingState, cancel: &CancellationToken) -> Result<BindingState, ReconcileError> {
        let declared = state.scopes.to_declared();
        self.reconciler.reconcile(&state.parent, &declared).await?;

        let outcome = self
            .waiter
            .wait_for_convergence(&state.parent, &declared, self.max_attempts, cancel)
            .await?;
        if let WaitOutcome::Exhausted { .. } = outcome {
            // The refreshed state below shows the host whatever is still missing
            tracing::debug!(parent = %state.parent, "returning unconverged state");
        }

        self.read(state)
            .await?
            .ok_or_else(|| ReconcileError::ParentNotFound {
                parent: state.parent.clone(),
            })
    }
}
