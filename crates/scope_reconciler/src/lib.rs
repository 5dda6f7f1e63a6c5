use async_trait::async_trait;
use thiserror::Error;

pub mod controller;
pub mod lifecycle;
pub mod parent;
pub mod reconcile;
pub mod snapshot;
pub mod state;

pub use controller::{ConvergenceWaiter, Drift, DriftReporter, Reconciler, WaitOutcome};
pub use lifecycle::{BindingResource, BindingState, DeclaredScopes};
pub use parent::ParentKey;
pub use reconcile::{compute_delta, Delta};
pub use snapshot::{Snapshot, SnapshotDirectory, SnapshotError};
pub use scopesync_config::BindingKind;
pub use state::{AttachedSet, DeclaredSet, Item};

/// Error reported by a [`Directory`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("remote error: {0}")]
    Remote(String),
}

impl DirectoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Remote mutation that failed while applying a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOp {
    Attach,
    Detach,
}

impl std::fmt::Display for ApplyOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attach => f.write_str("attach"),
            Self::Detach => f.write_str("detach"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    #[error("validation error: {parent} does not exist")]
    ParentNotFound { parent: ParentKey },

    #[error("Failed to fetch scopes of {parent}: {source}")]
    TransientFetch {
        parent: ParentKey,
        #[source]
        source: DirectoryError,
    },

    #[error("Failed to {op} scope '{item}' on {parent}: {source}")]
    Apply {
        op: ApplyOp,
        parent: ParentKey,
        item: String,
        #[source]
        source: DirectoryError,
    },

    #[error("validation error: scope '{name}' is not defined in realm {realm}")]
    UnknownItem { realm: String, name: String },

    #[error("{parent} did not converge after {attempts} poll(s)")]
    ConvergenceExhausted { parent: ParentKey, attempts: u32 },

    #[error("Cancelled while waiting for {parent} to converge")]
    Cancelled { parent: ParentKey },

    #[error("Invalid import id '{id}'. Supported import format: {expected}")]
    InvalidImportId { id: String, expected: &'static str },

    #[error("Invalid parent: {0}")]
    InvalidParent(String),
}

impl ReconcileError {
    /// Errors the host reports as validation errors rather than remote failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ParentNotFound { .. }
                | Self::UnknownItem { .. }
                | Self::InvalidImportId { .. }
                | Self::InvalidParent(_)
        )
    }

    /// Maps a failed fetch of `parent` to the matching error kind.
    pub(crate) fn from_fetch(parent: &ParentKey, err: DirectoryError) -> Self {
        if err.is_not_found() {
            Self::ParentNotFound {
                parent: parent.clone(),
            }
        } else {
            Self::TransientFetch {
                parent: parent.clone(),
                source: err,
            }
        }
    }
}

// ============================================================================
// Directory Trait - the remote side, abstracted for tests
// ============================================================================

/// Scope collections of a remote directory.
///
/// Reads may lag behind writes. `attach` and `detach` must be idempotent:
/// attaching a present scope or detaching an absent one succeeds.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Lists the scopes attached to `parent`. Fails with `NotFound` if the parent is gone.
    async fn list(&self, parent: &ParentKey) -> Result<Vec<Item>, DirectoryError>;

    /// Lists every scope defined in `realm`, used to resolve names to ids.
    async fn catalog(&self, realm: &str) -> Result<Vec<Item>, DirectoryError>;

    /// Attaches the scope `item_id` to `parent`.
    async fn attach(&self, parent: &ParentKey, item_id: &str) -> Result<(), DirectoryError>;

    /// Detaches the scope `item_id` from `parent`.
    async fn detach(&self, parent: &ParentKey, item_id: &str) -> Result<(), DirectoryError>;
}

// ============================================================================
// Test Utilities - exported for integration tests
// ============================================================================

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// A remote call recorded by [`MockDirectory`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        List(String),
        Catalog(String),
        Attach(String, String),
        Detach(String, String),
    }

    #[derive(Default)]
    struct Inner {
        catalogs: HashMap<String, Vec<Item>>,
        attached: HashMap<String, Vec<Item>>,
        calls: Vec<Call>,
        failing_ops: HashMap<String, DirectoryError>,
        failing_lists: VecDeque<DirectoryError>,
        stale_reads: usize,
        last_visible: HashMap<String, Vec<Item>>,
    }

    /// In-memory directory for tests.
    ///
    /// Parents exist once they were added with [`MockDirectory::add_parent`].
    /// `with_stale_reads(n)` makes the next `n` lists return what was visible
    /// before the last mutation, imitating a lagging read endpoint.
    #[derive(Default)]
    pub struct MockDirectory {
        inner: Mutex<Inner>,
    }

    impl MockDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        /// Defines scopes in a realm catalog.
        pub fn with_catalog(self, realm: &str, scopes: &[(&str, &str)]) -> Self {
            {
                let mut inner = self.inner.lock().unwrap();
                let catalog = inner.catalogs.entry(realm.to_string()).or_default();
                catalog.extend(scopes.iter().map(|(id, name)| item(id, name)));
            }
            self
        }

        /// Creates `parent` with the given attached items.
        pub fn add_parent(&self, parent: &ParentKey, attached: Vec<Item>) {
            let mut inner = self.inner.lock().unwrap();
            let key = parent.to_string();
            inner.last_visible.insert(key.clone(), attached.clone());
            inner.attached.insert(key, attached);
        }

        /// Removes `parent`; further calls against it fail with `NotFound`.
        pub fn remove_parent(&self, parent: &ParentKey) {
            let mut inner = self.inner.lock().unwrap();
            inner.attached.remove(&parent.to_string());
            inner.last_visible.remove(&parent.to_string());
        }

        /// Makes every attach/detach of `item_id` fail with `err`.
        pub fn fail_on(&self, item_id: &str, err: DirectoryError) {
            self.inner
                .lock()
                .unwrap()
                .failing_ops
                .insert(item_id.to_string(), err);
        }

        /// Queues an error returned by the next list call.
        pub fn fail_next_list(&self, err: DirectoryError) {
            self.inner.lock().unwrap().failing_lists.push_back(err);
        }

        /// The next `reads` list calls return the state before the last mutation.
        pub fn with_stale_reads(self, reads: usize) -> Self {
            self.inner.lock().unwrap().stale_reads = reads;
            self
        }

        pub fn set_stale_reads(&self, reads: usize) {
            self.inner.lock().unwrap().stale_reads = reads;
        }

        /// Current authoritative state of `parent`.
        pub fn attached(&self, parent: &ParentKey) -> Vec<Item> {
            self.inner
                .lock()
                .unwrap()
                .attached
                .get(&parent.to_string())
                .cloned()
                .unwrap_or_default()
        }

        pub fn attached_names(&self, parent: &ParentKey) -> Vec<String> {
            let mut names: Vec<String> = self.attached(parent).into_iter().map(|i| i.name).collect();
            names.sort();
            names
        }

        pub fn calls(&self) -> Vec<Call> {
            self.inner.lock().unwrap().calls.clone()
        }

        /// Only the attach/detach calls, in order.
        pub fn mutations(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| matches!(c, Call::Attach(..) | Call::Detach(..)))
                .collect()
        }

        pub fn list_count(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::List(_)))
                .count()
        }
    }

    /// Builds an [`Item`].
    pub fn item(id: &str, name: &str) -> Item {
        Item {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    pub fn realm_default(realm: &str) -> ParentKey {
        ParentKey::new(BindingKind::RealmDefault, realm, None).unwrap()
    }

    pub fn client_default(realm: &str, client: &str) -> ParentKey {
        ParentKey::new(BindingKind::ClientDefault, realm, Some(client)).unwrap()
    }

    pub fn declared(names: &[&str]) -> DeclaredSet {
        names.iter().copied().collect()
    }

    #[async_trait]
    impl Directory for MockDirectory {
        async fn list(&self, parent: &ParentKey) -> Result<Vec<Item>, DirectoryError> {
            let mut inner = self.inner.lock().unwrap();
            let key = parent.to_string();
            inner.calls.push(Call::List(key.clone()));

            if let Some(err) = inner.failing_lists.pop_front() {
                return Err(err);
            }

            let current = inner
                .attached
                .get(&key)
                .cloned()
                .ok_or_else(|| DirectoryError::NotFound(key.clone()))?;

            if inner.stale_reads > 0 {
                inner.stale_reads -= 1;
                return Ok(inner.last_visible.get(&key).cloned().unwrap_or_default());
            }

            inner.last_visible.insert(key, current.clone());
            Ok(current)
        }

        async fn catalog(&self, realm: &str) -> Result<Vec<Item>, DirectoryError> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::Catalog(realm.to_string()));
            inner
                .catalogs
                .get(realm)
                .cloned()
                .ok_or_else(|| DirectoryError::NotFound(realm.to_string()))
        }

        async fn attach(&self, parent: &ParentKey, item_id: &str) -> Result<(), DirectoryError> {
            let mut inner = self.inner.lock().unwrap();
            let key = parent.to_string();
            inner.calls.push(Call::Attach(key.clone(), item_id.to_string()));

            if let Some(err) = inner.failing_ops.get(item_id) {
                return Err(err.clone());
            }

            let scope = inner
                .catalogs
                .get(parent.realm())
                .and_then(|c| c.iter().find(|i| i.id == item_id))
                .cloned()
                .ok_or_else(|| DirectoryError::NotFound(item_id.to_string()))?;

            let attached = inner
                .attached
                .get_mut(&key)
                .ok_or_else(|| DirectoryError::NotFound(key.clone()))?;
            if !attached.iter().any(|i| i.id == item_id) {
                attached.push(scope);
            }
            Ok(())
        }

        async fn detach(&self, parent: &ParentKey, item_id: &str) -> Result<(), DirectoryError> {
            let mut inner = self.inner.lock().unwrap();
            let key = parent.to_string();
            inner.calls.push(Call::Detach(key.clone(), item_id.to_string()));

            if let Some(err) = inner.failing_ops.get(item_id) {
                return Err(err.clone());
            }

            let attached = inner
                .attached
                .get_mut(&key)
                .ok_or_else(|| DirectoryError::NotFound(key.clone()))?;
            attached.retain(|i| i.id != item_id);
            Ok(())
        }
    }
}
