//! Reconciler - applies a delta against the directory
//!
//! Detaches run before attaches, one call at a time. The first failing call
//! aborts the pass; whatever was already applied stays applied and the next
//! invocation picks up from the fresh attached state.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::controller::fetch_attached;
use crate::reconcile::{compute_delta, Delta};
use crate::state::DeclaredSet;
use crate::{ApplyOp, Directory, ParentKey, ReconcileError};

/// Converges the scopes of a parent to a declared set.
pub struct Reconciler<D: Directory> {
    directory: Arc<D>,
}

impl<D: Directory> Clone for Reconciler<D> {
    fn clone(&self) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
        }
    }
}

impl<D: Directory> Reconciler<D> {
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }

    /// Computes the delta for `parent` without applying it.
    pub async fn plan(&self, parent: &ParentKey, declared: &DeclaredSet) -> Result<Delta, ReconcileError> {
        let attached = fetch_attached(self.directory.as_ref(), parent).await?;
        Ok(compute_delta(declared, &attached))
    }

    /// Applies the delta between `declared` and the attached scopes of `parent`.
    ///
    /// Returns the applied delta. Success does not mean the directory already
    /// reports the declared state; use the `ConvergenceWaiter` for that.
    pub async fn reconcile(&self, parent: &ParentKey, declared: &DeclaredSet) -> Result<Delta, ReconcileError> {
        let delta = self.plan(parent, declared).await?;
        if delta.is_empty() {
            debug!(%parent, "already in sync");
            return Ok(delta);
        }

        // Resolve before mutating so an unknown scope name leaves the parent untouched
        let to_attach = self.resolve(parent, &delta.to_attach).await?;

        for item in &delta.to_detach {
            self.apply(ApplyOp::Detach, parent, &item.name, &item.id).await?;
        }
        for (name, id) in &to_attach {
            self.apply(ApplyOp::Attach, parent, name, id).await?;
        }

        info!(%parent, attached = delta.to_attach.len(), detached = delta.to_detach.len(), "reconciled");
        Ok(delta)
    }

    /// Detaches every scope currently attached to `parent`.
    pub async fn teardown(&self, parent: &ParentKey) -> Result<Delta, ReconcileError> {
        self.reconcile(parent, &DeclaredSet::new()).await
    }

    /// Maps scope names to ids through the realm catalog.
    async fn resolve(
        &self,
        parent: &ParentKey,
        names: &BTreeSet<String>,
    ) -> Result<Vec<(String, String)>, ReconcileError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let catalog = self
            .directory
            .catalog(parent.realm())
            .await
            .map_err(|e| ReconcileError::from_fetch(parent, e))?;

        names
            .iter()
            .map(|name| {
                catalog
                    .iter()
                    .find(|scope| &scope.name == name)
                    .map(|scope| (name.clone(), scope.id.clone()))
                    .ok_or_else(|| ReconcileError::UnknownItem {
                        realm: parent.realm().to_string(),
                        name: name.clone(),
                    })
            })
            .collect()
    }

    async fn apply(&self, op: ApplyOp, parent: &ParentKey, name: &str, id: &str) -> Result<(), ReconcileError> {
        debug!(%parent, %op, scope = name, id, "applying");
        let result = match op {
            ApplyOp::Attach => self.directory.attach(parent, id).await,
            ApplyOp::Detach => self.directory.detach(parent, id).await,
        };
        result.map_err(|source| ReconcileError::Apply {
            op,
            parent: parent.clone(),
            item: name.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{client_default, declared, item, realm_default, Call, MockDirectory};
    use crate::DirectoryError;

    fn directory() -> MockDirectory {
        MockDirectory::new().with_catalog(
            "master",
            &[("s1", "email"), ("s2", "profile"), ("s3", "roles"), ("s4", "address")],
        )
    }

    #[tokio::test]
    async fn test_reconcile_attaches_and_detaches() {
        let directory = Arc::new(directory());
        let parent = client_default("master", "web");
        directory.add_parent(&parent, vec![item("s1", "email"), item("s3", "roles")]);

        let reconciler = Reconciler::new(directory.clone());
        let delta = reconciler
            .reconcile(&parent, &declared(&["profile", "email"]))
            .await
            .unwrap();

        assert_eq!(delta.to_detach, vec![item("s3", "roles")]);
        assert_eq!(directory.attached_names(&parent), vec!["email", "profile"]);

        // Detaches come first
        let key = parent.to_string();
        assert_eq!(
            directory.mutations(),
            vec![Call::Detach(key.clone(), "s3".into()), Call::Attach(key, "s2".into())]
        );
    }

    #[tokio::test]
    async fn test_reconcile_missing_parent_fails_before_diff() {
        let directory = Arc::new(directory());
        let parent = client_default("master", "gone");

        let reconciler = Reconciler::new(directory.clone());
        let err = reconciler
            .reconcile(&parent, &declared(&["email"]))
            .await
            .unwrap_err();

        assert_eq!(err, ReconcileError::ParentNotFound { parent: parent.clone() });
        assert!(err.is_validation());
        assert_eq!(directory.calls(), vec![Call::List(parent.to_string())]);
    }

    #[tokio::test]
    async fn test_reconcile_transient_fetch_failure() {
        let directory = Arc::new(directory());
        let parent = realm_default("master");
        directory.add_parent(&parent, vec![]);
        directory.fail_next_list(DirectoryError::Remote("503".into()));

        let err = Reconciler::new(directory.clone())
            .reconcile(&parent, &declared(&["email"]))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::TransientFetch { .. }));
        assert!(!err.is_validation());
        assert!(directory.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_second_reconcile_is_a_noop() {
        let directory = Arc::new(directory());
        let parent = realm_default("master");
        directory.add_parent(&parent, vec![item("s3", "roles")]);
        let reconciler = Reconciler::new(directory.clone());
        let wanted = declared(&["email", "profile"]);

        reconciler.reconcile(&parent, &wanted).await.unwrap();
        let mutations = directory.mutations().len();

        let second = reconciler.reconcile(&parent, &wanted).await.unwrap();

        assert!(second.is_empty());
        assert_eq!(directory.mutations().len(), mutations);
    }

    #[tokio::test]
    async fn test_detach_failure_stops_everything_after_it() {
        let directory = Arc::new(directory());
        let parent = realm_default("master");
        directory.add_parent(
            &parent,
            vec![item("s1", "email"), item("s2", "profile"), item("s3", "roles")],
        );
        let failure = DirectoryError::Remote("boom".into());
        directory.fail_on("s2", failure.clone());

        let err = Reconciler::new(directory.clone())
            .reconcile(&parent, &declared(&["address"]))
            .await
            .unwrap_err();

        match err {
            ReconcileError::Apply { op, item, source, .. } => {
                assert_eq!(op, ApplyOp::Detach);
                assert_eq!(item, "profile");
                assert_eq!(source, failure);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let key = parent.to_string();
        assert_eq!(
            directory.mutations(),
            vec![Call::Detach(key.clone(), "s1".into()), Call::Detach(key, "s2".into())]
        );
        // First detach stays applied
        assert_eq!(directory.attached_names(&parent), vec!["profile", "roles"]);
    }

    #[tokio::test]
    async fn test_attach_failure_aborts_remaining_attaches() {
        let directory = Arc::new(directory());
        let parent = realm_default("master");
        directory.add_parent(&parent, vec![]);
        directory.fail_on("s2", DirectoryError::NotFound("s2".into()));

        let err = Reconciler::new(directory.clone())
            .reconcile(&parent, &declared(&["email", "profile", "roles"]))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Apply { op: ApplyOp::Attach, .. }));
        assert_eq!(directory.attached_names(&parent), vec!["email"]);
        assert_eq!(directory.mutations().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_scope_fails_before_any_mutation() {
        let directory = Arc::new(directory());
        let parent = realm_default("master");
        directory.add_parent(&parent, vec![item("s3", "roles")]);

        let err = Reconciler::new(directory.clone())
            .reconcile(&parent, &declared(&["email", "does-not-exist"]))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ReconcileError::UnknownItem {
                realm: "master".into(),
                name: "does-not-exist".into()
            }
        );
        assert!(directory.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_detaches_everything() {
        let directory = Arc::new(directory());
        let parent = client_default("master", "web");
        directory.add_parent(&parent, vec![item("s1", "email"), item("s2", "profile")]);

        let delta = Reconciler::new(directory.clone()).teardown(&parent).await.unwrap();

        assert_eq!(delta.to_detach.len(), 2);
        assert!(directory.attached(&parent).is_empty());
        assert!(!directory.calls().iter().any(|c| matches!(c, Call::Catalog(_))));
    }

    #[tokio::test]
    async fn test_plan_does_not_mutate() {
        let directory = Arc::new(directory());
        let parent = realm_default("master");
        directory.add_parent(&parent, vec![item("s3", "roles")]);

        let delta = Reconciler::new(directory.clone())
            .plan(&parent, &declared(&["email"]))
            .await
            .unwrap();

        assert_eq!(delta.operation_count(), 2);
        assert!(directory.mutations().is_empty());
    }
}
