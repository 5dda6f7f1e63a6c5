//! Drift Reporter - maps the directory state back onto a declared set
//!
//! Used by refresh and import. Nothing is diffed or mutated here.

use std::sync::Arc;

use tracing::info;

use crate::state::{AttachedSet, DeclaredSet};
use crate::{Directory, ParentKey, ReconcileError};

/// What the directory currently holds for a parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    /// The parent exists with these attached names
    Present(DeclaredSet),
    /// The parent no longer exists; the binding should be dropped from state
    Gone,
}

pub struct DriftReporter<D: Directory> {
    directory: Arc<D>,
}

impl<D: Directory> DriftReporter<D> {
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }

    pub async fn current_declared_equivalent(&self, parent: &ParentKey) -> Result<Drift, ReconcileError> {
        match self.directory.list(parent).await {
            Ok(items) => Ok(Drift::Present(AttachedSet::from_items(items).to_declared())),
            Err(err) if err.is_not_found() => {
                info!(%parent, "parent no longer exists");
                Ok(Drift::Gone)
            }
            Err(err) => Err(ReconcileError::from_fetch(parent, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{client_default, declared, item, MockDirectory};
    use crate::DirectoryError;

    #[tokio::test]
    async fn test_reports_attached_names() {
        let directory = Arc::new(MockDirectory::new());
        let parent = client_default("master", "web");
        directory.add_parent(
            &parent,
            vec![item("s1", "email"), item("s2", "profile"), item("s9", "email")],
        );

        let drift = DriftReporter::new(directory)
            .current_declared_equivalent(&parent)
            .await
            .unwrap();

        assert_eq!(drift, Drift::Present(declared(&["email", "profile"])));
    }

    #[tokio::test]
    async fn test_missing_parent_is_gone() {
        let directory = Arc::new(MockDirectory::new());

        let drift = DriftReporter::new(directory)
            .current_declared_equivalent(&client_default("master", "deleted"))
            .await
            .unwrap();

        assert_eq!(drift, Drift::Gone);
    }

    #[tokio::test]
    async fn test_remote_failure_propagates() {
        let directory = Arc::new(MockDirectory::new());
        let parent = client_default("master", "web");
        directory.add_parent(&parent, vec![]);
        directory.fail_next_list(DirectoryError::Remote("timeout".into()));

        let err = DriftReporter::new(directory)
            .current_declared_equivalent(&parent)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::TransientFetch { .. }));
    }
}
