//! Delta - the changes derived by `compute_delta`
//!
//! A delta is recomputed on every pass and never persisted.

use std::collections::BTreeSet;
use std::fmt;

use crate::state::Item;

/// The attach/detach operations needed to move the attached set to the
/// declared set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    /// Declared names that are not attached yet
    pub to_attach: BTreeSet<String>,
    /// Attached items whose name is not declared, sorted by (name, id)
    pub to_detach: Vec<Item>,
}

impl Delta {
    /// Checks whether nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.to_attach.is_empty() && self.to_detach.is_empty()
    }

    /// Number of remote calls applying this delta takes.
    pub fn operation_count(&self) -> usize {
        self.to_attach.len() + self.to_detach.len()
    }

    /// Names that will be detached, deduplicated.
    pub fn detach_names(&self) -> BTreeSet<&str> {
        self.to_detach.iter().map(|i| i.name.as_str()).collect()
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{} -{}", self.to_attach.len(), self.to_detach.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, name: &str) -> Item {
        Item {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_empty_delta() {
        let delta = Delta::default();
        assert!(delta.is_empty());
        assert_eq!(delta.operation_count(), 0);
        assert_eq!(delta.to_string(), "+0 -0");
    }

    #[test]
    fn test_operation_count() {
        let delta = Delta {
            to_attach: ["profile".to_string()].into_iter().collect(),
            to_detach: vec![item("a2", "roles"), item("a3", "roles")],
        };

        assert!(!delta.is_empty());
        assert_eq!(delta.operation_count(), 3);
        assert_eq!(delta.detach_names().into_iter().collect::<Vec<_>>(), vec!["roles"]);
        assert_eq!(delta.to_string(), "+1 -2");
    }
}
