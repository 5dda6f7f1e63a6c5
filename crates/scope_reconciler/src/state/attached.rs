//! Attached State - what the directory actually reports
//!
//! Fetched fresh for every pass and every poll. The directory may report the
//! same name more than once; that is tolerated, not an error.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::DeclaredSet;

/// A scope as reported by the directory. Matched by `name`, addressed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
}

/// The scopes currently attached to one parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachedSet {
    pub items: Vec<Item>,
}

impl AttachedSet {
    pub fn from_items(items: Vec<Item>) -> Self {
        Self { items }
    }

    /// Distinct attached names.
    pub fn names(&self) -> BTreeSet<&str> {
        self.items.iter().map(|i| i.name.as_str()).collect()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.items.iter().any(|i| i.name == name)
    }

    /// Finds the first item with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.name == name)
    }

    /// Projects the attached items onto the declared representation.
    pub fn to_declared(&self) -> DeclaredSet {
        self.items.iter().map(|i| i.name.clone()).collect()
    }

    /// Checks whether the attached names equal `declared` exactly.
    ///
    /// A superset or subset is not a match.
    pub fn matches(&self, declared: &DeclaredSet) -> bool {
        let names = self.names();
        if names.len() != declared.len() {
            return false;
        }
        names.iter().all(|name| declared.contains(name))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
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
    fn test_names_deduplicate() {
        let attached = AttachedSet::from_items(vec![
            item("a1", "email"),
            item("a2", "email"),
            item("a3", "roles"),
        ]);

        assert_eq!(attached.len(), 3);
        assert_eq!(attached.names().into_iter().collect::<Vec<_>>(), vec!["email", "roles"]);
    }

    #[test]
    fn test_matches_exact() {
        let attached = AttachedSet::from_items(vec![item("a1", "email"), item("a2", "profile")]);
        assert!(attached.matches(&DeclaredSet::from_list(["profile", "email"])));
    }

    #[test]
    fn test_superset_does_not_match() {
        let attached = AttachedSet::from_items(vec![
            item("a1", "email"),
            item("a2", "profile"),
            item("a3", "roles"),
        ]);
        assert!(!attached.matches(&DeclaredSet::from_list(["profile", "email"])));
    }

    #[test]
    fn test_subset_does_not_match() {
        let attached = AttachedSet::from_items(vec![item("a1", "email")]);
        assert!(!attached.matches(&DeclaredSet::from_list(["profile", "email"])));
    }

    #[test]
    fn test_same_size_different_names_do_not_match() {
        let attached = AttachedSet::from_items(vec![item("a1", "email"), item("a2", "roles")]);
        assert!(!attached.matches(&DeclaredSet::from_list(["profile", "email"])));
    }

    #[test]
    fn test_duplicates_still_match() {
        let attached = AttachedSet::from_items(vec![item("a1", "email"), item("a2", "email")]);
        assert!(attached.matches(&DeclaredSet::from_list(["email"])));
    }

    #[test]
    fn test_empty_matches_empty() {
        assert!(AttachedSet::default().matches(&DeclaredSet::new()));
    }

    #[test]
    fn test_item_from_json() {
        let items: Vec<Item> =
            serde_json::from_str(r#"[{"id":"a1","name":"email"},{"id":"a2","name":"roles"}]"#).unwrap();
        let attached = AttachedSet::from_items(items);
        assert_eq!(attached.find_by_name("roles").map(|i| i.id.as_str()), Some("a2"));
        assert!(attached.contains_name("email"));
        assert_eq!(attached.to_declared(), DeclaredSet::from_list(["email", "roles"]));
    }
}
