//! Declared State - the scope names a parent should carry
//!
//! Order and duplicates of the input are irrelevant; two declarations with the
//! same content are the same value.

use std::collections::BTreeSet;

/// The declared scope names of one parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredSet {
    names: BTreeSet<String>,
}

impl DeclaredSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from a list, collapsing duplicates.
    pub fn from_list<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn into_sorted_vec(self) -> Vec<String> {
        self.names.into_iter().collect()
    }

    pub fn as_set(&self) -> &BTreeSet<String> {
        &self.names
    }
}

impl<S: Into<String>> FromIterator<S> for DeclaredSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_list(iter)
    }
}

impl From<BTreeSet<String>> for DeclaredSet {
    fn from(names: BTreeSet<String>) -> Self {
        Self { names }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_collapse() {
        let declared = DeclaredSet::from_list(["email", "profile", "email"]);
        assert_eq!(declared.len(), 2);
        assert!(declared.contains("email"));
        assert!(declared.contains("profile"));
    }

    #[test]
    fn test_order_is_not_significant() {
        let a = DeclaredSet::from_list(["roles", "email", "profile"]);
        let b: DeclaredSet = ["profile", "roles", "email"].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec!["email", "profile", "roles"]);
    }

    #[test]
    fn test_empty() {
        let declared = DeclaredSet::new();
        assert!(declared.is_empty());
        assert!(!declared.contains(""));
    }

    #[test]
    fn test_insert_reports_new_names() {
        let mut declared = DeclaredSet::new();
        assert!(declared.insert("email"));
        assert!(!declared.insert("email"));
        assert_eq!(declared.into_sorted_vec(), vec!["email"]);
    }
}
