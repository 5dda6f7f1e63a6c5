//! Reconcile Module - pure diff between declared and attached state
//!
//! `compute_delta` is a **pure function**:
//! - no side effects
//! - deterministic, independent of input order
//! - testable without a directory

mod delta;

pub use delta::Delta;

use crate::state::{AttachedSet, DeclaredSet, Item};

/// Computes the operations that turn `attached` into `declared`.
///
/// Items are matched by name. Every attached item whose name is not declared
/// is detached, including all duplicates of that name. Declared names that
/// are attached at least once are left alone, even if duplicated.
///
/// # Example
///
/// ```ignore
/// let attached = AttachedSet::from_items(directory.list(&parent).await?);
/// let delta = compute_delta(&declared, &attached);
///
/// for item in &delta.to_detach {
///     directory.detach(&parent, &item.id).await?;
/// }
/// ```
pub fn compute_delta(declared: &DeclaredSet, attached: &AttachedSet) -> Delta {
    let mut to_detach: Vec<Item> = attached
        .items
        .iter()
        .filter(|item| !declared.contains(&item.name))
        .cloned()
        .collect();
    to_detach.sort_by(|a, b| (&a.name, &a.id).cmp(&(&b.name, &b.id)));

    let present = attached.names();
    let to_attach = declared
        .iter()
        .filter(|name| !present.contains(name))
        .map(str::to_string)
        .collect();

    Delta { to_attach, to_detach }
}
