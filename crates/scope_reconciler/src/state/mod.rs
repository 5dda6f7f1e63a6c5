//! State Module - the two sides of a reconciliation
//!
//! - **DeclaredSet**: which scope names the caller wants attached
//! - **AttachedSet**: what the directory currently reports

mod attached;
mod declared;

pub use attached::{AttachedSet, Item};
pub use declared::DeclaredSet;
