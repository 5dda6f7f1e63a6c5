//! Parent keys - the scope under which items are attached.

use std::fmt;

use scopesync_config::{BindingKind, BindingSpec};

use crate::ReconcileError;

/// Identifies one scope collection: a binding kind plus the realm (and client
/// for client kinds) it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParentKey {
    kind: BindingKind,
    realm: String,
    client: Option<String>,
}

impl ParentKey {
    /// Builds a key, checking that a client is given exactly for client kinds.
    pub fn new(kind: BindingKind, realm: &str, client: Option<&str>) -> Result<Self, ReconcileError> {
        if realm.is_empty() {
            return Err(ReconcileError::InvalidParent("realm must not be empty".to_string()));
        }
        match (kind.is_client_scoped(), client) {
            (true, None) | (true, Some("")) => Err(ReconcileError::InvalidParent(format!(
                "{} requires a client",
                kind
            ))),
            (false, Some(_)) => Err(ReconcileError::InvalidParent(format!(
                "{} does not take a client",
                kind
            ))),
            _ => Ok(Self {
                kind,
                realm: realm.to_string(),
                client: client.map(str::to_string),
            }),
        }
    }

    pub fn from_binding(binding: &BindingSpec) -> Result<Self, ReconcileError> {
        Self::new(binding.kind, &binding.realm, binding.client.as_deref())
    }

    /// Parses an import id: `<realm>/<client>` for client kinds, `<realm>` otherwise.
    ///
    /// Malformed ids are rejected before anything is sent to the directory.
    pub fn from_import_id(kind: BindingKind, id: &str) -> Result<Self, ReconcileError> {
        let parts: Vec<&str> = id.split('/').collect();
        let invalid = || ReconcileError::InvalidImportId {
            id: id.to_string(),
            expected: Self::import_format(kind),
        };

        match (kind.is_client_scoped(), parts.as_slice()) {
            (true, [realm, client]) if !realm.is_empty() && !client.is_empty() => {
                Self::new(kind, realm, Some(*client))
            }
            (false, [realm]) if !realm.is_empty() => Self::new(kind, realm, None),
            _ => Err(invalid()),
        }
    }

    fn import_format(kind: BindingKind) -> &'static str {
        if kind.is_client_scoped() {
            "{{realmId}}/{{clientId}}"
        } else {
            "{{realmId}}"
        }
    }

    /// Resource id the host stores for this binding (inverse of `from_import_id`).
    pub fn resource_id(&self) -> String {
        match &self.client {
            Some(client) => format!("{}/{}", self.realm, client),
            None => self.realm.clone(),
        }
    }

    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn client(&self) -> Option<&str> {
        self.client.as_deref()
    }
}

impl fmt::Display for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.resource_id())
    }
}
