//! # Resource Model
//!
//! Identity, version token and immutable snapshot of a declarative resource.
//!
//! A [`ResourceSnapshot`] is what the cache hands out and what user reconcilers
//! receive. The body is kept as untyped JSON (`spec` / `status`) so the core stays
//! agnostic of the resource kind it drives.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a resource: optional namespace plus name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceId {
    pub fn new(namespace: Option<String>, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }

    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(Some(namespace.into()), name)
    }

    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self::new(None, name)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Opaque optimistic-locking token assigned by the remote store
///
/// Versions are only ever compared for equality; their ordering is a store detail.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVersion(String);

impl ResourceVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceVersion {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ResourceVersion {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable copy of a resource's state at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub id: ResourceId,
    pub version: ResourceVersion,
    #[serde(default)]
    pub finalizers: Vec<String>,
    /// Deletion was requested; the store keeps the resource until its finalizers are gone
    #[serde(default)]
    pub deletion_requested: bool,
    #[serde(default)]
    pub spec: serde_json::Value,
    #[serde(default)]
    pub status: Option<serde_json::Value>,
}

impl ResourceSnapshot {
    pub fn new(id: ResourceId, version: impl Into<ResourceVersion>) -> Self {
        Self {
            id,
            version: version.into(),
            finalizers: Vec::new(),
            deletion_requested: false,
            spec: serde_json::Value::Null,
            status: None,
        }
    }

    pub fn with_spec(mut self, spec: serde_json::Value) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_status(mut self, status: serde_json::Value) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_finalizer(mut self, finalizer: impl Into<String>) -> Self {
        self.add_finalizer(finalizer);
        self
    }

    pub fn with_version(mut self, version: impl Into<ResourceVersion>) -> Self {
        self.version = version.into();
        self
    }

    pub fn marked_for_deletion(mut self) -> Self {
        self.deletion_requested = true;
        self
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Adds the finalizer, returning false when it was already present
    pub fn add_finalizer(&mut self, finalizer: impl Into<String>) -> bool {
        let finalizer = finalizer.into();
        if self.has_finalizer(&finalizer) {
            return false;
        }
        self.finalizers.push(finalizer);
        true
    }

    /// Removes the finalizer, returning false when it was not present
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        before != self.finalizers.len()
    }
}
