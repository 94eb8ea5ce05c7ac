use core::fmt;

use serde::{Deserialize, Serialize};

/// Summary information about a stored namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    /// Name of the namespace (a model name for imported entities).
    pub name: String,
    /// Number of keys in the namespace.
    pub entity_count: u64,
    /// Total size of the stored values.
    pub bytes: u64,
}

/// Summary information about the entire store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbInfo {
    /// Total number of keys across all namespaces.
    pub total_entities: u64,
    /// Total size of all stored values.
    pub total_bytes: u64,
    /// Per-namespace breakdown, ordered by name.
    pub namespaces: Vec<NamespaceInfo>,
}

/// Core trait for state persistence.
///
/// Every backend implements this trait. It provides simple key-value
/// operations scoped by a namespace (analogous to a table).
///
/// Data is stored as opaque bytes; the store does not interpret entities.
/// Versioning is handled by the envelope written by [`ImportDb`](crate::ImportDb).
pub trait StateStore {
    /// Error type for this backend.
    type Error: fmt::Debug + fmt::Display;

    /// Store a value under `(namespace, key)`.
    fn put(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<(), Self::Error>;

    /// Retrieve a value by `(namespace, key)`.
    /// Returns `None` if the key does not exist.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Delete a value by `(namespace, key)`.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), Self::Error>;

    /// List all keys in a namespace.
    fn list_keys(&self, namespace: &str) -> Result<Vec<String>, Self::Error>;

    /// List all namespaces holding at least one key.
    fn list_namespaces(&self) -> Result<Vec<String>, Self::Error>;

    /// Check if a key exists in a namespace.
    fn exists(&self, namespace: &str, key: &str) -> Result<bool, Self::Error> {
        Ok(self.get(namespace, key)?.is_some())
    }
}

/// Extension trait for backends that support atomic transactions.
pub trait Transactional: StateStore {
    /// Execute a closure within an atomic transaction.
    /// If the closure returns `Err`, all changes are rolled back.
    fn transaction<F, R, E>(&mut self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Self) -> Result<R, E>,
        E: From<Self::Error>;
}
