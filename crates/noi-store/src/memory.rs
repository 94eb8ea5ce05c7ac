use std::collections::BTreeMap;

use crate::traits::{DbInfo, NamespaceInfo, StateStore, Transactional};

/// In-memory storage backend.
///
/// All data is stored in a `BTreeMap`; nothing touches disk.
/// Transactions snapshot the map and restore it on failure.
///
/// # Example
///
/// ```
/// use noi_store::{MemoryStore, StateStore};
///
/// let mut store = MemoryStore::new();
/// store.put("tickets.site", "1", b"welket").unwrap();
///
/// let data = store.get("tickets.site", "1").unwrap().unwrap();
/// assert_eq!(data, b"welket");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// (namespace, key) -> value
    state: BTreeMap<(String, String), Vec<u8>>,
}

/// Error type for the in-memory backend.
///
/// This backend never actually fails, but the trait requires an error type.
#[derive(Debug, Clone, thiserror::Error)]
#[error("MemoryStore error: {0}")]
pub struct MemoryError(String);

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of entries across all namespaces.
    pub fn state_count(&self) -> usize {
        self.state.len()
    }

    /// Summary of the stored namespaces.
    pub fn db_info(&self) -> DbInfo {
        let mut namespaces: Vec<NamespaceInfo> = Vec::new();
        for ((ns, _), value) in &self.state {
            match namespaces.last_mut() {
                Some(info) if info.name == *ns => {
                    info.entity_count += 1;
                    info.bytes += value.len() as u64;
                }
                _ => namespaces.push(NamespaceInfo {
                    name: ns.clone(),
                    entity_count: 1,
                    bytes: value.len() as u64,
                }),
            }
        }
        DbInfo {
            total_entities: namespaces.iter().map(|n| n.entity_count).sum(),
            total_bytes: namespaces.iter().map(|n| n.bytes).sum(),
            namespaces,
        }
    }

    fn ns_key(namespace: &str, key: &str) -> (String, String) {
        (namespace.to_string(), key.to_string())
    }
}

impl StateStore for MemoryStore {
    type Error = MemoryError;

    fn put(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<(), Self::Error> {
        self.state
            .insert(Self::ns_key(namespace, key), value.to_vec());
        Ok(())
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.state.get(&Self::ns_key(namespace, key)).cloned())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), Self::Error> {
        self.state.remove(&Self::ns_key(namespace, key));
        Ok(())
    }

    fn list_keys(&self, namespace: &str) -> Result<Vec<String>, Self::Error> {
        let keys = self
            .state
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, k)| k.clone())
            .collect();
        Ok(keys)
    }

    fn list_namespaces(&self) -> Result<Vec<String>, Self::Error> {
        let mut namespaces: Vec<String> = self.state.keys().map(|(ns, _)| ns.clone()).collect();
        namespaces.dedup();
        Ok(namespaces)
    }

    fn exists(&self, namespace: &str, key: &str) -> Result<bool, Self::Error> {
        Ok(self.state.contains_key(&Self::ns_key(namespace, key)))
    }
}

impl Transactional for MemoryStore {
    fn transaction<F, R, E>(&mut self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Self) -> Result<R, E>,
        E: From<Self::Error>,
    {
        let snapshot = self.state.clone();
        let result = f(self);
        if result.is_err() {
            self.state = snapshot;
        }
        result
    }
}
