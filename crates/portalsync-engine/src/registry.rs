//! Shared old-to-new connection registry.
//!
//! Extraction workers record every successful extraction here; the rewiring
//! pool reads a snapshot once extraction has fully completed. Keys are leaf
//! dataset names, disambiguated with `_1` suffixes when two layers share one.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use portalsync_types::{LayerId, LocalDescriptor, RemoteDescriptor};

const DISAMBIGUATION_SUFFIX: &str = "_1";

/// One rewiring instruction: point `layer` away from `old` and at `new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub old: RemoteDescriptor,
    pub new: LocalDescriptor,
    pub layer: LayerId,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: Mutex<BTreeMap<String, RegistryEntry>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Each operation leaves the map consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, RegistryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `entry` under `key`, appending `_1` until the key is unused.
    ///
    /// The check and insert happen under one lock, so concurrent registrations
    /// of the same name always get distinct keys. The entry's local dataset is
    /// set to the final key, which is returned.
    pub fn register(&self, key: &str, mut entry: RegistryEntry) -> String {
        let mut entries = self.lock();
        let mut final_key = key.to_string();
        while entries.contains_key(&final_key) {
            final_key.push_str(DISAMBIGUATION_SUFFIX);
        }
        entry.new.dataset.clone_from(&final_key);
        entries.insert(final_key.clone(), entry);
        final_key
    }

    /// Remove the entry under `key`, e.g. after its extraction failed.
    pub fn withdraw(&self, key: &str) -> Option<RegistryEntry> {
        self.lock().remove(key)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<RegistryEntry> {
        self.lock().get(key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All entries ordered by key.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, RegistryEntry)> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn entry(layer: &str) -> RegistryEntry {
        RegistryEntry {
            old: RemoteDescriptor {
                account: Some("gisuser".into()),
                server: Some("gisprod01".into()),
                instance: None,
                dataset: "GIS.ROADS".into(),
                feature_dataset: None,
            },
            new: LocalDescriptor {
                database: PathBuf::from("/data/roads_data/roads_0.db"),
                dataset: String::new(),
            },
            layer: LayerId::new(layer),
        }
    }

    #[test]
    fn colliding_names_get_suffixes() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.register("ROADS", entry("a")), "ROADS");
        assert_eq!(registry.register("ROADS", entry("b")), "ROADS_1");
        assert_eq!(registry.register("ROADS", entry("c")), "ROADS_1_1");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn registered_entry_points_at_final_key() {
        let registry = ConnectionRegistry::new();
        registry.register("ROADS", entry("a"));
        let key = registry.register("ROADS", entry("b"));
        let stored = registry.get(&key).unwrap();
        assert_eq!(stored.new.dataset, "ROADS_1");
        assert_eq!(stored.layer, LayerId::new("b"));
    }

    #[test]
    fn withdrawn_key_can_be_reused() {
        let registry = ConnectionRegistry::new();
        let key = registry.register("ROADS", entry("a"));
        assert!(registry.withdraw(&key).is_some());
        assert!(registry.is_empty());
        assert_eq!(registry.register("ROADS", entry("b")), "ROADS");
    }

    #[test]
    fn snapshot_is_ordered_by_key() {
        let registry = ConnectionRegistry::new();
        registry.register("ZONING", entry("z"));
        registry.register("ADDRESS", entry("a"));
        registry.register("ROADS", entry("r"));
        let keys: Vec<String> = registry.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["ADDRESS", "ROADS", "ZONING"]);
    }

    #[test]
    fn concurrent_registration_never_loses_entries() {
        let registry = Arc::new(ConnectionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|i| registry.register("ROADS", entry(&format!("{t}-{i}"))))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut keys: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 200);
        assert_eq!(registry.len(), 200);
    }
}
