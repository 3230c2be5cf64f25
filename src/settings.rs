//! Persisted SETTINGS storage, keyed by origin (spec §4.G, §6 "Persisted
//! state"). Grounded on `original_source/SPDY/SPDYSettingsStore.h`.

use crate::frame::SettingsId;
use crate::origin::Origin;
use dashmap::DashMap;
use enum_map::EnumMap;

pub type SettingsSnapshot = EnumMap<SettingsId, Option<u32>>;

/// Process-wide, keyed by origin; reads and writes are atomic per key
/// (spec §5 "Shared resources"). Shared across every [`crate::session::Session`]
/// for the same origin via `Arc<SettingsStore>`.
#[derive(Default)]
pub struct SettingsStore {
    by_origin: DashMap<Origin, SettingsSnapshot>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot_for(&self, origin: &Origin) -> SettingsSnapshot {
        self.by_origin.get(origin).map(|e| *e).unwrap_or_default()
    }

    pub fn persist(&self, origin: &Origin, id: SettingsId, value: u32) {
        self.by_origin.entry(origin.clone()).or_default()[id] = Some(value);
    }

    /// Resolves the spec's open question on SETTINGS_CLEAR_SETTINGS: purge
    /// everything persisted for this origin.
    pub fn clear(&self, origin: &Origin) {
        self.by_origin.remove(origin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_values_are_retrievable_under_the_same_origin_key() {
        let store = SettingsStore::new();
        let origin = Origin::new("https", "example.com", 443).unwrap();
        store.persist(&origin, SettingsId::InitialWindowSize, 32768);

        let snapshot = store.snapshot_for(&origin);
        assert_eq!(snapshot[SettingsId::InitialWindowSize], Some(32768));
    }

    #[test]
    fn clear_purges_all_entries_for_the_origin() {
        let store = SettingsStore::new();
        let origin = Origin::new("https", "example.com", 443).unwrap();
        store.persist(&origin, SettingsId::InitialWindowSize, 32768);
        store.clear(&origin);
        assert_eq!(
            store.snapshot_for(&origin)[SettingsId::InitialWindowSize],
            None
        );
    }

    #[test]
    fn origins_do_not_share_state() {
        let store = SettingsStore::new();
        let a = Origin::new("https", "a.example.com", 443).unwrap();
        let b = Origin::new("https", "b.example.com", 443).unwrap();
        store.persist(&a, SettingsId::InitialWindowSize, 1);
        assert_eq!(store.snapshot_for(&b)[SettingsId::InitialWindowSize], None);
    }
}
