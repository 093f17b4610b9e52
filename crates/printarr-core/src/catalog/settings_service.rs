//! Typed settings service (spec.md §4.10): wraps the store's raw
//! get/put/delete with schema validation, default-skip-persist, and
//! change-notification over the event broadcaster.

use serde_json::Value;

use crate::error::Result;
use crate::events::{Broadcaster, EventType};
use crate::settings;

use super::store::CatalogStore;

/// Pairs a `CatalogStore` with a `Broadcaster` so a single settings write
/// can validate, persist, and notify in one call.
#[derive(Clone)]
pub struct SettingsService {
    store: CatalogStore,
    broadcaster: Broadcaster,
}

impl SettingsService {
    pub fn new(store: CatalogStore, broadcaster: Broadcaster) -> Self {
        Self { store, broadcaster }
    }

    /// Falls back to the schema default when no row is persisted.
    pub fn get(&self, key: &str) -> Result<Value> {
        match self.store.get_setting_raw(key)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => settings::default_value(key).ok_or_else(|| crate::error::PrintarrError::NotFound {
                resource: "setting".to_string(),
                id: key.to_string(),
            }),
        }
    }

    pub fn get_all(&self) -> Result<std::collections::HashMap<String, Value>> {
        let mut map = settings::defaults();
        for (key, value) in map.iter_mut() {
            *value = self.get(key)?;
        }
        Ok(map)
    }

    /// Validates against the schema; a value equal to the default is not
    /// persisted (spec.md §4.10) but a change notification still fires so
    /// subscribers observing the effective value stay in sync.
    pub fn put(&self, key: &str, value: Value) -> Result<()> {
        settings::validate(key, &value)?;
        if settings::is_default(key, &value) {
            self.store.delete_setting(key)?;
        } else {
            self.store.put_setting_raw(key, &serde_json::to_string(&value)?)?;
        }
        self.broadcaster.publish(
            EventType::SettingsChanged,
            serde_json::json!({"key": key, "value": value}),
        );
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.store.delete_setting(key)?;
        self.broadcaster.publish(
            EventType::SettingsChanged,
            serde_json::json!({"key": key, "value": settings::default_value(key)}),
        );
        Ok(())
    }

    /// Returns the full default map after clearing every persisted override.
    pub fn reset_to_defaults(&self) -> Result<std::collections::HashMap<String, Value>> {
        self.store.reset_all_settings()?;
        let defaults = settings::defaults();
        self.broadcaster.publish(EventType::SettingsChanged, serde_json::json!({"reset": true}));
        Ok(defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_equal_write_does_not_persist() {
        let store = CatalogStore::open_in_memory().unwrap();
        let service = SettingsService::new(store.clone(), Broadcaster::new());
        service.put("delete_archives_after_extraction", Value::Bool(false)).unwrap();
        assert!(store.get_setting_raw("delete_archives_after_extraction").unwrap().is_none());
    }

    #[test]
    fn non_default_write_persists_and_reads_back() {
        let store = CatalogStore::open_in_memory().unwrap();
        let service = SettingsService::new(store, Broadcaster::new());
        service.put("max_concurrent_downloads", Value::from(5)).unwrap();
        assert_eq!(service.get("max_concurrent_downloads").unwrap(), Value::from(5));
    }

    #[test]
    fn out_of_bounds_write_is_rejected() {
        let store = CatalogStore::open_in_memory().unwrap();
        let service = SettingsService::new(store, Broadcaster::new());
        assert!(service.put("max_concurrent_downloads", Value::from(15)).is_err());
    }

    #[test]
    fn reset_clears_overrides_and_returns_defaults() {
        let store = CatalogStore::open_in_memory().unwrap();
        let service = SettingsService::new(store, Broadcaster::new());
        service.put("max_concurrent_downloads", Value::from(7)).unwrap();
        let defaults = service.reset_to_defaults().unwrap();
        assert_eq!(service.get("max_concurrent_downloads").unwrap(), defaults["max_concurrent_downloads"]);
    }
}
