//! In-process cache.

use super::pending::{PendingMessage, PendingQueue};
use super::{CacheError, RegistrationCache};
use crate::core::config::IngestConfig;
use crate::core::time::SystemClock;
use crate::lock::{ComponentLock, LockCoordinator};
use crate::packet::types::Source;
use crate::packet::{ApplicationInfo, PropertyRegistration, SystemInfo};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One source's registration sub-record.
#[derive(Debug, Default)]
struct SourceRecord {
    /// Registration order is the iteration order downstream sees.
    properties: Vec<(String, PropertyRegistration)>,
    registered: bool,
}

impl SourceRecord {
    fn clear_properties(&mut self) {
        self.properties.clear();
    }
}

/// Everything known about one component.
#[derive(Debug, Default)]
struct ComponentEntry {
    api_version: Option<u32>,
    system_info: Option<SystemInfo>,
    app_info: Option<ApplicationInfo>,
    system: SourceRecord,
    app: SourceRecord,
    pending: Option<PendingQueue>,
}

impl ComponentEntry {
    fn record(&self, source: Source) -> &SourceRecord {
        match source {
            Source::System => &self.system,
            Source::App => &self.app,
        }
    }

    fn record_mut(&mut self, source: Source) -> &mut SourceRecord {
        match source {
            Source::System => &mut self.system,
            Source::App => &mut self.app,
        }
    }
}

/// Default in-process [`RegistrationCache`].
pub struct MemoryCache {
    entries: Mutex<HashMap<String, ComponentEntry>>,
    pending_capacity: usize,
    system_lock: Arc<dyn ComponentLock>,
    app_lock: Arc<dyn ComponentLock>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_config(&IngestConfig::default())
    }

    pub fn with_config(config: &IngestConfig) -> Self {
        let poll = config.lock_poll_interval();
        Self {
            entries: Mutex::new(HashMap::new()),
            pending_capacity: config.pending_queue_capacity,
            system_lock: Arc::new(LockCoordinator::new(Source::System, poll, SystemClock)),
            app_lock: Arc::new(LockCoordinator::new(Source::App, poll, SystemClock)),
        }
    }

    fn with_entry<T>(&self, component: &str, f: impl FnOnce(&mut ComponentEntry) -> T) -> T {
        let mut entries = self.entries.lock();
        f(entries.entry(component.to_string()).or_default())
    }

    /// Read-only view; absent components read as defaults.
    fn read_entry<T>(&self, component: &str, f: impl FnOnce(Option<&ComponentEntry>) -> T) -> T {
        let entries = self.entries.lock();
        f(entries.get(component))
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistrationCache for MemoryCache {
    async fn cache_api_version(&self, component: &str, version: u32) -> Result<(), CacheError> {
        self.with_entry(component, |entry| entry.api_version = Some(version));
        Ok(())
    }

    async fn api_version(&self, component: &str) -> Result<Option<u32>, CacheError> {
        Ok(self.read_entry(component, |entry| entry.and_then(|e| e.api_version)))
    }

    async fn clear_api_version(&self, component: &str) -> Result<(), CacheError> {
        self.with_entry(component, |entry| entry.api_version = None);
        Ok(())
    }

    async fn cache_system_info(
        &self,
        component: &str,
        info: SystemInfo,
    ) -> Result<(), CacheError> {
        self.with_entry(component, |entry| entry.system_info = Some(info));
        Ok(())
    }

    async fn system_info(&self, component: &str) -> Result<Option<SystemInfo>, CacheError> {
        Ok(self.read_entry(component, |entry| entry.and_then(|e| e.system_info.clone())))
    }

    async fn clear_system_info(&self, component: &str) -> Result<(), CacheError> {
        self.with_entry(component, |entry| entry.system_info = None);
        Ok(())
    }

    async fn cache_app_info(
        &self,
        component: &str,
        info: ApplicationInfo,
    ) -> Result<(), CacheError> {
        self.with_entry(component, |entry| entry.app_info = Some(info));
        Ok(())
    }

    async fn app_info(&self, component: &str) -> Result<Option<ApplicationInfo>, CacheError> {
        Ok(self.read_entry(component, |entry| entry.and_then(|e| e.app_info.clone())))
    }

    async fn cache_property(
        &self,
        component: &str,
        source: Source,
        path: &str,
        registration: PropertyRegistration,
    ) -> Result<(), CacheError> {
        self.with_entry(component, |entry| {
            let record = entry.record_mut(source);
            match record.properties.iter_mut().find(|(p, _)| p == path) {
                Some((_, existing)) => *existing = registration,
                None => record.properties.push((path.to_string(), registration)),
            }
        });
        Ok(())
    }

    async fn property(
        &self,
        component: &str,
        source: Source,
        path: &str,
    ) -> Result<Option<PropertyRegistration>, CacheError> {
        Ok(self.read_entry(component, |entry| {
            entry.and_then(|e| {
                e.record(source)
                    .properties
                    .iter()
                    .find(|(p, _)| p == path)
                    .map(|(_, reg)| reg.clone())
            })
        }))
    }

    async fn all_properties(
        &self,
        component: &str,
        source: Source,
    ) -> Result<Vec<PropertyRegistration>, CacheError> {
        Ok(self.read_entry(component, |entry| {
            entry
                .map(|e| {
                    e.record(source)
                        .properties
                        .iter()
                        .map(|(_, reg)| reg.clone())
                        .collect()
                })
                .unwrap_or_default()
        }))
    }

    async fn clear_properties(&self, component: &str, source: Source) -> Result<(), CacheError> {
        self.with_entry(component, |entry| {
            entry.record_mut(source).clear_properties();
        });
        Ok(())
    }

    async fn set_registered(
        &self,
        component: &str,
        source: Source,
        registered: bool,
    ) -> Result<(), CacheError> {
        self.with_entry(component, |entry| {
            entry.record_mut(source).registered = registered;
        });
        Ok(())
    }

    async fn is_registered(&self, component: &str, source: Source) -> Result<bool, CacheError> {
        Ok(self.read_entry(component, |entry| {
            entry.map(|e| e.record(source).registered).unwrap_or(false)
        }))
    }

    async fn clear_info_and_registered(
        &self,
        component: &str,
        source: Source,
    ) -> Result<(), CacheError> {
        self.with_entry(component, |entry| {
            match source {
                Source::System => entry.system_info = None,
                Source::App => entry.app_info = None,
            }
            entry.record_mut(source).registered = false;
        });
        Ok(())
    }

    async fn clear_cached_values(
        &self,
        component: &str,
        source: Source,
    ) -> Result<(), CacheError> {
        self.with_entry(component, |entry| {
            let record = entry.record_mut(source);
            record.clear_properties();
            record.registered = false;
        });
        Ok(())
    }

    async fn clear_all(&self, component: &str) -> Result<(), CacheError> {
        self.entries.lock().remove(component);
        Ok(())
    }

    async fn cache_pending_message(
        &self,
        component: &str,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), CacheError> {
        let capacity = self.pending_capacity;
        self.with_entry(component, |entry| {
            entry
                .pending
                .get_or_insert_with(|| PendingQueue::new(capacity))
                .push(PendingMessage {
                    topic: topic.to_string(),
                    payload: payload.to_vec(),
                });
        });
        Ok(())
    }

    async fn next_pending_message(
        &self,
        component: &str,
    ) -> Result<Option<PendingMessage>, CacheError> {
        let mut entries = self.entries.lock();
        Ok(entries
            .get_mut(component)
            .and_then(|entry| entry.pending.as_mut())
            .and_then(PendingQueue::pop))
    }

    fn source_lock(&self, source: Source) -> Arc<dyn ComponentLock> {
        match source {
            Source::System => Arc::clone(&self.system_lock),
            Source::App => Arc::clone(&self.app_lock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::types::PropertyType;

    fn registration(path: &str, index: u32) -> PropertyRegistration {
        PropertyRegistration {
            path: path.into(),
            index,
            desc: None,
            prop_type: PropertyType::Primitive,
            format: "B".into(),
            length: 1,
            settable: true,
            gettable: true,
            min: None,
            max: None,
            step: None,
            ui_hidden: None,
        }
    }

    #[tokio::test]
    async fn test_lazy_entry_creation() {
        let cache = MemoryCache::new();
        assert_eq!(cache.api_version("c1").await.unwrap(), None);
        assert!(cache.entries.lock().is_empty());

        cache.cache_api_version("c1", 2).await.unwrap();
        assert_eq!(cache.api_version("c1").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_property_order_and_overwrite() {
        let cache = MemoryCache::new();
        for (path, index) in [("b/x", 0), ("a/y", 1), ("c/z", 2)] {
            cache
                .cache_property("c1", Source::App, path, registration(path, index))
                .await
                .unwrap();
        }
        let paths: Vec<String> = cache
            .all_properties("c1", Source::App)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(paths, vec!["b/x", "a/y", "c/z"]);

        // Re-registering a path replaces in place, keeping its slot.
        let mut updated = registration("a/y", 1);
        updated.settable = false;
        cache
            .cache_property("c1", Source::App, "a/y", updated)
            .await
            .unwrap();
        let all = cache.all_properties("c1", Source::App).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(!all[1].settable);
    }

    #[tokio::test]
    async fn test_sources_are_independent() {
        let cache = MemoryCache::new();
        cache
            .cache_property("c1", Source::System, "s/p", registration("s/p", 0))
            .await
            .unwrap();
        cache.set_registered("c1", Source::System, true).await.unwrap();

        assert!(cache.is_registered("c1", Source::System).await.unwrap());
        assert!(!cache.is_registered("c1", Source::App).await.unwrap());
        assert!(cache
            .all_properties("c1", Source::App)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_clear_cached_values_keeps_info() {
        let cache = MemoryCache::new();
        let info = crate::packet::parse_application_info(br#"{"num_props": 1}"#).unwrap();
        cache.cache_app_info("c1", info).await.unwrap();
        cache
            .cache_property("c1", Source::App, "a/b", registration("a/b", 0))
            .await
            .unwrap();
        cache.set_registered("c1", Source::App, true).await.unwrap();

        cache.clear_cached_values("c1", Source::App).await.unwrap();
        assert!(!cache.is_registered("c1", Source::App).await.unwrap());
        assert!(cache
            .all_properties("c1", Source::App)
            .await
            .unwrap()
            .is_empty());
        assert!(cache.app_info("c1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_info_and_registered_keeps_properties() {
        let cache = MemoryCache::new();
        let info = crate::packet::parse_application_info(br#"{"num_props": 1}"#).unwrap();
        cache.cache_app_info("c1", info).await.unwrap();
        cache
            .cache_property("c1", Source::App, "a/b", registration("a/b", 0))
            .await
            .unwrap();
        cache.set_registered("c1", Source::App, true).await.unwrap();

        cache
            .clear_info_and_registered("c1", Source::App)
            .await
            .unwrap();
        assert!(cache.app_info("c1").await.unwrap().is_none());
        assert!(!cache.is_registered("c1", Source::App).await.unwrap());
        assert_eq!(cache.all_properties("c1", Source::App).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_all_destroys_entry() {
        let cache = MemoryCache::new();
        cache.cache_api_version("c1", 2).await.unwrap();
        cache.cache_pending_message("c1", "t", &[1]).await.unwrap();

        cache.clear_all("c1").await.unwrap();
        assert!(cache.entries.lock().is_empty());
        assert_eq!(cache.next_pending_message("c1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pending_fifo() {
        let cache = MemoryCache::new();
        cache.cache_pending_message("c1", "t1", &[1]).await.unwrap();
        cache.cache_pending_message("c1", "t2", &[2]).await.unwrap();

        let first = cache.next_pending_message("c1").await.unwrap().unwrap();
        assert_eq!(first.topic, "t1");
        let second = cache.next_pending_message("c1").await.unwrap().unwrap();
        assert_eq!(second.topic, "t2");
        assert_eq!(cache.next_pending_message("c1").await.unwrap(), None);
    }
}
