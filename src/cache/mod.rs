//! Registration cache.
//!
//! The cache is the only shared mutable state in the core. The contract
//! is pluggable so one cache can back several dispatchers (with a
//! distributed lock behind [`crate::lock::ComponentLock`]); the default
//! is the in-process [`MemoryCache`].
//!
//! Writes touching a source's sub-record must happen inside that
//! source's lock — the cache itself does not enforce it.

pub mod memory;
pub mod pending;

pub use memory::MemoryCache;
pub use pending::{PendingMessage, PendingQueue};

use crate::lock::ComponentLock;
use crate::packet::types::Source;
use crate::packet::{ApplicationInfo, PropertyRegistration, SystemInfo};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// A cache implementation failure; the in-process default never raises
/// one, a remote backing may.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cache backend failure: {0}")]
pub struct CacheError(pub String);

/// Per-component registration state store.
///
/// Entries come into being on first write and die on will-message
/// arrival or an explicit clear-all.
#[async_trait]
pub trait RegistrationCache: Send + Sync {
    async fn cache_api_version(&self, component: &str, version: u32) -> Result<(), CacheError>;
    async fn api_version(&self, component: &str) -> Result<Option<u32>, CacheError>;
    async fn clear_api_version(&self, component: &str) -> Result<(), CacheError>;

    async fn cache_system_info(&self, component: &str, info: SystemInfo)
        -> Result<(), CacheError>;
    async fn system_info(&self, component: &str) -> Result<Option<SystemInfo>, CacheError>;
    async fn clear_system_info(&self, component: &str) -> Result<(), CacheError>;

    async fn cache_app_info(&self, component: &str, info: ApplicationInfo)
        -> Result<(), CacheError>;
    async fn app_info(&self, component: &str) -> Result<Option<ApplicationInfo>, CacheError>;

    async fn cache_property(
        &self,
        component: &str,
        source: Source,
        path: &str,
        registration: PropertyRegistration,
    ) -> Result<(), CacheError>;
    async fn property(
        &self,
        component: &str,
        source: Source,
        path: &str,
    ) -> Result<Option<PropertyRegistration>, CacheError>;
    /// All registrations for a source, in registration order.
    async fn all_properties(
        &self,
        component: &str,
        source: Source,
    ) -> Result<Vec<PropertyRegistration>, CacheError>;
    async fn clear_properties(&self, component: &str, source: Source) -> Result<(), CacheError>;

    async fn set_registered(
        &self,
        component: &str,
        source: Source,
        registered: bool,
    ) -> Result<(), CacheError>;
    async fn is_registered(&self, component: &str, source: Source) -> Result<bool, CacheError>;

    /// Drop a source's info record and registration flag.
    async fn clear_info_and_registered(
        &self,
        component: &str,
        source: Source,
    ) -> Result<(), CacheError>;
    /// Drop a source's cached property registrations and registration flag.
    async fn clear_cached_values(&self, component: &str, source: Source)
        -> Result<(), CacheError>;
    /// Drop everything known about a component.
    async fn clear_all(&self, component: &str) -> Result<(), CacheError>;

    async fn cache_pending_message(
        &self,
        component: &str,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), CacheError>;
    /// FIFO; `None` when the component's queue is empty.
    async fn next_pending_message(
        &self,
        component: &str,
    ) -> Result<Option<PendingMessage>, CacheError>;

    /// The advisory lock guarding one source's sub-records.
    fn source_lock(&self, source: Source) -> Arc<dyn ComponentLock>;
}
