//! V2 dispatcher.
//!
//! Routes component-relative topics, drives the per-source registration
//! state machine to completion, and turns value publications into typed
//! events. Every mutation of a source's sub-record happens inside that
//! source's lock; the effect order for one (component, source) is the
//! order those operations won the lock.

use super::events::{
    EventBus, LogReceivedEvent, MessageEvent, OnlineEvent, PropertyUpdateEvent, RegisteredEvent,
};
use super::topic::{parse_topic, property_set_topic, TopicAction};
use super::{DispatchError, Publisher};
use crate::cache::{CacheError, RegistrationCache};
use crate::codec::{format_json, pack, unpack, unpack_json};
use crate::core::config::IngestConfig;
use crate::core::time::{Clock, SystemClock};
use crate::lock::with_locks;
use crate::packet::types::{ApiVersion, Source};
use crate::packet::{
    parse_application_info, parse_log_record, parse_property_registration, parse_system_info,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct Inner<C: Clock> {
    cache: Arc<dyn RegistrationCache>,
    events: EventBus,
    config: IngestConfig,
    clock: C,
    /// At most one armed completion check per (component, source).
    timers: Mutex<HashMap<(String, Source), JoinHandle<()>>>,
}

/// Per-source registration driver and value-path endpoint.
///
/// Cloning is cheap and shares the cache, event surface and timers;
/// timer tasks hold one of these clones.
pub struct V2Dispatcher<C: Clock = SystemClock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> Clone for V2Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl V2Dispatcher<SystemClock> {
    pub fn new(cache: Arc<dyn RegistrationCache>, config: IngestConfig) -> Self {
        Self::with_clock(cache, config, SystemClock)
    }
}

impl<C: Clock> V2Dispatcher<C> {
    pub fn with_clock(cache: Arc<dyn RegistrationCache>, config: IngestConfig, clock: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                events: EventBus::new(),
                config,
                clock,
                timers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The event surface consumers subscribe on.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Route one component-relative message.
    ///
    /// Failures are logged and the message abandoned; nothing here takes
    /// the listener down.
    pub async fn dispatch(&self, component: &str, topic: &str, payload: &[u8]) {
        self.inner.events.emit_received(&MessageEvent {
            component: component.to_string(),
            topic: topic.to_string(),
        });

        let result = match parse_topic(topic) {
            TopicAction::SystemInfo => self.handle_system_info(component, payload).await,
            TopicAction::AppInfo => self.handle_app_info(component, payload).await,
            TopicAction::RegisterProperty(source) => {
                self.handle_property_registration(component, source, payload)
                    .await
            }
            TopicAction::Log(source) => self.handle_log(component, source, payload).await,
            TopicAction::PropertyPublish { source, path } => {
                self.handle_property_publish(component, source, &path, payload)
                    .await
            }
            TopicAction::Unhandled => {
                debug!(component, topic, "unhandled topic");
                self.inner.events.emit_unhandled(&MessageEvent {
                    component: component.to_string(),
                    topic: topic.to_string(),
                });
                Ok(())
            }
        };

        if let Err(err) = result {
            warn!(component, topic, error = %err, "message abandoned");
        }
    }

    /// Identity announcement, or the will message when the payload is
    /// empty.
    async fn handle_system_info(
        &self,
        component: &str,
        payload: &[u8],
    ) -> Result<(), DispatchError> {
        if payload.is_empty() {
            self.inner.events.emit_online(&OnlineEvent {
                component: component.to_string(),
                online: false,
            });
            self.cancel_timers(component);
            let locks = [
                self.inner.cache.source_lock(Source::System),
                self.inner.cache.source_lock(Source::App),
            ];
            return with_locks(&locks, component, async {
                self.inner.cache.clear_all(component).await?;
                Ok(())
            })
            .await;
        }

        self.inner.events.emit_online(&OnlineEvent {
            component: component.to_string(),
            online: true,
        });

        let info = match parse_system_info(payload) {
            Ok(info) => info,
            Err(err) => {
                // A component announcing a garbage identity gets a clean slate.
                self.cancel_timers(component);
                let locks = [
                    self.inner.cache.source_lock(Source::System),
                    self.inner.cache.source_lock(Source::App),
                ];
                let cleared: Result<(), DispatchError> =
                    with_locks(&locks, component, async {
                        self.inner.cache.clear_all(component).await?;
                        Ok(())
                    })
                    .await;
                if let Err(clear_err) = cleared {
                    warn!(component, error = %clear_err, "state clear after bad identity failed");
                }
                return Err(err.into());
            }
        };

        let locks = [self.inner.cache.source_lock(Source::System)];
        let stored = with_locks(&locks, component, async {
            self.inner
                .cache
                .cache_api_version(component, info.api_ver)
                .await?;
            let num_props = info.num_props;
            self.inner.cache.cache_system_info(component, info).await?;
            if num_props == 0 {
                self.complete_registration(component, Source::System).await?;
            } else {
                self.schedule_registration_check(component, Source::System);
            }
            Ok(())
        })
        .await;
        self.recover_cache_failure(component, stored).await
    }

    /// Application announcement; a re-announcement tears the old
    /// registration down first.
    async fn handle_app_info(&self, component: &str, payload: &[u8]) -> Result<(), DispatchError> {
        let locks = [self.inner.cache.source_lock(Source::App)];
        with_locks(&locks, component, async {
            if self.inner.cache.is_registered(component, Source::App).await? {
                self.inner
                    .cache
                    .clear_cached_values(component, Source::App)
                    .await?;
                self.inner.events.emit_registered(&RegisteredEvent {
                    component: component.to_string(),
                    source: Source::App,
                    registered: false,
                });
            }
            let info = parse_application_info(payload)?;
            let num_props = info.num_props;
            self.inner.cache.cache_app_info(component, info).await?;
            if num_props == 0 {
                self.complete_registration(component, Source::App).await?;
            } else {
                self.schedule_registration_check(component, Source::App);
            }
            Ok(())
        })
        .await
    }

    /// One property registration record.
    async fn handle_property_registration(
        &self,
        component: &str,
        source: Source,
        payload: &[u8],
    ) -> Result<(), DispatchError> {
        let locks = [self.inner.cache.source_lock(source)];
        with_locks(&locks, component, async {
            let registration = parse_property_registration(payload)?;
            let existing = self.inner.cache.all_properties(component, source).await?;

            // A conflict leaves the cache exactly as it was, including a
            // completed registration.
            let mut duplicate = false;
            for current in &existing {
                let same_path = current.path == registration.path;
                let same_index = current.index == registration.index;
                if same_path != same_index {
                    // One dimension collides and the other does not: the
                    // record contradicts the declared set. Skip it.
                    debug!(
                        component,
                        %source,
                        path = %registration.path,
                        index = registration.index,
                        "conflicting property registration skipped"
                    );
                    return Ok(());
                }
                duplicate |= same_path && same_index;
            }

            if self.inner.cache.is_registered(component, source).await? {
                self.inner
                    .cache
                    .clear_cached_values(component, source)
                    .await?;
                self.inner.events.emit_registered(&RegisteredEvent {
                    component: component.to_string(),
                    source,
                    registered: false,
                });
                duplicate = false;
            }

            let path = registration.path.clone();
            self.inner
                .cache
                .cache_property(component, source, &path, registration)
                .await?;

            let declared = self.declared_props(component, source).await?;
            let count = self.inner.cache.all_properties(component, source).await?.len() as u32;
            if !duplicate && declared == Some(count) {
                self.complete_registration(component, source).await?;
            } else {
                self.schedule_registration_check(component, source);
            }
            Ok(())
        })
        .await
    }

    async fn handle_log(
        &self,
        component: &str,
        source: Source,
        payload: &[u8],
    ) -> Result<(), DispatchError> {
        let log = parse_log_record(payload)?;
        self.inner.events.emit_log_received(&LogReceivedEvent {
            component: component.to_string(),
            source,
            log,
        });
        Ok(())
    }

    /// A full-value publication.
    async fn handle_property_publish(
        &self,
        component: &str,
        source: Source,
        path: &str,
        payload: &[u8],
    ) -> Result<(), DispatchError> {
        let registration = self
            .inner
            .cache
            .property(component, source, path)
            .await?
            .ok_or_else(|| DispatchError::PropertyUnknown {
                component: component.to_string(),
                source,
                path: path.to_string(),
            })?;

        let value = unpack(payload, &registration)?;
        let formatted = format_json(&value, &registration)?;
        self.inner.events.emit_property_update(&PropertyUpdateEvent {
            component: component.to_string(),
            source,
            path: path.to_string(),
            format: registration.format.clone(),
            value,
            formatted,
            raw: payload.to_vec(),
        });
        Ok(())
    }

    /// Encode and publish a value onto a component's settable property.
    pub async fn set_property(
        &self,
        component: &str,
        source: Source,
        path: &str,
        value: &serde_json::Value,
        publisher: &dyn Publisher,
    ) -> Result<(), DispatchError> {
        let version = self.inner.cache.api_version(component).await?;
        let registration = self.inner.cache.property(component, source, path).await?;
        let registration = match (version.and_then(ApiVersion::from_raw), registration) {
            (Some(ApiVersion::V2), Some(registration)) => registration,
            _ => {
                return Err(DispatchError::PropertyUnknown {
                    component: component.to_string(),
                    source,
                    path: path.to_string(),
                })
            }
        };
        if !registration.settable {
            return Err(DispatchError::NotSettable {
                path: path.to_string(),
            });
        }

        let decoded = unpack_json(value, &registration, self.inner.config.excess_values)?;
        let payload = pack(&registration, &decoded)?;
        let topic = property_set_topic(component, source, path);
        publisher.publish(&topic, payload).await?;
        Ok(())
    }

    /// Flip a source to registered and announce it.
    async fn complete_registration(
        &self,
        component: &str,
        source: Source,
    ) -> Result<(), DispatchError> {
        self.cancel_timer(component, source);
        self.inner
            .cache
            .set_registered(component, source, true)
            .await?;
        self.inner.events.emit_registered(&RegisteredEvent {
            component: component.to_string(),
            source,
            registered: true,
        });
        Ok(())
    }

    /// Declared property count for a source, from its cached info record.
    async fn declared_props(
        &self,
        component: &str,
        source: Source,
    ) -> Result<Option<u32>, CacheError> {
        Ok(match source {
            Source::System => self
                .inner
                .cache
                .system_info(component)
                .await?
                .map(|info| info.num_props),
            Source::App => self
                .inner
                .cache
                .app_info(component)
                .await?
                .map(|info| info.num_props),
        })
    }

    /// Arm the completion check for a source, replacing any prior timer.
    ///
    /// The armed task is abortable only while it sleeps; once the delay
    /// elapses the check runs to completion on its own task so a
    /// cancellation can never strand a held lock.
    fn schedule_registration_check(&self, component: &str, source: Source) {
        let key = (component.to_string(), source);
        let this = self.clone();
        let sleep = self.inner.clock.sleep(self.inner.config.registration_check_delay());
        let component = component.to_string();
        let handle = tokio::spawn(async move {
            sleep.await;
            tokio::spawn(async move {
                this.run_registration_check(&component, source).await;
            });
        });
        let mut timers = self.inner.timers.lock();
        if let Some(previous) = timers.insert(key, handle) {
            previous.abort();
        }
    }

    /// The delayed completion check.
    async fn run_registration_check(&self, component: &str, source: Source) {
        let locks = [self.inner.cache.source_lock(source)];
        let result: Result<(), DispatchError> = with_locks(&locks, component, async {
            if self.inner.cache.is_registered(component, source).await? {
                return Ok(());
            }
            let declared = self.declared_props(component, source).await?;
            let count = self.inner.cache.all_properties(component, source).await?.len() as u32;
            if declared == Some(count) {
                self.inner
                    .cache
                    .set_registered(component, source, true)
                    .await?;
            }
            self.inner.events.emit_registered(&RegisteredEvent {
                component: component.to_string(),
                source,
                registered: declared == Some(count),
            });
            Ok(())
        })
        .await;
        if let Err(err) = result {
            warn!(component, %source, error = %err, "registration check failed");
        }
    }

    fn cancel_timer(&self, component: &str, source: Source) {
        if let Some(handle) = self
            .inner
            .timers
            .lock()
            .remove(&(component.to_string(), source))
        {
            handle.abort();
        }
    }

    fn cancel_timers(&self, component: &str) {
        for source in Source::ALL {
            self.cancel_timer(component, source);
        }
    }

    /// Cache failures on the identity path get a best-effort clear-all so
    /// half-written state cannot linger.
    async fn recover_cache_failure(
        &self,
        component: &str,
        result: Result<(), DispatchError>,
    ) -> Result<(), DispatchError> {
        if matches!(result, Err(DispatchError::Cache(_))) {
            if let Err(clear_err) = self.inner.cache.clear_all(component).await {
                warn!(component, error = %clear_err, "state clear after cache failure failed");
            }
        }
        result
    }
}
