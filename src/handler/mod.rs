//! Ingress shell.
//!
//! First stop for every inbound `(component, topic, payload)` triple.
//! Resolves the component's api version, parks messages that arrive
//! before the identity does, and hands everything else to the
//! version-specific dispatcher.

use crate::cache::RegistrationCache;
use crate::core::config::IngestConfig;
use crate::core::time::{Clock, SystemClock};
use crate::dispatch::events::{EventBus, MessageEvent};
use crate::dispatch::topic::SYSTEM_INFO_TOPIC;
use crate::dispatch::V2Dispatcher;
use crate::packet::types::ApiVersion;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Just enough of an identity payload to learn the api version.
#[derive(Debug, Deserialize)]
struct VersionProbe {
    api_ver: u32,
}

/// Top-level inbound entry point.
pub struct IngressHandler<C: Clock = SystemClock> {
    cache: Arc<dyn RegistrationCache>,
    dispatcher: V2Dispatcher<C>,
    config: IngestConfig,
    clock: C,
}

impl IngressHandler<SystemClock> {
    pub fn new(cache: Arc<dyn RegistrationCache>, config: IngestConfig) -> Self {
        Self::with_clock(cache, config, SystemClock)
    }
}

impl<C: Clock> IngressHandler<C> {
    pub fn with_clock(cache: Arc<dyn RegistrationCache>, config: IngestConfig, clock: C) -> Self {
        let dispatcher = V2Dispatcher::with_clock(Arc::clone(&cache), config.clone(), clock.clone());
        Self {
            cache,
            dispatcher,
            config,
            clock,
        }
    }

    /// The event surface consumers subscribe on.
    pub fn events(&self) -> &EventBus {
        self.dispatcher.events()
    }

    /// The dispatcher behind this shell, for the set-publication path.
    pub fn dispatcher(&self) -> &V2Dispatcher<C> {
        &self.dispatcher
    }

    /// Handle one inbound message. Never fails; delivery problems are
    /// logged and the message is dropped or parked.
    pub async fn handle_message(&self, component: &str, topic: &str, payload: &[u8]) {
        let version = match self.cache.api_version(component).await {
            Ok(version) => version,
            Err(err) => {
                warn!(component, topic, error = %err, "api version read failed; dropping message");
                return;
            }
        };

        match version.map(|raw| (raw, ApiVersion::from_raw(raw))) {
            Some((_, Some(ApiVersion::V2))) => {
                self.dispatcher.dispatch(component, topic, payload).await;
            }
            Some((raw, None)) => {
                warn!(component, topic, version = raw, "unsupported api version; dropping message");
            }
            None => self.handle_before_identity(component, topic, payload).await,
        }
    }

    /// No version on record yet: learn it from an identity message, park
    /// anything else.
    async fn handle_before_identity(&self, component: &str, topic: &str, payload: &[u8]) {
        if topic != SYSTEM_INFO_TOPIC {
            self.events().emit_received(&MessageEvent {
                component: component.to_string(),
                topic: topic.to_string(),
            });
            debug!(component, topic, "parking message until identity arrives");
            if let Err(err) = self
                .cache
                .cache_pending_message(component, topic, payload)
                .await
            {
                warn!(component, topic, error = %err, "could not park message; dropping");
            }
            return;
        }

        // The will message carries no version and needs none to wipe.
        if payload.is_empty() {
            self.dispatcher.dispatch(component, topic, payload).await;
            return;
        }

        let raw = match serde_json::from_slice::<VersionProbe>(payload) {
            Ok(probe) => probe.api_ver,
            Err(err) => {
                warn!(component, error = %err, "identity carries no readable api version; dropping");
                return;
            }
        };

        if let Err(err) = self.cache.cache_api_version(component, raw).await {
            warn!(component, error = %err, "api version store failed; dropping message");
            return;
        }

        match ApiVersion::from_raw(raw) {
            Some(ApiVersion::V2) => {
                self.dispatcher.dispatch(component, topic, payload).await;
                self.drain_pending(component).await;
            }
            None => {
                // Stored so later traffic short-circuits on the known-bad
                // version instead of buffering forever.
                warn!(component, version = raw, "component announced an unsupported api version");
            }
        }
    }

    /// Replay parked messages in arrival order, bounded by the configured
    /// wall-clock budget; whatever the budget cuts off is dropped.
    async fn drain_pending(&self, component: &str) {
        let deadline = self.clock.now() + self.config.pending_drain_budget();
        loop {
            if self.clock.now() >= deadline {
                let mut dropped: u64 = 0;
                while let Ok(Some(_)) = self.cache.next_pending_message(component).await {
                    dropped += 1;
                }
                if dropped > 0 {
                    warn!(component, dropped, "pending drain budget exhausted; dropping remainder");
                }
                return;
            }
            match self.cache.next_pending_message(component).await {
                Ok(Some(message)) => {
                    self.dispatcher
                        .dispatch(component, &message.topic, &message.payload)
                        .await;
                }
                Ok(None) => return,
                Err(err) => {
                    warn!(component, error = %err, "pending drain read failed");
                    return;
                }
            }
        }
    }
}
