//! Typed event surface.
//!
//! Downstream consumers subscribe per event kind; handlers run
//! synchronously on the dispatcher's execution context and receive
//! immutable snapshots, never live cache references.

use crate::codec::DecodedValue;
use crate::packet::types::Source;
use crate::packet::LogRecord;
use parking_lot::RwLock;

/// A message entered the dispatcher, or was parked by the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub component: String,
    pub topic: String,
}

/// Component presence flipped; `online: false` is the will message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineEvent {
    pub component: String,
    pub online: bool,
}

/// A source's registration completed or was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredEvent {
    pub component: String,
    pub source: Source,
    pub registered: bool,
}

/// A full-value publication decoded successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyUpdateEvent {
    pub component: String,
    pub source: Source,
    pub path: String,
    pub format: String,
    pub value: DecodedValue,
    pub formatted: serde_json::Value,
    pub raw: Vec<u8>,
}

/// A component relayed a log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogReceivedEvent {
    pub component: String,
    pub source: Source,
    pub log: LogRecord,
}

type Handlers<E> = RwLock<Vec<Box<dyn Fn(&E) + Send + Sync>>>;

fn emit<E>(handlers: &Handlers<E>, event: &E) {
    for handler in handlers.read().iter() {
        handler(event);
    }
}

/// Publish/subscribe port for the six dispatcher event kinds.
#[derive(Default)]
pub struct EventBus {
    received: Handlers<MessageEvent>,
    unhandled: Handlers<MessageEvent>,
    online: Handlers<OnlineEvent>,
    registered: Handlers<RegisteredEvent>,
    property_update: Handlers<PropertyUpdateEvent>,
    log_received: Handlers<LogReceivedEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_received(&self, handler: impl Fn(&MessageEvent) + Send + Sync + 'static) {
        self.received.write().push(Box::new(handler));
    }

    pub fn on_unhandled(&self, handler: impl Fn(&MessageEvent) + Send + Sync + 'static) {
        self.unhandled.write().push(Box::new(handler));
    }

    pub fn on_online(&self, handler: impl Fn(&OnlineEvent) + Send + Sync + 'static) {
        self.online.write().push(Box::new(handler));
    }

    pub fn on_registered(&self, handler: impl Fn(&RegisteredEvent) + Send + Sync + 'static) {
        self.registered.write().push(Box::new(handler));
    }

    pub fn on_property_update(
        &self,
        handler: impl Fn(&PropertyUpdateEvent) + Send + Sync + 'static,
    ) {
        self.property_update.write().push(Box::new(handler));
    }

    pub fn on_log_received(&self, handler: impl Fn(&LogReceivedEvent) + Send + Sync + 'static) {
        self.log_received.write().push(Box::new(handler));
    }

    pub(crate) fn emit_received(&self, event: &MessageEvent) {
        emit(&self.received, event);
    }

    pub(crate) fn emit_unhandled(&self, event: &MessageEvent) {
        emit(&self.unhandled, event);
    }

    pub(crate) fn emit_online(&self, event: &OnlineEvent) {
        emit(&self.online, event);
    }

    pub(crate) fn emit_registered(&self, event: &RegisteredEvent) {
        emit(&self.registered, event);
    }

    pub(crate) fn emit_property_update(&self, event: &PropertyUpdateEvent) {
        emit(&self.property_update, event);
    }

    pub(crate) fn emit_log_received(&self, event: &LogReceivedEvent) {
        emit(&self.log_received, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            bus.on_online(move |event| {
                seen.lock().push((tag, event.online));
            });
        }
        bus.emit_online(&OnlineEvent {
            component: "c1".into(),
            online: true,
        });
        assert_eq!(*seen.lock(), vec![("first", true), ("second", true)]);
    }

    #[test]
    fn test_kinds_are_isolated() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&count);
        bus.on_unhandled(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit_received(&MessageEvent {
            component: "c1".into(),
            topic: "t".into(),
        });
        assert_eq!(count.load(Ordering::SeqCst), 0);

        bus.emit_unhandled(&MessageEvent {
            component: "c1".into(),
            topic: "t".into(),
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
