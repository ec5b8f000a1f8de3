// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Function complexity: dispatch handlers are inherently long
#![allow(clippy::too_many_lines)]
// Documentation style: many terms don't need backticks
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
// API ergonomics: prefer simplicity over must_use annotations
#![allow(clippy::must_use_candidate)]
// Numeric casts: intentional in protocol code
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_lossless)]

//! Fleetlink - MQTT-facing ingestion core for component fleets.
//!
//! Each networked hardware component publishes identity, application,
//! property-registration and value messages on its own topic tree. This
//! crate parses them, drives a per-component, per-source registration
//! state machine, caches the results, and turns value publications into
//! typed events for downstream consumers. The transport itself is out of
//! scope: inbound delivery and outbound publication are injected ports.
//!
//! # Module Organization
//!
//! ## Core
//! - `core::config` - Ingestion tunables
//! - `core::time` - Deterministic time utilities
//!
//! ## Payloads
//! - `packet` - JSON payload types and validation
//! - `codec` - Binary property value codec and JSON round-trip
//!
//! ## State
//! - `cache` - Pluggable registration cache, in-process default
//! - `lock` - Per-(source, component) advisory locks
//!
//! ## Flow
//! - `dispatch` - Topic routing, registration state machine, events
//! - `handler` - Ingress shell with pre-identity buffering

// Core infrastructure
pub mod core;

// Payload parsing
pub mod codec;
pub mod packet;

// Shared state
pub mod cache;
pub mod lock;

// Message flow
pub mod dispatch;
pub mod handler;

// Re-exports for convenience
pub use self::core::config::{ExcessPolicy, IngestConfig};
pub use self::core::time::{Clock, SystemClock};
pub use self::core::{config, time};
pub use cache::{CacheError, MemoryCache, PendingMessage, RegistrationCache};
pub use codec::{CodecError, DecodedValue, Scalar};
pub use dispatch::{DispatchError, EventBus, PublishError, Publisher, V2Dispatcher};
pub use handler::IngressHandler;
pub use lock::{ComponentLock, LockCoordinator, LockError};
pub use packet::types::{ApiVersion, Capability, ComponentCategory, LogLevel, PropertyType, Source};
pub use packet::{ApplicationInfo, LogRecord, PropertyRegistration, SystemInfo};
