//! V2 message dispatch.
//!
//! - `topic` - Topic grammar and publish-topic builders
//! - `events` - Typed event surface
//! - `v2` - Registration state machine and value paths

pub mod events;
pub mod topic;
pub mod v2;

pub use events::{
    EventBus, LogReceivedEvent, MessageEvent, OnlineEvent, PropertyUpdateEvent, RegisteredEvent,
};
pub use topic::{parse_topic, TopicAction, SUBSCRIPTION_TEMPLATES, SYSTEM_INFO_TOPIC};
pub use v2::V2Dispatcher;

use crate::cache::CacheError;
use crate::codec::CodecError;
use crate::lock::LockError;
use crate::packet::types::Source;
use crate::packet::PacketError;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Outbound publication failed; carries the transport's own message.
#[derive(Debug, Clone, Error)]
#[error("publish failed: {0}")]
pub struct PublishError(pub String);

/// Outbound publish capability, supplied by the transport owner. The
/// core publishes only on the property-set path.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError>;
}

/// Why a dispatched message or a set-publication was abandoned.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no registration for {source}/{path} on component {component:?}")]
    PropertyUnknown {
        component: String,
        source: Source,
        path: String,
    },
    #[error("property {path:?} is not settable")]
    NotSettable { path: String },
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}
