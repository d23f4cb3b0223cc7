//! Narrow transport interfaces the retriable operations depend on.
//!
//! The agent's communication channel implements [`CloudChannel`]; operations
//! only publish correlated requests, collect responses by correlation id and
//! manage topic subscriptions. Wire encoding stays on the channel side.

use crate::orchestration::TransportError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// Request published to the cloud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRequest {
    /// Message type, e.g. `enr_req`
    pub message_type: String,
    /// Hyphen-less UUID matching the response to this request
    pub correlation_id: String,
    pub payload: Value,
}

pub trait CloudChannel: Send + Debug {
    fn is_connected(&self) -> bool;

    fn publish(&mut self, request: &OutboundRequest) -> Result<(), TransportError>;

    /// Take the response for `correlation_id` if one has arrived
    ///
    /// Responses carrying any other correlation id are never returned for
    /// this request; the channel drops them once nobody is waiting.
    fn take_response(&mut self, correlation_id: &str) -> Option<Result<Value, TransportError>>;

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// `true` once the broker acknowledged the subscription
    fn is_subscribed(&self, topic: &str) -> bool;
}

/// Channel shared by every operation of one agent
pub type SharedChannel = Arc<Mutex<dyn CloudChannel>>;

/// Wrap a channel for sharing between operations
pub fn shared_channel<C: CloudChannel + 'static>(channel: C) -> SharedChannel {
    Arc::new(Mutex::new(channel))
}
