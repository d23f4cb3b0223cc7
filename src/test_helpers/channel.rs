use crate::operations::{CloudChannel, OutboundRequest, SharedChannel};
use crate::orchestration::TransportError;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

#[derive(Debug, Default)]
struct ChannelState {
    connected: bool,
    published: Vec<OutboundRequest>,
    responses: HashMap<String, Result<Value, TransportError>>,
    publish_failures: VecDeque<TransportError>,
    subscribe_failures: VecDeque<TransportError>,
    subscribe_requests: Vec<String>,
    subscribed: HashSet<String>,
    auto_ack: bool,
}

/// In-process channel: records requests, serves scripted responses
///
/// Clones share state; [`FakeChannel::shared`] hands a clone to operations.
#[derive(Debug, Clone, Default)]
pub struct FakeChannel {
    state: Arc<Mutex<ChannelState>>,
}

impl FakeChannel {
    pub fn connected() -> Self {
        let channel = Self::default();
        {
            let mut state = channel.state.lock();
            state.connected = true;
            state.auto_ack = true;
        }
        channel
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> SharedChannel {
        Arc::new(Mutex::new(self.clone()))
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// Leave subscriptions unacknowledged until [`FakeChannel::ack`]
    pub fn set_auto_ack(&self, auto_ack: bool) {
        self.state.lock().auto_ack = auto_ack;
    }

    pub fn ack(&self, topic: &str) {
        self.state.lock().subscribed.insert(topic.to_string());
    }

    pub fn published(&self) -> Vec<OutboundRequest> {
        self.state.lock().published.clone()
    }

    pub fn subscribe_requests(&self) -> Vec<String> {
        self.state.lock().subscribe_requests.clone()
    }

    pub fn respond(&self, correlation_id: &str, response: Result<Value, TransportError>) {
        self.state
            .lock()
            .responses
            .insert(correlation_id.to_string(), response);
    }

    pub fn fail_next_publish(&self, error: TransportError) {
        self.state.lock().publish_failures.push_back(error);
    }

    pub fn fail_next_subscribe(&self, error: TransportError) {
        self.state.lock().subscribe_failures.push_back(error);
    }
}

impl CloudChannel for FakeChannel {
    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn publish(&mut self, request: &OutboundRequest) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if let Some(error) = state.publish_failures.pop_front() {
            return Err(error);
        }
        state.published.push(request.clone());
        Ok(())
    }

    fn take_response(&mut self, correlation_id: &str) -> Option<Result<Value, TransportError>> {
        self.state.lock().responses.remove(correlation_id)
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if let Some(error) = state.subscribe_failures.pop_front() {
            return Err(error);
        }
        state.subscribe_requests.push(topic.to_string());
        if state.auto_ack {
            state.subscribed.insert(topic.to_string());
        }
        Ok(())
    }

    fn is_subscribed(&self, topic: &str) -> bool {
        self.state.lock().subscribed.contains(topic)
    }
}
