use crate::orchestration::TransportError;
use tracing::debug;
use uuid::Uuid;

/// Correlation id and deadline of the request currently awaiting a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightRequest {
    pub correlation_id: String,
    pub sent_at: i64,
}

/// Tracks at most one in-flight request per operation
///
/// Clearing the tracker orphans the outstanding request: its response can no
/// longer be matched and is ignored.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    in_flight: Option<InFlightRequest>,
    request_timeout_secs: i64,
}

impl RequestTracker {
    pub fn new(request_timeout_secs: i64) -> Self {
        Self {
            in_flight: None,
            request_timeout_secs,
        }
    }

    /// Generate a fresh correlation id (UUID without hyphens)
    pub fn new_correlation_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    pub fn start(&mut self, correlation_id: String, now: i64) {
        debug!(correlation_id = %correlation_id, "📨 REQUEST: Awaiting response");
        self.in_flight = Some(InFlightRequest {
            correlation_id,
            sent_at: now,
        });
    }

    pub fn in_flight(&self) -> Option<&InFlightRequest> {
        self.in_flight.as_ref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.in_flight.as_ref().map(|r| r.correlation_id.as_str())
    }

    /// Timeout error once the in-flight request has waited too long
    pub fn check_timeout(&self, now: i64) -> Option<TransportError> {
        let request = self.in_flight.as_ref()?;
        if self.request_timeout_secs > 0
            && now >= request.sent_at.saturating_add(self.request_timeout_secs)
        {
            Some(TransportError::ResponseTimeout {
                timeout_secs: self.request_timeout_secs,
            })
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.in_flight = None;
    }
}
