//! Security-event and request-metric sinks. Default implementations emit
//! structured `tracing` events rather than a dedicated metrics crate,
//! since an external metrics backend is out of scope.

use tracing::{info, warn};

/// A named security-relevant occurrence worth a durable trail independent
/// of the request's own span: rate-limit denials, auth failures, forbidden
/// access, WS admission denials.
#[derive(Clone, Debug)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub client_identity: String,
    pub service_id: Option<String>,
    pub detail: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SecurityEventKind {
    RateLimitExceeded,
    AuthenticationFailed,
    AuthorizationDenied,
    WsAdmissionDenied,
}

impl SecurityEventKind {
    fn as_str(self) -> &'static str {
        match self {
            SecurityEventKind::RateLimitExceeded => "rate_limit_exceeded",
            SecurityEventKind::AuthenticationFailed => "authentication_failed",
            SecurityEventKind::AuthorizationDenied => "authorization_denied",
            SecurityEventKind::WsAdmissionDenied => "ws_admission_denied",
        }
    }
}

pub trait SecurityEventSink: Send + Sync {
    fn record(&self, event: SecurityEvent);
}

pub struct TracingSecurityEventSink;

impl SecurityEventSink for TracingSecurityEventSink {
    fn record(&self, event: SecurityEvent) {
        warn!(
            target: "security_event",
            kind = event.kind.as_str(),
            client_identity = %event.client_identity,
            service_id = ?event.service_id,
            detail = %event.detail,
            "security event"
        );
    }
}

/// A single gateway request's outcome, emitted as one structured event
/// rather than a counter/histogram pair. The sampling rate governs whether
/// the enclosing span exists, not whether this event fires.
#[derive(Clone, Debug)]
pub struct RequestMetric {
    pub service_id: String,
    pub status: u16,
    pub duration_ms: u64,
    pub rate_limited: bool,
}

pub trait MetricsSink: Send + Sync {
    fn record_request(&self, metric: RequestMetric);
}

pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record_request(&self, metric: RequestMetric) {
        info!(
            target: "request_metric",
            service_id = %metric.service_id,
            status = metric.status,
            duration_ms = metric.duration_ms,
            rate_limited = metric.rate_limited,
            "request completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink(Arc<AtomicUsize>);
    impl SecurityEventSink for CountingSink {
        fn record(&self, _event: SecurityEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn sink_is_invoked_once_per_event() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = CountingSink(count.clone());
        sink.record(SecurityEvent {
            kind: SecurityEventKind::RateLimitExceeded,
            client_identity: "1.2.3.4".into(),
            service_id: Some("svc-a".into()),
            detail: "too many requests".into(),
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
