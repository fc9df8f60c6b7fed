//! Client metrics.
//!
//! Thin wrappers over the `metrics` facade so metric names and labels stay consistent
//! across the transport, gateway and dispatcher. Nothing is recorded unless the
//! application installs a recorder.

use std::time::Duration;

use ::metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// REST requests sent, by route and status.
pub const HTTP_REQUESTS_TOTAL: &str = "dgw_http_requests_total";
/// Time spent waiting on quota buckets before a request.
pub const RATE_LIMIT_WAIT_SECONDS: &str = "dgw_rate_limit_wait_seconds";
/// 429 responses, by scope.
pub const RATE_LIMITED_TOTAL: &str = "dgw_rate_limited_total";
/// Gateway connection attempts, by kind (identify, resume).
pub const GATEWAY_CONNECTS_TOTAL: &str = "dgw_gateway_connects_total";
/// Gateway reconnects, by whether the session was kept.
pub const GATEWAY_RECONNECTS_TOTAL: &str = "dgw_gateway_reconnects_total";
/// Heartbeat round trip.
pub const HEARTBEAT_LATENCY_SECONDS: &str = "dgw_heartbeat_latency_seconds";
/// Dispatch events routed, by type.
pub const EVENTS_DISPATCHED_TOTAL: &str = "dgw_events_dispatched_total";
/// Handler failures, by kind.
pub const HANDLER_ERRORS_TOTAL: &str = "dgw_handler_errors_total";
/// Jobs rejected because the worker queue was full.
pub const WORKER_REJECTED_TOTAL: &str = "dgw_worker_rejected_total";
/// Jobs waiting in the worker queue.
pub const WORKER_QUEUE_DEPTH: &str = "dgw_worker_queue_depth";

/// Register descriptions for every client metric.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "REST requests sent");
    describe_histogram!(
        RATE_LIMIT_WAIT_SECONDS,
        "Time spent waiting for rate limit capacity"
    );
    describe_counter!(RATE_LIMITED_TOTAL, "429 responses received");
    describe_counter!(GATEWAY_CONNECTS_TOTAL, "Gateway connection attempts");
    describe_counter!(GATEWAY_RECONNECTS_TOTAL, "Gateway reconnects");
    describe_histogram!(HEARTBEAT_LATENCY_SECONDS, "Heartbeat acknowledgement latency");
    describe_counter!(EVENTS_DISPATCHED_TOTAL, "Dispatch events routed to handlers");
    describe_counter!(HANDLER_ERRORS_TOTAL, "Handler failures");
    describe_counter!(WORKER_REJECTED_TOTAL, "Jobs rejected by a full worker queue");
    describe_gauge!(WORKER_QUEUE_DEPTH, "Jobs waiting for a worker");
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Count one REST request.
pub fn record_http_request(route: &str, status: u16) {
    counter!(HTTP_REQUESTS_TOTAL, "route" => route.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record time spent waiting for quota.
pub fn record_rate_limit_wait(route: &str, waited: Duration) {
    if waited.is_zero() {
        return;
    }
    histogram!(RATE_LIMIT_WAIT_SECONDS, "route" => route.to_string()).record(waited.as_secs_f64());
}

/// Count one 429 response.
pub fn record_rate_limited(route: &str, global: bool) {
    let scope = if global { "global" } else { "route" };
    counter!(RATE_LIMITED_TOTAL, "route" => route.to_string(), "scope" => scope).increment(1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────────────────────────

/// Count a connection attempt.
pub fn record_gateway_connect(kind: &'static str) {
    counter!(GATEWAY_CONNECTS_TOTAL, "kind" => kind).increment(1);
}

/// Count a reconnect.
pub fn record_gateway_reconnect(resumable: bool) {
    let session = if resumable { "kept" } else { "cleared" };
    counter!(GATEWAY_RECONNECTS_TOTAL, "session" => session).increment(1);
}

/// Record heartbeat round trip.
pub fn record_heartbeat_latency(latency: Duration) {
    histogram!(HEARTBEAT_LATENCY_SECONDS).record(latency.as_secs_f64());
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

/// Count one routed event.
pub fn record_event_dispatched(type_tag: &str) {
    counter!(EVENTS_DISPATCHED_TOTAL, "event" => type_tag.to_string()).increment(1);
}

/// Count one handler failure.
pub fn record_handler_error(kind: &'static str) {
    counter!(HANDLER_ERRORS_TOTAL, "kind" => kind).increment(1);
}

/// Count one job rejected by a full queue.
pub fn record_worker_rejected() {
    counter!(WORKER_REJECTED_TOTAL).increment(1);
}

/// Publish the current queue depth.
#[allow(clippy::cast_precision_loss)]
pub fn set_worker_queue_depth(depth: usize) {
    gauge!(WORKER_QUEUE_DEPTH).set(depth as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers_without_recorder() {
        // No recorder installed: every call is a no-op.
        describe_metrics();
        record_http_request("GET /gateway/bot", 200);
        record_rate_limit_wait("GET /gateway/bot", Duration::from_millis(5));
        record_rate_limited("GET /gateway/bot", true);
        record_gateway_connect("identify");
        record_gateway_reconnect(true);
        record_heartbeat_latency(Duration::from_millis(40));
        record_event_dispatched("MESSAGE_CREATE");
        record_handler_error("handler");
        record_worker_rejected();
        set_worker_queue_depth(3);
    }

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            HTTP_REQUESTS_TOTAL,
            RATE_LIMIT_WAIT_SECONDS,
            RATE_LIMITED_TOTAL,
            GATEWAY_CONNECTS_TOTAL,
            GATEWAY_RECONNECTS_TOTAL,
            HEARTBEAT_LATENCY_SECONDS,
            EVENTS_DISPATCHED_TOTAL,
            HANDLER_ERRORS_TOTAL,
            WORKER_REJECTED_TOTAL,
            WORKER_QUEUE_DEPTH,
        ] {
            assert!(name.starts_with("dgw_"), "{name}");
        }
    }
}
