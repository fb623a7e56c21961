//! Metrics definitions for the signaling service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `sig_` prefix for the signaling service
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `message_type`: bounded by the client message kinds (13 values)
//! - `outcome`: success, error
//! - `reason`: bounded by `DeliveryError` and rejection kinds
//! - `tier`: 5 quality tiers
//! - `operation`: save, mark_ended
//! - `error_type`: bounded by `SignalingError` variants
//!
//! Room and participant identifiers are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle used
/// to serve `/metrics`.
///
/// Must be called before any metrics are recorded. Histogram buckets:
/// - message handling p99 < 50ms
/// - persistence p99 < 10ms
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("sig_message".to_string()),
            &[
                0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500,
            ],
        )
        .map_err(|e| format!("Failed to set message latency buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("sig_persistence".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set persistence latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Gauges
// ============================================================================

/// Metric: `sig_connections_active`
pub fn set_connections_active(count: usize) {
    // usize to f64 conversion is safe for realistic connection counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("sig_connections_active").set(count as f64);
}

/// Metric: `sig_rooms_active`
///
/// Rooms with at least one present participant.
pub fn set_rooms_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("sig_rooms_active").set(count as f64);
}

/// Metric: `sig_sessions_active`
pub fn set_sessions_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("sig_sessions_active").set(count as f64);
}

// ============================================================================
// Message Handling
// ============================================================================

/// Record one handled client message.
///
/// Metrics: `sig_message_latency_seconds{message_type}`,
/// `sig_messages_total{message_type,outcome}`
pub fn record_message(message_type: &'static str, outcome: &'static str, duration: Duration) {
    histogram!("sig_message_latency_seconds", "message_type" => message_type)
        .record(duration.as_secs_f64());
    counter!("sig_messages_total", "message_type" => message_type, "outcome" => outcome)
        .increment(1);
}

/// Metric: `sig_delivery_failures_total{reason}`
///
/// Reasons: `not_connected`, `queue_full`, `closed`, `encode`.
pub fn record_delivery_failure(reason: &'static str) {
    counter!("sig_delivery_failures_total", "reason" => reason).increment(1);
}

/// Metric: `sig_screen_share_rejections_total{reason}`
///
/// Reasons: `capacity`, `permission`.
pub fn record_screen_share_rejection(reason: &'static str) {
    counter!("sig_screen_share_rejections_total", "reason" => reason).increment(1);
}

/// Metric: `sig_quality_samples_total{tier}`
pub fn record_quality_sample(tier: &'static str) {
    counter!("sig_quality_samples_total", "tier" => tier).increment(1);
}

// ============================================================================
// Persistence
// ============================================================================

/// Record a persistence call.
///
/// Metrics: `sig_persistence_latency_seconds{operation}`, and on failure
/// `sig_persistence_errors_total{operation}`.
pub fn record_persistence(operation: &'static str, duration: Duration, ok: bool) {
    histogram!("sig_persistence_latency_seconds", "operation" => operation)
        .record(duration.as_secs_f64());
    if !ok {
        counter!("sig_persistence_errors_total", "operation" => operation).increment(1);
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Metric: `sig_errors_total{error_type}`
pub fn record_error(error_type: &'static str) {
    counter!("sig_errors_total", "error_type" => error_type).increment(1);
}
