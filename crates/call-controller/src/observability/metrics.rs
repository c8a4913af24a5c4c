//! Metrics definitions for the call controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `cc_` prefix for the call controller
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `type`: the five control message types plus `unknown`
//! - `outcome`: dial outcomes (`dialed`, `already_connected`, `credentials_failed`)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // ICE credential fetch - external HTTP call with a 10s default timeout
        .set_buckets_for_metric(
            Matcher::Full("cc_ice_fetch_duration_seconds".to_string()),
            &[
                0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set ICE fetch buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Control Channel Metrics (Counters)
// ============================================================================

/// Record a control message handed to the pub/sub transport.
///
/// Metric: `cc_control_messages_published_total`
/// Labels: `type`
pub fn record_control_published(message_type: &'static str) {
    counter!("cc_control_messages_published_total", "type" => message_type).increment(1);
}

/// Record a control message received on the local control channel.
///
/// Metric: `cc_control_messages_received_total`
/// Labels: `type` (`unknown` for unrecognised or undecodable messages)
pub fn record_control_received(message_type: &'static str) {
    counter!("cc_control_messages_received_total", "type" => message_type).increment(1);
}

/// Record a publish the transport refused.
///
/// Metric: `cc_publish_failures_total`
/// Labels: none
///
/// Failures are not retried, so a non-zero rate means missed announcements.
pub fn record_publish_failure() {
    counter!("cc_publish_failures_total").increment(1);
}

/// Record a channel event dropped because the subscriber's queue was full.
///
/// Metric: `cc_channel_events_dropped_total`
/// Labels: none
pub fn record_channel_event_dropped() {
    counter!("cc_channel_events_dropped_total").increment(1);
}

// ============================================================================
// Call Metrics
// ============================================================================

/// Set the number of participants in the roster.
///
/// Metric: `cc_roster_size`
/// Labels: none
pub fn set_roster_size(size: usize) {
    // usize to f64 conversion is safe for call-sized rosters
    #[allow(clippy::cast_precision_loss)]
    gauge!("cc_roster_size").set(size as f64);
}

/// Record the outcome of a dial.
///
/// Metric: `cc_dial_total`
/// Labels: `outcome`
pub fn record_dial(outcome: &'static str) {
    counter!("cc_dial_total", "outcome" => outcome).increment(1);
}

/// Record how long an ICE credential fetch took.
///
/// Metric: `cc_ice_fetch_duration_seconds`
/// Labels: `status` (success, error)
pub fn record_ice_fetch(status: &'static str, duration: Duration) {
    histogram!("cc_ice_fetch_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
}

/// Set the controller mailbox depth.
///
/// Metric: `cc_actor_mailbox_depth`
/// Labels: none
pub fn set_mailbox_depth(depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("cc_actor_mailbox_depth").set(depth as f64);
}
