//! Observability for the call controller.
//!
//! Logging uses `tracing` with `cc.<area>` targets. Instrumented functions use
//! `#[instrument(skip_all)]` and allow-list their fields, so message payloads
//! and credentials never reach the logs.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `cc_control_messages_published_total` | Counter | `type` | Outbound control messages |
//! | `cc_control_messages_received_total` | Counter | `type` | Inbound control messages |
//! | `cc_publish_failures_total` | Counter | none | Publishes the transport refused |
//! | `cc_channel_events_dropped_total` | Counter | none | Pub/sub deliveries dropped on a full queue |
//! | `cc_roster_size` | Gauge | none | Current roster size |
//! | `cc_dial_total` | Counter | `outcome` | Dial attempts |
//! | `cc_ice_fetch_duration_seconds` | Histogram | `status` | ICE credential fetch latency |
//! | `cc_actor_mailbox_depth` | Gauge | none | Controller backpressure |

pub mod metrics;

pub use metrics::{
    init_metrics_recorder, record_channel_event_dropped, record_control_published,
    record_control_received, record_dial, record_ice_fetch, record_publish_failure,
    set_mailbox_depth, set_roster_size,
};
