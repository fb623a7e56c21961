//! Observability for the signaling service.
//!
//! # Privacy by Default
//!
//! Router entry points use `#[instrument(skip_all)]` with an explicit field
//! allow-list (`room_id`, `participant_id`, `session_id`). Message payloads,
//! SDP bodies and credentials are never recorded.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `sig_connections_active` | Gauge | none | Open WebSocket connections |
//! | `sig_rooms_active` | Gauge | none | Rooms with present participants |
//! | `sig_sessions_active` | Gauge | none | Live sessions |
//! | `sig_message_latency_seconds` | Histogram | `message_type` | Client message handling time |
//! | `sig_messages_total` | Counter | `message_type`, `outcome` | Handled client messages |
//! | `sig_delivery_failures_total` | Counter | `reason` | Dropped outbound notifications |
//! | `sig_screen_share_rejections_total` | Counter | `reason` | Refused screen shares |
//! | `sig_quality_samples_total` | Counter | `tier` | Connection-quality reports |
//! | `sig_persistence_latency_seconds` | Histogram | `operation` | Session persistence time |
//! | `sig_persistence_errors_total` | Counter | `operation` | Failed persistence writes |
//! | `sig_errors_total` | Counter | `error_type` | Errors returned to clients |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
