//! Signaling Service Library
//!
//! WebRTC signaling and live session state for meeting rooms:
//!
//! - Room presence (who is connected where)
//! - Relay of offer / answer / ICE candidate messages between peers
//! - Live per-room session state: media toggles, screen shares, pinning,
//!   connection-quality samples
//! - Screen-share arbitration under a per-session concurrency cap
//! - Session lifecycle (lazy start on first activity, explicit end by a
//!   host or co-host)
//!
//! # Architecture
//!
//! ```text
//! WebSocket / REST (http)
//!   └── SignalRouter (router)
//!       ├── PresenceRegistry (presence)
//!       ├── SessionStore (session)        ── SessionPersistence (in-memory | Redis)
//!       ├── ScreenShareArbiter (arbiter)
//!       ├── QualityMonitor (quality)
//!       └── Transport (transport)         ── ConnectionRegistry, one queue per socket
//! ```
//!
//! Room roles, display names and end-of-session notifications come from
//! collaborator traits in [`collaborators`].
//!
//! # Modules
//!
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with signaling and HTTP codes
//! - [`protocol`] - Wire messages in both directions
//! - [`http`] - WebSocket endpoint and REST API

pub mod arbiter;
pub mod collaborators;
pub mod config;
pub mod errors;
pub mod http;
pub mod ice;
pub mod observability;
pub mod presence;
pub mod protocol;
pub mod quality;
pub mod router;
pub mod session;
pub mod transport;
