//! # Signaling Test Utilities
//!
//! Shared test utilities for the signaling service.
//!
//! - `fixtures` - Rooms with roles, participants, quality reports per tier
//! - `hub` - `TestHub`: a router wired to recording doubles
//! - `app` - `TestApp`: the real HTTP routes and connection registry,
//!   driven in-process
//!
//! ## Usage
//!
//! ```rust,ignore
//! use signaling_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let hub = TestHub::new();
//!     let room = TestRoom::new("42").with_host("host");
//!     hub.install(&room);
//!
//!     hub.join(&room, "host").await;
//!     hub.join(&room, "alice").await;
//!
//!     assert_eq!(hub.kinds_for("host"), vec!["participant-joined"]);
//! }
//! ```

pub mod app;
pub mod fixtures;
pub mod hub;

// Re-export commonly used items
pub use app::*;
pub use fixtures::*;
pub use hub::*;
