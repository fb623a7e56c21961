//! Secret types for values that must never reach a log line.
//!
//! Re-exports the [`secrecy`] wrappers. `SecretString` redacts itself in
//! `Debug`, so a struct deriving `Debug` stays safe to log even when it
//! holds credentials. The value is only reachable through
//! [`ExposeSecret::expose_secret`].
//!
//! In the signaling service this covers the Redis URL (which may embed a
//! password) and the TURN credential handed to clients.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let turn_credential = SecretString::from("s3cr3t");
//! assert!(!format!("{turn_credential:?}").contains("s3cr3t"));
//! assert_eq!(turn_credential.expose_secret(), "s3cr3t");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
