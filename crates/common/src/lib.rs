//! Common types shared across the signaling crates.

#![warn(clippy::pedantic)]

/// Module for room, participant, stream and session identifiers
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;
