//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for various services used by the bug-announcer:
//! - Chat services (e.g., Slack)
//! - Event sinks that announcements are published to
//! - Bug trackers (e.g., Bugzilla)
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod chat;
pub mod sink;
pub mod tracker;
