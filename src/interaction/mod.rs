//! Chat interactions for bug-announcer.
//!
//! This module provides functionality for reacting to chat messages:
//! - Recognizing `bnc#<id>` bug references
//! - Replying with the referenced bug's title and link

pub mod bug_lookup;
