//! The inbound Bugzilla mail pipeline.
//!
//! This module turns raw mail delivered over TCP into announcements:
//! - `listener` accepts connections and reads each mail to the end
//! - `parser` classifies a mail and extracts the bug fields
//! - `notification` holds the parsed value and its rendered message

pub mod listener;
pub mod notification;
pub mod parser;
