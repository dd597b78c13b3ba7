//! Library root for `bug-announcer`.
//!
//! Bug-announcer is a chat bot for bug-fixing sessions designed to:
//! - Announce newly filed and newly closed Bugzilla bugs in a channel
//! - Answer `bnc#<id>` references with the bug's title and link
//!
//! Bugzilla mail is delivered to the bot over a plain TCP feed, one mail per
//! connection. The architecture is built around extensible traits that allow
//! for different chat, tracker, and announcement implementations.

#[deny(missing_docs)]
pub mod base;
pub mod interaction;
pub mod mail;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the bug-announcer runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with the mail parser, tracker, and chat clients
/// - Runs the mail listener and the chat client until shutdown
pub async fn start(config: Config) -> Void {
    info!("Starting bug-announcer ...");

    // Start the crypto provider; it may already be installed by a dependency.
    let _ = crypto::ring::default_provider().install_default();

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
