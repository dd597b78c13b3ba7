//! Load configuration via `config` crate with env-override support.

use std::{net::SocketAddr, ops::Deref, sync::Arc, time::Duration};

use serde::Deserialize;

use super::types::Res;
use crate::mail::listener::DEFAULT_MAX_PAYLOAD_BYTES;

/// Default address the mail feed listens on.
fn default_listen_address() -> String {
    "0.0.0.0:2000".to_string()
}

/// Default cap on the size of one inbound mail.
fn default_max_payload_bytes() -> u64 {
    DEFAULT_MAX_PAYLOAD_BYTES
}

/// Default Bugzilla instance.
fn default_tracker_base_url() -> String {
    "https://bugzilla.novell.com".to_string()
}

/// Default Bugzilla classification that is announced.
fn default_tracker_classification() -> String {
    "openSUSE".to_string()
}

/// Configuration for the bug-announcer application.
#[derive(Debug, Clone)]
pub struct Config {
    /// The shared configuration values.
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// The configuration values, deserialized from the environment and config file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// Slack app token (`SLACK_APP_TOKEN`).
    pub slack_app_token: String,
    /// Slack bot token (`SLACK_BOT_TOKEN`).
    pub slack_bot_token: String,
    /// Channel that mail notifications are announced in (`ANNOUNCE_CHANNEL_ID`).
    pub announce_channel_id: String,
    /// Address of the inbound mail feed (`LISTEN_ADDRESS`).
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Optional deadline for a peer to send its payload and close (`READ_TIMEOUT_SECS`).
    ///
    /// Unset means connections may stay open indefinitely, which is how the
    /// mail feed has always behaved.
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
    /// Largest mail accepted on one connection, in bytes (`MAX_PAYLOAD_BYTES`).
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,
    /// Base URL of the Bugzilla instance (`TRACKER_BASE_URL`).
    #[serde(default = "default_tracker_base_url")]
    pub tracker_base_url: String,
    /// Classification a mail must belong to in order to be announced (`TRACKER_CLASSIFICATION`).
    #[serde(default = "default_tracker_classification")]
    pub tracker_classification: String,
}

impl Config {
    /// Loads the configuration from the environment and an optional TOML file.
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("BUG_ANNOUNCER"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Checks the values that deserialization alone cannot.
    pub fn validate(&self) -> Res<()> {
        if self.announce_channel_id.trim().is_empty() {
            return Err(anyhow::anyhow!("Announce channel ID must not be empty."));
        }

        if self.tracker_classification.trim().is_empty() {
            return Err(anyhow::anyhow!("Tracker classification must not be empty."));
        }

        if !self.tracker_base_url.starts_with("http://") && !self.tracker_base_url.starts_with("https://") {
            return Err(anyhow::anyhow!("Tracker base URL must be an http(s) URL."));
        }

        if self.read_timeout_secs == Some(0) {
            return Err(anyhow::anyhow!("Read timeout must be at least one second when set."));
        }

        if self.max_payload_bytes == 0 {
            return Err(anyhow::anyhow!("Max payload bytes must be positive."));
        }

        self.listen_address
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("Listen address `{}` is invalid: {}", self.listen_address, e))?;

        Ok(())
    }

    /// The per-connection read deadline, if one is configured.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }
}

// Tests.
