//! Bugzilla implementation of the tracker client.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::instrument;

use super::{GenericTrackerClient, TrackerClient};
use crate::base::{config::Config, types::Res};

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("Invalid title regex"));

/// Bugzilla prefixes page titles with `Bug <id>` and a three character separator (` – `).
static BUG_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Bug [0-9]+...").expect("Invalid bug prefix regex"));

// Extra methods on `TrackerClient` applied by the bugzilla implementation.

impl TrackerClient {
    /// Creates a client for the configured Bugzilla instance.
    pub fn bugzilla(config: &Config) -> Self {
        Self::new(Arc::new(BugzillaClient::new(&config.tracker_base_url)))
    }
}

/// Scrapes bug titles from Bugzilla's `show_bug.cgi` pages.
struct BugzillaClient {
    http: reqwest::Client,
    base_url: String,
}

impl BugzillaClient {
    fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GenericTrackerClient for BugzillaClient {
    fn bug_url(&self, bug_id: &str) -> String {
        format!("{}/show_bug.cgi?id={}", self.base_url, bug_id)
    }

    #[instrument(skip(self))]
    async fn bug_title(&self, bug_id: &str) -> Res<String> {
        let url = self.bug_url(bug_id);

        let page = self.http.get(&url).send().await?.error_for_status()?.text().await?;

        let title = extract_title(&page).ok_or_else(|| anyhow::anyhow!("The page at {} has no title.", url))?;

        Ok(strip_bug_prefix(&title))
    }
}

// Helpers.

/// Extracts and unescapes the contents of the first `<title>` element.
fn extract_title(html: &str) -> Option<String> {
    let raw = TITLE_RE.captures(html)?.get(1)?.as_str();
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    Some(unescape_html(&collapsed))
}

/// Removes the leading `Bug <id> – ` from a Bugzilla page title.
fn strip_bug_prefix(title: &str) -> String {
    BUG_PREFIX_RE.replace(title, "").trim().to_string()
}

fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&ndash;", "–")
        .replace("&amp;", "&")
}

// Tests.
