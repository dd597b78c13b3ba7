//! This module answers `bnc#<id>` bug references posted in chat.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{Instrument, error, info, instrument};

use crate::{
    base::types::Void,
    service::{chat::ChatClient, tracker::TrackerClient},
};

static BUG_REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)bnc#([0-9]+)").expect("Invalid bug reference regex"));

/// Returns the id of the first bug referenced in `text`.
pub fn find_bug_reference(text: &str) -> Option<&str> {
    BUG_REFERENCE_RE.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Handles a chat message that may reference a bug.
///
/// Messages without a reference are ignored. Otherwise a new task is spawned
/// that looks the bug up and replies where the message was posted.
#[instrument(skip_all)]
pub fn handle_bug_lookup(text: String, channel_id: String, thread_ts: Option<String>, tracker: TrackerClient, chat: ChatClient) {
    let Some(bug_id) = find_bug_reference(&text).map(str::to_string) else {
        return;
    };

    tokio::spawn(async move {
        // Process the lookup.
        let result = handle_bug_lookup_internal(bug_id, channel_id, thread_ts, &tracker, &chat).in_current_span().await;

        // Log any errors.
        if let Err(err) = &result {
            error!("Error while handling: {}", err);
        }
    });
}

/// Looks the bug up and posts the reply, including when the lookup fails.
#[instrument(skip(tracker, chat))]
pub async fn handle_bug_lookup_internal(bug_id: String, channel_id: String, thread_ts: Option<String>, tracker: &TrackerClient, chat: &ChatClient) -> Void {
    info!("Looking up bnc#{} ...", bug_id);

    let reply = match tracker.bug_title(&bug_id).await {
        Ok(title) => format!("bnc#{} is '{}' - {}", bug_id, title, tracker.bug_url(&bug_id)),
        Err(err) => {
            error!("Failed to look up bnc#{}: {}", bug_id, err);
            format!("Sorry, I could not look up bnc#{}: {}", bug_id, err)
        }
    };

    match thread_ts {
        Some(thread_ts) => chat.reply_in_thread(&channel_id, &thread_ts, &reply).await,
        None => chat.post_message(&channel_id, &reply).await,
    }
}

// Tests.
