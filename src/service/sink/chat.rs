//! Event sink that announces notifications in a chat channel.

use std::sync::Arc;

use tracing::{Instrument, error, info, instrument};

use super::{EventSink, GenericEventSink};
use crate::{mail::notification::Notification, service::chat::ChatClient};

impl EventSink {
    /// Creates a sink that posts every notification to `channel_id`.
    pub fn chat(chat: ChatClient, channel_id: impl Into<String>) -> Self {
        Self::new(Arc::new(ChatEventSink {
            chat,
            channel_id: channel_id.into(),
        }))
    }
}

/// Posts the rendered notification message to a single channel.
struct ChatEventSink {
    chat: ChatClient,
    channel_id: String,
}

impl GenericEventSink for ChatEventSink {
    #[instrument(skip_all, fields(bug = notification.id()))]
    fn publish(&self, notification: Notification) {
        let chat = self.chat.clone();
        let channel_id = self.channel_id.clone();
        let message = notification.rendered_message();

        tokio::spawn(
            async move {
                info!("Got notification, announcing in {} ...", channel_id);

                // Dropped on failure; there is no redelivery.
                if let Err(err) = chat.post_message(&channel_id, &message).await {
                    error!("Failed to announce notification: {}", err);
                }
            }
            .in_current_span(),
        );
    }
}

// Tests.
