pub mod chat;

use std::{ops::Deref, sync::Arc};

use crate::mail::notification::Notification;

// Traits.

/// Generic event sink trait that announcement targets must implement.
///
/// Publishing is fire-and-forget: the mail pipeline never waits for delivery
/// and never retries. Implementations are shared between all connection
/// handlers and may be called concurrently.
pub trait GenericEventSink: Send + Sync + 'static {
    /// Hand a notification over for broadcasting.
    fn publish(&self, notification: Notification);
}

// Structs.

/// Event sink for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<dyn GenericEventSink>,
}

impl Deref for EventSink {
    type Target = dyn GenericEventSink;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl EventSink {
    pub fn new(inner: Arc<dyn GenericEventSink>) -> Self {
        Self { inner }
    }
}
