pub mod bugzilla;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::Res;

// Traits.

/// Generic bug tracker trait that clients must implement.
///
/// Used to answer bug references posted in chat.
#[async_trait]
pub trait GenericTrackerClient: Send + Sync + 'static {
    /// The public URL of a bug.
    fn bug_url(&self, bug_id: &str) -> String;

    /// Fetch the title of a bug, without the tracker's `Bug <id>` prefix.
    async fn bug_title(&self, bug_id: &str) -> Res<String>;
}

// Structs.

/// Bug tracker client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct TrackerClient {
    inner: Arc<dyn GenericTrackerClient>,
}

impl Deref for TrackerClient {
    type Target = dyn GenericTrackerClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl TrackerClient {
    pub fn new(inner: Arc<dyn GenericTrackerClient>) -> Self {
        Self { inner }
    }
}
