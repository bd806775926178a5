use std::sync::Arc;

use serde_json::{Map, Value};

use super::events::{EventDispatcher, MailListener};
use super::mailable::MailParts;
use super::view::ViewRenderer;
use crate::jobs::Queues;
use crate::storage::Disks;

pub type ViewDataCallback = Arc<dyn Fn(&MailParts) -> Map<String, Value> + Send + Sync>;

/// Collaborators a mailer needs while building and dispatching mail.
#[derive(Clone, Default)]
pub struct MailServices {
    pub views: Option<Arc<dyn ViewRenderer>>,
    pub disks: Disks,
    pub queues: Queues,
    pub events: EventDispatcher,
    pub view_data: Option<ViewDataCallback>,
}

impl MailServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_views(mut self, views: impl ViewRenderer) -> Self {
        self.views = Some(Arc::new(views));
        self
    }

    pub fn with_disks(mut self, disks: Disks) -> Self {
        self.disks = disks;
        self
    }

    pub fn with_queues(mut self, queues: Queues) -> Self {
        self.queues = queues;
        self
    }

    pub fn listen(mut self, listener: impl MailListener) -> Self {
        self.events.listen(listener);
        self
    }

    /// Extra view data computed for every mailable before it is rendered.
    pub fn build_view_data_using<F>(mut self, callback: F) -> Self
    where
        F: Fn(&MailParts) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.view_data = Some(Arc::new(callback));
        self
    }
}

impl std::fmt::Debug for MailServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailServices")
            .field("views", &self.views.is_some())
            .field("disks", &self.disks)
            .field("queues", &self.queues)
            .field("events", &self.events)
            .field("view_data", &self.view_data.is_some())
            .finish()
    }
}
