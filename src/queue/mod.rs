//! In-memory download queue.
//!
//! The [`Queue`] is owned by the controlling task. It holds the items, the
//! engine shared by their tasks and the receiving end of the event channel;
//! draining that channel ([`Queue::pump`], [`Queue::next_event`]) and feeding
//! each event to [`Queue::handle_event`] is the only way item state changes
//! as a result of task work.
//!
//! # Overview
//!
//! - [`Queue`] - Ordered items and bulk operations
//! - [`QueueItem`] - Per-URL state machine
//! - [`FormatSelection`] - Per-item format choices
//! - [`UsageError`] - Refused requests
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mediaq_core::{Config, Queue, YtDlpEngine};
//!
//! let mut queue = Queue::new(Config::new("/downloads"), Arc::new(YtDlpEngine::new()));
//! queue.add("https://example.com/watch?v=1");
//! queue.run_until_idle().await;
//! queue.download_selected(&[]);
//! queue.run_until_idle().await;
//! ```

mod error;
mod item;
mod selection;

pub use error::UsageError;
pub use item::{ItemState, Progress, QueueItem};
pub use selection::{BEST, DEFAULT_AUDIO_FORMAT, FormatSelection, Selector, format_preference};

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::task::{Dispatcher, ItemId, TaskEvent};

/// Ordered collection of queue items.
pub struct Queue {
    items: Vec<QueueItem>,
    next_id: u64,
    defaults: Config,
    engine: Arc<dyn Engine>,
    dispatcher: Dispatcher,
    events: mpsc::UnboundedReceiver<TaskEvent>,
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("items", &self.items)
            .field("defaults", &self.defaults)
            .field("engine", &self.engine.name())
            .finish_non_exhaustive()
    }
}

impl Queue {
    /// Creates an empty queue. Every item starts from a copy of `defaults`.
    #[must_use]
    pub fn new(defaults: Config, engine: Arc<dyn Engine>) -> Self {
        let (dispatcher, events) = Dispatcher::channel();
        Self {
            items: Vec::new(),
            next_id: 1,
            defaults,
            engine,
            dispatcher,
            events,
        }
    }

    /// Appends an item and starts its metadata resolution.
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(self))]
    pub fn add(&mut self, url: &str) -> ItemId {
        let id = ItemId::new(self.next_id);
        self.next_id += 1;

        let mut item = QueueItem::new(
            id,
            url,
            self.defaults.clone(),
            Arc::clone(&self.engine),
            self.dispatcher.clone(),
        );
        item.request_metadata();
        self.items.push(item);
        info!(item = %id, "Item added");
        id
    }

    /// Drops the given items. Tasks already running keep running; their
    /// events are discarded on arrival.
    pub fn remove_selected(&mut self, ids: &[ItemId]) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !ids.contains(&item.id()));
        let removed = before - self.items.len();
        debug!(requested = ids.len(), removed, "Items removed");
        removed
    }

    /// Requests a download for each given item, or for every item when
    /// `ids` is empty. Returns how many downloads started.
    ///
    /// Refused requests are logged and skipped.
    pub fn download_selected(&mut self, ids: &[ItemId]) -> usize {
        let targets: Vec<ItemId> = if ids.is_empty() {
            self.items.iter().map(QueueItem::id).collect()
        } else {
            ids.to_vec()
        };

        let mut started = 0;
        for id in targets {
            match self.item_mut(id).and_then(QueueItem::request_download) {
                Ok(()) => started += 1,
                Err(err @ UsageError::UnknownItem(_)) => warn!(item = %id, error = %err, "Skipping"),
                Err(err) => debug!(item = %id, error = %err, "Download not started"),
            }
        }
        info!(started, "Downloads requested");
        started
    }

    /// Routes one event to its item. Returns `false` when the item is gone.
    pub fn handle_event(&mut self, event: TaskEvent) -> bool {
        let id = event.item();
        let Some(item) = self.get_mut(id) else {
            debug!(item = %id, "Event for removed item dropped");
            return false;
        };
        match event {
            TaskEvent::MetadataDone { outcome, .. } => item.on_metadata_done(outcome),
            TaskEvent::DownloadProgress {
                status, fraction, ..
            } => item.on_download_progress(status, fraction),
            TaskEvent::DownloadDone { outcome, .. } => item.on_download_done(outcome),
        }
        true
    }

    /// Handles every event already waiting, without blocking.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Waits for the next event without handling it.
    ///
    /// The queue holds a sender itself, so this only returns `None` if the
    /// channel is closed from the outside.
    pub async fn next_event(&mut self) -> Option<TaskEvent> {
        self.events.recv().await
    }

    /// True when no item has a task in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.items.iter().any(QueueItem::is_busy)
    }

    /// Handles events until no item has a task in flight.
    pub async fn run_until_idle(&mut self) {
        while !self.is_idle() {
            let Some(event) = self.next_event().await else {
                break;
            };
            self.handle_event(event);
        }
    }

    #[must_use]
    pub fn get(&self, id: ItemId) -> Option<&QueueItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    #[must_use]
    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|item| item.id() == id)
    }

    /// # Errors
    ///
    /// Returns [`UsageError::UnknownItem`] when no item has this id.
    pub fn item_mut(&mut self, id: ItemId) -> Result<&mut QueueItem, UsageError> {
        self.get_mut(id).ok_or(UsageError::UnknownItem(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut QueueItem> {
        self.items.iter_mut()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(QueueItem::id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Config every new item starts from.
    #[must_use]
    pub fn defaults(&self) -> &Config {
        &self.defaults
    }
}
