//! Worker tasks and the event channel back to the controlling task.
//!
//! Workers never touch queue state. Each one owns its inputs by value and a
//! [`Completion`] handle; progress and completion travel as [`TaskEvent`]s
//! over a single unbounded channel whose receiver is drained by whoever owns
//! the [`crate::queue::Queue`]. Because a worker's progress events and its
//! completion go through the same FIFO channel, progress always precedes the
//! terminal event.
//!
//! # Architecture
//!
//! - [`Dispatcher`] - Cloneable sending side of the event channel
//! - [`Completion`] - One-shot outcome handle, consumed on delivery
//! - [`MetadataTask`] - Resolves a URL and persists the sidecar
//! - [`DownloadTask`] - Transfers the payload with normalized progress

mod download;
mod error;
mod metadata;

pub use download::{
    DownloadOutcome, DownloadTask, ProgressReporter, ProgressStatus, normalize_progress,
};
pub use error::TaskError;
pub use metadata::{MetadataOutcome, MetadataTask, ResolvedMetadata};

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

/// Prefix of temporary metadata folder names.
pub const TEMP_ID_PREFIX: &str = "mediaq_";

/// Stable identifier of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Message from a worker to the controlling task.
#[derive(Debug)]
pub enum TaskEvent {
    /// A metadata task finished.
    MetadataDone {
        item: ItemId,
        outcome: MetadataOutcome,
    },
    /// A download task reported normalized progress.
    DownloadProgress {
        item: ItemId,
        status: ProgressStatus,
        fraction: f64,
    },
    /// A download task finished.
    DownloadDone {
        item: ItemId,
        outcome: DownloadOutcome,
    },
}

impl TaskEvent {
    /// Item the event is addressed to.
    #[must_use]
    pub fn item(&self) -> ItemId {
        match self {
            Self::MetadataDone { item, .. }
            | Self::DownloadProgress { item, .. }
            | Self::DownloadDone { item, .. } => *item,
        }
    }

    /// True for events that end a task.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::DownloadProgress { .. })
    }
}

/// Sending side of the event channel.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl Dispatcher {
    /// Creates the channel. The receiver belongs to the controlling task.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Posts an event. Dropped silently once the receiver is gone.
    pub fn dispatch(&self, event: TaskEvent) {
        if let Err(err) = self.tx.send(event) {
            debug!(item = %err.0.item(), "Event receiver closed, dropping event");
        }
    }
}

/// One-shot handle a worker uses to report its outcome.
///
/// [`Completion::deliver`] consumes the handle, so an outcome can be
/// delivered at most once; [`spawn_task`] guarantees it is delivered at
/// least once.
pub struct Completion<T> {
    item: ItemId,
    dispatcher: Dispatcher,
    wrap: fn(ItemId, T) -> TaskEvent,
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("item", &self.item)
            .finish_non_exhaustive()
    }
}

impl Completion<MetadataOutcome> {
    #[must_use]
    pub fn metadata(item: ItemId, dispatcher: Dispatcher) -> Self {
        Self {
            item,
            dispatcher,
            wrap: |item, outcome| TaskEvent::MetadataDone { item, outcome },
        }
    }
}

impl Completion<DownloadOutcome> {
    #[must_use]
    pub fn download(item: ItemId, dispatcher: Dispatcher) -> Self {
        Self {
            item,
            dispatcher,
            wrap: |item, outcome| TaskEvent::DownloadDone { item, outcome },
        }
    }
}

impl<T> Completion<T> {
    #[must_use]
    pub fn item(&self) -> ItemId {
        self.item
    }

    /// Dispatcher the outcome will be posted through.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Posts the outcome to the controlling task.
    pub fn deliver(self, outcome: T) {
        self.dispatcher.dispatch((self.wrap)(self.item, outcome));
    }
}

/// Runs `work` on the runtime and delivers its outcome through `completion`.
///
/// The work runs in its own task; if it panics, `on_abort` converts the
/// panic into an outcome so the completion still fires exactly once.
pub(crate) fn spawn_task<T, F>(
    completion: Completion<T>,
    work: F,
    on_abort: fn(TaskError) -> T,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    tokio::spawn(async move {
        let outcome = match tokio::spawn(work).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let message = join_error_message(err);
                warn!(item = %completion.item(), error = %message, "Task aborted");
                on_abort(TaskError::Panicked(message))
            }
        };
        completion.deliver(outcome);
    })
}

fn join_error_message(err: JoinError) -> String {
    if err.is_panic() {
        panic_payload_message(err.into_panic().as_ref())
    } else {
        err.to_string()
    }
}

fn panic_payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Returns a fresh temporary id, `mediaq_<hex nanos>`.
///
/// The nanosecond counter is strictly increasing across the process, so
/// two tasks never share a temp folder.
#[must_use]
pub fn next_temp_id() -> String {
    static LAST: AtomicU64 = AtomicU64::new(0);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0);
    let previous = LAST
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |prev| {
            Some(now.max(prev.saturating_add(1)))
        })
        .unwrap_or_else(|prev| prev);
    let id = now.max(previous.saturating_add(1));
    format!("{TEMP_ID_PREFIX}{id:x}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_next_temp_id_is_unique_and_prefixed() {
        let ids: Vec<String> = (0..1000).map(|_| next_temp_id()).collect();
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(ids.iter().all(|id| id.starts_with(TEMP_ID_PREFIX)));
    }

    #[test]
    fn test_next_temp_id_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..250).map(|_| next_temp_id()).collect::<Vec<_>>()))
            .collect();
        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 1000);
    }

    #[test]
    fn test_item_id_display() {
        assert_eq!(ItemId::new(7).to_string(), "#7");
    }

    #[tokio::test]
    async fn test_completion_delivers_once_through_channel() {
        let (dispatcher, mut rx) = Dispatcher::channel();
        let completion = Completion::download(ItemId::new(3), dispatcher);
        completion.deliver(DownloadOutcome::success());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.item(), ItemId::new(3));
        assert!(event.is_terminal());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spawn_task_converts_panic_into_outcome() {
        let (dispatcher, mut rx) = Dispatcher::channel();
        let completion = Completion::download(ItemId::new(1), dispatcher);

        spawn_task(
            completion,
            async {
                let explode = true;
                if explode {
                    panic!("engine exploded");
                }
                DownloadOutcome::success()
            },
            DownloadOutcome::failed,
        )
        .await
        .unwrap();

        match rx.recv().await.unwrap() {
            TaskEvent::DownloadDone { outcome, .. } => {
                assert_eq!(outcome.exit_code, -1);
                assert!(matches!(
                    outcome.error,
                    Some(TaskError::Panicked(ref m)) if m == "engine exploded"
                ));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dispatch_after_receiver_dropped_does_not_panic() {
        let (dispatcher, rx) = Dispatcher::channel();
        drop(rx);
        Completion::download(ItemId::new(9), dispatcher).deliver(DownloadOutcome::success());
    }
}
