//! Error types for queue operations.

use thiserror::Error;

use crate::task::ItemId;

/// A request that is not valid in the item's current state.
///
/// These are local no-ops: the request is refused, the reason is logged and
/// stored as the item's status message, and nothing else changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// Metadata has not been resolved yet.
    #[error("metadata is not available yet")]
    MetadataNotReady,

    /// Metadata resolution failed; the item cannot be downloaded.
    #[error("metadata could not be resolved")]
    MetadataFailed,

    /// A download for this item is already running.
    #[error("a download is already in progress")]
    DownloadInFlight,

    /// The item has already been downloaded.
    #[error("already downloaded")]
    AlreadyDownloaded,

    /// The value is not one of the selector's offered choices.
    #[error("{value:?} is not an offered {selector}")]
    UnknownChoice {
        selector: &'static str,
        value: String,
    },

    /// No item with this id is in the queue.
    #[error("no queue item {0}")]
    UnknownItem(ItemId),
}

impl UsageError {
    pub(crate) fn unknown_choice(selector: &'static str, value: &str) -> Self {
        Self::UnknownChoice {
            selector,
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_error_messages() {
        assert_eq!(
            UsageError::unknown_choice("resolution", "8k").to_string(),
            "\"8k\" is not an offered resolution"
        );
        assert_eq!(
            UsageError::UnknownItem(ItemId::new(4)).to_string(),
            "no queue item #4"
        );
    }
}
