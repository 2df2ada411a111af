//! Metadata resolution task.

use std::path::Path;
use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, instrument, warn};

use super::{Completion, TaskError, next_temp_id, spawn_task};
use crate::config::Config;
use crate::engine::Engine;
use crate::metadata::Metadata;
use crate::options::{
    EngineOptions, OptionsError, PostProcessWhen, PostProcessor, merge_user_args,
};
use crate::sidecar::{self, FinalizedRecord, SidecarError, THUMBNAIL_EXT};

/// Metadata plus where it was persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMetadata {
    pub metadata: Metadata,
    pub record: FinalizedRecord,
}

/// Outcome delivered by a [`MetadataTask`].
pub type MetadataOutcome = Result<ResolvedMetadata, TaskError>;

/// Resolves one URL into metadata and persists its sidecar.
#[derive(Debug, Clone)]
pub struct MetadataTask {
    config: Config,
    url: String,
}

impl MetadataTask {
    #[must_use]
    pub fn new(config: Config, url: impl Into<String>) -> Self {
        Self {
            config,
            url: url.into(),
        }
    }

    /// Engine options for a resolution into `<root>/<temp_id>`.
    ///
    /// User flags are merged first; the flags a metadata-only run depends on
    /// are forced afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError`] when the extra engine arguments are malformed.
    pub fn options(&self, temp_id: &str) -> Result<EngineOptions, OptionsError> {
        let mut options = merge_user_args(self.config.extra_engine_args.as_deref())?;
        options.no_playlist = true;
        options.no_progress = true;
        options.quiet = true;
        options.skip_download = true;
        options.write_thumbnail = true;
        options.postprocessors = vec![PostProcessor::ConvertThumbnails {
            format: THUMBNAIL_EXT.to_string(),
            when: PostProcessWhen::BeforeDownload,
        }];
        options.paths_home = Some(self.config.download_root.join(temp_id));
        options.thumbnail_template = Some(format!("{temp_id}.%(ext)s"));
        options.info_json = None;
        Ok(options)
    }

    /// Runs the resolution to completion.
    #[instrument(skip(self, engine), fields(url = %self.url, engine = engine.name()))]
    pub async fn run(self, engine: Arc<dyn Engine>) -> MetadataOutcome {
        let temp_id = next_temp_id();
        let temp_dir = self.config.download_root.join(&temp_id);
        let options = self.options(&temp_id)?;
        debug!(temp_id = %temp_id, "Resolving metadata");

        let metadata = match engine.resolve(&self.url, &options).await {
            Ok(metadata) => metadata,
            Err(err) => {
                remove_temp_dir(&temp_dir).await;
                return Err(TaskError::Resolution(err));
            }
        };

        let root = self.config.download_root.clone();
        let to_persist = metadata.clone();
        let persist_dir = temp_dir.clone();
        let joined = tokio::task::spawn_blocking(move || {
            sidecar::finalize(&root, &persist_dir, &temp_id, &to_persist)
        })
        .await;
        let record = settle_persist(&temp_dir, joined).await?;

        info!(
            title = %metadata.title,
            formats = metadata.formats.len(),
            folder = %record.folder.display(),
            "Metadata resolved"
        );
        Ok(ResolvedMetadata { metadata, record })
    }

    /// Spawns the task; the outcome arrives through `completion`.
    pub fn spawn(
        self,
        engine: Arc<dyn Engine>,
        completion: Completion<MetadataOutcome>,
    ) -> JoinHandle<()> {
        spawn_task(completion, self.run(engine), Err)
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Unwraps the blocking persist step, removing the temp folder on any
/// failure, including a panicked or cancelled blocking task.
async fn settle_persist(
    temp_dir: &Path,
    joined: Result<Result<FinalizedRecord, SidecarError>, JoinError>,
) -> Result<FinalizedRecord, TaskError> {
    let result = match joined {
        Ok(finalized) => finalized.map_err(TaskError::from),
        Err(err) => Err(TaskError::Panicked(err.to_string())),
    };
    if result.is_err() {
        remove_temp_dir(temp_dir).await;
    }
    result
}

async fn remove_temp_dir(temp_dir: &Path) {
    match tokio::fs::remove_dir_all(temp_dir).await {
        Ok(()) => debug!(path = %temp_dir.display(), "Removed temp folder"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %temp_dir.display(), error = %err, "Failed to remove temp folder"),
    }
}
