//! Metadata sidecar persistence.
//!
//! A metadata task resolves into a temporary folder named after its temp id
//! (the title is unknown until the engine answers). Finalizing writes the
//! full engine record as `<title>.json`, renames the folder to `<title>` and
//! renames the thumbnail to `<title>.png`:
//!
//! ```text
//! <root>/<temp_id>/<temp_id>.png   ->   <root>/<title>/<title>.png
//!                                       <root>/<title>/<title>.json
//! ```

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::metadata::Metadata;

/// Image extension the metadata task converts thumbnails to.
pub const THUMBNAIL_EXT: &str = "png";

/// Errors produced while persisting a metadata record.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// I/O error on a sidecar path.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The metadata could not be serialized.
    #[error("failed to serialize metadata record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A rename from the temporary layout failed.
    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SidecarError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn rename(from: &Path, to: &Path, source: std::io::Error) -> Self {
        Self::Rename {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        }
    }
}

/// Final on-disk layout of a resolved item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedRecord {
    /// `<root>/<title>`; downloads go here.
    pub folder: PathBuf,
    /// `<root>/<title>/<title>.json`.
    pub sidecar_path: PathBuf,
    /// `<root>/<title>/<title>.png`, when the engine produced a thumbnail.
    pub thumbnail_path: Option<PathBuf>,
}

/// Turns a media title into a single safe path segment.
///
/// Path separators and control characters become `_`; a title that would
/// be empty or a dot segment becomes `untitled`.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let sanitized: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let is_plain_segment = matches!(
        Path::new(&sanitized).components().collect::<Vec<_>>().as_slice(),
        [Component::Normal(_)]
    );
    if sanitized.is_empty() || !is_plain_segment {
        return "untitled".to_string();
    }
    sanitized
}

/// Persists `metadata` and moves the temporary folder into place.
///
/// The temporary folder is created if the engine did not create it (no
/// thumbnail was written).
///
/// # Errors
///
/// Returns [`SidecarError`] when the record cannot be written or a rename
/// fails. A partially written record is removed.
#[instrument(skip(metadata), fields(title = %metadata.title))]
pub fn finalize(
    root: &Path,
    temp_dir: &Path,
    temp_id: &str,
    metadata: &Metadata,
) -> Result<FinalizedRecord, SidecarError> {
    let name = sanitize_title(&metadata.title);
    fs::create_dir_all(temp_dir).map_err(|source| SidecarError::io(temp_dir, source))?;

    let temp_record = temp_dir.join(format!("{name}.json"));
    write_record(&temp_record, metadata)?;

    let folder = root.join(&name);
    fs::rename(temp_dir, &folder).map_err(|source| SidecarError::rename(temp_dir, &folder, source))?;
    debug!(folder = %folder.display(), "Metadata folder finalized");

    let temp_thumbnail = folder.join(format!("{temp_id}.{THUMBNAIL_EXT}"));
    let thumbnail_path = if temp_thumbnail.is_file() {
        let target = folder.join(format!("{name}.{THUMBNAIL_EXT}"));
        fs::rename(&temp_thumbnail, &target)
            .map_err(|source| SidecarError::rename(&temp_thumbnail, &target, source))?;
        Some(target)
    } else {
        debug!("No thumbnail produced");
        None
    };

    Ok(FinalizedRecord {
        sidecar_path: folder.join(format!("{name}.json")),
        folder,
        thumbnail_path,
    })
}

fn write_record(path: &Path, metadata: &Metadata) -> Result<(), SidecarError> {
    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|source| SidecarError::io(path, source))?;

    let write_result = {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, metadata)
            .map_err(SidecarError::from)
            .and_then(|()| writer.flush().map_err(|source| SidecarError::io(path, source)))
    };
    if write_result.is_err() {
        // Partial records must not be picked up by a later download.
        let _ = fs::remove_file(path);
    }
    write_result
}

/// Reads a previously written record.
///
/// # Errors
///
/// Returns [`SidecarError`] when the file cannot be read or parsed.
pub fn read_record(path: &Path) -> Result<Metadata, SidecarError> {
    let bytes = fs::read(path).map_err(|source| SidecarError::io(path, source))?;
    Ok(serde_json::from_slice(&bytes)?)
}
