//! Output existence checks used to skip work that has already been done.
//!
//! Every check fails open: a filesystem error counts as "does not exist" so
//! the job is reprocessed rather than silently skipped.

use std::io;
use std::path::Path;

use tokio::fs;
use tracing::{debug, warn};

use vframe_models::{Job, JobKind};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Whether `path` exists and is a regular file.
pub async fn file_exists(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    match fs::metadata(path).await {
        Ok(meta) => meta.is_file(),
        Err(e) => {
            log_fs_error(path, &e);
            false
        }
    }
}

/// Whether `dir` exists and holds at least one jpg/jpeg/png file.
pub async fn has_images(dir: impl AsRef<Path>) -> bool {
    count_matching(dir.as_ref(), is_image_name).await > 0
}

/// Stricter than [`has_images`]: the image file name must also contain
/// `frame`, the marker of extracted frames.
pub async fn has_frames(dir: impl AsRef<Path>) -> bool {
    count_frames(dir).await > 0
}

/// Number of extracted frame images in `dir`.
pub async fn count_frames(dir: impl AsRef<Path>) -> usize {
    count_matching(dir.as_ref(), is_frame_name).await
}

/// Whether a file name is recognised as an extracted frame: an image
/// extension and `frame` somewhere in the name, both case-insensitive.
pub fn is_frame_name(name: &str) -> bool {
    is_image_name(name) && name.to_ascii_lowercase().contains("frame")
}

/// Existence check for a job's output, dispatched on its kind.
///
/// Transcodes check the output file; frame extraction uses [`has_frames`].
pub async fn output_exists(job: &Job) -> bool {
    match job.kind() {
        JobKind::Transcode => file_exists(&job.output_path).await,
        JobKind::FrameExtract => has_frames(&job.output_path).await,
    }
}

fn is_image_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

async fn count_matching(dir: &Path, name_filter: impl Fn(&str) -> bool) -> usize {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            log_fs_error(dir, &e);
            return 0;
        }
    };

    let mut count = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                log_fs_error(dir, &e);
                break;
            }
        };

        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_image_name(name) || !name_filter(name) {
            continue;
        }

        match entry.file_type().await {
            Ok(file_type) if file_type.is_file() => count += 1,
            Ok(_) => {}
            Err(e) => log_fs_error(&entry.path(), &e),
        }
    }

    count
}

fn log_fs_error(path: &Path, error: &io::Error) {
    if error.kind() == io::ErrorKind::NotFound {
        debug!(path = %path.display(), "Output not found");
    } else {
        warn!(
            path = %path.display(),
            "Output check failed, treating as absent: {}",
            error
        );
    }
}
