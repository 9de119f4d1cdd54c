//! Stage 1: media relocation
//!
//! Copies game-exported source media into the `wem/` staging directory
//! next to each language's bank source. A file is skipped when its SHA-256
//! matches an existing file at the destination, so repeated runs only move
//! what changed.

use super::{ExportError, ExportJob};
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Relocate media for every job; one fan-out over all files, bounded by
/// CPU count. Each task writes only its own destination path.
pub async fn relocate_all(jobs: &[&ExportJob]) -> Result<(), ExportError> {
    let mut tasks: Vec<(PathBuf, PathBuf)> = Vec::new();
    for job in jobs {
        let media = job.media_dir();
        if !media.is_dir() {
            debug!(lang = job.lang.label(), "No media directory, nothing to relocate");
            continue;
        }
        let wem = job.wem_dir();
        std::fs::create_dir_all(&wem)?;
        for entry in WalkDir::new(&media)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let dest = wem.join(entry.file_name());
            tasks.push((entry.into_path(), dest));
        }
    }

    let limit = num_cpus::get();
    let results: Vec<Result<bool, ExportError>> = stream::iter(tasks)
        .map(|(src, dest)| {
            tokio::task::spawn_blocking(move || copy_if_changed(&src, &dest))
        })
        .buffer_unordered(limit)
        .map(|joined| joined.map_err(|e| ExportError::Join(e.to_string()))?)
        .collect()
        .await;

    let mut copied = 0;
    for result in results {
        if result? {
            copied += 1;
        }
    }
    info!(copied, "Media relocation finished");
    Ok(())
}

/// Copy unless an identical file already sits at the destination.
/// Returns whether a copy happened.
fn copy_if_changed(src: &Path, dest: &Path) -> Result<bool, ExportError> {
    if dest.exists() && sha256_file(src)? == sha256_file(dest)? {
        return Ok(false);
    }
    std::fs::copy(src, dest)?;
    debug!(src = %src.display(), dest = %dest.display(), "Relocated media file");
    Ok(true)
}

/// SHA-256 of a file, read in 1MB chunks
pub fn sha256_file(path: &Path) -> Result<String, ExportError> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
