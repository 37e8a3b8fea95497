//! File moves and best-effort deletes for cache entries.

use std::io;
use std::path::Path;

use tokio::fs;
use tracing::{debug, warn};

/// Move `src` into the cache at `dst`, replacing any existing file.
///
/// Tries a rename first and falls back to copy-then-rename through a
/// `.tmp` sibling when the source lives on another filesystem.
pub async fn move_into_place(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Rename crosses filesystems, copying instead"
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(e),
    }
}

/// EXDEV on Linux and macOS.
fn is_cross_device_error(e: &io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> io::Result<()> {
    let tmp_dst = dst.with_extension("tmp");

    if let Err(e) = fs::copy(src, &tmp_dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(e);
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!(src = %src.display(), error = %e, "Copied download left behind");
    }
    Ok(())
}

/// Remove a file, treating "already gone" as success.
pub async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
