use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tracing::{debug, trace, warn};

use crate::storage::local::fs_util;
use crate::types::error::S3mirrorError;
use crate::types::interruptible::InterruptibleReader;
use crate::types::progress_watcher::BytesProgressWatcher;
use crate::types::token::PipelineCancellationToken;
use crate::types::{ContentHash, SIDECAR_HASH_SUFFIX};

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// MD5 of a local file. Every byte read is reported to `watcher`, and the read
/// loop stops with `Interrupted` as soon as the token is cancelled.
pub async fn compute_md5(
    path: &Path,
    cancellation_token: PipelineCancellationToken,
    watcher: Option<Arc<BytesProgressWatcher>>,
) -> Result<ContentHash> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| io_failure(path, &e))?;
    let mut reader = InterruptibleReader::new(file, cancellation_token, watcher);

    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let read_bytes = reader.read(&mut buffer).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::Interrupted {
                anyhow::Error::from(S3mirrorError::Interrupted)
            } else {
                io_failure(path, &e)
            }
        })?;
        if read_bytes == 0 {
            break;
        }
        context.consume(&buffer[..read_bytes]);
    }

    let digest = context.finalize();
    trace!(path = path.to_string_lossy().to_string(), "md5 computed.");

    Ok(ContentHash::from_bytes(digest.as_slice()))
}

pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut sidecar = path.as_os_str().to_os_string();
    sidecar.push(SIDECAR_HASH_SUFFIX);
    PathBuf::from(sidecar)
}

/// The name of the file `name` would be the sidecar of. Whether it really is
/// one depends on that file existing.
pub fn sidecar_owner(name: &str) -> Option<&str> {
    name.strip_suffix(SIDECAR_HASH_SUFFIX)
        .filter(|owner| !owner.is_empty() && !owner.ends_with('/'))
}

/// Reads `<file>.md5`. Stale (older than the file) or malformed sidecars are
/// reported as `None` so the caller recomputes.
pub async fn read_sidecar(path: &Path) -> Result<Option<ContentHash>> {
    let sidecar = sidecar_path(path);
    if !sidecar.is_file() {
        return Ok(None);
    }

    let file_last_modified = fs_util::get_last_modified(path).await?;
    let sidecar_last_modified = fs_util::get_last_modified(&sidecar).await?;
    if sidecar_last_modified < file_last_modified {
        debug!(
            sidecar = sidecar.to_string_lossy().to_string(),
            "stale sidecar hash ignored."
        );
        return Ok(None);
    }

    let content = tokio::fs::read_to_string(&sidecar)
        .await
        .map_err(|e| io_failure(&sidecar, &e))?;
    let hex = content.split_whitespace().next().unwrap_or_default();
    if hex.len() != 32 {
        warn!(
            sidecar = sidecar.to_string_lossy().to_string(),
            "malformed sidecar hash ignored."
        );
        return Ok(None);
    }

    Ok(ContentHash::parse(hex))
}

pub async fn write_sidecar(path: &Path, hash: &ContentHash) -> Result<()> {
    let sidecar = sidecar_path(path);
    tokio::fs::write(&sidecar, hash.to_hex())
        .await
        .with_context(|| format!("failed to write sidecar hash: {}", sidecar.display()))?;

    trace!(
        sidecar = sidecar.to_string_lossy().to_string(),
        "sidecar hash written."
    );
    Ok(())
}

fn io_failure(path: &Path, e: &std::io::Error) -> anyhow::Error {
    anyhow::Error::from(S3mirrorError::IoFailure {
        path: path.to_string_lossy().to_string(),
        message: e.to_string(),
    })
}
