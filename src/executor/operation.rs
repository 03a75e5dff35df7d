use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, trace};

use crate::storage::Store;
use crate::storage::local::fs_util;
use crate::types::error::S3mirrorError;
use crate::types::interruptible::{InterruptibleReader, new_interruptible_reader};
use crate::types::progress_watcher::BytesProgressWatcher;
use crate::types::token::PipelineCancellationToken;
use crate::types::{AccessControlList, ObjectMetadata, RemoteEntry};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    CreateBucket,
    Upload,
    Delete,
    Get,
    Head,
    GetAcl,
    PutAcl,
    Download,
    DeleteLocal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreateBucket,
    /// `source` is `None` for a directory marker.
    Upload {
        source: Option<PathBuf>,
        size: u64,
        metadata: ObjectMetadata,
    },
    Delete,
    Get,
    Head,
    GetAcl,
    PutAcl(AccessControlList),
    Download {
        destination: PathBuf,
        size: u64,
        last_modified: Option<DateTime<Utc>>,
    },
    DeleteLocal {
        path: PathBuf,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CreateBucket => OperationKind::CreateBucket,
            Operation::Upload { .. } => OperationKind::Upload,
            Operation::Delete => OperationKind::Delete,
            Operation::Get => OperationKind::Get,
            Operation::Head => OperationKind::Head,
            Operation::GetAcl => OperationKind::GetAcl,
            Operation::PutAcl(_) => OperationKind::PutAcl,
            Operation::Download { .. } => OperationKind::Download,
            Operation::DeleteLocal { .. } => OperationKind::DeleteLocal,
        }
    }

    /// Only transfers have a known size. Everything else leaves the byte
    /// total of a batch untouched.
    pub fn size(&self) -> Option<u64> {
        match self {
            Operation::Upload { size, .. } | Operation::Download { size, .. } => Some(*size),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutput {
    None,
    Entry(RemoteEntry),
    Object { entry: RemoteEntry, data: Vec<u8> },
    Acl(AccessControlList),
    Downloaded { path: PathBuf, bytes: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Completed(OperationOutput),
    Failed(String),
    Interrupted,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed(_) | TaskState::Failed(_) | TaskState::Interrupted
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationTask {
    pub id: usize,
    pub key: String,
    pub operation: Operation,
    pub state: TaskState,
}

impl OperationTask {
    pub fn new(id: usize, key: &str, operation: Operation) -> Self {
        Self {
            id,
            key: key.to_string(),
            operation,
            state: TaskState::Pending,
        }
    }

    pub fn output(&self) -> Option<&OperationOutput> {
        match &self.state {
            TaskState::Completed(output) => Some(output),
            _ => None,
        }
    }
}

/// Runs one operation against `store`. Every byte stream goes through an
/// `InterruptibleReader` bound to `cancellation_token`.
pub async fn execute(
    store: &Store,
    key: &str,
    operation: &Operation,
    cancellation_token: PipelineCancellationToken,
    watcher: Arc<BytesProgressWatcher>,
) -> Result<OperationOutput> {
    match operation {
        Operation::CreateBucket => {
            store.create_bucket().await?;
            Ok(OperationOutput::None)
        }
        Operation::Upload {
            source,
            size,
            metadata,
        } => {
            let reader = match source {
                Some(source) => {
                    let file = tokio::fs::File::open(source)
                        .await
                        .map_err(|e| io_failure(source, &e))?;
                    new_interruptible_reader(file, cancellation_token, Some(watcher))
                }
                None => new_interruptible_reader(tokio::io::empty(), cancellation_token, None),
            };

            let entry = store.put(key, reader, *size, metadata).await?;
            Ok(OperationOutput::Entry(entry))
        }
        Operation::Delete => {
            store.delete(key).await?;
            Ok(OperationOutput::None)
        }
        Operation::Get => {
            let (entry, reader) = store.get(key).await?;
            let mut reader = InterruptibleReader::new(reader, cancellation_token, Some(watcher));

            // the reported size is not trusted for preallocation
            let mut data = Vec::new();
            reader.read_to_end(&mut data).await.map_err(|e| {
                if e.kind() == io::ErrorKind::Interrupted {
                    anyhow!(S3mirrorError::Interrupted)
                } else {
                    anyhow!(S3mirrorError::StoreFailure {
                        key: key.to_string(),
                        message: e.to_string(),
                    })
                }
            })?;

            Ok(OperationOutput::Object { entry, data })
        }
        Operation::Head => Ok(OperationOutput::Entry(store.head(key).await?)),
        Operation::GetAcl => Ok(OperationOutput::Acl(store.get_acl(key).await?)),
        Operation::PutAcl(acl) => {
            store.put_acl(key, acl).await?;
            Ok(OperationOutput::None)
        }
        Operation::Download {
            destination,
            size: _,
            last_modified,
        } => {
            download(
                store,
                key,
                destination,
                last_modified.as_ref(),
                cancellation_token,
                watcher,
            )
            .await
        }
        Operation::DeleteLocal { path } => {
            delete_local(key, path).await?;
            Ok(OperationOutput::None)
        }
    }
}

async fn download(
    store: &Store,
    key: &str,
    destination: &Path,
    last_modified: Option<&DateTime<Utc>>,
    cancellation_token: PipelineCancellationToken,
    watcher: Arc<BytesProgressWatcher>,
) -> Result<OperationOutput> {
    if fs_util::is_key_a_directory(key) {
        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|e| io_failure(destination, &e))?;
        trace!(key = key, "directory created.");
        return Ok(OperationOutput::Downloaded {
            path: destination.to_path_buf(),
            bytes: 0,
        });
    }

    let parent = destination
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = destination
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| key.to_string());

    let (entry, reader) = store.get(key).await?;
    let mut reader = InterruptibleReader::new(reader, cancellation_token, Some(watcher));

    let temp_file = fs_util::create_temp_file_from_key(&parent, &file_name)
        .await
        .map_err(|e| {
            anyhow!(S3mirrorError::IoFailure {
                path: destination.to_string_lossy().to_string(),
                message: format!("{e:#}"),
            })
        })?;
    let mut file = tokio::fs::File::from_std(
        temp_file
            .as_file()
            .try_clone()
            .map_err(|e| io_failure(destination, &e))?,
    );

    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut written: u64 = 0;
    loop {
        let read_bytes = reader.read(&mut buffer).await.map_err(|e| {
            if e.kind() == io::ErrorKind::Interrupted {
                anyhow!(S3mirrorError::Interrupted)
            } else {
                anyhow!(S3mirrorError::StoreFailure {
                    key: key.to_string(),
                    message: e.to_string(),
                })
            }
        })?;
        if read_bytes == 0 {
            break;
        }

        file.write_all(&buffer[..read_bytes])
            .await
            .map_err(|e| io_failure(destination, &e))?;
        written += read_bytes as u64;
    }
    file.flush()
        .await
        .map_err(|e| io_failure(destination, &e))?;
    drop(file);

    temp_file
        .persist(destination)
        .map_err(|e| io_failure(destination, &e.error))?;

    let last_modified = last_modified
        .copied()
        .or_else(|| entry.authoritative_last_modified());
    if let Some(last_modified) = last_modified.as_ref() {
        fs_util::set_last_modified(destination, last_modified)
            .map_err(|e| io_failure(destination, &e))?;
    }

    info!(
        key = key,
        path = destination.to_string_lossy().to_string(),
        size = written,
        "download completed."
    );

    Ok(OperationOutput::Downloaded {
        path: destination.to_path_buf(),
        bytes: written,
    })
}

async fn delete_local(key: &str, path: &Path) -> Result<()> {
    let result = if fs_util::is_key_a_directory(key) {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    if let Err(e) = result {
        if e.kind() != io::ErrorKind::NotFound {
            return Err(io_failure(path, &e));
        }
        debug!(key = key, "local file already deleted.");
        return Ok(());
    }

    info!(
        key = key,
        path = path.to_string_lossy().to_string(),
        "local delete completed."
    );
    Ok(())
}

fn io_failure(path: &Path, e: &io::Error) -> anyhow::Error {
    anyhow!(S3mirrorError::IoFailure {
        path: path.to_string_lossy().to_string(),
        message: e.to_string(),
    })
}
