use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use crate::comparer::hash::compute_md5;
use crate::config::ClientConfig;
use crate::storage::{ObjectStore, Store, StoreFactory};
use crate::types::error::S3mirrorError;
use crate::types::interruptible::ObjectReader;
use crate::types::token::PipelineCancellationToken;
use crate::types::{
    AccessControlList, ContentHash, ObjectMetadata, RemoteEntry,
    S3MIRROR_ORIGINAL_LAST_MODIFIED_METADATA_KEY, StoragePath,
};

pub mod fs_util;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

pub struct LocalStoreFactory {}

#[async_trait]
impl StoreFactory for LocalStoreFactory {
    async fn create(
        path: StoragePath,
        cancellation_token: PipelineCancellationToken,
        _client_config: Option<ClientConfig>,
        _max_keys: i32,
    ) -> Result<Store> {
        LocalObjectStore::create(path, cancellation_token)
    }
}

/// A directory treated as a bucket. Keys map to relative paths below it.
#[derive(Clone)]
pub struct LocalObjectStore {
    path: PathBuf,
    cancellation_token: PipelineCancellationToken,
}

impl LocalObjectStore {
    pub fn create(
        path: StoragePath,
        cancellation_token: PipelineCancellationToken,
    ) -> Result<Store> {
        let StoragePath::Local(local_path) = path else {
            return Err(anyhow!(S3mirrorError::ConfigurationError(
                "local path required".to_string()
            )));
        };

        Ok(Box::new(LocalObjectStore {
            path: local_path,
            cancellation_token,
        }))
    }

    async fn build_entry(&self, key: &str, real_path: &Path) -> Result<RemoteEntry> {
        let metadata = tokio::fs::metadata(real_path)
            .await
            .map_err(|e| store_failure(key, &e.to_string()))?;
        let last_modified = metadata
            .modified()
            .map(fs_util::system_time_to_utc)
            .map_err(|e| store_failure(key, &e.to_string()))?;

        if metadata.is_dir() {
            let mut entry = RemoteEntry::implicit_directory(key);
            entry.last_modified = Some(last_modified);
            return Ok(entry);
        }

        let content_hash = compute_md5(real_path, self.cancellation_token.clone(), None).await?;

        Ok(RemoteEntry::new(
            key,
            metadata.len(),
            Some(content_hash),
            Some(last_modified),
            Some(HashMap::new()),
        ))
    }

    fn real_path(&self, key: &str) -> Result<PathBuf> {
        if fs_util::check_directory_traversal(key) {
            return Err(anyhow!(S3mirrorError::DirectoryTraversal(key.to_string())));
        }
        Ok(fs_util::key_to_file_path(&self.path, key))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn bucket(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    fn is_local_store(&self) -> bool {
        true
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RemoteEntry>> {
        let mut entries = Vec::new();

        if !self.path.is_dir() {
            debug!(
                path = self.path.to_string_lossy().to_string(),
                "local store does not exist yet."
            );
            return Ok(entries);
        }

        for entry in WalkDir::new(&self.path)
            .min_depth(1)
            .sort_by_file_name()
        {
            if self.cancellation_token.is_cancelled() {
                trace!("list() cancelled.");
                return Err(anyhow!(S3mirrorError::Interrupted));
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if let Some(inner) = e.io_error() {
                        if inner.kind() == io::ErrorKind::NotFound {
                            continue;
                        }
                    }
                    let path = e
                        .path()
                        .unwrap_or_else(|| Path::new(""))
                        .to_string_lossy()
                        .to_string();
                    let error = e.to_string();
                    warn!(path = path, error = error, "failed to list local files.");
                    return Err(anyhow!(S3mirrorError::StoreFailure {
                        key: path,
                        message: error,
                    }));
                }
            };

            let Some(mut key) = fs_util::relative_key(&self.path, entry.path()) else {
                continue;
            };
            if entry.file_type().is_dir() {
                key.push('/');
            } else if !entry.file_type().is_file() {
                debug!(key = key, "skip non regular file.");
                continue;
            }

            if !key.starts_with(prefix) || key == prefix {
                continue;
            }

            entries.push(self.build_entry(&key, entry.path()).await?);
        }

        Ok(entries)
    }

    async fn head(&self, key: &str) -> Result<RemoteEntry> {
        let real_path = self.real_path(key)?;
        self.build_entry(key, &real_path).await
    }

    async fn get(&self, key: &str) -> Result<(RemoteEntry, ObjectReader)> {
        let real_path = self.real_path(key)?;
        let entry = self.build_entry(key, &real_path).await?;

        let file = tokio::fs::File::open(&real_path)
            .await
            .map_err(|e| store_failure(key, &e.to_string()))?;

        Ok((entry, Box::pin(file)))
    }

    async fn put(
        &self,
        key: &str,
        mut reader: ObjectReader,
        size: u64,
        metadata: &ObjectMetadata,
    ) -> Result<RemoteEntry> {
        let real_path = self.real_path(key)?;

        if fs_util::is_key_a_directory(key) {
            fs_util::create_directory_hierarchy_from_key(&self.path, key).await?;
            return Ok(RemoteEntry::implicit_directory(key));
        }

        let temp_file = fs_util::create_temp_file_from_key(&self.path, key).await?;
        let mut file = tokio::fs::File::from_std(
            temp_file
                .as_file()
                .try_clone()
                .context("std::fs::File::try_clone() failed.")?,
        );

        let mut context = md5::Context::new();
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut written: u64 = 0;
        loop {
            let read_bytes = reader
                .read(&mut buffer)
                .await
                .context(S3mirrorError::StoreFailure {
                    key: key.to_string(),
                    message: "failed to read the source.".to_string(),
                })?;
            if read_bytes == 0 {
                break;
            }

            file.write_all(&buffer[..read_bytes])
                .await
                .map_err(|e| store_failure(key, &e.to_string()))?;
            context.consume(&buffer[..read_bytes]);
            written += read_bytes as u64;
        }

        file.flush().await?;
        drop(file);

        if written != size {
            return Err(anyhow!(S3mirrorError::StoreFailure {
                key: key.to_string(),
                message: format!("size mismatch. expected={size} written={written}"),
            }));
        }

        temp_file
            .persist(&real_path)
            .map_err(|e| store_failure(key, &e.to_string()))?;

        let last_modified = metadata
            .user_metadata
            .get(S3MIRROR_ORIGINAL_LAST_MODIFIED_METADATA_KEY)
            .and_then(|value| chrono::DateTime::parse_from_rfc3339(value).ok())
            .map(|datetime| datetime.with_timezone(&chrono::Utc));
        if let Some(last_modified) = last_modified.as_ref() {
            fs_util::set_last_modified(&real_path, last_modified)
                .map_err(|e| store_failure(key, &e.to_string()))?;
        }

        let lossy_path = real_path.to_string_lossy().to_string();
        info!(
            key = key,
            real_path = lossy_path,
            size = written,
            "put completed.",
        );

        Ok(RemoteEntry::new(
            key,
            written,
            Some(ContentHash::from_bytes(context.finalize().as_slice())),
            Some(fs_util::get_last_modified(&real_path).await?),
            Some(HashMap::new()),
        ))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let file_to_delete = self.real_path(key)?;
        let lossy_path = file_to_delete.to_string_lossy().to_string();

        let result = if fs_util::is_key_a_directory(key) {
            tokio::fs::remove_dir_all(&file_to_delete).await
        } else {
            tokio::fs::remove_file(&file_to_delete).await
        };

        if let Err(e) = result {
            if e.kind() != io::ErrorKind::NotFound {
                return Err(store_failure(key, &e.to_string()));
            }
            debug!(key = key, real_path = lossy_path, "already deleted.");
            return Ok(());
        }

        info!(key = key, real_path = lossy_path, "delete completed.");

        Ok(())
    }

    async fn get_acl(&self, key: &str) -> Result<AccessControlList> {
        Err(store_failure(key, "ACL is not supported by local storage."))
    }

    async fn put_acl(&self, key: &str, _acl: &AccessControlList) -> Result<()> {
        Err(store_failure(key, "ACL is not supported by local storage."))
    }

    async fn create_bucket(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.path)
            .await
            .context("tokio::fs::create_dir_all() failed.")?;

        info!(
            path = self.path.to_string_lossy().to_string(),
            "local store created."
        );
        Ok(())
    }
}

fn store_failure(key: &str, message: &str) -> anyhow::Error {
    anyhow!(S3mirrorError::StoreFailure {
        key: key.to_string(),
        message: message.to_string(),
    })
}
