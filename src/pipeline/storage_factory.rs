use anyhow::Result;

use crate::config::ClientConfig;
use crate::storage::local::LocalStoreFactory;
use crate::storage::s3::S3StoreFactory;
use crate::storage::{Store, StoreFactory};
use crate::types::StoragePath;
use crate::types::token::PipelineCancellationToken;

pub async fn create_store(
    storage_path: StoragePath,
    cancellation_token: PipelineCancellationToken,
    client_config: Option<ClientConfig>,
    max_keys: i32,
) -> Result<Store> {
    let factory_fn = match storage_path {
        StoragePath::S3 { .. } => S3StoreFactory::create,
        StoragePath::Local(_) => LocalStoreFactory::create,
    };

    factory_fn(storage_path, cancellation_token, client_config, max_keys).await
}

/// The prefix every remote key lives under. A local store has none.
pub fn remote_prefix(storage_path: &StoragePath) -> String {
    match storage_path {
        StoragePath::S3 { prefix, .. } => prefix.clone(),
        StoragePath::Local(_) => String::new(),
    }
}
