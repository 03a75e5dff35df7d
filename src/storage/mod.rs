use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_types::body::SdkBody;
use dyn_clone::DynClone;
use futures_util::stream::TryStreamExt;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::io::ReaderStream;

use crate::config::ClientConfig;
use crate::types::interruptible::ObjectReader;
use crate::types::token::PipelineCancellationToken;
use crate::types::{AccessControlList, ObjectMetadata, RemoteEntry, StoragePath};

pub mod local;
pub mod s3;

pub type Store = Box<dyn ObjectStore + Send + Sync>;

#[async_trait]
pub trait StoreFactory {
    async fn create(
        path: StoragePath,
        cancellation_token: PipelineCancellationToken,
        client_config: Option<ClientConfig>,
        max_keys: i32,
    ) -> Result<Store>;
}

/// The capability the engine needs from an object store. Keys are full keys
/// within the bucket; prefix handling belongs to the caller.
#[async_trait]
pub trait ObjectStore: DynClone {
    fn bucket(&self) -> String;
    fn is_local_store(&self) -> bool;
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteEntry>>;
    async fn head(&self, key: &str) -> Result<RemoteEntry>;
    async fn get(&self, key: &str) -> Result<(RemoteEntry, ObjectReader)>;
    async fn put(
        &self,
        key: &str,
        reader: ObjectReader,
        size: u64,
        metadata: &ObjectMetadata,
    ) -> Result<RemoteEntry>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn get_acl(&self, key: &str) -> Result<AccessControlList>;
    async fn put_acl(&self, key: &str, acl: &AccessControlList) -> Result<()>;
    async fn create_bucket(&self) -> Result<()>;
}

pub fn convert_to_byte_stream<R>(reader: R) -> ByteStream
where
    R: AsyncRead + Send + 'static + Sync,
{
    let buf_reader = BufReader::new(reader);

    let reader_stream = ReaderStream::new(buf_reader).map_ok(Frame::data);

    let stream_body = StreamBody::new(reader_stream);

    let boxed_body = BodyExt::boxed(stream_body);

    let sdk_body = SdkBody::from_body_1_x(boxed_body);

    ByteStream::new(sdk_body)
}

/// Joins a store prefix and a relative path into a full key.
pub fn join_key(prefix: &str, relative: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        return format!("{prefix}{relative}");
    }
    format!("{prefix}/{relative}")
}

/// A non-empty prefix always names a directory.
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        return prefix.to_string();
    }
    format!("{prefix}/")
}
