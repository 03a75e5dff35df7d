use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::DateTime;
use aws_sdk_s3::types::{
    AccessControlPolicy, BucketLocationConstraint, CreateBucketConfiguration, Grant, Grantee,
    ObjectCannedAcl, Owner, Permission, Type,
};
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::Utc;
use tracing::{debug, info, trace};

use crate::config::ClientConfig;
use crate::storage::{ObjectStore, Store, StoreFactory, convert_to_byte_stream};
use crate::types::error::S3mirrorError;
use crate::types::interruptible::ObjectReader;
use crate::types::token::PipelineCancellationToken;
use crate::types::{
    AccessControlList, AclGrant, AclGrantee, ContentHash, ObjectMetadata, RemoteEntry, StoragePath,
};

mod client_builder;

const DEFAULT_REGION: &str = "us-east-1";

pub struct S3StoreFactory {}

#[async_trait]
impl StoreFactory for S3StoreFactory {
    async fn create(
        path: StoragePath,
        cancellation_token: PipelineCancellationToken,
        client_config: Option<ClientConfig>,
        max_keys: i32,
    ) -> Result<Store> {
        let client_config = client_config.ok_or_else(|| {
            anyhow!(S3mirrorError::ConfigurationError(
                "client config required for s3 store".to_string()
            ))
        })?;

        S3ObjectStore::boxed_new(
            path,
            cancellation_token,
            Arc::new(client_config.create_client().await),
            max_keys,
        )
    }
}

#[derive(Clone)]
pub struct S3ObjectStore {
    bucket: String,
    cancellation_token: PipelineCancellationToken,
    client: Arc<Client>,
    max_keys: i32,
}

impl S3ObjectStore {
    pub fn boxed_new(
        path: StoragePath,
        cancellation_token: PipelineCancellationToken,
        client: Arc<Client>,
        max_keys: i32,
    ) -> Result<Store> {
        let StoragePath::S3 { bucket, .. } = path else {
            return Err(anyhow!(S3mirrorError::ConfigurationError(
                "s3 path required".to_string()
            )));
        };

        Ok(Box::new(S3ObjectStore {
            bucket,
            cancellation_token,
            client,
            max_keys,
        }))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> String {
        self.bucket.clone()
    }

    fn is_local_store(&self) -> bool {
        false
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RemoteEntry>> {
        let mut entries = Vec::new();

        let mut continuation_token = None;
        loop {
            if self.cancellation_token.is_cancelled() {
                trace!("list() cancelled.");
                return Err(anyhow!(S3mirrorError::Interrupted));
            }

            let list_objects_output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token)
                .max_keys(self.max_keys)
                .send()
                .await
                .context("aws_sdk_s3::client::list_objects_v2() failed.")
                .context(S3mirrorError::StoreFailure {
                    key: prefix.to_string(),
                    message: "failed to list objects.".to_string(),
                })?;

            for object in list_objects_output.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                if key == prefix {
                    debug!(key = key, "key that is same as prefix is skipped.");
                    continue;
                }

                entries.push(RemoteEntry::new(
                    key,
                    object.size().unwrap_or_default().max(0) as u64,
                    object.e_tag().and_then(ContentHash::parse),
                    to_chrono(object.last_modified()),
                    None,
                ));
            }

            if !list_objects_output.is_truncated().unwrap_or(false) {
                break;
            }

            continuation_token = list_objects_output
                .next_continuation_token()
                .map(|token| token.to_string());
        }

        Ok(entries)
    }

    async fn head(&self, key: &str) -> Result<RemoteEntry> {
        let head_object_output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("aws_sdk_s3::client::head_object() failed.")
            .context(store_failure(key, "failed to head object."))?;

        Ok(RemoteEntry::new(
            key,
            head_object_output.content_length().unwrap_or_default().max(0) as u64,
            head_object_output.e_tag().and_then(ContentHash::parse),
            to_chrono(head_object_output.last_modified()),
            Some(head_object_output.metadata().cloned().unwrap_or_default()),
        ))
    }

    async fn get(&self, key: &str) -> Result<(RemoteEntry, ObjectReader)> {
        let get_object_output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("aws_sdk_s3::client::get_object() failed.")
            .context(store_failure(key, "failed to get object."))?;

        let entry = RemoteEntry::new(
            key,
            get_object_output.content_length().unwrap_or_default().max(0) as u64,
            get_object_output.e_tag().and_then(ContentHash::parse),
            to_chrono(get_object_output.last_modified()),
            Some(get_object_output.metadata().cloned().unwrap_or_default()),
        );

        Ok((entry, Box::pin(get_object_output.body.into_async_read())))
    }

    async fn put(
        &self,
        key: &str,
        reader: ObjectReader,
        size: u64,
        metadata: &ObjectMetadata,
    ) -> Result<RemoteEntry> {
        let put_object_output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(size as i64)
            .body(convert_to_byte_stream(reader))
            .set_metadata(Some(metadata.user_metadata.clone()))
            .set_content_type(metadata.content_type.clone())
            .set_acl(metadata.canned_acl.as_deref().map(ObjectCannedAcl::from))
            .send()
            .await
            .context("aws_sdk_s3::client::put_object() failed.")
            .context(store_failure(key, "failed to put object."))?;

        info!(key = key, size = size, "put completed.");

        Ok(RemoteEntry::new(
            key,
            size,
            put_object_output.e_tag().and_then(ContentHash::parse),
            Some(Utc::now()),
            Some(metadata.user_metadata.clone()),
        ))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("aws_sdk_s3::client::delete_object() failed.")
            .context(store_failure(key, "failed to delete object."))?;

        info!(key = key, "delete completed.");

        Ok(())
    }

    async fn get_acl(&self, key: &str) -> Result<AccessControlList> {
        let get_object_acl_output = self
            .client
            .get_object_acl()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("aws_sdk_s3::client::get_object_acl() failed.")
            .context(store_failure(key, "failed to get object acl."))?;

        let grants = get_object_acl_output
            .grants()
            .iter()
            .filter_map(from_sdk_grant)
            .collect();

        Ok(AccessControlList {
            owner_id: get_object_acl_output
                .owner()
                .and_then(|owner| owner.id())
                .map(|id| id.to_string()),
            grants,
        })
    }

    async fn put_acl(&self, key: &str, acl: &AccessControlList) -> Result<()> {
        let grants = acl
            .grants
            .iter()
            .map(to_sdk_grant)
            .collect::<Result<Vec<Grant>>>()?;

        let policy = AccessControlPolicy::builder()
            .set_owner(
                acl.owner_id
                    .as_ref()
                    .map(|id| Owner::builder().id(id).build()),
            )
            .set_grants(Some(grants))
            .build();

        self.client
            .put_object_acl()
            .bucket(&self.bucket)
            .key(key)
            .access_control_policy(policy)
            .send()
            .await
            .context("aws_sdk_s3::client::put_object_acl() failed.")
            .context(store_failure(key, "failed to put object acl."))?;

        info!(key = key, "put acl completed.");

        Ok(())
    }

    async fn create_bucket(&self) -> Result<()> {
        let region = self
            .client
            .config()
            .region()
            .map(|region| region.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let create_bucket_configuration = if region == DEFAULT_REGION {
            None
        } else {
            Some(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region.as_str()))
                    .build(),
            )
        };

        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .set_create_bucket_configuration(create_bucket_configuration)
            .send()
            .await
            .context("aws_sdk_s3::client::create_bucket() failed.")
            .context(store_failure(&self.bucket, "failed to create bucket."))?;

        info!(bucket = self.bucket, region = region, "bucket created.");

        Ok(())
    }
}

fn to_chrono(last_modified: Option<&DateTime>) -> Option<chrono::DateTime<Utc>> {
    last_modified.and_then(|last_modified| last_modified.to_chrono_utc().ok())
}

fn store_failure(key: &str, message: &str) -> S3mirrorError {
    S3mirrorError::StoreFailure {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn from_sdk_grant(grant: &Grant) -> Option<AclGrant> {
    let grantee = grant.grantee()?;
    let permission = grant.permission()?.as_str().to_string();

    let grantee = match grantee.r#type() {
        Type::CanonicalUser => AclGrantee::CanonicalUser {
            id: grantee.id()?.to_string(),
        },
        Type::Group => AclGrantee::Group {
            uri: grantee.uri()?.to_string(),
        },
        Type::AmazonCustomerByEmail => AclGrantee::Email {
            address: grantee.email_address()?.to_string(),
        },
        _ => return None,
    };

    Some(AclGrant {
        grantee,
        permission,
    })
}

fn to_sdk_grant(grant: &AclGrant) -> Result<Grant> {
    let grantee = match &grant.grantee {
        AclGrantee::CanonicalUser { id } => Grantee::builder().r#type(Type::CanonicalUser).id(id),
        AclGrantee::Group { uri } => Grantee::builder().r#type(Type::Group).uri(uri),
        AclGrantee::Email { address } => Grantee::builder()
            .r#type(Type::AmazonCustomerByEmail)
            .email_address(address),
    }
    .build()
    .context("aws_sdk_s3::types::Grantee::build() failed.")?;

    Ok(Grant::builder()
        .grantee(grantee)
        .permission(Permission::from(grant.permission.as_str()))
        .build())
}
