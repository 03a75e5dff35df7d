use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use uuid::Uuid;

pub const REGION: &str = "ap-northeast-1";

/// Direct S3 access for checking what a mirror left in the bucket.
pub struct S3Helper {
    client: Client,
    pub bucket: String,
}

impl S3Helper {
    pub async fn new() -> Self {
        let region_provider = RegionProviderChain::default_provider().or_else(REGION);
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        Self {
            client: Client::new(&sdk_config),
            bucket: format!("s3mirror-e2e-{}", Uuid::new_v4()),
        }
    }

    pub async fn create_bucket(&self) {
        let constraint = BucketLocationConstraint::from(REGION);
        let bucket_config = CreateBucketConfiguration::builder()
            .location_constraint(constraint)
            .build();

        self.client
            .create_bucket()
            .create_bucket_configuration(bucket_config)
            .bucket(&self.bucket)
            .send()
            .await
            .unwrap();
    }

    pub async fn list_keys(&self) -> Vec<String> {
        let mut keys = vec![];
        let mut continuation_token = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_continuation_token(continuation_token)
                .send()
                .await
                .unwrap();

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(|key| key.to_string())),
            );

            if !output.is_truncated().unwrap_or(false) {
                break;
            }
            continuation_token = output.next_continuation_token().map(|t| t.to_string());
        }

        keys.sort();
        keys
    }

    pub async fn head_object(&self, key: &str) -> HeadObjectOutput {
        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete_bucket_with_cascade(&self) {
        for key in self.list_keys().await {
            let _ = self
                .client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await;
        }

        let _ = self
            .client
            .delete_bucket()
            .bucket(&self.bucket)
            .send()
            .await;
    }
}
