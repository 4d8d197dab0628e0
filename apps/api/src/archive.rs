use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::info;

use crate::config::ArchiveConfig;

/// Markdown archive of evaluated sessions in an S3-compatible bucket.
#[derive(Clone)]
pub struct TranscriptArchive {
    client: S3Client,
    bucket: String,
}

impl TranscriptArchive {
    /// Builds a client for MinIO (local) or AWS (production).
    pub async fn connect(config: &ArchiveConfig) -> Self {
        let credentials = Credentials::new(
            &config.aws_access_key_id,
            &config.aws_secret_access_key,
            None,
            None,
            "rehearse-static",
        );

        let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .endpoint_url(&config.s3_endpoint)
            .load()
            .await;

        Self {
            client: S3Client::new(&s3_config),
            bucket: config.s3_bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn upload_markdown(&self, key: &str, markdown: String) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(markdown.into_bytes()))
            .content_type("text/markdown")
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("S3 upload failed: {e}"))?;

        info!("Uploaded transcript to s3://{}/{}", self.bucket, key);
        Ok(())
    }
}
