//! Storage client
//!
//! [`S3Client`] wraps the SDK client with the handful of calls the suites
//! need, folding every SDK error into [`Error`] so failures keep the server's
//! error code.

pub mod post_policy;
pub mod select;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Region, RequestChecksumCalculation, ResponseChecksumValidation};
use aws_sdk_s3::operation::select_object_content::SelectObjectContentOutput;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Delete, ExpressionType, ObjectIdentifier,
    RequestProgress, SelectObjectContentEventStream,
};
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::common::config::ServerConfig;
use crate::common::{Config, Error, Result};
use crate::harness::{RecordStream, SelectTarget};
use post_policy::{PostForm, PostPolicy};
use select::SelectRequest;

/// Signatures of the client calls, as reported in test records
pub mod api {
    use crate::report::ApiSignature;

    pub const MAKE_BUCKET: ApiSignature =
        ApiSignature::new("make_bucket", &["bucket_name", "location"]);
    pub const LIST_BUCKETS: ApiSignature = ApiSignature::new("list_buckets", &[]);
    pub const BUCKET_EXISTS: ApiSignature = ApiSignature::new("bucket_exists", &["bucket_name"]);
    pub const REMOVE_BUCKET: ApiSignature = ApiSignature::new("remove_bucket", &["bucket_name"]);
    pub const PUT_OBJECT: ApiSignature = ApiSignature::new(
        "put_object",
        &["bucket_name", "object_name", "data", "length"],
    );
    pub const FPUT_OBJECT: ApiSignature =
        ApiSignature::new("fput_object", &["bucket_name", "object_name", "file_path"]);
    pub const COPY_OBJECT: ApiSignature = ApiSignature::new(
        "copy_object",
        &["bucket_name", "object_name", "object_source", "conditions"],
    );
    pub const STAT_OBJECT: ApiSignature =
        ApiSignature::new("stat_object", &["bucket_name", "object_name"]);
    pub const GET_OBJECT: ApiSignature =
        ApiSignature::new("get_object", &["bucket_name", "object_name"]);
    pub const GET_PARTIAL_OBJECT: ApiSignature = ApiSignature::new(
        "get_partial_object",
        &["bucket_name", "object_name", "offset", "length"],
    );
    pub const FGET_OBJECT: ApiSignature =
        ApiSignature::new("fget_object", &["bucket_name", "object_name", "file_path"]);
    pub const PRESIGNED_GET_OBJECT: ApiSignature = ApiSignature::new(
        "presigned_get_object",
        &["bucket_name", "object_name", "expires"],
    );
    pub const PRESIGNED_PUT_OBJECT: ApiSignature = ApiSignature::new(
        "presigned_put_object",
        &["bucket_name", "object_name", "expires"],
    );
    pub const PRESIGNED_POST_POLICY: ApiSignature =
        ApiSignature::new("presigned_post_policy", &["policy"]);
    pub const LIST_OBJECTS: ApiSignature =
        ApiSignature::new("list_objects", &["bucket_name", "prefix", "recursive"]);
    pub const LIST_OBJECTS_V2: ApiSignature =
        ApiSignature::new("list_objects_v2", &["bucket_name", "prefix", "recursive"]);
    pub const REMOVE_OBJECTS: ApiSignature =
        ApiSignature::new("remove_objects", &["bucket_name", "objects_iter"]);
    pub const SELECT_OBJECT_CONTENT: ApiSignature = ApiSignature::new(
        "select_object_content",
        &["bucket_name", "object_name", "request"],
    );
}

/// Metadata returned by `stat_object`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: u64,
    pub etag: String,
    pub content_type: Option<String>,
    /// Seconds since the Unix epoch
    pub last_modified: Option<i64>,
}

/// One entry of an object listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub etag: String,
    pub last_modified: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    pub name: String,
    pub creation_date: Option<i64>,
}

/// Preconditions for a server-side copy
#[derive(Debug, Clone, Default)]
pub struct CopyConditions {
    pub match_etag: Option<String>,
}

/// A key that a multi-object delete did not remove
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub key: String,
    pub code: String,
    pub message: String,
}

/// Presigned URL plus the headers that must accompany it
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// Client for one configured server
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    server: ServerConfig,
    endpoint_url: String,
}

impl S3Client {
    /// Build a client for the configured server
    pub async fn connect(config: &Config) -> Self {
        let server = config.server.clone();
        let endpoint_url = config.endpoint_url();
        let credentials = Credentials::new(
            server.access_key.clone(),
            server.secret_key.clone(),
            None,
            None,
            "s3-conformance",
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(server.region.clone()))
            .endpoint_url(&endpoint_url)
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
            .build();

        debug!(endpoint = %endpoint_url, region = %server.region, "S3 client ready");

        Self {
            client: Client::from_conf(s3_config),
            server,
            endpoint_url,
        }
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    pub fn region(&self) -> &str {
        &self.server.region
    }

    // === Buckets ===

    /// Create a bucket; a bucket we already own counts as created
    pub async fn make_bucket(&self, bucket: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if self.server.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(
                        self.server.region.as_str(),
                    ))
                    .build(),
            );
        }

        let result = request
            .send()
            .await
            .map(|_| ())
            .map_err(|e| Error::s3("CreateBucket", e));
        accept_already_owned(bucket, result)
    }

    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(Error::s3("HeadBucket", e)),
        }
    }

    pub async fn remove_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| Error::s3("DeleteBucket", e))?;
        Ok(())
    }

    /// Remove every object in `bucket`, then the bucket itself
    pub async fn purge_bucket(&self, bucket: &str) -> Result<()> {
        let keys: Vec<String> = self
            .list_objects_v2(bucket, None)
            .await?
            .into_iter()
            .map(|o| o.key)
            .collect();

        if !keys.is_empty() {
            let failures = self.remove_objects(bucket, &keys).await?;
            if let Some(first) = failures.first() {
                return Err(Error::S3 {
                    operation: "DeleteObjects",
                    code: Some(first.code.clone()),
                    message: format!("could not remove '{}': {}", first.key, first.message),
                });
            }
        }
        self.remove_bucket(bucket).await
    }

    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| Error::s3("ListBuckets", e))?;

        Ok(output
            .buckets()
            .iter()
            .map(|b| BucketInfo {
                name: b.name().unwrap_or_default().to_string(),
                creation_date: b.creation_date().map(|d| d.secs()),
            })
            .collect())
    }

    // === Objects ===

    pub async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        let length = data.len() as i64;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(length)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| Error::s3("PutObject", e))?;
        trace!(bucket, key, length, "object written");
        Ok(())
    }

    /// Upload the contents of a local file
    pub async fn fput_object(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| Error::FileRead {
                path: path.display().to_string(),
                error: e.to_string(),
            })?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::s3("PutObject", e))?;
        Ok(())
    }

    pub async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::s3("HeadObject", e))?;

        Ok(ObjectStat {
            size: output.content_length().unwrap_or_default().max(0) as u64,
            etag: output.e_tag().unwrap_or_default().to_string(),
            content_type: output.content_type().map(str::to_string),
            last_modified: output.last_modified().map(|d| d.secs()),
        })
    }

    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.read_object(bucket, key, None).await
    }

    /// Read `length` bytes starting at `offset`
    pub async fn get_partial_object(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>> {
        if length == 0 {
            return Err(Error::assertion("partial read length must be positive"));
        }
        let range = format!("bytes={}-{}", offset, offset + length - 1);
        self.read_object(bucket, key, Some(range)).await
    }

    /// Download an object into a local file, streaming it chunk by chunk
    pub async fn fget_object(&self, bucket: &str, key: &str, path: &Path) -> Result<u64> {
        let mut body = self.object_body(bucket, key, None).await?;
        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;
        while let Some(bytes) = body
            .try_next()
            .await
            .map_err(|e| Error::Internal(format!("reading '{}': {}", key, e)))?
        {
            file.write_all(&bytes).await?;
            written += bytes.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    async fn read_object(&self, bucket: &str, key: &str, range: Option<String>) -> Result<Vec<u8>> {
        let body = self.object_body(bucket, key, range).await?;
        let data = body
            .collect()
            .await
            .map_err(|e| Error::Internal(format!("reading '{}': {}", key, e)))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn object_body(&self, bucket: &str, key: &str, range: Option<String>) -> Result<ByteStream> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_range(range)
            .send()
            .await
            .map_err(|e| Error::s3("GetObject", e))?;
        Ok(output.body)
    }

    /// Server-side copy of `source_bucket/source_key` into `bucket/key`
    pub async fn copy_object(
        &self,
        bucket: &str,
        key: &str,
        source_bucket: &str,
        source_key: &str,
        conditions: &CopyConditions,
    ) -> Result<()> {
        self.client
            .copy_object()
            .bucket(bucket)
            .key(key)
            .copy_source(format!("{}/{}", source_bucket, source_key))
            .set_copy_source_if_match(conditions.match_etag.clone())
            .send()
            .await
            .map_err(|e| Error::s3("CopyObject", e).into_precondition())?;
        Ok(())
    }

    pub async fn remove_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::s3("DeleteObject", e))?;
        Ok(())
    }

    /// Delete many keys in one request, returning the keys that were not removed
    pub async fn remove_objects(&self, bucket: &str, keys: &[String]) -> Result<Vec<DeleteFailure>> {
        let mut failures = Vec::new();

        // A multi-delete request carries at most 1000 keys
        for batch in keys.chunks(1000) {
            let objects = batch
                .iter()
                .map(|k| ObjectIdentifier::builder().key(k).build())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::Internal(e.to_string()))?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| Error::Internal(e.to_string()))?;

            let output = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| Error::s3("DeleteObjects", e))?;

            failures.extend(output.errors().iter().map(|e| DeleteFailure {
                key: e.key().unwrap_or_default().to_string(),
                code: e.code().unwrap_or_default().to_string(),
                message: e.message().unwrap_or_default().to_string(),
            }));
        }

        Ok(failures)
    }

    /// List with the original marker-based paging
    pub async fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects()
                .bucket(bucket)
                .set_prefix(prefix.map(str::to_string))
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| Error::s3("ListObjects", e))?;

            for object in output.contents() {
                objects.push(ObjectInfo {
                    bucket: bucket.to_string(),
                    key: object.key().unwrap_or_default().to_string(),
                    size: object.size().unwrap_or_default().max(0) as u64,
                    etag: object.e_tag().unwrap_or_default().to_string(),
                    last_modified: object.last_modified().map(|d| d.secs()),
                });
            }

            if !output.is_truncated().unwrap_or(false) {
                break;
            }
            // Without a delimiter the server may omit NextMarker; the last key resumes the listing
            marker = output
                .next_marker()
                .map(str::to_string)
                .or_else(|| objects.last().map(|o| o.key.clone()));
            if marker.is_none() {
                break;
            }
        }

        Ok(objects)
    }

    /// List with continuation-token paging
    pub async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_prefix(prefix.map(str::to_string))
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| Error::s3("ListObjectsV2", e))?;

            for object in output.contents() {
                objects.push(ObjectInfo {
                    bucket: bucket.to_string(),
                    key: object.key().unwrap_or_default().to_string(),
                    size: object.size().unwrap_or_default().max(0) as u64,
                    etag: object.e_tag().unwrap_or_default().to_string(),
                    last_modified: object.last_modified().map(|d| d.secs()),
                });
            }

            token = output.next_continuation_token().map(str::to_string);
            if !output.is_truncated().unwrap_or(false) || token.is_none() {
                break;
            }
        }

        Ok(objects)
    }

    // === Presigning ===

    pub async fn presigned_get_object(
        &self,
        bucket: &str,
        key: &str,
        expires: Duration,
    ) -> Result<PresignedUrl> {
        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config(expires)?)
            .await
            .map_err(|e| Error::s3("PresignGetObject", e))?;
        Ok(PresignedUrl {
            url: request.uri().to_string(),
            headers: collect_headers(request.headers()),
        })
    }

    pub async fn presigned_put_object(
        &self,
        bucket: &str,
        key: &str,
        expires: Duration,
    ) -> Result<PresignedUrl> {
        let request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config(expires)?)
            .await
            .map_err(|e| Error::s3("PresignPutObject", e))?;
        Ok(PresignedUrl {
            url: request.uri().to_string(),
            headers: collect_headers(request.headers()),
        })
    }

    /// Sign a POST policy with this client's credentials
    pub fn presigned_post_policy(&self, policy: &PostPolicy) -> Result<PostForm> {
        policy.sign(&self.server, &self.endpoint_url, chrono::Utc::now())
    }

    // === Select ===

    pub async fn select_object_content(
        &self,
        bucket: &str,
        key: &str,
        request: &SelectRequest,
    ) -> Result<SelectStream> {
        let mut call = self
            .client
            .select_object_content()
            .bucket(bucket)
            .key(key)
            .expression(&request.expression)
            .expression_type(ExpressionType::Sql)
            .input_serialization((&request.input).into())
            .output_serialization((&request.output).into());
        if request.request_progress {
            call = call.request_progress(RequestProgress::builder().enabled(true).build());
        }

        let output = call
            .send()
            .await
            .map_err(|e| Error::s3("SelectObjectContent", e))?;
        Ok(SelectStream {
            output,
            records: 0,
        })
    }
}

/// Creating a bucket the caller already owns counts as success
fn accept_already_owned(bucket: &str, result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.s3_code() == Some("BucketAlreadyOwnedByYou") => {
            debug!(bucket, "bucket already owned");
            Ok(())
        }
        other => other,
    }
}

fn presigning_config(expires: Duration) -> Result<PresigningConfig> {
    PresigningConfig::expires_in(expires).map_err(|e| Error::Config(e.to_string()))
}

fn collect_headers<'a>(headers: impl Iterator<Item = (&'a str, &'a str)>) -> Vec<(String, String)> {
    headers
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Event stream of a select call, yielding record payloads
pub struct SelectStream {
    output: SelectObjectContentOutput,
    records: usize,
}

#[async_trait]
impl RecordStream for SelectStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let event = self
                .output
                .payload
                .recv()
                .await
                .map_err(|e| Error::s3("SelectObjectContent", e))?;

            match event {
                Some(SelectObjectContentEventStream::Records(records)) => {
                    if let Some(payload) = records.payload() {
                        self.records += 1;
                        return Ok(Some(payload.as_ref().to_vec()));
                    }
                }
                Some(SelectObjectContentEventStream::End(_)) | None => {
                    trace!(chunks = self.records, "select stream ended");
                    return Ok(None);
                }
                // Stats, progress and keep-alive events carry no records
                Some(_) => {}
            }
        }
    }
}

#[async_trait]
impl SelectTarget for S3Client {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        S3Client::put_object(self, bucket, key, body).await
    }

    async fn select_object_content(
        &self,
        bucket: &str,
        key: &str,
        request: &SelectRequest,
    ) -> Result<Box<dyn RecordStream>> {
        let stream = S3Client::select_object_content(self, bucket, key, request).await?;
        Ok(Box::new(stream))
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<()> {
        S3Client::remove_object(self, bucket, key).await
    }
}
