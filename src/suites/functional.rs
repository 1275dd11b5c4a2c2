//! Functional suite: bucket and object round trips
//!
//! Every test works in a bucket of its own, which is emptied and removed
//! when the test finishes, whatever the outcome.

use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use tracing::debug;

use super::SuiteContext;
use crate::common::{Error, Result, PRECONDITION_FAILED_MESSAGE};
use crate::fixtures;
use crate::harness::finish;
use crate::report::TestReport;
use crate::s3::post_policy::PostPolicy;
use crate::s3::CopyConditions;

const BUCKET_PREFIX: &str = "functional";
const MIB: usize = 1024 * 1024;

/// Run the functional test called `name`
pub async fn run(ctx: &SuiteContext, name: &str, report: &mut TestReport) -> Result<()> {
    if name == "make_bucket_invalid_name" {
        return make_bucket_invalid_name(ctx, report).await;
    }

    let bucket = fixtures::bucket_name(BUCKET_PREFIX);
    report.set_arg("bucket_name", bucket.as_str());
    ctx.s3.make_bucket(&bucket).await?;

    let outcome = match name {
        "make_bucket" => make_bucket(ctx, &bucket, report).await,
        "list_buckets" => list_buckets(ctx, &bucket).await,
        "put_small_object_from_stream" => put_from_stream(ctx, &bucket, report, small_size()).await,
        "put_large_object_from_stream" => {
            put_from_stream(ctx, &bucket, report, large_size(ctx)).await
        }
        "put_small_object_from_file" => put_from_file(ctx, &bucket, report, false).await,
        "put_large_object_from_file" => put_from_file(ctx, &bucket, report, true).await,
        "copy_object" => copy_object(ctx, &bucket, report).await,
        "copy_object_with_conditions" => copy_object_with_conditions(ctx, &bucket, report).await,
        "stat_object" => stat_object(ctx, &bucket, report).await,
        "get_object" => get_object(ctx, &bucket, report).await,
        "get_partial_object" => get_partial_object(ctx, &bucket, report).await,
        "fget_object" => fget_object(ctx, &bucket, report).await,
        "presigned_get_object" => presigned_get_object(ctx, &bucket, report).await,
        "presigned_put_object" => presigned_put_object(ctx, &bucket, report).await,
        "presigned_post_policy" => presigned_post_policy(ctx, &bucket, report).await,
        "list_objects" => list_objects(ctx, &bucket, report, false).await,
        "list_objects_v2" => list_objects(ctx, &bucket, report, true).await,
        "remove_objects" => remove_objects(ctx, &bucket, report).await,
        "remove_bucket" => remove_bucket(ctx, &bucket).await,
        other => Err(Error::Internal(format!("unknown functional test '{}'", other))),
    };

    let cleanup = match ctx.s3.bucket_exists(&bucket).await {
        Ok(true) => ctx.s3.purge_bucket(&bucket).await,
        Ok(false) => Ok(()),
        Err(e) => Err(e),
    };
    finish(outcome, cleanup)
}

fn small_size() -> usize {
    fixtures::paragraph().len()
}

fn large_size(ctx: &SuiteContext) -> usize {
    ctx.config.fixtures.large_object_mb * MIB
}

fn chunk_size(ctx: &SuiteContext) -> usize {
    ctx.config.fixtures.chunk_size_kb * 1024
}

fn presign_expiry(ctx: &SuiteContext, report: &mut TestReport) -> Duration {
    let secs = ctx.config.fixtures.presign_expiry_secs;
    report.set_arg("expires", secs);
    Duration::from_secs(secs)
}

fn check_size(what: &str, expected: u64, actual: u64) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::assertion(format!(
            "{} size is {}, expected {}",
            what, actual, expected
        )))
    }
}

fn check_status(method: &str, response: &reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(Error::HttpStatus {
            method: method.to_string(),
            status: status.as_u16(),
        })
    }
}

/// Upload a paragraph of generated text under a fresh key
async fn put_text(
    ctx: &SuiteContext,
    bucket: &str,
    report: &mut TestReport,
) -> Result<(String, Vec<u8>)> {
    let key = fixtures::object_name();
    let data = fixtures::paragraph().into_bytes();
    report.set_arg("object_name", key.as_str());
    ctx.s3.put_object(bucket, &key, data.clone()).await?;
    Ok((key, data))
}

async fn make_bucket(ctx: &SuiteContext, bucket: &str, report: &mut TestReport) -> Result<()> {
    report.set_arg("location", ctx.s3.region());
    if !ctx.s3.bucket_exists(bucket).await? {
        return Err(Error::assertion(format!("bucket '{}' not found after creation", bucket)));
    }
    // Creating a bucket we already own succeeds
    ctx.s3.make_bucket(bucket).await
}

async fn make_bucket_invalid_name(ctx: &SuiteContext, report: &mut TestReport) -> Result<()> {
    let bucket = fixtures::random_string(65);
    report.set_arg("bucket_name", bucket.as_str());

    match ctx.s3.make_bucket(&bucket).await {
        Ok(()) => {
            let cleanup = ctx.s3.remove_bucket(&bucket).await;
            finish(
                Err(Error::assertion("a 65-character bucket name was accepted")),
                cleanup,
            )
        }
        Err(e) => check_invalid_name_rejected(e),
    }
}

/// Only the server's `InvalidBucketName` rejection is the expected outcome
fn check_invalid_name_rejected(err: Error) -> Result<()> {
    if err.s3_code() == Some("InvalidBucketName") {
        debug!(error = %err, "invalid bucket name rejected");
        Ok(())
    } else {
        Err(err)
    }
}

async fn list_buckets(ctx: &SuiteContext, bucket: &str) -> Result<()> {
    let buckets = ctx.s3.list_buckets().await?;
    let found = buckets
        .iter()
        .find(|b| b.name == bucket)
        .ok_or_else(|| Error::assertion(format!("bucket '{}' missing from listing", bucket)))?;
    if found.creation_date.is_none() {
        return Err(Error::assertion(format!("bucket '{}' has no creation date", bucket)));
    }
    Ok(())
}

async fn put_from_stream(
    ctx: &SuiteContext,
    bucket: &str,
    report: &mut TestReport,
    size: usize,
) -> Result<()> {
    let key = fixtures::object_name();
    let data = fixtures::text(size);
    report.set_arg("object_name", key.as_str());
    report.set_arg("length", size);

    ctx.s3.put_object(bucket, &key, data).await?;
    let stat = ctx.s3.stat_object(bucket, &key).await?;
    check_size("uploaded object", size as u64, stat.size)
}

async fn put_from_file(
    ctx: &SuiteContext,
    bucket: &str,
    report: &mut TestReport,
    large: bool,
) -> Result<()> {
    let key = fixtures::object_name();
    let file = if large {
        fixtures::large_temp_file(large_size(ctx), chunk_size(ctx))?
    } else {
        fixtures::temp_file(fixtures::paragraph().as_bytes())?
    };
    let file_size = file.as_file().metadata()?.len();
    report.set_arg("object_name", key.as_str());
    report.set_arg("file_path", file.path().display().to_string());

    ctx.s3.fput_object(bucket, &key, file.path()).await?;
    let stat = ctx.s3.stat_object(bucket, &key).await?;
    check_size("uploaded object", file_size, stat.size)
}

async fn copy_object(ctx: &SuiteContext, bucket: &str, report: &mut TestReport) -> Result<()> {
    let (source, _) = put_text(ctx, bucket, report).await?;
    let dest = format!("{}-copy", source);
    report.set_arg("object_source", format!("/{}/{}", bucket, source));
    report.set_arg("object_name", dest.as_str());

    let stat = ctx.s3.stat_object(bucket, &source).await?;
    ctx.s3
        .copy_object(bucket, &dest, bucket, &source, &CopyConditions::default())
        .await?;
    let copied = ctx.s3.stat_object(bucket, &dest).await?;
    check_size("copied object", stat.size, copied.size)
}

async fn copy_object_with_conditions(
    ctx: &SuiteContext,
    bucket: &str,
    report: &mut TestReport,
) -> Result<()> {
    let (source, _) = put_text(ctx, bucket, report).await?;
    let dest = format!("{}-copycond", source);
    let conditions = CopyConditions {
        match_etag: Some("test-etag".to_string()),
    };
    report.set_arg("object_source", format!("/{}/{}", bucket, source));
    report.set_arg("object_name", dest.as_str());
    report.set_arg("conditions", "If-Match: test-etag");

    let result = ctx
        .s3
        .copy_object(bucket, &dest, bucket, &source, &conditions)
        .await;
    check_conditional_copy(result)
}

/// A copy under a non-matching etag must be refused with the standard message
fn check_conditional_copy(result: Result<()>) -> Result<()> {
    match result {
        Err(Error::PreconditionFailed(message)) if message == PRECONDITION_FAILED_MESSAGE => {
            debug!("copy refused on etag mismatch");
            Ok(())
        }
        Err(e) => Err(e),
        Ok(()) => Err(Error::assertion(
            "copy succeeded although the If-Match etag does not match",
        )),
    }
}

async fn stat_object(ctx: &SuiteContext, bucket: &str, report: &mut TestReport) -> Result<()> {
    let key = fixtures::object_name();
    let file = fixtures::temp_file(fixtures::paragraph().as_bytes())?;
    let file_size = file.as_file().metadata()?.len();
    report.set_arg("object_name", key.as_str());

    ctx.s3.fput_object(bucket, &key, file.path()).await?;
    let stat = ctx.s3.stat_object(bucket, &key).await?;
    check_size("stat", file_size, stat.size)?;
    if stat.etag.is_empty() {
        return Err(Error::assertion("stat returned no etag"));
    }
    Ok(())
}

async fn get_object(ctx: &SuiteContext, bucket: &str, report: &mut TestReport) -> Result<()> {
    let (key, data) = put_text(ctx, bucket, report).await?;

    let body = ctx.s3.get_object(bucket, &key).await?;
    let file = fixtures::temp_file(&body)?;
    let stat = ctx.s3.stat_object(bucket, &key).await?;
    check_size("downloaded object", stat.size, file.as_file().metadata()?.len())?;
    if body != data {
        return Err(Error::assertion("downloaded bytes differ from the upload"));
    }
    Ok(())
}

async fn get_partial_object(
    ctx: &SuiteContext,
    bucket: &str,
    report: &mut TestReport,
) -> Result<()> {
    const OFFSET: usize = 5;
    const LENGTH: usize = 10;

    let (key, data) = put_text(ctx, bucket, report).await?;
    report.set_arg("offset", OFFSET);
    report.set_arg("length", LENGTH);

    let part = ctx
        .s3
        .get_partial_object(bucket, &key, OFFSET as u64, LENGTH as u64)
        .await?;
    check_size("partial read", LENGTH as u64, part.len() as u64)?;
    if part != data[OFFSET..OFFSET + LENGTH] {
        return Err(Error::assertion("partial read returned the wrong bytes"));
    }
    Ok(())
}

async fn fget_object(ctx: &SuiteContext, bucket: &str, report: &mut TestReport) -> Result<()> {
    let (key, _) = put_text(ctx, bucket, report).await?;
    let target = tempfile::NamedTempFile::new()?;
    report.set_arg("file_path", target.path().display().to_string());

    let written = ctx.s3.fget_object(bucket, &key, target.path()).await?;
    let on_disk = std::fs::metadata(target.path())?.len();
    let stat = ctx.s3.stat_object(bucket, &key).await?;
    check_size("downloaded file", stat.size, on_disk)?;
    check_size("streamed download", stat.size, written)
}

async fn presigned_get_object(
    ctx: &SuiteContext,
    bucket: &str,
    report: &mut TestReport,
) -> Result<()> {
    let (key, data) = put_text(ctx, bucket, report).await?;
    let expires = presign_expiry(ctx, report);

    let presigned = ctx.s3.presigned_get_object(bucket, &key, expires).await?;
    let mut request = ctx.http.get(&presigned.url);
    for (name, value) in &presigned.headers {
        request = request.header(name, value);
    }
    let response = request.send().await?;
    check_status("GET", &response)?;

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk?);
    }
    if body != data {
        return Err(Error::assertion("presigned GET returned different bytes"));
    }
    Ok(())
}

async fn presigned_put_object(
    ctx: &SuiteContext,
    bucket: &str,
    report: &mut TestReport,
) -> Result<()> {
    let key = fixtures::object_name();
    let data = fixtures::paragraph().into_bytes();
    report.set_arg("object_name", key.as_str());
    let expires = presign_expiry(ctx, report);

    let presigned = ctx.s3.presigned_put_object(bucket, &key, expires).await?;
    let mut request = ctx.http.put(&presigned.url).body(data.clone());
    for (name, value) in &presigned.headers {
        request = request.header(name, value);
    }
    let response = request.send().await?;
    check_status("PUT", &response)?;

    let stored = ctx.s3.get_object(bucket, &key).await?;
    if stored != data {
        return Err(Error::assertion("object differs from the presigned upload"));
    }
    Ok(())
}

async fn presigned_post_policy(
    ctx: &SuiteContext,
    bucket: &str,
    report: &mut TestReport,
) -> Result<()> {
    const PREFIX: &str = "objectPrefix/";

    let mut policy = PostPolicy::new(bucket, Utc::now() + chrono::Duration::days(10));
    policy.set_key_startswith(PREFIX);
    report.set_arg("policy", format!("bucket={} key-prefix={}", policy.bucket(), PREFIX));

    let form = ctx.s3.presigned_post_policy(&policy)?;
    let key = format!("{}{}", PREFIX, fixtures::object_name());
    let data = fixtures::paragraph().into_bytes();

    let mut multipart = Form::new().text("key", key.clone());
    for (name, value) in &form.fields {
        multipart = multipart.text(name.clone(), value.clone());
    }
    // The file must be the last field of the form
    multipart = multipart.part("file", Part::bytes(data.clone()).file_name("upload.txt"));

    let response = ctx.http.post(&form.url).multipart(multipart).send().await?;
    check_status("POST", &response)?;

    let stat = ctx.s3.stat_object(bucket, &key).await?;
    check_size("posted object", data.len() as u64, stat.size)
}

async fn list_objects(
    ctx: &SuiteContext,
    bucket: &str,
    report: &mut TestReport,
    v2: bool,
) -> Result<()> {
    report.set_arg("recursive", true);
    let mut written = Vec::new();
    for _ in 0..3 {
        let (key, data) = put_text(ctx, bucket, report).await?;
        written.push((key, data.len() as u64));
    }
    report.args_mut().remove("object_name");

    let listed = if v2 {
        ctx.s3.list_objects_v2(bucket, None).await?
    } else {
        ctx.s3.list_objects(bucket, None).await?
    };

    for (key, size) in &written {
        let object = listed
            .iter()
            .find(|o| &o.key == key)
            .ok_or_else(|| Error::assertion(format!("object '{}' missing from listing", key)))?;
        check_size(&format!("listed object '{}'", key), *size, object.size)?;
        if object.etag.is_empty() || object.bucket != bucket {
            return Err(Error::assertion(format!(
                "listing entry for '{}' is incomplete",
                key
            )));
        }
    }
    Ok(())
}

async fn remove_objects(ctx: &SuiteContext, bucket: &str, report: &mut TestReport) -> Result<()> {
    let keys: Vec<String> = (0..10).map(|i| format!("newobject{}", i)).collect();
    for key in &keys {
        let file = fixtures::temp_file(fixtures::paragraph().as_bytes())?;
        ctx.s3.fput_object(bucket, key, file.path()).await?;
    }
    report.set_arg("objects_iter", keys.clone());

    let failures = ctx.s3.remove_objects(bucket, &keys).await?;
    if let Some(first) = failures.first() {
        return Err(Error::assertion(format!(
            "{} of {} deletions failed; first: '{}' {} {}",
            failures.len(),
            keys.len(),
            first.key,
            first.code,
            first.message
        )));
    }

    let remaining = ctx.s3.list_objects_v2(bucket, None).await?;
    if !remaining.is_empty() {
        return Err(Error::assertion(format!(
            "{} objects left after multi-delete",
            remaining.len()
        )));
    }
    Ok(())
}

async fn remove_bucket(ctx: &SuiteContext, bucket: &str) -> Result<()> {
    ctx.s3.remove_bucket(bucket).await?;
    if ctx.s3.bucket_exists(bucket).await? {
        return Err(Error::assertion(format!("bucket '{}' still exists", bucket)));
    }
    Ok(())
}
