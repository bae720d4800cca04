//! Object storage mirroring.
//!
//! Copies every file under a local folder into an S3 bucket, keyed by its
//! path relative to that folder, and lists what a bucket already holds.
//!
//! [`ObjectStore`] is the seam; [`S3Client`] implements it with the S3 REST
//! API and SigV4 signing. Requests use virtual-hosted addressing
//! (`<bucket>.s3.<region>.amazonaws.com`) unless an `endpoint_url` is
//! configured for an S3-compatible service, in which case path-style
//! addressing (`<endpoint>/<bucket>/<key>`) is used.
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! bucket = "ms-sos-regulations-data-december-2025"
//! root = "data"
//! # region = "us-east-1"
//! # endpoint_url = "http://localhost:4566"   # LocalStack
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use quick_xml::events::Event;
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;

use crate::aws::{canonical_query, encode_path, split_endpoint, AwsCredentials, CanonicalRequest, Signer};
use crate::config::Config;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("request to object storage failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("object storage returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("malformed object storage response: {0}")]
    Xml(String),
}

/// Result of checking whether the bucket exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    Exists,
    Missing,
    AccessDenied,
    Error(u16),
}

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: i64,
    /// Entity tag, stripped of surrounding quotes.
    pub etag: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;
    async fn head_bucket(&self) -> Result<BucketStatus, StorageError>;
    async fn create_bucket(&self) -> Result<(), StorageError>;
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError>;
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError>;
}

// ============ S3 client ============

pub struct S3Client {
    http: reqwest::Client,
    credentials: AwsCredentials,
    bucket: String,
    region: String,
    scheme: String,
    host: String,
    path_style: bool,
}

impl S3Client {
    pub fn new(
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint_url: Option<&str>,
        credentials: AwsCredentials,
    ) -> Self {
        let bucket = bucket.into();
        let region = region.into();
        let (scheme, host, path_style) = match endpoint_url {
            Some(endpoint) => {
                let (scheme, host) = split_endpoint(endpoint);
                (scheme.to_string(), host.to_string(), true)
            }
            None => (
                "https".to_string(),
                format!("{}.s3.{}.amazonaws.com", bucket, region),
                false,
            ),
        };
        Self {
            http: reqwest::Client::new(),
            credentials,
            bucket,
            region,
            scheme,
            host,
            path_style,
        }
    }

    /// Client for the configured bucket with credentials from the environment.
    pub fn from_config(config: &Config) -> Result<Self> {
        let credentials = AwsCredentials::from_env()?;
        Ok(Self::new(
            config.storage.bucket.clone(),
            config.storage_region(),
            config.storage.endpoint_url.as_deref(),
            credentials,
        ))
    }

    fn object_path(&self, key: &str) -> String {
        let encoded = encode_path(key);
        if self.path_style {
            format!("/{}/{}", self.bucket, encoded)
        } else {
            format!("/{}", encoded)
        }
    }

    fn bucket_path(&self) -> String {
        if self.path_style {
            format!("/{}", self.bucket)
        } else {
            "/".to_string()
        }
    }

    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<reqwest::Response, StorageError> {
        let signed = Signer::new(&self.credentials, &self.region, "s3").sign(
            &CanonicalRequest {
                method: method.as_str(),
                host: &self.host,
                path,
                query,
                headers: &[],
                payload: &body,
            },
            Utc::now(),
        );

        let qs = canonical_query(query);
        let url = if qs.is_empty() {
            format!("{}://{}{}", self.scheme, self.host, path)
        } else {
            format!("{}://{}{}?{}", self.scheme, self.host, path, qs)
        };

        let mut req = self.http.request(method, &url).body(body);
        for (name, value) in &signed {
            req = req.header(name.as_str(), value.as_str());
        }
        Ok(req.send().await?)
    }
}

async fn error_from(resp: reqwest::Response) -> StorageError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message = parse_error_message(&body).unwrap_or_else(|| body.chars().take(500).collect());
    StorageError::Http { status, message }
}

#[async_trait]
impl ObjectStore for S3Client {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head_bucket(&self) -> Result<BucketStatus, StorageError> {
        let resp = self
            .send(reqwest::Method::HEAD, &self.bucket_path(), &[], Vec::new())
            .await?;
        Ok(match resp.status().as_u16() {
            200..=299 => BucketStatus::Exists,
            404 => BucketStatus::Missing,
            403 => BucketStatus::AccessDenied,
            other => BucketStatus::Error(other),
        })
    }

    async fn create_bucket(&self) -> Result<(), StorageError> {
        // us-east-1 rejects an explicit location constraint.
        let body = if self.region == "us-east-1" {
            Vec::new()
        } else {
            format!(
                "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
                 <LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
                self.region
            )
            .into_bytes()
        };
        let resp = self
            .send(reqwest::Method::PUT, &self.bucket_path(), &[], body)
            .await?;
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        Ok(())
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        let resp = self
            .send(reqwest::Method::PUT, &self.object_path(key), &[], body)
            .await?;
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !prefix.is_empty() {
                query.push(("prefix".to_string(), prefix.to_string()));
            }
            if let Some(ref token) = continuation_token {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let resp = self
                .send(reqwest::Method::GET, &self.bucket_path(), &query, Vec::new())
                .await?;
            if !resp.status().is_success() {
                return Err(error_from(resp).await);
            }
            let xml = resp.text().await?;
            let page = parse_list_objects_response(&xml)?;
            objects.extend(page.objects);

            match page.next_token {
                Some(token) if page.is_truncated => continuation_token = Some(token),
                _ => break,
            }
        }

        Ok(objects)
    }
}

// ============ XML parsing ============

#[derive(Debug, Default)]
struct ListPage {
    objects: Vec<ObjectInfo>,
    is_truncated: bool,
    next_token: Option<String>,
}

/// Parse a `ListObjectsV2` response. Folder placeholder keys (`a/`) are skipped.
fn parse_list_objects_response(xml: &str) -> Result<ListPage, StorageError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = ListPage::default();
    let mut current: Option<ObjectInfo> = None;
    let mut element = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == "Contents" {
                    current = Some(ObjectInfo {
                        key: String::new(),
                        size: 0,
                        etag: String::new(),
                    });
                }
                element = name;
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| StorageError::Xml(e.to_string()))?
                    .to_string();
                match (element.as_str(), current.as_mut()) {
                    ("Key", Some(obj)) => obj.key = text,
                    ("Size", Some(obj)) => obj.size = text.parse().unwrap_or(0),
                    ("ETag", Some(obj)) => obj.etag = text.trim_matches('"').to_string(),
                    ("IsTruncated", None) => page.is_truncated = text == "true",
                    ("NextContinuationToken", None) => page.next_token = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"Contents" {
                    if let Some(obj) = current.take() {
                        if !obj.key.is_empty() && !obj.key.ends_with('/') {
                            page.objects.push(obj);
                        }
                    }
                }
                element.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(StorageError::Xml(e.to_string())),
            _ => {}
        }
    }

    Ok(page)
}

/// Message of an S3 `<Error>` body, falling back to its `<Code>`.
fn parse_error_message(xml: &str) -> Option<String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut element = String::new();
    let mut code = None;
    let mut message = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                element = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().ok()?.to_string();
                match element.as_str() {
                    "Message" => message = Some(text),
                    "Code" => code = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => element.clear(),
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
    }
    message.or(code).filter(|m| !m.is_empty())
}

// ============ Folder mirror ============

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub failed: usize,
}

/// Object key for `path`: its path relative to `root`, `/`-separated.
pub fn object_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Make sure the bucket exists, creating it when missing.
pub async fn ensure_bucket(store: &dyn ObjectStore) -> Result<()> {
    match store.head_bucket().await? {
        BucketStatus::Exists => {
            tracing::info!(bucket = store.bucket(), "bucket already exists");
        }
        BucketStatus::Missing => {
            tracing::info!(bucket = store.bucket(), "creating bucket");
            store
                .create_bucket()
                .await
                .with_context(|| format!("Failed to create bucket {}", store.bucket()))?;
        }
        BucketStatus::AccessDenied => {
            bail!("access denied to bucket {}; check permissions", store.bucket())
        }
        BucketStatus::Error(status) => {
            bail!("error checking bucket {} (HTTP {})", store.bucket(), status)
        }
    }
    Ok(())
}

/// Upload every file under `root` to the store, one at a time.
///
/// A file that cannot be read or uploaded is logged and skipped.
pub async fn mirror_folder(store: &dyn ObjectStore, root: &Path) -> Result<UploadSummary> {
    ensure_bucket(store).await?;

    if !root.is_dir() {
        bail!(
            "folder '{}' not found; create it and put the documents inside",
            root.display()
        );
    }
    tracing::info!(root = %root.display(), bucket = store.bucket(), "starting upload");

    let mut summary = UploadSummary::default();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                summary.failed += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(key) = object_key(root, path) else {
            continue;
        };

        tracing::info!(%key, "uploading");
        let result = match tokio::fs::read(path).await {
            Ok(body) => store.put_object(&key, body).await.map_err(anyhow::Error::from),
            Err(e) => Err(anyhow::Error::from(e)),
        };
        match result {
            Ok(()) => summary.uploaded += 1,
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(%key, error = %e, "failed to upload");
            }
        }
    }

    tracing::info!(
        uploaded = summary.uploaded,
        failed = summary.failed,
        bucket = store.bucket(),
        "upload finished"
    );
    Ok(summary)
}
