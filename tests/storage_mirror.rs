//! Folder mirroring against a local S3-compatible stand-in.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Router,
};
use regassist::aws::AwsCredentials;
use regassist::storage::{self, ObjectStore, S3Client};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Clone, Default)]
struct FakeS3 {
    buckets: Arc<Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>>,
    /// Keys whose upload is rejected.
    reject: Arc<Vec<String>>,
    forbidden: bool,
}

async fn bucket_get(
    State(s3): State<FakeS3>,
    Path(bucket): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if s3.forbidden {
        return (StatusCode::FORBIDDEN, String::new());
    }
    let buckets = s3.buckets.lock().unwrap();
    let Some(objects) = buckets.get(&bucket) else {
        return (StatusCode::NOT_FOUND, String::new());
    };
    // Plain HEAD/GET without list-type is a bucket existence check.
    if !params.contains_key("list-type") {
        return (StatusCode::OK, String::new());
    }
    let prefix = params.get("prefix").cloned().unwrap_or_default();
    let contents: String = objects
        .iter()
        .filter(|(k, _)| k.starts_with(&prefix))
        .map(|(k, v)| {
            format!(
                "<Contents><Key>{}</Key><ETag>\"e\"</ETag><Size>{}</Size></Contents>",
                k.replace('&', "&amp;"),
                v.len()
            )
        })
        .collect();
    (
        StatusCode::OK,
        format!(
            "<ListBucketResult><IsTruncated>false</IsTruncated>{}</ListBucketResult>",
            contents
        ),
    )
}

async fn bucket_put(State(s3): State<FakeS3>, Path(bucket): Path<String>) -> StatusCode {
    s3.buckets.lock().unwrap().entry(bucket).or_default();
    StatusCode::OK
}

async fn object_put(
    State(s3): State<FakeS3>,
    Path((bucket, key)): Path<(String, String)>,
    body: axum::body::Bytes,
) -> StatusCode {
    if s3.reject.contains(&key) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    let mut buckets = s3.buckets.lock().unwrap();
    match buckets.get_mut(&bucket) {
        Some(objects) => {
            objects.insert(key, body.to_vec());
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn spawn(s3: FakeS3) -> String {
    let app = Router::new()
        .route("/{bucket}", get(bucket_get).put(bucket_put))
        .route("/{bucket}/{*key}", put(object_put))
        .with_state(s3);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(endpoint: &str) -> S3Client {
    S3Client::new(
        "regs",
        "us-east-1",
        Some(endpoint),
        AwsCredentials::new("AKIDTEST", "secret", None),
    )
}

fn data_tree() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    std::fs::create_dir_all(root.join("Title 10/Revenue")).unwrap();
    std::fs::create_dir_all(root.join("Title 13")).unwrap();
    std::fs::write(root.join("Title 10/Revenue/a.pdf"), b"pdf-a").unwrap();
    std::fs::write(root.join("Title 10/Revenue/a.pdf.metadata.json"), b"{}").unwrap();
    std::fs::write(root.join("Title 13/b & c.pdf"), b"pdf-b").unwrap();
    tmp
}

#[tokio::test]
async fn creates_missing_bucket_and_uploads_relative_keys() {
    let s3 = FakeS3::default();
    let endpoint = spawn(s3.clone()).await;
    let data = data_tree();
    let client = client(&endpoint);

    let summary = storage::mirror_folder(&client, data.path()).await.unwrap();
    assert_eq!(summary.uploaded, 3);
    assert_eq!(summary.failed, 0);

    let buckets = s3.buckets.lock().unwrap().clone();
    let objects = buckets.get("regs").expect("bucket created");
    let keys: Vec<_> = objects.keys().cloned().collect();
    assert_eq!(
        keys,
        vec![
            "Title 10/Revenue/a.pdf",
            "Title 10/Revenue/a.pdf.metadata.json",
            "Title 13/b & c.pdf",
        ]
    );
    assert_eq!(objects["Title 13/b & c.pdf"], b"pdf-b");

    let listed = client.list_objects("Title 10/").await.unwrap();
    let listed: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(
        listed,
        vec!["Title 10/Revenue/a.pdf", "Title 10/Revenue/a.pdf.metadata.json"]
    );
}

#[tokio::test]
async fn failed_upload_is_skipped_and_counted() {
    let s3 = FakeS3 {
        reject: Arc::new(vec!["Title 13/b & c.pdf".to_string()]),
        ..FakeS3::default()
    };
    s3.buckets
        .lock()
        .unwrap()
        .insert("regs".to_string(), BTreeMap::new());
    let endpoint = spawn(s3.clone()).await;
    let data = data_tree();

    let summary = storage::mirror_folder(&client(&endpoint), data.path())
        .await
        .unwrap();
    assert_eq!(summary.uploaded, 2);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn access_denied_aborts_before_upload() {
    let s3 = FakeS3 {
        forbidden: true,
        ..FakeS3::default()
    };
    let endpoint = spawn(s3.clone()).await;
    let data = data_tree();

    let err = storage::mirror_folder(&client(&endpoint), data.path())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("access denied"), "{}", err);
    assert!(s3.buckets.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_local_folder_is_an_error() {
    let endpoint = spawn(FakeS3::default()).await;
    let tmp = TempDir::new().unwrap();
    let err = storage::mirror_folder(&client(&endpoint), &tmp.path().join("data"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"), "{}", err);
}

#[test]
fn bucket_name_is_reported() {
    let c = client("http://127.0.0.1:1");
    assert_eq!(c.bucket(), "regs");
}
