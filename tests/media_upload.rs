use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vidtube::staging::StagingArea;
use vidtube::storage::{
    sign_params, upload_on_media_host, CloudinaryUploader, MediaError, MediaHostConfig, MediaUploader,
    SignatureAlgorithm,
};

fn uploader(server: &MockServer) -> CloudinaryUploader {
    CloudinaryUploader::new(MediaHostConfig {
        cloud_name: "demo".into(),
        api_key: "123456".into(),
        api_secret: "shh".into(),
        api_base: server.uri(),
        timeout: Duration::from_secs(5),
        signature_algorithm: SignatureAlgorithm::Sha1,
    })
    .unwrap()
}

fn staging() -> (tempfile::TempDir, StagingArea) {
    let tmp = tempfile::tempdir().unwrap();
    let area = StagingArea::new(tmp.path().join("temp")).unwrap();
    (tmp, area)
}

fn staged_count(area: &StagingArea) -> usize {
    std::fs::read_dir(area.root()).unwrap().count()
}

fn cloudinary_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "public_id": "sample",
        "version": 1312461204,
        "width": 1,
        "height": 1,
        "format": "png",
        "resource_type": "image",
        "bytes": 16,
        "url": "http://res.cloudinary.com/demo/image/upload/v1312461204/sample.png",
        "secure_url": "https://res.cloudinary.com/demo/image/upload/v1312461204/sample.png"
    }))
}

#[tokio::test]
async fn successful_upload_returns_metadata_and_removes_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1_1/demo/auto/upload"))
        .and(body_string_contains("name=\"api_key\""))
        .and(body_string_contains("name=\"signature\""))
        .and(body_string_contains("name=\"timestamp\""))
        .respond_with(cloudinary_ok())
        .expect(1)
        .mount(&server)
        .await;

    let (_tmp, area) = staging();
    let staged = area.stage("avatar", Some("me.png".into()), b"\x89PNG\r\n\x1a\n").await.unwrap();
    let up = uploader(&server);

    let media = upload_on_media_host(&up, Some(staged)).await.unwrap();
    assert_eq!(media.url, "http://res.cloudinary.com/demo/image/upload/v1312461204/sample.png");
    assert_eq!(media.public_id, "sample");
    assert_eq!(media.resource_type, "image");
    assert_eq!(media.format.as_deref(), Some("png"));
    assert_eq!(media.width, Some(1));
    assert!(media.duration.is_none());
    assert_eq!(staged_count(&area), 0);
}

#[tokio::test]
async fn provider_rejection_surfaces_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1_1/demo/auto/upload"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Invalid Signature" }
        })))
        .mount(&server)
        .await;

    let (_tmp, area) = staging();
    let staged = area.stage("avatar", None, b"bytes").await.unwrap();
    let err = uploader(&server).upload(staged.path()).await.unwrap_err();
    match err {
        MediaError::Rejected { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid Signature");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // a direct upload leaves the local file alone
    assert!(staged.path().exists());
}

#[tokio::test]
async fn failed_upload_yields_none_and_removes_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (_tmp, area) = staging();
    let staged = area.stage("coverImage", None, b"bytes").await.unwrap();
    assert!(upload_on_media_host(&uploader(&server), Some(staged)).await.is_none());
    assert_eq!(staged_count(&area), 0);
}

#[tokio::test]
async fn unreachable_host_is_not_an_error() {
    let server = MockServer::start().await;
    let up = uploader(&server);
    drop(server);

    let (_tmp, area) = staging();
    let staged = area.stage("avatar", None, b"bytes").await.unwrap();
    assert!(upload_on_media_host(&up, Some(staged)).await.is_none());
    assert_eq!(staged_count(&area), 0);
}

#[tokio::test]
async fn no_file_means_no_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(cloudinary_ok())
        .expect(0)
        .mount(&server)
        .await;
    assert!(upload_on_media_host(&uploader(&server), None).await.is_none());
}

// Pull a text part out of a multipart body.
fn form_value(body: &str, name: &str) -> Option<String> {
    let marker = format!("name=\"{name}\"\r\n\r\n");
    let start = body.find(&marker)? + marker.len();
    let end = body[start..].find("\r\n")? + start;
    Some(body[start..end].to_string())
}

async fn sent_signature(algorithm: SignatureAlgorithm) -> (String, String) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(cloudinary_ok())
        .mount(&server)
        .await;
    let up = CloudinaryUploader::new(MediaHostConfig {
        cloud_name: "demo".into(),
        api_key: "123456".into(),
        api_secret: "shh".into(),
        api_base: server.uri(),
        timeout: Duration::from_secs(5),
        signature_algorithm: algorithm,
    })
    .unwrap();

    let (_tmp, area) = staging();
    let staged = area.stage("avatar", None, b"bytes").await.unwrap();
    up.upload(staged.path()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body).into_owned();
    let timestamp = form_value(&body, "timestamp").unwrap();
    let signature = form_value(&body, "signature").unwrap();
    (timestamp, signature)
}

#[tokio::test]
async fn uploads_are_signed_with_sha1_by_default() {
    let (timestamp, signature) = sent_signature(SignatureAlgorithm::default()).await;
    assert_eq!(signature.len(), 40);
    assert_eq!(signature, sign_params(&[("timestamp", timestamp)], "shh", SignatureAlgorithm::Sha1));
}

#[tokio::test]
async fn sha256_signing_can_be_selected() {
    let (timestamp, signature) = sent_signature(SignatureAlgorithm::Sha256).await;
    assert_eq!(signature.len(), 64);
    assert_eq!(signature, sign_params(&[("timestamp", timestamp)], "shh", SignatureAlgorithm::Sha256));
}
