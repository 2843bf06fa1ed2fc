//! Web API Upload Tests
//!
//! Integration tests for single and batch uploads, quotas, and limits.

mod common;

use axum::http::{HeaderName, StatusCode};
use axum_test::multipart::{MultipartForm, Part};
use serde_json::Value;

use common::{create_test_server, create_test_server_with, file_form, files_on_disk, text_part};

fn forwarded_for() -> HeaderName {
    HeaderName::from_static("x-forwarded-for")
}

#[tokio::test]
async fn test_upload_generated_name() {
    let ctx = create_test_server();

    let response = ctx
        .server
        .post("/api/upload")
        .multipart(file_form("file", "my report.txt", b"hello", None))
        .await;

    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "File uploaded successfully");

    let file = &body["file"];
    let filename = file["filename"].as_str().unwrap();
    assert_eq!(file["name"], "my report.txt");
    assert!(filename.ends_with("_my_report.txt"));
    assert!(filename
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
    assert_eq!(file["path"], format!("/storage/{filename}"));
    assert_eq!(file["size"], 5);
    assert_eq!(file["mimetype"], "text/plain");
    assert!(file["uploadedAt"].is_string());
    assert_eq!(std::fs::read(ctx.root().join(filename)).unwrap(), b"hello");
}

#[tokio::test]
async fn test_upload_declared_path() {
    let ctx = create_test_server();

    let response = ctx
        .server
        .post("/api/upload")
        .multipart(file_form("file", "b.txt", b"nested", Some("deep/er/b.txt")))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["file"]["filename"], "deep/er/b.txt");
    assert!(ctx.root().join("deep/er/b.txt").is_file());
}

#[tokio::test]
async fn test_upload_without_file() {
    let ctx = create_test_server();

    let response = ctx
        .server
        .post("/api/upload")
        .multipart(MultipartForm::new().add_text("path", "a.txt"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "No file uploaded");
}

#[tokio::test]
async fn test_upload_rejects_traversal() {
    let ctx = create_test_server();

    for path in ["../evil.txt", "sub/../../evil.txt", "/etc/evil.txt"] {
        let response = ctx
            .server
            .post("/api/upload")
            .multipart(file_form("file", "evil.txt", b"x", Some(path)))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["code"], "INVALID_PATH");
    }

    assert!(!ctx.temp_dir.path().join("evil.txt").exists());
    assert!(files_on_disk(ctx.root()).is_empty());
}

#[tokio::test]
async fn test_upload_too_large_leaves_no_partial_file() {
    let ctx = create_test_server_with(|config| config.limits.max_file_size = 16);

    let response = ctx
        .server
        .post("/api/upload")
        .multipart(file_form("file", "big.bin", &[7u8; 64], Some("big/big.bin")))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
    assert!(files_on_disk(ctx.root()).is_empty());
}

#[tokio::test]
async fn test_upload_forbidden_type() {
    let ctx = create_test_server();
    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(b"#!/bin/sh\necho hi\n".to_vec())
            .file_name("run.sh")
            .mime_type("application/x-sh"),
    );

    let response = ctx.server.post("/api/upload").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "FORBIDDEN_TYPE");
    assert!(files_on_disk(ctx.root()).is_empty());
}

#[tokio::test]
async fn test_upload_quota() {
    let ctx = create_test_server_with(|config| {
        config.limits.max_uploads_per_window = 2;
        config.web.trust_proxy_headers = true;
    });

    for _ in 0..2 {
        ctx.server
            .post("/api/upload")
            .add_header(forwarded_for(), "203.0.113.5".to_string())
            .multipart(file_form("file", "a.txt", b"a", None))
            .await
            .assert_status_ok();
    }

    let response = ctx
        .server
        .post("/api/upload")
        .add_header(forwarded_for(), "203.0.113.5".to_string())
        .multipart(file_form("file", "a.txt", b"a", None))
        .await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get("retry-after")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 3600);
    let body = response.json::<Value>();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "QUOTA_EXCEEDED");

    // Another client still has its full quota
    ctx.server
        .post("/api/upload")
        .add_header(forwarded_for(), "198.51.100.9".to_string())
        .multipart(file_form("file", "a.txt", b"a", None))
        .await
        .assert_status_ok();

    assert_eq!(files_on_disk(ctx.root()).len(), 3);
}

#[tokio::test]
async fn test_upload_quota_ignores_forwarding_headers_by_default() {
    let ctx = create_test_server_with(|config| config.limits.max_uploads_per_window = 1);

    let mut admitted = 0;
    for i in 0..5 {
        let response = ctx
            .server
            .post("/api/upload")
            .add_header(forwarded_for(), format!("10.0.0.{i}"))
            .add_header(HeaderName::from_static("x-real-ip"), format!("10.0.1.{i}"))
            .multipart(file_form("file", "a.txt", b"a", None))
            .await;
        if response.status_code() == StatusCode::OK {
            admitted += 1;
        } else {
            response.assert_status(StatusCode::TOO_MANY_REQUESTS);
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(files_on_disk(ctx.root()).len(), 1);
}

#[tokio::test]
async fn test_upload_rejects_reserved_partial_prefix() {
    let ctx = create_test_server();

    let response = ctx
        .server
        .post("/api/upload")
        .multipart(file_form(
            "file",
            "secret.txt",
            b"hidden",
            Some(".storehouse-partial-x/secret.txt"),
        ))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "INVALID_PATH");
    assert!(files_on_disk(ctx.root()).is_empty());

    let listing = ctx.server.get("/api/files").await.json::<Value>();
    assert_eq!(listing["totalFiles"], 0);
}

#[tokio::test]
async fn test_upload_url_is_percent_encoded() {
    let ctx = create_test_server();

    let response = ctx
        .server
        .post("/api/upload")
        .multipart(file_form("file", "a.txt", b"odd name", Some("my docs/a #1?.txt")))
        .await;

    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["file"]["filename"], "my docs/a #1?.txt");
    assert_eq!(body["file"]["path"], "/storage/my%20docs/a%20%231%3F.txt");

    let served = ctx.server.get("/storage/my%20docs/a%20%231%3F.txt").await;
    served.assert_status_ok();
    assert_eq!(&served.as_bytes()[..], &b"odd name"[..]);
}

#[tokio::test]
async fn test_upload_multiple() {
    let ctx = create_test_server();
    let form = MultipartForm::new()
        .add_part("files", text_part("one.txt", b"1"))
        .add_part("files", text_part("two.txt", b"22"))
        .add_text("path", "nested/three.txt")
        .add_part("files", text_part("three.txt", b"333"));

    let response = ctx.server.post("/api/upload-multiple").multipart(form).await;

    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "3 files uploaded successfully");
    assert_eq!(body["files"].as_array().unwrap().len(), 3);
    assert_eq!(body["failures"].as_array().unwrap().len(), 0);
    assert_eq!(body["totalSize"], 6);
    assert_eq!(body["files"][2]["filename"], "nested/three.txt");
}

#[tokio::test]
async fn test_upload_multiple_partial_failure() {
    let ctx = create_test_server_with(|config| config.limits.max_file_size = 8);
    let form = MultipartForm::new()
        .add_part("files", text_part("ok.txt", b"fine"))
        .add_part("files", text_part("big.txt", b"much too large"))
        .add_text("path", "../escape.txt")
        .add_part("files", text_part("escape.txt", b"x"))
        .add_part("files", text_part("ok2.txt", b"also"));

    let response = ctx.server.post("/api/upload-multiple").multipart(form).await;

    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["success"], true);
    assert_eq!(body["files"].as_array().unwrap().len(), 2);
    assert_eq!(body["totalSize"], 8);

    let failures = body["failures"].as_array().unwrap();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0]["name"], "big.txt");
    assert_eq!(failures[0]["code"], "PAYLOAD_TOO_LARGE");
    assert_eq!(failures[1]["name"], "escape.txt");
    assert_eq!(failures[1]["code"], "INVALID_PATH");

    assert_eq!(files_on_disk(ctx.root()).len(), 2);
    assert!(!ctx.temp_dir.path().join("escape.txt").exists());
}

#[tokio::test]
async fn test_upload_multiple_too_many_files() {
    let ctx = create_test_server_with(|config| config.limits.max_files_per_batch = 2);
    let form = (0..3).fold(MultipartForm::new(), |form, i| {
        form.add_part("files", text_part(&format!("f{i}.txt"), b"x"))
    });

    let response = ctx.server.post("/api/upload-multiple").multipart(form).await;

    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["files"].as_array().unwrap().len(), 2);
    assert_eq!(body["failures"][0]["name"], "f2.txt");
    assert_eq!(body["failures"][0]["code"], "TOO_MANY_FILES");
    assert_eq!(files_on_disk(ctx.root()).len(), 2);
}

#[tokio::test]
async fn test_upload_multiple_all_failed() {
    let ctx = create_test_server();
    let form = MultipartForm::new().add_part(
        "files",
        Part::bytes(b"MZ".to_vec())
            .file_name("setup.exe")
            .mime_type("application/x-msdownload"),
    );

    let response = ctx.server.post("/api/upload-multiple").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "FORBIDDEN_TYPE");
    assert_eq!(body["totalSize"], 0);
    assert!(files_on_disk(ctx.root()).is_empty());
}

#[tokio::test]
async fn test_upload_multiple_without_files() {
    let ctx = create_test_server();

    let response = ctx
        .server
        .post("/api/upload-multiple")
        .multipart(MultipartForm::new().add_text("note", "nothing here"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "No files uploaded");
}

#[tokio::test]
async fn test_upload_multiple_counts_once_against_quota() {
    let ctx = create_test_server_with(|config| config.limits.max_uploads_per_window = 1);
    let batch = || {
        MultipartForm::new()
            .add_part("files", text_part("a.txt", b"a"))
            .add_part("files", text_part("b.txt", b"b"))
    };

    ctx.server
        .post("/api/upload-multiple")
        .multipart(batch())
        .await
        .assert_status_ok();

    let response = ctx.server.post("/api/upload-multiple").multipart(batch()).await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(files_on_disk(ctx.root()).len(), 2);
}
