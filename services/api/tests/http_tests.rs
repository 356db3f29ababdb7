//! services/api/tests/http_tests.rs
//!
//! Drives the full router in-process against the in-memory store and a
//! temporary files directory.

use api_lib::adapters::{Argon2Hasher, FsBlobStorage, TokenIssuer};
use api_lib::config::Config;
use api_lib::web::{router, AppState};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use pastebin_core::{BinRepository, MemoryStore, UserRepository};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "pastebin-test-boundary";

struct TestApp {
    app: Router,
    files: TempDir,
}

fn test_app() -> TestApp {
    test_app_with(&[])
}

/// Builds the app with `vars` standing in for the environment.
fn test_app_with(vars: &[(&str, &str)]) -> TestApp {
    let files = tempfile::tempdir().unwrap();
    let config = Config::from_lookup(|name| {
        vars.iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    })
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let bins = BinRepository::new(store.clone(), Arc::new(FsBlobStorage::new(files.path())));
    let users = UserRepository::new(store, Arc::new(Argon2Hasher::new()));
    let tokens = TokenIssuer::new(b"http-test-secret", 1);

    let state = Arc::new(AppState::new(bins, users, tokens, Arc::new(config)));
    TestApp {
        app: router(state),
        files,
    }
}

impl TestApp {
    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn create_bin(&self, alias: &str, contain: &str) -> Value {
        let (status, body) = self
            .send(json_request(
                Method::POST,
                "/bins",
                json!({ "alias": alias, "contain": contain }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn multipart_request(alias: Option<&str>, file: Option<(&str, &[u8])>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(alias) = alias {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"alias\"\r\n\r\n{alias}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/bins/files")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

//=========================================================================================
// Bins
//=========================================================================================

#[tokio::test]
async fn text_bin_lifecycle() {
    let app = test_app();

    let created = app.create_bin("hello", "world").await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["alias"], "hello");
    assert_eq!(created["kind"], "text");
    assert_eq!(created["clic"], 0);

    let (status, body) = app.send(get("/bins/hello")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contain"], "world");
    assert_eq!(body["clic"], 1);
    let (_, body) = app.send(get("/bins/hello")).await;
    assert_eq!(body["clic"], 2);

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/bins",
            json!({ "alias": "hello", "contain": "other" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("hello"));

    let (status, body) = app
        .send(json_request(
            Method::PUT,
            &format!("/bins/{id}"),
            json!({ "alias": "hello2", "contain": "updated" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alias"], "hello2");
    assert_eq!(body["clic"], 2);
    assert_eq!(app.send(get("/bins/hello")).await.0, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send(
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/bins/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contain"], "updated");
    assert_eq!(body["clic"], 2);

    let (status, body) = app.send(get("/bins/hello2")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn invalid_aliases_are_rejected() {
    let app = test_app();
    for alias in ["statistics", "files", "has space", "../up"] {
        let (status, _) = app
            .send(json_request(
                Method::POST,
                "/bins",
                json!({ "alias": alias, "contain": "x" }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "alias {alias:?}");
    }
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let app = test_app();
    let (status, _) = app
        .send(json_request(
            Method::PUT,
            "/bins/does-not-exist",
            json!({ "contain": "x" }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(json_request(
            Method::PUT,
            "/bins/does-not-exist/expiration",
            json!({ "seconds": 60 }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listing_and_statistics_agree() {
    let app = test_app();
    app.create_bin("a", "1").await;
    app.create_bin("b", "2").await;
    app.create_bin("", "id only").await;
    app.send(get("/bins/a")).await;
    app.send(get("/bins/a")).await;
    app.send(get("/bins/b")).await;

    let (status, list) = app.send(get("/bins")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 3);

    let (status, stats) = app.send(get("/bins/statistics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["bin_count"], 3);
    let mut clicks: Vec<u64> = stats["clicks_by_bin"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["clicks"].as_u64().unwrap())
        .collect();
    clicks.sort_unstable();
    assert_eq!(clicks, vec![0, 1, 2]);
}

#[tokio::test]
async fn expiration_can_be_renewed() {
    let app = test_app();
    let created = app.create_bin("renew", "x").await;
    let id = created["id"].as_str().unwrap();

    let (status, _) = app
        .send(json_request(
            Method::PUT,
            &format!("/bins/{id}/expiration"),
            json!({ "seconds": 0 }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(json_request(
            Method::PUT,
            &format!("/bins/{id}/expiration"),
            json!({ "seconds": 3600 }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let before: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(created["expires_at"].clone()).unwrap();
    let after: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(body["expires_at"].clone()).unwrap();
    assert!(after < before);
}

//=========================================================================================
// Files
//=========================================================================================

#[tokio::test]
async fn file_bin_upload_and_download() {
    let app = test_app();

    let (status, body) = app
        .send(multipart_request(Some("pic"), Some(("Photo.PNG", b"\x89PNG data"))))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["kind"], "file");
    let id = body["id"].as_str().unwrap();
    let stored = format!("{id}.png");
    assert_eq!(body["contain"], stored.as_str());
    assert!(app.files.path().join(&stored).exists());

    let response = app.app.clone().oneshot(get("/bins/pic/file")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("\"pic.png\""), "{disposition}");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"\x89PNG data");

    // A second upload under the same alias conflicts and keeps the first file.
    let (status, _) = app
        .send(multipart_request(Some("pic"), Some(("other.png", b"other"))))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        std::fs::read(app.files.path().join(&stored)).unwrap(),
        b"\x89PNG data"
    );

    // Deleting the bin removes the file.
    let (status, _) = app
        .send(
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/bins/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!app.files.path().join(&stored).exists());
}

#[tokio::test]
async fn file_bins_cannot_be_pointed_at_another_file() {
    let app = test_app();
    let (_, victim) = app
        .send(multipart_request(Some("victim"), Some(("a.png", b"secret"))))
        .await;
    let (_, other) = app
        .send(multipart_request(Some("other"), Some(("b.png", b"mine"))))
        .await;
    let other_id = other["id"].as_str().unwrap();

    let (status, body) = app
        .send(json_request(
            Method::PUT,
            &format!("/bins/{other_id}"),
            json!({ "alias": "other", "contain": victim["contain"], "kind": "file" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let text = app.create_bin("note", "hi").await;
    let (status, _) = app
        .send(json_request(
            Method::PUT,
            &format!("/bins/{}", text["id"].as_str().unwrap()),
            json!({ "alias": "note", "contain": victim["contain"], "kind": "file" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Renaming keeps the stored file and leaves the old alias free.
    let (status, body) = app
        .send(json_request(
            Method::PUT,
            &format!("/bins/{other_id}"),
            json!({ "alias": "renamed" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contain"], other["contain"]);
    let (status, _) = app
        .send(multipart_request(Some("other"), Some(("c.png", b"newcomer"))))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let response = app.app.clone().oneshot(get("/bins/renamed/file")).await.unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"mine");
    let response = app.app.clone().oneshot(get("/bins/victim/file")).await.unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"secret");
}

#[tokio::test]
async fn oversized_uploads_are_rejected_with_413() {
    let app = test_app_with(&[("MAX_UPLOAD_BYTES", "1024")]);
    let big = vec![b'x'; 4096];

    let (status, body) = app
        .send(multipart_request(Some("big"), Some(("big.bin", big.as_slice()))))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "{body}");
    assert!(body["error"].is_string());
    assert_eq!(std::fs::read_dir(app.files.path()).unwrap().count(), 0);
    assert_eq!(app.send(get("/bins/big")).await.0, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(multipart_request(Some("small"), Some(("small.bin", b"ok"))))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn upload_without_a_file_part_is_a_bad_request() {
    let app = test_app();
    let (status, body) = app.send(multipart_request(Some("nofile"), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("file"));
}

#[tokio::test]
async fn downloading_a_text_bin_is_not_found() {
    let app = test_app();
    app.create_bin("plain", "just text").await;
    let (status, _) = app.send(get("/bins/plain/file")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

//=========================================================================================
// Auth and Users
//=========================================================================================

#[tokio::test]
async fn signup_login_and_user_admin() {
    let app = test_app();
    let credentials = json!({ "email": "Alice@Example.com", "password": "s3cret" });

    assert_eq!(app.send(get("/users")).await.0, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(json_request(Method::POST, "/auth/signup", credentials.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "alice@example.com");
    assert!(body.get("password_hash").is_none());

    let (status, _) = app
        .send(json_request(Method::POST, "/auth/signup", credentials.clone()))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/auth/login",
            json!({ "email": "alice@example.com", "password": "wrong" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(json_request(Method::POST, "/auth/login", credentials))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let authed = |method: Method| {
        Request::builder()
            .method(method)
            .uri("/users")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    };

    let (status, users) = app.send(authed(Method::GET)).await;
    assert_eq!(status, StatusCode::OK);
    let users = users.as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["email"], "alice@example.com");
    assert!(users[0].get("password_hash").is_none());

    let by_email = |email: &str, token: Option<&str>| {
        let mut req = Request::builder().uri(format!("/users/by-email?email={email}"));
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        req.body(Body::empty()).unwrap()
    };
    let (status, user) = app
        .send(by_email("ALICE%40example.com", Some(token.as_str())))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["email"], "alice@example.com");
    assert_eq!(user["id"], users[0]["id"]);
    assert!(user.get("password_hash").is_none());
    assert_eq!(
        app.send(by_email("bob%40example.com", Some(token.as_str()))).await.0,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.send(by_email("alice%40example.com", None)).await.0,
        StatusCode::UNAUTHORIZED
    );

    // Dropping users leaves bins alone.
    app.create_bin("survivor", "x").await;
    let (status, body) = app.send(authed(Method::DELETE)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);
    assert_eq!(app.send(get("/bins/survivor")).await.0, StatusCode::OK);
}

#[tokio::test]
async fn garbage_tokens_are_rejected() {
    let app = test_app();
    let req = Request::builder()
        .uri("/users")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}
