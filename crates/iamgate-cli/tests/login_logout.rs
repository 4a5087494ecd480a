
use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use fixtures::{
    LOGOUT_PATH, TOKEN_PATH, jwt, now, token_response, write_config, write_session,
};
use predicates::prelude::*;
use tempfile::tempdir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test(flavor = "multi_thread")]
async fn test_login_with_pasted_code_stores_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response(&jwt(
            "alice",
            &["default-roles-myrealm"],
            now() + 300,
        ))))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    write_config(dir.path(), &server.uri());
    let home = dir.path().to_path_buf();

    tokio::task::spawn_blocking(move || {
        cargo_bin_cmd!("iamgate")
            .env("IAMGATE_HOME", &home)
            .env("IAMGATE_NO_BROWSER", "1")
            .env_remove("IAMGATE_PROVIDER_URL")
            .arg("login")
            .write_stdin("abc123\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("Signed in as alice"))
            .stderr(predicate::str::contains("Authorization URL"));
    })
    .await
    .unwrap();

    let session = fs::read_to_string(dir.path().join("session.json")).unwrap();
    assert!(session.contains(&format!("{}|myrealm|mytest", server.uri())));
    assert!(session.contains("new-refresh-token"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_login_rejected_code_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    write_config(dir.path(), &server.uri());
    let home = dir.path().to_path_buf();

    tokio::task::spawn_blocking(move || {
        cargo_bin_cmd!("iamgate")
            .env("IAMGATE_HOME", &home)
            .env("IAMGATE_NO_BROWSER", "1")
            .env_remove("IAMGATE_PROVIDER_URL")
            .arg("login")
            .write_stdin("bad-code\n")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Token exchange failed"));
    })
    .await
    .unwrap();

    assert!(!dir.path().join("session.json").exists());
}

#[test]
fn test_logout_without_session() {
    let dir = tempdir().unwrap();
    write_config(dir.path(), "http://localhost:8080");

    cargo_bin_cmd!("iamgate")
        .env("IAMGATE_HOME", dir.path())
        .env("IAMGATE_NO_BROWSER", "1")
        .env_remove("IAMGATE_PROVIDER_URL")
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not logged in"));
}

#[test]
fn test_logout_clears_cache_when_provider_unreachable() {
    let dir = tempdir().unwrap();
    let url = "http://127.0.0.1:1";
    write_config(dir.path(), url);
    let exp = now() - 10;
    write_session(dir.path(), url, &jwt("alice", &[], exp), exp);

    cargo_bin_cmd!("iamgate")
        .env("IAMGATE_HOME", dir.path())
        .env("IAMGATE_NO_BROWSER", "1")
        .env_remove("IAMGATE_PROVIDER_URL")
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out"));

    let session = fs::read_to_string(dir.path().join("session.json")).unwrap();
    assert!(!session.contains("refresh-token"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_logout_ends_provider_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGOUT_PATH))
        .and(body_string_contains("refresh_token=refresh-token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    write_config(dir.path(), &server.uri());
    let exp = now() + 3600;
    write_session(dir.path(), &server.uri(), &jwt("alice", &[], exp), exp);
    let home = dir.path().to_path_buf();

    tokio::task::spawn_blocking(move || {
        cargo_bin_cmd!("iamgate")
            .env("IAMGATE_HOME", &home)
            .env("IAMGATE_NO_BROWSER", "1")
            .env_remove("IAMGATE_PROVIDER_URL")
            .arg("logout")
            .assert()
            .success()
            .stdout(predicate::str::contains("Logged out"));
    })
    .await
    .unwrap();

    let session = fs::read_to_string(dir.path().join("session.json")).unwrap();
    assert!(!session.contains("alice") && !session.contains("refresh-token"));
}

#[test]
fn test_refresh_keeps_valid_token() {
    let dir = tempdir().unwrap();
    write_config(dir.path(), "http://localhost:8080");
    let exp = now() + 3600;
    write_session(
        dir.path(),
        "http://localhost:8080",
        &jwt("alice", &[], exp),
        exp,
    );

    cargo_bin_cmd!("iamgate")
        .env("IAMGATE_HOME", dir.path())
        .env("IAMGATE_NO_BROWSER", "1")
        .env_remove("IAMGATE_PROVIDER_URL")
        .arg("refresh")
        .assert()
        .success()
        .stdout(predicate::str::contains("Token still valid"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_refresh_renews_expiring_cached_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response(&jwt(
            "alice",
            &[],
            now() + 300,
        ))))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    write_config(dir.path(), &server.uri());
    // inside the minimum validity window, so the handshake refreshes it
    let exp = now() + 2;
    write_session(dir.path(), &server.uri(), &jwt("alice", &[], exp), exp);
    let home = dir.path().to_path_buf();

    tokio::task::spawn_blocking(move || {
        cargo_bin_cmd!("iamgate")
            .env("IAMGATE_HOME", &home)
            .env("IAMGATE_NO_BROWSER", "1")
            .env_remove("IAMGATE_PROVIDER_URL")
            .arg("refresh")
            .assert()
            .success()
            .stdout(predicate::str::contains("Token still valid"));
    })
    .await
    .unwrap();

    let session = fs::read_to_string(dir.path().join("session.json")).unwrap();
    assert!(session.contains("new-refresh-token"));
}
