//! Facade behavior against a scripted identity client.

use std::time::Duration;

use iamgate_core::identity::{InitOptions, OnLoad, PkceMethod};
use iamgate_core::service::default_role_name;
use iamgate_core::testing::FakeIdentityClient;
use iamgate_core::{IamService, InitOutcome, RefreshOutcome};

fn options() -> InitOptions {
    InitOptions {
        on_load: OnLoad::CheckSso,
        silent_check_sso_redirect_uri: "http://127.0.0.1:8976/silent-check-sso.html"
            .parse()
            .unwrap(),
        pkce_method: PkceMethod::S256,
        silent_check_sso_browser: false,
    }
}

fn service(client: FakeIdentityClient) -> IamService<FakeIdentityClient> {
    IamService::new(client, options())
}

#[tokio::test]
async fn test_anonymous_until_login() {
    let mut svc = service(FakeIdentityClient::with_user("alice", &["default-roles-myrealm"]));

    assert!(!svc.is_authenticated());
    assert_eq!(svc.initialize().await, InitOutcome::Anonymous);
    assert!(!svc.is_authenticated());
    assert_eq!(svc.display_name(), None);

    svc.login().await.unwrap();
    assert!(svc.is_authenticated());
    assert_eq!(svc.display_name(), Some("alice"));
}

#[tokio::test]
async fn test_existing_session_restored_by_initialize() {
    let mut svc = service(FakeIdentityClient::signed_in("alice", &["default-roles-myrealm"]));

    assert_eq!(svc.initialize().await, InitOutcome::Authenticated);
    assert_eq!(svc.display_name(), Some("alice"));
    assert!(svc.has_role(&default_role_name("myrealm")));
    assert_eq!(svc.client().init_calls, 1);
}

#[tokio::test]
async fn test_role_check_requires_exact_role() {
    let mut svc = service(FakeIdentityClient::signed_in("bob", &["other-role"]));
    svc.initialize().await;

    assert!(svc.is_authenticated());
    assert!(!svc.has_role("default-roles-myrealm"));
    assert!(svc.has_role("other-role"));
    assert!(!svc.has_role(""));
}

#[tokio::test]
async fn test_queries_without_token_are_empty() {
    let svc = service(FakeIdentityClient::default());

    assert!(!svc.is_authenticated());
    assert_eq!(svc.display_name(), None);
    assert!(!svc.has_role("default-roles-myrealm"));
}

#[tokio::test]
async fn test_logout_returns_to_anonymous() {
    let mut svc = service(FakeIdentityClient::signed_in("alice", &["default-roles-myrealm"]));
    svc.initialize().await;
    assert!(svc.is_authenticated());

    svc.logout().await.unwrap();
    assert!(!svc.is_authenticated());
    assert_eq!(svc.display_name(), None);
    assert!(!svc.has_role("default-roles-myrealm"));

    // A later handshake does not resurrect the session.
    assert_eq!(svc.initialize().await, InitOutcome::Anonymous);
}

#[tokio::test]
async fn test_failed_handshake_still_settles_anonymous() {
    let mut client = FakeIdentityClient::signed_in("alice", &[]);
    client.fail_init = true;
    let mut svc = service(client);

    assert_eq!(svc.initialize().await, InitOutcome::Failed);
    assert!(!svc.is_authenticated());
}

#[tokio::test]
async fn test_refresh_success_invokes_callback() {
    let mut client = FakeIdentityClient::signed_in("alice", &[]);
    client.refresh_needed = true;
    let mut svc = service(client);
    svc.initialize().await;

    let mut seen = None;
    let outcome = svc.refresh(|refreshed| seen = Some(refreshed)).await;

    assert_eq!(outcome, RefreshOutcome::Refreshed);
    assert_eq!(seen, Some(true));
    assert_eq!(svc.client().last_min_validity, Some(Duration::from_secs(5)));
    assert_eq!(svc.client().login_calls, 0);
}

#[tokio::test]
async fn test_refresh_of_valid_token_reports_still_valid() {
    let mut svc = service(FakeIdentityClient::signed_in("alice", &[]));
    svc.initialize().await;

    let mut seen = None;
    assert_eq!(
        svc.refresh(|refreshed| seen = Some(refreshed)).await,
        RefreshOutcome::StillValid
    );
    assert_eq!(seen, Some(false));
}

#[tokio::test]
async fn test_refresh_failure_triggers_login_once() {
    let mut client = FakeIdentityClient::signed_in("alice", &[]);
    client.fail_refresh = true;
    let mut svc = service(client);
    svc.initialize().await;

    let mut called = false;
    let outcome = svc.refresh(|_| called = true).await;

    assert_eq!(outcome, RefreshOutcome::LoginTriggered);
    assert!(!called);
    assert_eq!(svc.client().login_calls, 1);
    assert_eq!(svc.client().refresh_calls, 1);
}

#[tokio::test]
async fn test_refresh_failure_with_failing_login_is_not_surfaced() {
    let mut client = FakeIdentityClient::with_user("alice", &[]);
    client.fail_login = true;
    let mut svc = service(client);

    // No session at all: refresh fails, login fails, nothing panics or errors.
    assert_eq!(svc.refresh(|_| {}).await, RefreshOutcome::LoginTriggered);
    assert_eq!(svc.client().login_calls, 1);
    assert!(!svc.is_authenticated());
}
