mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{logged_in_client, FakeBackend, STUDENT_EMAIL, STUDENT_PASSWORD};
use exam_session::error::{ApiError, AppError, SessionError};
use exam_session::services::AuthService;
use exam_session::{ApiRequest, CredentialEvent, CredentialStore, HttpTransport, AuthorizedClient, Role};
use futures::future::join_all;
use serde_json::Value;

#[tokio::test(start_paused = true)]
async fn concurrent_expired_calls_share_a_single_refresh() {
    let backend = FakeBackend::new();
    backend.set_refresh_delay(Duration::from_millis(100));
    let (client, store) = logged_in_client(&backend);
    backend.expire_access_token();

    let calls = (0..5).map(|_| client.send_json::<Value>(ApiRequest::get("/ping")));
    let results = join_all(calls).await;

    assert!(results.iter().all(|r| r.is_ok()), "{results:?}");
    assert_eq!(backend.refresh_calls(), 1);
    // 每个调用：第一次 401 + 续期后重试一次
    assert_eq!(backend.count("GET", "/ping"), 10);
    assert_eq!(store.access_token(), backend.current_access_token());
    assert_eq!(client.refresher().refresh_count(), 1);
    assert!(!client.refresher().is_refreshing());
}

#[tokio::test(start_paused = true)]
async fn calls_arriving_during_refresh_join_it() {
    let backend = FakeBackend::new();
    backend.set_refresh_delay(Duration::from_millis(500));
    let (client, _store) = logged_in_client(&backend);
    backend.expire_access_token();

    let first = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.send(ApiRequest::get("/ping")).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(client.refresher().is_refreshing());

    let second = client.send(ApiRequest::get("/ping")).await.unwrap();
    let first = first.await.unwrap().unwrap();

    assert!(first.is_success());
    assert!(second.is_success());
    assert_eq!(backend.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_refresh_terminates_every_pending_call_and_clears_once() {
    let backend = FakeBackend::new();
    backend.set_refresh_delay(Duration::from_millis(50));
    backend.set_refresh_status(403);
    let (client, store) = logged_in_client(&backend);
    let mut events = store.subscribe();
    backend.expire_access_token();

    let calls = (0..3).map(|_| client.send(ApiRequest::get("/ping")));
    let results = join_all(calls).await;

    for result in &results {
        let error = result.as_ref().unwrap_err();
        assert!(error.is_session_terminated(), "{error:?}");
    }
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(backend.count("GET", "/ping"), 3);
    assert!(!store.is_authenticated());

    let mut cleared = 0;
    while let Ok(event) = events.try_recv() {
        if event == CredentialEvent::Cleared {
            cleared += 1;
        }
    }
    assert_eq!(cleared, 1);
}

#[tokio::test]
async fn forbidden_response_clears_the_session_without_refreshing() {
    let backend = FakeBackend::new();
    let (client, store) = logged_in_client(&backend);
    let mut events = store.subscribe();

    let error = client
        .send(ApiRequest::get("/admin/users"))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        AppError::Session(SessionError::SessionTerminated { .. })
    ));
    assert_eq!(backend.refresh_calls(), 0);
    assert_eq!(backend.count("GET", "/admin/users"), 1);
    assert!(!store.is_authenticated());
    assert_eq!(events.try_recv().unwrap(), CredentialEvent::Cleared);
}

#[tokio::test]
async fn a_second_unauthorized_response_is_not_retried_again() {
    let backend = FakeBackend::new();
    let (client, store) = logged_in_client(&backend);

    let error = client
        .send(ApiRequest::get("/always-401"))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        AppError::Session(SessionError::Unauthorized { .. })
    ));
    assert_eq!(backend.count("GET", "/always-401"), 2);
    assert_eq!(backend.refresh_calls(), 1);
    // 续期本身成功了，凭证保留
    assert!(store.is_authenticated());
}

#[tokio::test]
async fn unavailable_refresh_keeps_the_credential() {
    let backend = FakeBackend::new();
    backend.set_refresh_status(503);
    let (client, store) = logged_in_client(&backend);
    let before = store.get();
    backend.expire_access_token();

    let error = client.send(ApiRequest::get("/ping")).await.unwrap_err();

    assert!(matches!(
        error,
        AppError::Session(SessionError::RefreshUnavailable { .. })
    ));
    assert!(error.is_transient());
    assert_eq!(store.get(), before);
}

#[tokio::test]
async fn validation_errors_pass_through_untouched() {
    let backend = FakeBackend::new();
    let (client, store) = logged_in_client(&backend);

    let error = client
        .send_json::<Value>(ApiRequest::get("/no-such-route"))
        .await
        .unwrap_err();

    match error {
        AppError::Api(ApiError::BadResponse {
            status, message, ..
        }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "No route");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(store.is_authenticated());
    assert_eq!(backend.refresh_calls(), 0);
}

#[tokio::test]
async fn stale_token_uses_the_already_renewed_credential() {
    let backend = FakeBackend::new();
    let (client, store) = logged_in_client(&backend);

    let renewed = client
        .refresher()
        .refresh_stale(Some("access-from-before"))
        .await
        .unwrap();

    assert_eq!(Some(renewed.access_token), store.access_token());
    assert_eq!(backend.refresh_calls(), 0);
}

#[tokio::test]
async fn missing_credential_is_reported_as_not_authenticated() {
    let backend = FakeBackend::new();
    let transport: Arc<dyn HttpTransport> = backend.clone();
    let client = AuthorizedClient::new(transport, CredentialStore::in_memory());

    let error = client.send(ApiRequest::get("/ping")).await.unwrap_err();

    assert!(matches!(
        error,
        AppError::Session(SessionError::NotAuthenticated { .. })
    ));
    assert_eq!(backend.calls()[0].bearer, None);
    assert_eq!(backend.refresh_calls(), 0);
}

#[tokio::test]
async fn login_stores_credential_and_bad_password_does_not_refresh() {
    let backend = FakeBackend::new();
    let store = CredentialStore::in_memory();
    let transport: Arc<dyn HttpTransport> = backend.clone();
    let auth = AuthService::new(Arc::new(AuthorizedClient::new(transport, store.clone())));

    let error = auth.login(STUDENT_EMAIL, "yanlis").await.unwrap_err();
    assert_eq!(error.status(), Some(401));
    assert!(!store.is_authenticated());
    assert_eq!(backend.refresh_calls(), 0);

    let identity = auth.login(STUDENT_EMAIL, STUDENT_PASSWORD).await.unwrap();
    assert_eq!(identity.role, Role::Student);
    assert_eq!(store.access_token(), backend.current_access_token());
    assert!(auth.ensure_student().is_ok());

    let mut events = store.subscribe();
    auth.logout();
    assert!(!auth.is_authenticated());
    assert_eq!(events.try_recv().unwrap(), CredentialEvent::Cleared);
}

#[tokio::test]
async fn oauth_callback_success_and_error_codes() {
    let backend = FakeBackend::new();
    let store = CredentialStore::in_memory();
    let transport: Arc<dyn HttpTransport> = backend.clone();
    let auth = AuthService::new(Arc::new(AuthorizedClient::new(transport, store.clone())));

    let error = auth
        .complete_oauth_callback("http://localhost:3000/oauth2/callback?error=user_not_registered")
        .unwrap_err();
    assert!(matches!(
        error,
        AppError::Session(SessionError::OAuthCallback { .. })
    ));

    let missing = auth.complete_oauth_callback(
        "http://localhost:3000/oauth2/callback?accessToken=a&refreshToken=r&email=x%40okul.com",
    );
    assert!(missing.is_err());
    assert!(!store.is_authenticated());

    let identity = auth
        .complete_oauth_callback(
            "http://localhost:3000/oauth2/callback?accessToken=a1&refreshToken=r1&email=veli%40okul.com&role=ROLE_PARENT",
        )
        .unwrap();
    assert_eq!(identity.email, "veli@okul.com");
    assert_eq!(identity.role, Role::Parent);
    assert_eq!(store.refresh_token().as_deref(), Some("r1"));
    assert!(auth.ensure_student().is_err());
}
