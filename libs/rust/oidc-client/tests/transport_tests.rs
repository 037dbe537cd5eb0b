//! Refresh round trips over real HTTP against a wiremock server.

use oidc_client::{
    ACCESS_TOKEN_KEY, ClientConfig, Headers, HttpConfig, HttpTransport, KeyValueStore,
    MemoryStore, REFRESH_TOKEN_KEY, ReqwestTransport, TokenManager,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{RecordingNotifier, expired_token, init_test_tracing, valid_token};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Client {
    manager: TokenManager,
    session: Arc<MemoryStore>,
    persistent: Arc<MemoryStore>,
    notifier: Arc<RecordingNotifier>,
}

async fn client(server: &MockServer) -> Client {
    init_test_tracing();
    let session = Arc::new(MemoryStore::new());
    let persistent = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());

    session.set(ACCESS_TOKEN_KEY, &expired_token()).await.unwrap();
    persistent.set(REFRESH_TOKEN_KEY, "rt-1").await.unwrap();

    let manager = TokenManager::builder()
        .config(ClientConfig::new(server.uri()))
        .session_store(session.clone())
        .persistent_store(persistent.clone())
        .notifier(notifier.clone())
        .build()
        .unwrap();

    Client {
        manager,
        session,
        persistent,
        notifier,
    }
}

#[tokio::test]
async fn test_refresh_over_http() {
    let server = MockServer::start().await;
    let fresh = valid_token();
    Mock::given(method("GET"))
        .and(path("/token/refresh"))
        .and(header("Refresh-Token", "rt-1"))
        .and(header("Content-Type", "application/json; charset=UTF-8"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "token": fresh, "refreshToken": "rt-2" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let c = client(&server).await;
    let headers = c.manager.prepare_headers(None).await;

    assert_eq!(headers.get("Authorization"), Some(&format!("Bearer {fresh}")));
    assert_eq!(
        c.persistent.get(REFRESH_TOKEN_KEY).await.unwrap().as_deref(),
        Some("rt-2")
    );
}

#[tokio::test]
async fn test_tokens_from_response_headers_over_http() {
    let server = MockServer::start().await;
    let fresh = valid_token();
    Mock::given(method("GET"))
        .and(path("/token/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .insert_header("token", fresh.as_str())
                .insert_header("refreshToken", "rt-2"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let c = client(&server).await;
    assert_eq!(c.manager.get_access_token().await, Some(fresh));
    assert_eq!(
        c.persistent.get(REFRESH_TOKEN_KEY).await.unwrap().as_deref(),
        Some("rt-2")
    );
}

#[tokio::test]
async fn test_forbidden_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/token/refresh"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let c = client(&server).await;
    assert_eq!(c.manager.get_access_token().await, None);
    assert_eq!(c.notifier.logouts(), 1);
    assert_eq!(c.session.get(ACCESS_TOKEN_KEY).await.unwrap(), None);
    assert_eq!(c.persistent.get(REFRESH_TOKEN_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn test_server_error_page_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let c = client(&server).await;
    assert_eq!(c.manager.get_access_token().await, None);
    assert_eq!(c.notifier.logouts(), 1);
}

#[tokio::test]
async fn test_unreachable_server() {
    init_test_tracing();
    let persistent = Arc::new(MemoryStore::new());
    persistent.set(REFRESH_TOKEN_KEY, "rt-1").await.unwrap();
    let notifier = Arc::new(RecordingNotifier::new());

    let manager = TokenManager::builder()
        .config(ClientConfig::new("http://127.0.0.1:1"))
        .persistent_store(persistent.clone())
        .notifier(notifier.clone())
        .build()
        .unwrap();

    assert_eq!(manager.get_access_token().await, None);
    assert_eq!(notifier.logouts(), 1);
    assert_eq!(persistent.get(REFRESH_TOKEN_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn test_transport_returns_status_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/teapot"))
        .and(header("X-Trace", "1"))
        .respond_with(
            ResponseTemplate::new(418)
                .insert_header("X-Reply", "teapot")
                .set_body_string("short and stout"),
        )
        .mount(&server)
        .await;

    let transport =
        ReqwestTransport::new(&HttpConfig::default().with_timeout(Duration::from_secs(5))).unwrap();
    let headers = Headers::from([("X-Trace".to_string(), "1".to_string())]);
    let response = transport
        .get(&format!("{}/teapot", server.uri()), &headers)
        .await
        .unwrap();

    assert_eq!(response.status, 418);
    assert_eq!(response.headers.get("x-reply").map(String::as_str), Some("teapot"));
    assert_eq!(response.body, b"short and stout");
}
