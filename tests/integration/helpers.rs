//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tower::ServiceExt;

use chathub_api::{AppState, build_router};
use chathub_auth::{Authenticator, MemoryUserDirectory, PasswordHasher, TokenService};
use chathub_core::config::{AppConfig, SeedUser};
use chathub_core::types::ProcessId;
use chathub_realtime::RealtimeEngine;
use chathub_store::StoreManager;

/// Password shared by every seeded test user.
pub const PASSWORD: &str = "secret";

/// Client side of a test WebSocket.
pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Realtime engine behind the router
    pub engine: Arc<RealtimeEngine>,
    /// Seeded user directory
    pub directory: Arc<MemoryUserDirectory>,
    /// Application config
    pub config: AppConfig,
}

/// Response captured by [`TestApp::request`].
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: axum::http::HeaderMap,
    /// Parsed JSON body
    pub body: Value,
}

impl TestApp {
    /// Create a new test application with the memory store and four users,
    /// one of them inactive.
    pub async fn new() -> Self {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "integration-test-secret-0123456789".to_string();
        config.users = ["johndoe", "alice", "bob", "dormant"]
            .iter()
            .map(|name| SeedUser {
                id: None,
                username: name.to_string(),
                password: PASSWORD.to_string(),
                full_name: None,
                email: None,
                active: *name != "dormant",
            })
            .collect();

        let directory = Arc::new(
            MemoryUserDirectory::from_seed(&config.users, &PasswordHasher::new())
                .expect("Failed to seed users"),
        );
        let authenticator = Arc::new(Authenticator::new(
            directory.clone(),
            TokenService::new(&config.auth),
        ));
        let stores = StoreManager::in_memory(&config.presence, &config.cluster);
        let engine = Arc::new(RealtimeEngine::new(
            ProcessId::new("integration"),
            stores,
            Arc::clone(&authenticator),
            config.realtime.clone(),
            config.presence.clone(),
        ));
        engine.start().await.expect("Failed to start engine");

        let state = AppState::new(
            Arc::new(config.clone()),
            authenticator,
            Arc::clone(&engine),
        );
        let router = build_router(state);

        Self {
            router,
            engine,
            directory,
            config,
        }
    }

    /// Send a JSON request through the router.
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let body_str = body
            .map(|b| serde_json::to_string(&b).expect("Failed to serialize body"))
            .unwrap_or_default();

        let mut req = Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");

        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let req = req
            .body(Body::from(body_str))
            .expect("Failed to build request");
        self.send(req).await
    }

    /// Post the login form.
    pub async fn login_form(&self, username: &str, password: &str) -> TestResponse {
        let req = Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("username={username}&password={password}")))
            .expect("Failed to build request");
        self.send(req).await
    }

    /// Log in and return the access token.
    pub async fn login(&self, username: &str) -> String {
        let response = self.login_form(username, PASSWORD).await;
        assert_eq!(response.status, StatusCode::OK, "login failed for {username}");
        response.body["access_token"]
            .as_str()
            .expect("access_token missing")
            .to_string()
    }

    /// User ID of a seeded user, as a string.
    pub async fn user_id(&self, username: &str) -> String {
        let token = self.login(username).await;
        let response = self.request("GET", "/users/me", None, Some(&token)).await;
        response.body["data"]["id"]
            .as_str()
            .expect("id missing")
            .to_string()
    }

    /// Serve the router on an ephemeral local port.
    pub async fn spawn(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("No local address");
        let router = self.router.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        addr
    }

    async fn send(&self, req: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");

        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Open a WebSocket to the chat endpoint.
pub async fn connect(addr: SocketAddr, token: &str) -> WsClient {
    let url = format!("ws://{addr}/ws/chat?access_token={token}");
    let (stream, _) = connect_async(url).await.expect("WebSocket connect failed");
    stream
}

/// Next JSON text frame, skipping pings.
pub async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("Timed out waiting for a frame")
            .expect("Stream ended")
            .expect("WebSocket error");
        match msg {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("Frame is not JSON");
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Unexpected frame: {other:?}"),
        }
    }
}

/// Send a JSON text frame.
pub async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("Failed to send frame");
}

/// Read and discard the two snapshot frames sent after connect.
pub async fn skip_snapshots(ws: &mut WsClient) {
    let own = next_json(ws).await;
    assert!(own.get("user").is_some(), "expected own profile, got {own}");
    let users = next_json(ws).await;
    assert!(users.get("users").is_some(), "expected user list, got {users}");
}
