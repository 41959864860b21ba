//! Integration tests for the login, refresh, and identity endpoints.

mod helpers;

use axum::http::{StatusCode, header};

#[tokio::test]
async fn test_login_success() {
    let app = helpers::TestApp::new().await;

    let response = app.login_form("johndoe", helpers::PASSWORD).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.get("access_token").is_some());
    assert!(response.body.get("refresh_token").is_some());
    assert_eq!(response.body["token_type"], "bearer");

    let cookies: Vec<&str> = response
        .headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("access_token=")));
    assert!(cookies.iter().any(|c| c.starts_with("refresh_token=")));
    assert!(cookies.iter().all(|c| c.contains("SameSite=Strict")));
}

#[tokio::test]
async fn test_login_invalid_password() {
    let app = helpers::TestApp::new().await;

    let response = app.login_form("johndoe", "wrongpassword").await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "AUTH_INVALID");
    assert_eq!(
        response.headers.get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );
}

#[tokio::test]
async fn test_login_nonexistent_user() {
    let app = helpers::TestApp::new().await;

    let response = app.login_form("nobody", helpers::PASSWORD).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "AUTH_INVALID");
}

#[tokio::test]
async fn test_login_inactive_user() {
    let app = helpers::TestApp::new().await;

    let response = app.login_form("dormant", helpers::PASSWORD).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "INACTIVE_USER");
}

#[tokio::test]
async fn test_me_with_token() {
    let app = helpers::TestApp::new().await;
    let token = app.login("johndoe").await;

    let response = app.request("GET", "/users/me", None, Some(&token)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["username"], "johndoe");
    assert!(response.body["data"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_me_with_cookie() {
    let app = helpers::TestApp::new().await;
    let token = app.login("johndoe").await;

    let req = axum::http::Request::get("/users/me")
        .header(header::COOKIE, format!("access_token={token}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), req)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_me_with_garbage_token() {
    let app = helpers::TestApp::new().await;

    let response = app
        .request("GET", "/users/me", None, Some("not-a-jwt"))
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "TOKEN_INVALID");
}

#[tokio::test]
async fn test_refresh_issues_new_pair() {
    let app = helpers::TestApp::new().await;
    let login = app.login_form("johndoe", helpers::PASSWORD).await;
    let refresh_token = login.body["refresh_token"].as_str().unwrap().to_string();

    let response = app
        .request(
            "POST",
            "/auth/refresh",
            Some(serde_json::json!({ "refresh_token": refresh_token })),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let access = response.body["access_token"].as_str().unwrap();
    let me = app.request("GET", "/users/me", None, Some(access)).await;
    assert_eq!(me.body["data"]["username"], "johndoe");
}

#[tokio::test]
async fn test_access_token_is_not_a_refresh_token() {
    let app = helpers::TestApp::new().await;
    let access = app.login("johndoe").await;

    let response = app
        .request(
            "POST",
            "/auth/refresh",
            Some(serde_json::json!({ "refresh_token": access })),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_all_users_excludes_requested_user() {
    let app = helpers::TestApp::new().await;
    let token = app.login("johndoe").await;
    let me = app.user_id("johndoe").await;

    let response = app
        .request("GET", &format!("/all_users?exclude={me}"), None, Some(&token))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let names: Vec<&str> = response.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert!(!names.contains(&"johndoe"));
    assert!(!names.contains(&"dormant"));
    assert!(names.contains(&"alice"));
}

#[tokio::test]
async fn test_health_check() {
    let app = helpers::TestApp::new().await;

    let response = app.request("GET", "/health", None, None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["status"], "ok");
    assert_eq!(response.body["data"]["process_id"], "integration");
}
