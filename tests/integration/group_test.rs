//! Integration tests for group administration.

mod helpers;

use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_create_group_adds_creator() {
    let app = helpers::TestApp::new().await;
    let token = app.login("johndoe").await;
    let me = app.user_id("johndoe").await;
    let alice = app.user_id("alice").await;

    let response = app
        .request(
            "POST",
            "/groups",
            Some(json!({ "name": "team", "members": [alice] })),
            Some(&token),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    let members = response.body["data"]["members"].as_array().unwrap();
    assert_eq!(members.len(), 2);
    assert!(members.iter().any(|m| m == &json!(me)));
    assert!(members.iter().any(|m| m == &json!(alice)));
}

#[tokio::test]
async fn test_create_group_rejects_empty_members() {
    let app = helpers::TestApp::new().await;
    let token = app.login("johndoe").await;

    let response = app
        .request(
            "POST",
            "/groups",
            Some(json!({ "name": "team", "members": [] })),
            Some(&token),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "VALIDATION");
}

#[tokio::test]
async fn test_create_group_rejects_unknown_member() {
    let app = helpers::TestApp::new().await;
    let token = app.login("johndoe").await;

    let response = app
        .request(
            "POST",
            "/groups",
            Some(json!({ "name": "team", "members": [uuid::Uuid::new_v4()] })),
            Some(&token),
        )
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_group_requires_auth() {
    let app = helpers::TestApp::new().await;

    let response = app
        .request("POST", "/groups", Some(json!({ "name": "x", "members": [] })), None)
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_membership_changes_show_in_both_directions() {
    let app = helpers::TestApp::new().await;
    let token = app.login("johndoe").await;
    let alice = app.user_id("alice").await;
    let bob = app.user_id("bob").await;
    let bob_token = app.login("bob").await;

    let created = app
        .request(
            "POST",
            "/groups",
            Some(json!({ "name": "team", "members": [alice] })),
            Some(&token),
        )
        .await;
    let group_id = created.body["data"]["id"].as_str().unwrap().to_string();

    let added = app
        .request(
            "POST",
            &format!("/groups/{group_id}/members"),
            Some(json!({ "user_id": bob })),
            Some(&token),
        )
        .await;
    assert_eq!(added.status, StatusCode::OK);
    assert_eq!(added.body["data"]["members"].as_array().unwrap().len(), 3);

    let bob_groups = app
        .request("GET", "/users/me/groups", None, Some(&bob_token))
        .await;
    assert_eq!(bob_groups.body["data"], json!([group_id]));

    let removed = app
        .request(
            "DELETE",
            &format!("/groups/{group_id}/members/{bob}"),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.body["data"]["members"].as_array().unwrap().len(), 2);

    let bob_groups = app
        .request("GET", "/users/me/groups", None, Some(&bob_token))
        .await;
    assert_eq!(bob_groups.body["data"], json!([]));
}

#[tokio::test]
async fn test_unknown_group_is_not_found() {
    let app = helpers::TestApp::new().await;
    let token = app.login("johndoe").await;

    let response = app
        .request(
            "GET",
            &format!("/groups/{}", uuid::Uuid::new_v4()),
            None,
            Some(&token),
        )
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
