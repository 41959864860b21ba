//! Integration tests for WebSocket connection and messaging.

mod helpers;

use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn test_connect_receives_profile_then_users() {
    let app = helpers::TestApp::new().await;
    let addr = app.spawn().await;
    let token = app.login("alice").await;

    let mut ws = helpers::connect(addr, &token).await;

    let own = helpers::next_json(&mut ws).await;
    assert_eq!(own["user"]["username"], "alice");

    let users = helpers::next_json(&mut ws).await;
    let names: Vec<&str> = users["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"bob"));
    assert!(!names.contains(&"alice"));
    assert!(!names.contains(&"dormant"));
}

#[tokio::test]
async fn test_bad_token_gets_error_then_policy_close() {
    let app = helpers::TestApp::new().await;
    let addr = app.spawn().await;

    let mut ws = helpers::connect(addr, "not-a-jwt").await;

    let error = helpers::next_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "TOKEN_INVALID");

    let close = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match close {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1008),
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_direct_message_then_recipient_disconnects() {
    let app = helpers::TestApp::new().await;
    let addr = app.spawn().await;
    let alice_id = app.user_id("alice").await;
    let bob_id = app.user_id("bob").await;

    let mut alice = helpers::connect(addr, &app.login("alice").await).await;
    helpers::skip_snapshots(&mut alice).await;
    let mut bob = helpers::connect(addr, &app.login("bob").await).await;
    helpers::skip_snapshots(&mut bob).await;

    helpers::send_json(
        &mut alice,
        json!({ "type": "direct", "to": bob_id, "payload": { "text": "hi" } }),
    )
    .await;

    let received = helpers::next_json(&mut bob).await;
    assert_eq!(received["type"], "message");
    assert_eq!(received["text"], "hi");
    assert_eq!(received["from"], json!(alice_id));

    let ack = helpers::next_json(&mut alice).await;
    assert_eq!(ack["type"], "ack");
    assert_eq!(ack["seq"], 1);
    assert_eq!(ack["delivered"], 1);

    bob.close(None).await.unwrap();
    drop(bob);

    // Unregistration runs after the close handshake; poll until it lands.
    let mut last = json!(null);
    for _ in 0..50 {
        helpers::send_json(
            &mut alice,
            json!({ "type": "direct", "to": bob_id, "payload": { "text": "still there?" } }),
        )
        .await;
        last = helpers::next_json(&mut alice).await;
        if last["type"] == "error" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(last["type"], "error");
    assert_eq!(last["code"], "TARGET_NOT_FOUND");
}

#[tokio::test]
async fn test_group_message_skips_sender() {
    let app = helpers::TestApp::new().await;
    let addr = app.spawn().await;
    let alice_token = app.login("alice").await;
    let bob_id = app.user_id("bob").await;

    let created = app
        .request(
            "POST",
            "/groups",
            Some(json!({ "name": "pair", "members": [bob_id] })),
            Some(&alice_token),
        )
        .await;
    let group_id = created.body["data"]["id"].as_str().unwrap().to_string();

    let mut alice = helpers::connect(addr, &alice_token).await;
    helpers::skip_snapshots(&mut alice).await;
    let mut bob = helpers::connect(addr, &app.login("bob").await).await;
    helpers::skip_snapshots(&mut bob).await;

    helpers::send_json(
        &mut alice,
        json!({ "type": "group", "to": group_id, "payload": { "text": "all" } }),
    )
    .await;

    let received = helpers::next_json(&mut bob).await;
    assert_eq!(received["group"], json!(group_id));
    assert_eq!(received["text"], "all");

    // The sender only sees its ack, never its own message.
    let ack = helpers::next_json(&mut alice).await;
    assert_eq!(ack["type"], "ack");
    assert_eq!(ack["delivered"], 1);
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let app = helpers::TestApp::new().await;
    let addr = app.spawn().await;

    let mut ws = helpers::connect(addr, &app.login("alice").await).await;
    helpers::skip_snapshots(&mut ws).await;

    helpers::send_json(&mut ws, json!({ "type": "shout" })).await;
    let error = helpers::next_json(&mut ws).await;
    assert_eq!(error["code"], "INVALID_MESSAGE");

    helpers::send_json(&mut ws, json!({ "type": "ping" })).await;
    let pong = helpers::next_json(&mut ws).await;
    assert_eq!(pong["type"], "pong");
}
