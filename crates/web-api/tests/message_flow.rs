//! 私信 HTTP 接口的端到端测试：发送、读取、收件箱和鉴权语义。

mod support;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use domain::UserId;
use support::{build_app, TestApp};

async fn send_request(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn bearer(app: &TestApp, user: UserId) -> String {
    let token = app.jwt.generate_token(Uuid::from(user)).unwrap();
    format!("Bearer {token}")
}

fn send_message_request(app: &TestApp, sender: UserId, receiver: UserId, body: &str) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(format!("/api/message/send/{}", Uuid::from(receiver)))
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, bearer(app, sender))
        .body(Body::from(json!({ "message": body }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn send_message_creates_conversation_and_returns_created() {
    let app = build_app();

    let (status, body) =
        send_request(&app.router, send_message_request(&app, app.alice, app.bob, "hello")).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Message successfuly sent");
    assert_eq!(body["newMessage"]["message"], "hello");
    assert_eq!(
        body["newMessage"]["senderId"],
        Uuid::from(app.alice).to_string()
    );

    // 首发会扇出 newMessage + newConversation 两个事件
    let events = app.broadcaster.events.lock().unwrap();
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn send_without_token_is_unauthorized() {
    let app = build_app();

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/api/message/send/{}", Uuid::from(app.bob)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "message": "hello" }).to_string()))
        .unwrap();
    let (status, _) = send_request(&app.router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn inbox_is_reachable_with_and_without_trailing_slash() {
    let app = build_app();
    send_request(&app.router, send_message_request(&app, app.alice, app.bob, "hello")).await;

    for uri in ["/api/message", "/api/message/"] {
        let request = Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, bearer(&app, app.alice))
            .body(Body::empty())
            .unwrap();
        let (status, inbox) = send_request(&app.router, request).await;

        assert_eq!(status, StatusCode::OK, "uri {uri}");
        assert_eq!(inbox.as_array().unwrap().len(), 1, "uri {uri}");
    }
}

#[tokio::test]
async fn body_without_message_field_is_a_bad_request() {
    let app = build_app();

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/api/message/send/{}", Uuid::from(app.bob)))
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, bearer(&app, app.alice))
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = send_request(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn empty_message_is_a_bad_request() {
    let app = build_app();

    let (status, body) =
        send_request(&app.router, send_message_request(&app, app.alice, app.bob, "  ")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn messaging_an_unknown_user_is_not_found() {
    let app = build_app();
    let stranger = UserId::from(Uuid::new_v4());

    let (status, body) =
        send_request(&app.router, send_message_request(&app, app.alice, stranger, "hi")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "USER_NOT_FOUND");
}

#[tokio::test]
async fn conversation_history_preserves_send_order() {
    let app = build_app();
    send_request(&app.router, send_message_request(&app, app.alice, app.bob, "hello")).await;
    send_request(&app.router, send_message_request(&app, app.bob, app.alice, "world")).await;

    // 通过 jwt cookie 认证读取收件箱
    let token = app.jwt.generate_token(Uuid::from(app.alice)).unwrap();
    let request = Request::builder()
        .uri("/api/message/")
        .header(header::COOKIE, format!("jwt={token}"))
        .body(Body::empty())
        .unwrap();
    let (status, inbox) = send_request(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inbox.as_array().unwrap().len(), 1);
    assert_eq!(inbox[0]["latestMessage"]["message"], "world");

    let conversation_id = inbox[0]["id"].as_str().unwrap().to_owned();
    let request = Request::builder()
        .uri(format!("/api/message/{conversation_id}"))
        .header(header::AUTHORIZATION, bearer(&app, app.alice))
        .body(Body::empty())
        .unwrap();
    let (status, conversation) = send_request(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    let bodies: Vec<&str> = conversation["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["message"].as_str().unwrap())
        .collect();
    assert_eq!(bodies, vec!["hello", "world"]);
    // 参与者档案绝不携带凭证字段
    for participant in conversation["participants"].as_array().unwrap() {
        assert!(participant.get("password").is_none());
        assert!(participant.get("passwordHash").is_none());
    }
}

#[tokio::test]
async fn foreign_and_missing_conversations_look_identical() {
    let app = build_app();
    send_request(&app.router, send_message_request(&app, app.alice, app.bob, "hello")).await;

    let token = app.jwt.generate_token(Uuid::from(app.alice)).unwrap();
    let request = Request::builder()
        .uri("/api/message/")
        .header(header::COOKIE, format!("jwt={token}"))
        .body(Body::empty())
        .unwrap();
    let (_, inbox) = send_request(&app.router, request).await;
    let conversation_id = inbox[0]["id"].as_str().unwrap().to_owned();

    // 局外人访问真实会话
    let outsider = UserId::from(Uuid::new_v4());
    let request = Request::builder()
        .uri(format!("/api/message/{conversation_id}"))
        .header(header::AUTHORIZATION, bearer(&app, outsider))
        .body(Body::empty())
        .unwrap();
    let (foreign_status, foreign_body) = send_request(&app.router, request).await;

    // 参与者访问不存在的会话
    let request = Request::builder()
        .uri(format!("/api/message/{}", Uuid::new_v4()))
        .header(header::AUTHORIZATION, bearer(&app, app.alice))
        .body(Body::empty())
        .unwrap();
    let (missing_status, missing_body) = send_request(&app.router, request).await;

    assert_eq!(foreign_status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing_status, StatusCode::UNAUTHORIZED);
    assert_eq!(foreign_body["code"], missing_body["code"]);
}

#[tokio::test]
async fn health_endpoint_is_open() {
    let app = build_app();

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send_request(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
}
