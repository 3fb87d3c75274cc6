#![forbid(unsafe_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt as _;
use parley_domain::{SecretString, UserId};
use parley_store::Store;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::server::api::router;
use crate::server::auth::mint_token;
use crate::server::chats::{ChatService, FollowBackPolicy};
use crate::server::health::HealthState;
use crate::server::messages::MessageService;
use crate::server::notify::{DisabledPush, Dispatcher};
use crate::server::registry::{GroupRegistry, RegistryConfig};
use crate::server::state::AppState;
use crate::util::time::unix_secs_now;

const SECRET: &str = "api-test-secret";

async fn test_app() -> (Router, Store) {
	let store = Store::connect_in_memory().await.unwrap();
	let registry = GroupRegistry::new(RegistryConfig::default());
	let notifier = Dispatcher::new(store.clone(), registry.clone(), Arc::new(DisabledPush));
	let chats = ChatService::new(store.clone(), notifier.clone(), Arc::new(FollowBackPolicy));
	let messages = MessageService::new(store.clone());
	let health = HealthState::new();
	health.mark_ready();

	let state = AppState {
		store: store.clone(),
		registry,
		chats,
		messages,
		notifier,
		auth_hmac_secret: Some(SecretString::new(SECRET)),
		health,
		page_size: 50,
	};

	(router(state), store)
}

fn bearer(user: UserId) -> String {
	format!("Bearer {}", mint_token(&user.to_string(), unix_secs_now() + 600, SECRET))
}

async fn send(app: &Router, method: &str, uri: &str, auth: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
	let mut req = Request::builder().method(method).uri(uri);
	if let Some(auth) = auth {
		req = req.header(AUTHORIZATION, auth);
	}

	let req = match body {
		Some(body) => req
			.header(CONTENT_TYPE, "application/json")
			.body(Body::from(body.to_string()))
			.unwrap(),
		None => req.body(Body::empty()).unwrap(),
	};

	let resp = app.clone().oneshot(req).await.unwrap();
	let status = resp.status();
	let bytes = resp.into_body().collect().await.unwrap().to_bytes();
	// Non-JSON bodies (the health routes are plain text) come back as strings.
	let value = if bytes.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
	};
	(status, value)
}

#[tokio::test]
async fn api_routes_require_a_bearer_token() {
	let (app, _store) = test_app().await;

	let (status, body) = send(&app, "GET", "/api/chats", None, None).await;
	assert_eq!(status, StatusCode::UNAUTHORIZED);
	assert_eq!(body["detail"], "authentication required");

	let stale = format!("Bearer {}", mint_token("1", unix_secs_now().saturating_sub(5), SECRET));
	let (status, _) = send(&app, "GET", "/api/chats", Some(&stale), None).await;
	assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_routes_need_no_credentials() {
	let (app, _store) = test_app().await;

	let (status, body) = send(&app, "GET", "/healthz", None, None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, "ok");
	let (status, body) = send(&app, "GET", "/readyz", None, None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, "ready");
}

#[tokio::test]
async fn request_accept_message_flow() {
	let (app, store) = test_app().await;
	let alice = store.create_user("alice").await.unwrap();
	let bob = store.create_user("bob").await.unwrap();

	// Bob only accepts chats from people he follows.
	let (status, body) = send(
		&app,
		"PUT",
		"/api/chat-settings",
		Some(&bearer(bob.id)),
		Some(json!({ "message_first_permission": "followers" })),
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["message_first_permission"], "followers");

	// Alice opens a chat; it lands as a pending request.
	let (status, body) = send(
		&app,
		"POST",
		"/api/chats",
		Some(&bearer(alice.id)),
		Some(json!({ "username": "bob" })),
	)
	.await;
	assert_eq!(status, StatusCode::CREATED);
	assert_eq!(body["is_request"], true);
	let chat_id = body["id"].as_i64().unwrap();

	// Re-creating returns the same chat with 200.
	let (status, body) = send(
		&app,
		"POST",
		"/api/chats",
		Some(&bearer(alice.id)),
		Some(json!({ "username": "bob" })),
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["id"].as_i64().unwrap(), chat_id);

	// Bob sees it as a pending request, not in his chat list.
	let (_, body) = send(&app, "GET", "/api/chats", Some(&bearer(bob.id)), None).await;
	assert_eq!(body.as_array().unwrap().len(), 0);
	let (_, body) = send(&app, "GET", "/api/chat-requests", Some(&bearer(bob.id)), None).await;
	assert_eq!(body.as_array().unwrap().len(), 1);

	// Alice cannot accept her own request.
	let uri = format!("/api/chats/{chat_id}/accept");
	let (status, _) = send(&app, "POST", &uri, Some(&bearer(alice.id)), None).await;
	assert_eq!(status, StatusCode::FORBIDDEN);

	let (status, body) = send(&app, "POST", &uri, Some(&bearer(bob.id)), None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["is_request"], false);

	// Alice was notified of the accept.
	let (_, body) = send(&app, "GET", "/api/notifications", Some(&bearer(alice.id)), None).await;
	assert_eq!(body[0]["kind"], "chat_accept");

	// Messages page newest first with a total count.
	for i in 0..3 {
		store
			.append_message(parley_domain::ChatId::new(chat_id), alice.id, Some(&format!("m{i}")), None, None, None)
			.await
			.unwrap();
	}
	let uri = format!("/api/chats/{chat_id}/messages?page=1&page_size=2");
	let (status, body) = send(&app, "GET", &uri, Some(&bearer(bob.id)), None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["count"], 3);
	assert_eq!(body["results"][0]["content"], "m2");

	// The detail view marks everything read.
	let uri = format!("/api/chats/{chat_id}");
	let (status, body) = send(&app, "GET", &uri, Some(&bearer(bob.id)), None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["unread_count"], 0);
	assert_eq!(body["messages"].as_array().unwrap().len(), 3);

	let (_, body) = send(&app, "GET", "/api/chats", Some(&bearer(bob.id)), None).await;
	assert_eq!(body[0]["unread_count"], 0);
}

#[tokio::test]
async fn block_flow_and_error_statuses() {
	let (app, store) = test_app().await;
	let alice = store.create_user("alice").await.unwrap();
	let bob = store.create_user("bob").await.unwrap();
	store
		.set_chat_settings(bob.id, parley_domain::MessageFirstPermission::Nobody)
		.await
		.unwrap();

	let (status, _) = send(
		&app,
		"POST",
		"/api/chats",
		Some(&bearer(alice.id)),
		Some(json!({ "username": "nobody" })),
	)
	.await;
	assert_eq!(status, StatusCode::NOT_FOUND);

	let (status, _) = send(
		&app,
		"POST",
		"/api/chats",
		Some(&bearer(alice.id)),
		Some(json!({ "username": "alice" })),
	)
	.await;
	assert_eq!(status, StatusCode::BAD_REQUEST);

	let (_, body) = send(
		&app,
		"POST",
		"/api/chats",
		Some(&bearer(alice.id)),
		Some(json!({ "username": "bob" })),
	)
	.await;
	let chat_id = body["id"].as_i64().unwrap();

	let uri = format!("/api/chats/{chat_id}/block");
	let (status, _) = send(&app, "POST", &uri, Some(&bearer(bob.id)), None).await;
	assert_eq!(status, StatusCode::NO_CONTENT);

	// The blocked pair cannot recreate the chat from either side.
	let (status, body) = send(
		&app,
		"POST",
		"/api/chats",
		Some(&bearer(alice.id)),
		Some(json!({ "username": "bob" })),
	)
	.await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["detail"], "chat unavailable");
}

#[tokio::test]
async fn group_creation_and_push_token_registration() {
	let (app, store) = test_app().await;
	let alice = store.create_user("alice").await.unwrap();
	let bob = store.create_user("bob").await.unwrap();

	let (status, body) = send(
		&app,
		"POST",
		"/api/chats/create-group",
		Some(&bearer(alice.id)),
		Some(json!({ "name": "plans", "members": [bob.id.as_i64()] })),
	)
	.await;
	assert_eq!(status, StatusCode::CREATED);
	assert_eq!(body["is_group"], true);
	assert_eq!(body["participants"].as_array().unwrap().len(), 2);

	let (status, _) = send(
		&app,
		"POST",
		"/api/chats/create-group",
		Some(&bearer(alice.id)),
		Some(json!({ "name": "  " })),
	)
	.await;
	assert_eq!(status, StatusCode::BAD_REQUEST);

	let (status, _) = send(
		&app,
		"POST",
		"/api/push-tokens",
		Some(&bearer(alice.id)),
		Some(json!({ "token": "tok-1", "device_id": "phone" })),
	)
	.await;
	assert_eq!(status, StatusCode::CREATED);
	assert_eq!(store.push_tokens_for_user(alice.id).await.unwrap().len(), 1);

	let (status, _) = send(
		&app,
		"POST",
		"/api/push-tokens",
		Some(&bearer(alice.id)),
		Some(json!({ "token": "  " })),
	)
	.await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
}
