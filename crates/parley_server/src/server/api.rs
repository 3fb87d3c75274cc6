#![forbid(unsafe_code)]

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::{Json, Router};
use parley_domain::{ChatId, Identity, MessageFirstPermission, UserId};
use parley_store::{ChatSettingRecord, NotificationRecord};
use serde::Deserialize;

use crate::server::auth::resolve_identity;
use crate::server::chats::{ChatDetail, ChatSummary};
use crate::server::error::ApiError;
use crate::server::gateway::{ws_chat, ws_notifications};
use crate::server::health::{healthz, readyz};
use crate::server::messages::MessagePage;
use crate::server::state::AppState;

/// Hard ceiling on client-requested page sizes.
const MAX_PAGE_SIZE: u32 = 200;

/// Authenticated caller, extracted from the `Authorization: Bearer` header.
pub struct Authed(pub UserId);

impl FromRequestParts<AppState> for Authed {
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
		let token = parts
			.headers
			.get(AUTHORIZATION)
			.and_then(|v| v.to_str().ok())
			.and_then(|v| v.strip_prefix("Bearer "));

		match resolve_identity(token, state.auth_hmac_secret.as_ref()) {
			Identity::User(user) => Ok(Authed(user)),
			Identity::Anonymous => Err(ApiError::Auth("authentication required".to_string())),
		}
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/api/chats", post(create_direct_chat).get(list_chats))
		.route("/api/chats/create-group", post(create_group_chat))
		.route("/api/chats/{chat_id}", get(chat_detail).delete(delete_chat))
		.route("/api/chats/{chat_id}/messages", get(list_messages))
		.route("/api/chats/{chat_id}/accept", post(accept_chat))
		.route("/api/chats/{chat_id}/block", post(block_chat))
		.route("/api/chat-requests", get(list_chat_requests))
		.route("/api/chat-settings", get(get_chat_settings).put(put_chat_settings))
		.route("/api/push-tokens", post(register_push_token))
		.route("/api/notifications", get(list_notifications))
		.route("/healthz", get(healthz))
		.route("/readyz", get(readyz))
		.route("/ws/chats/{chat_id}", get(ws_chat))
		.route("/ws/notifications", get(ws_notifications))
		.with_state(state)
}

#[derive(Debug, Deserialize)]
struct CreateChatBody {
	username: String,
}

async fn create_direct_chat(
	State(state): State<AppState>,
	Authed(actor): Authed,
	Json(body): Json<CreateChatBody>,
) -> Result<(StatusCode, Json<ChatSummary>), ApiError> {
	let (chat, created) = state.chats.open_direct(actor, body.username.trim()).await?;
	let status = if created { StatusCode::CREATED } else { StatusCode::OK };
	Ok((status, Json(chat)))
}

async fn list_chats(State(state): State<AppState>, Authed(actor): Authed) -> Result<Json<Vec<ChatSummary>>, ApiError> {
	Ok(Json(state.chats.list_chats(actor).await?))
}

async fn chat_detail(
	State(state): State<AppState>,
	Authed(actor): Authed,
	Path(chat_id): Path<ChatId>,
) -> Result<Json<ChatDetail>, ApiError> {
	Ok(Json(state.chats.detail(actor, chat_id).await?))
}

async fn delete_chat(
	State(state): State<AppState>,
	Authed(actor): Authed,
	Path(chat_id): Path<ChatId>,
) -> Result<StatusCode, ApiError> {
	state.chats.delete(actor, chat_id).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct PageParams {
	page: Option<u32>,
	page_size: Option<u32>,
}

async fn list_messages(
	State(state): State<AppState>,
	Authed(actor): Authed,
	Path(chat_id): Path<ChatId>,
	Query(params): Query<PageParams>,
) -> Result<Json<MessagePage>, ApiError> {
	let page = params.page.unwrap_or(1);
	let page_size = params
		.page_size
		.filter(|v| *v > 0)
		.unwrap_or(state.page_size)
		.min(MAX_PAGE_SIZE);
	Ok(Json(state.messages.page(actor, chat_id, page, page_size).await?))
}

async fn accept_chat(
	State(state): State<AppState>,
	Authed(actor): Authed,
	Path(chat_id): Path<ChatId>,
) -> Result<Json<ChatSummary>, ApiError> {
	Ok(Json(state.chats.accept(actor, chat_id).await?))
}

async fn block_chat(
	State(state): State<AppState>,
	Authed(actor): Authed,
	Path(chat_id): Path<ChatId>,
) -> Result<StatusCode, ApiError> {
	state.chats.block(actor, chat_id).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct CreateGroupBody {
	name: String,
	image: Option<String>,
	#[serde(default)]
	members: Vec<UserId>,
	content_plan: Option<String>,
}

async fn create_group_chat(
	State(state): State<AppState>,
	Authed(actor): Authed,
	Json(body): Json<CreateGroupBody>,
) -> Result<(StatusCode, Json<ChatSummary>), ApiError> {
	let chat = state
		.chats
		.create_group(
			actor,
			&body.name,
			body.image.as_deref(),
			&body.members,
			body.content_plan.as_deref(),
		)
		.await?;
	Ok((StatusCode::CREATED, Json(chat)))
}

async fn list_chat_requests(
	State(state): State<AppState>,
	Authed(actor): Authed,
) -> Result<Json<Vec<ChatSummary>>, ApiError> {
	Ok(Json(state.chats.list_requests(actor).await?))
}

async fn get_chat_settings(
	State(state): State<AppState>,
	Authed(actor): Authed,
) -> Result<Json<ChatSettingRecord>, ApiError> {
	Ok(Json(state.store.chat_settings(actor).await?))
}

#[derive(Debug, Deserialize)]
struct ChatSettingsBody {
	message_first_permission: MessageFirstPermission,
}

async fn put_chat_settings(
	State(state): State<AppState>,
	Authed(actor): Authed,
	Json(body): Json<ChatSettingsBody>,
) -> Result<Json<ChatSettingRecord>, ApiError> {
	Ok(Json(state.store.set_chat_settings(actor, body.message_first_permission).await?))
}

#[derive(Debug, Deserialize)]
struct PushTokenBody {
	token: String,
	device_id: Option<String>,
}

async fn register_push_token(
	State(state): State<AppState>,
	Authed(actor): Authed,
	Json(body): Json<PushTokenBody>,
) -> Result<StatusCode, ApiError> {
	let token = body.token.trim();
	if token.is_empty() {
		return Err(ApiError::Validation("token must not be empty".to_string()));
	}

	state.notifier.register_token(actor, token, body.device_id.as_deref()).await?;
	Ok(StatusCode::CREATED)
}

async fn list_notifications(
	State(state): State<AppState>,
	Authed(actor): Authed,
) -> Result<Json<Vec<NotificationRecord>>, ApiError> {
	Ok(Json(state.store.notifications_for_user(actor).await?))
}
