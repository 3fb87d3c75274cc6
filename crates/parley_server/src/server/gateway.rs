#![forbid(unsafe_code)]

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures::{SinkExt as _, StreamExt as _};
use parley_domain::{ChatId, GroupName, Identity, UserId};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::server::auth::resolve_identity;
use crate::server::error::ApiError;
use crate::server::frames::{Frame, InboundFrame, WireMessage};
use crate::server::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
	token: Option<String>,
}

/// `GET /ws/chats/{chat_id}?token=...`
///
/// The credential is checked before the upgrade; a failed check refuses the
/// socket rather than downgrading it. Identity and display name are resolved
/// once here and bound to the connection for its lifetime.
pub async fn ws_chat(
	State(state): State<AppState>,
	Path(chat_id): Path<ChatId>,
	Query(params): Query<WsParams>,
	ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
	let identity = resolve_identity(params.token.as_deref(), state.auth_hmac_secret.as_ref());
	let Identity::User(user) = identity else {
		return Err(ApiError::Auth("authentication required".to_string()));
	};

	if state.store.chat_by_id(chat_id).await?.is_none() {
		return Err(ApiError::NotFound("chat not found".to_string()));
	}
	if !state.store.is_participant(chat_id, user).await? {
		return Err(ApiError::Permission("not a participant of this chat".to_string()));
	}

	let username = state
		.store
		.user_by_id(user)
		.await?
		.map(|u| u.username)
		.unwrap_or_else(|| user.to_string());

	Ok(ws.on_upgrade(move |socket| run_chat_socket(state, chat_id, user, username, socket)))
}

async fn run_chat_socket(state: AppState, chat_id: ChatId, user: UserId, username: String, socket: WebSocket) {
	let group = GroupName::Chat(chat_id);
	let mut rx = state.registry.join(group).await;

	metrics::counter!("parley_server_ws_connections_total").increment(1);
	info!(chat = %chat_id, user = %user, "chat socket open");

	let (mut sink, mut stream) = socket.split();

	let forward = tokio::spawn(async move {
		while let Some(frame) = rx.recv().await {
			let text = match serde_json::to_string(&frame) {
				Ok(text) => text,
				Err(e) => {
					warn!(error = %e, "failed to encode outbound frame");
					continue;
				}
			};
			if sink.send(Message::Text(text.into())).await.is_err() {
				break;
			}
		}
	});

	while let Some(msg) = stream.next().await {
		match msg {
			Ok(Message::Text(text)) => publish_inbound(&state, chat_id, user, &username, text.as_str()).await,
			Ok(Message::Close(_)) | Err(_) => break,
			Ok(_) => {}
		}
	}

	// Dropping the receiver is what unregisters this member.
	forward.abort();
	state.registry.leave(&group).await;
	info!(chat = %chat_id, user = %user, "chat socket closed");
}

/// Parse, persist and broadcast one inbound text frame.
///
/// Malformed, empty and rejected frames are dropped; none of them closes the
/// connection. The group's publish gate is held across the persist-broadcast
/// pair, so the order frames reach other members matches the order they were
/// persisted in.
pub(crate) async fn publish_inbound(state: &AppState, chat_id: ChatId, user: UserId, username: &str, text: &str) {
	let frame: InboundFrame = match serde_json::from_str(text) {
		Ok(frame) => frame,
		Err(e) => {
			debug!(chat = %chat_id, error = %e, "dropping malformed frame");
			return;
		}
	};

	if frame.is_empty() {
		return;
	}

	let group = GroupName::Chat(chat_id);
	let _gate = state.registry.gate(&group).await;

	match state.messages.append(user, chat_id, &frame).await {
		Ok(record) => {
			state
				.registry
				.send(&group, Frame::ChatMessage {
					message: WireMessage {
						record,
						sender_username: username.to_string(),
					},
					user: username.to_string(),
				})
				.await;
		}
		Err(e) => debug!(chat = %chat_id, error = %e, "dropping rejected message"),
	}
}

/// `GET /ws/notifications?token=...`
///
/// Outbound-only stream of the caller's notification frames.
pub async fn ws_notifications(
	State(state): State<AppState>,
	Query(params): Query<WsParams>,
	ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
	let identity = resolve_identity(params.token.as_deref(), state.auth_hmac_secret.as_ref());
	let Identity::User(user) = identity else {
		return Err(ApiError::Auth("authentication required".to_string()));
	};

	Ok(ws.on_upgrade(move |socket| run_notification_socket(state, user, socket)))
}

async fn run_notification_socket(state: AppState, user: UserId, socket: WebSocket) {
	let group = GroupName::User(user);
	let mut rx = state.registry.join(group).await;

	metrics::counter!("parley_server_ws_connections_total").increment(1);
	info!(user = %user, "notification socket open");

	let (mut sink, mut stream) = socket.split();

	loop {
		tokio::select! {
			frame = rx.recv() => {
				let Some(frame) = frame else { break };
				let text = match serde_json::to_string(&frame) {
					Ok(text) => text,
					Err(e) => {
						warn!(error = %e, "failed to encode outbound frame");
						continue;
					}
				};
				if sink.send(Message::Text(text.into())).await.is_err() {
					break;
				}
			}
			msg = stream.next() => {
				// Inbound traffic on this socket is ignored except for close.
				match msg {
					Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
					Some(Ok(_)) => {}
				}
			}
		}
	}

	drop(rx);
	state.registry.leave(&group).await;
	info!(user = %user, "notification socket closed");
}
