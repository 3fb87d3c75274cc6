#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use parley_domain::{ChatId, GroupName, UserId};
use parley_store::Store;
use tokio::time::timeout;

use crate::server::chats::{ChatService, FollowBackPolicy};
use crate::server::frames::Frame;
use crate::server::gateway::publish_inbound;
use crate::server::health::HealthState;
use crate::server::messages::MessageService;
use crate::server::notify::{DisabledPush, Dispatcher};
use crate::server::registry::{GroupRegistry, RegistryConfig};
use crate::server::state::AppState;

async fn test_state() -> AppState {
	let store = Store::connect_in_memory().await.unwrap();
	let registry = GroupRegistry::new(RegistryConfig::default());
	let notifier = Dispatcher::new(store.clone(), registry.clone(), Arc::new(DisabledPush));
	let chats = ChatService::new(store.clone(), notifier.clone(), Arc::new(FollowBackPolicy));
	let messages = MessageService::new(store.clone());

	AppState {
		store,
		registry,
		chats,
		messages,
		notifier,
		auth_hmac_secret: None,
		health: HealthState::new(),
		page_size: 50,
	}
}

async fn direct_chat(state: &AppState) -> (UserId, UserId, ChatId) {
	let alice = state.store.create_user("alice").await.unwrap();
	let bob = state.store.create_user("bob").await.unwrap();
	let (chat, _) = state
		.store
		.create_direct_chat(alice.id, bob.id, false, alice.id)
		.await
		.unwrap();
	(alice.id, bob.id, chat.id)
}

async fn next_frame(rx: &mut tokio::sync::mpsc::Receiver<Frame>) -> Frame {
	timeout(Duration::from_millis(250), rx.recv())
		.await
		.expect("expected frame")
		.expect("channel open")
}

fn message_id(frame: &Frame) -> i64 {
	match frame {
		Frame::ChatMessage { message, .. } => message.record.id.as_i64(),
		other => panic!("expected ChatMessage frame, got: {other:?}"),
	}
}

#[tokio::test]
async fn a_published_frame_reaches_the_other_participant() {
	let state = test_state().await;
	let (alice, _bob, chat_id) = direct_chat(&state).await;

	// Bob's joined handle stands in for his open socket.
	let mut rx = state.registry.join(GroupName::Chat(chat_id)).await;

	publish_inbound(&state, chat_id, alice, "alice", r#"{"message": "hi"}"#).await;

	let json = serde_json::to_value(next_frame(&mut rx).await).unwrap();
	assert_eq!(json["user"], "alice");
	assert_eq!(json["message"]["content"], "hi");
	assert_eq!(json["message"]["sender_username"], "alice");
}

#[tokio::test]
async fn malformed_and_empty_frames_are_dropped_without_ending_the_stream() {
	let state = test_state().await;
	let (alice, _bob, chat_id) = direct_chat(&state).await;

	let mut rx = state.registry.join(GroupName::Chat(chat_id)).await;

	publish_inbound(&state, chat_id, alice, "alice", "not json at all").await;
	publish_inbound(&state, chat_id, alice, "alice", r#"{"message": "   "}"#).await;
	assert!(state.store.messages_chronological(chat_id).await.unwrap().is_empty());

	// The next well-formed frame on the same connection still goes through.
	publish_inbound(&state, chat_id, alice, "alice", r#"{"message": "still here"}"#).await;
	let json = serde_json::to_value(next_frame(&mut rx).await).unwrap();
	assert_eq!(json["message"]["content"], "still here");
}

#[tokio::test]
async fn a_rejected_frame_is_dropped_and_never_broadcast() {
	let state = test_state().await;
	let (_alice, _bob, chat_id) = direct_chat(&state).await;
	let outsider = state.store.create_user("carol").await.unwrap();

	let mut rx = state.registry.join(GroupName::Chat(chat_id)).await;

	publish_inbound(&state, chat_id, outsider.id, "carol", r#"{"message": "hi"}"#).await;

	assert!(state.store.messages_chronological(chat_id).await.unwrap().is_empty());
	let nothing = timeout(Duration::from_millis(50), rx.recv()).await;
	assert!(nothing.is_err(), "a rejected frame must not be broadcast");
}

#[tokio::test]
async fn concurrent_senders_broadcast_in_persisted_order() {
	let state = test_state().await;
	let (alice, bob, chat_id) = direct_chat(&state).await;

	let mut rx = state.registry.join(GroupName::Chat(chat_id)).await;

	let publish_many = |user: UserId, name: &'static str| {
		let state = state.clone();
		tokio::spawn(async move {
			for i in 0..20 {
				publish_inbound(&state, chat_id, user, name, &format!(r#"{{"message": "{name}-{i}"}}"#)).await;
			}
		})
	};

	let first = publish_many(alice, "alice");
	let second = publish_many(bob, "bob");
	first.await.unwrap();
	second.await.unwrap();

	let mut last = 0;
	for _ in 0..40 {
		let id = message_id(&next_frame(&mut rx).await);
		assert!(id > last, "message {id} was broadcast after {last}");
		last = id;
	}
}
