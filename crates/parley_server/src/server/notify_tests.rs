#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_domain::{GroupName, NotificationKind};
use parley_store::Store;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::server::frames::Frame;
use crate::server::notify::{Dispatcher, PushSender};
use crate::server::registry::{GroupRegistry, RegistryConfig};

struct RecordingPush {
	calls: Mutex<Vec<(String, String, String)>>,
	fail: bool,
}

impl RecordingPush {
	fn new(fail: bool) -> Arc<Self> {
		Arc::new(Self {
			calls: Mutex::new(Vec::new()),
			fail,
		})
	}

	async fn calls(&self) -> Vec<(String, String, String)> {
		self.calls.lock().await.clone()
	}
}

#[async_trait]
impl PushSender for RecordingPush {
	async fn send(&self, token: &str, title: &str, body: &str) -> anyhow::Result<()> {
		self.calls
			.lock()
			.await
			.push((token.to_string(), title.to_string(), body.to_string()));
		if self.fail {
			return Err(anyhow::anyhow!("relay unavailable"));
		}
		Ok(())
	}
}

async fn dispatcher_with(push: Arc<RecordingPush>) -> (Dispatcher, Store, GroupRegistry) {
	let store = Store::connect_in_memory().await.unwrap();
	let registry = GroupRegistry::new(RegistryConfig::default());
	let dispatcher = Dispatcher::new(store.clone(), registry.clone(), push);
	(dispatcher, store, registry)
}

#[tokio::test]
async fn one_push_attempt_per_registered_token() {
	let push = RecordingPush::new(false);
	let (dispatcher, store, _) = dispatcher_with(Arc::clone(&push)).await;

	let user = store.create_user("alice").await.unwrap();
	dispatcher.register_token(user.id, "tok-1", Some("phone")).await.unwrap();
	dispatcher.register_token(user.id, "tok-2", Some("tablet")).await.unwrap();

	dispatcher
		.notify(user.id, "Follow", "bob followed you", NotificationKind::Follow)
		.await
		.unwrap();

	let calls = push.calls().await;
	assert_eq!(calls.len(), 2);
	assert_eq!(calls[0].0, "tok-1");
	assert_eq!(calls[1].0, "tok-2");
	assert!(calls.iter().all(|(_, title, body)| title == "Follow" && body == "bob followed you"));
}

#[tokio::test]
async fn push_failure_does_not_roll_back_the_record() {
	let push = RecordingPush::new(true);
	let (dispatcher, store, _) = dispatcher_with(Arc::clone(&push)).await;

	let user = store.create_user("alice").await.unwrap();
	dispatcher.register_token(user.id, "tok-1", None).await.unwrap();

	let record = dispatcher
		.notify(user.id, "Mention", "bob mentioned you", NotificationKind::Mention)
		.await
		.expect("push failures are best effort");

	let listed = store.notifications_for_user(user.id).await.unwrap();
	assert_eq!(listed.len(), 1);
	assert_eq!(listed[0].id, record.id);
	assert_eq!(push.calls().await.len(), 1);
}

#[tokio::test]
async fn no_tokens_means_no_push_attempts() {
	let push = RecordingPush::new(false);
	let (dispatcher, store, _) = dispatcher_with(Arc::clone(&push)).await;

	let user = store.create_user("alice").await.unwrap();
	dispatcher
		.notify(user.id, "Follow", "bob followed you", NotificationKind::Follow)
		.await
		.unwrap();

	assert!(push.calls().await.is_empty());
}

#[tokio::test]
async fn live_members_receive_the_notification_frame() {
	let push = RecordingPush::new(false);
	let (dispatcher, store, registry) = dispatcher_with(push).await;

	let user = store.create_user("alice").await.unwrap();
	let mut rx = registry.join(GroupName::User(user.id)).await;

	dispatcher
		.notify(user.id, "Chat request", "bob wants to chat with you", NotificationKind::ChatRequest)
		.await
		.unwrap();

	let frame = timeout(Duration::from_millis(250), rx.recv())
		.await
		.expect("expected frame")
		.expect("channel open");
	match frame {
		Frame::Notification { message } => assert_eq!(message, "bob wants to chat with you"),
		other => panic!("expected Notification frame, got: {other:?}"),
	}
}
