#![forbid(unsafe_code)]

use std::time::Duration;

use parley_domain::{ChatId, GroupName, UserId};
use tokio::time::timeout;

use crate::server::frames::Frame;
use crate::server::registry::{GroupRegistry, RegistryConfig};

fn notification(text: &str) -> Frame {
	Frame::Notification { message: text.to_string() }
}

fn frame_text(frame: &Frame) -> &str {
	match frame {
		Frame::Notification { message } => message,
		other => panic!("expected Notification frame, got: {other:?}"),
	}
}

#[tokio::test]
async fn members_receive_frames_for_their_group_only() {
	let registry = GroupRegistry::new(RegistryConfig {
		subscriber_queue_capacity: 16,
	});

	let group_a = GroupName::Chat(ChatId::new(1));
	let group_b = GroupName::Chat(ChatId::new(2));

	let mut rx_a = registry.join(group_a).await;

	registry.send(&group_b, notification("b-1")).await;

	let got_unexpected = timeout(Duration::from_millis(50), rx_a.recv()).await;
	assert!(
		got_unexpected.is_err(),
		"member of group A unexpectedly received a frame for group B"
	);

	registry.send(&group_a, notification("a-1")).await;

	let frame = timeout(Duration::from_millis(250), rx_a.recv())
		.await
		.expect("expected to receive within timeout")
		.expect("channel open");
	assert_eq!(frame_text(&frame), "a-1");
}

#[tokio::test]
async fn sending_to_an_empty_group_is_a_no_op() {
	let registry = GroupRegistry::new(RegistryConfig {
		subscriber_queue_capacity: 16,
	});

	let group = GroupName::User(UserId::new(9));
	registry.send(&group, notification("nobody home")).await;

	assert!(registry.group_member_counts().await.is_empty());
}

#[tokio::test]
async fn dropped_members_are_pruned() {
	let registry = GroupRegistry::new(RegistryConfig {
		subscriber_queue_capacity: 16,
	});

	let group = GroupName::Chat(ChatId::new(1));

	{
		let _rx = registry.join(group).await;
	}

	registry.leave(&group).await;
	registry.send(&group, notification("a-1")).await;

	let counts = registry.group_member_counts().await;
	assert_eq!(counts.get(&group).copied().unwrap_or(0), 0);
}

#[tokio::test]
async fn a_full_member_queue_drops_frames_without_blocking_others() {
	let registry = GroupRegistry::new(RegistryConfig {
		subscriber_queue_capacity: 1,
	});

	let group = GroupName::Chat(ChatId::new(1));
	let mut slow = registry.join(group).await;
	let mut fast = registry.join(group).await;

	registry.send(&group, notification("m-1")).await;

	// Drain the fast member so only the slow member's queue is full when
	// the second frame goes out.
	let first = timeout(Duration::from_millis(250), fast.recv())
		.await
		.expect("expected first frame")
		.expect("channel open");
	assert_eq!(frame_text(&first), "m-1");

	registry.send(&group, notification("m-2")).await;

	let second = timeout(Duration::from_millis(250), fast.recv())
		.await
		.expect("expected second frame")
		.expect("channel open");
	assert_eq!(frame_text(&second), "m-2");

	let only = timeout(Duration::from_millis(250), slow.recv())
		.await
		.expect("expected the queued frame")
		.expect("channel open");
	assert_eq!(frame_text(&only), "m-1");

	let nothing_more = timeout(Duration::from_millis(50), slow.recv()).await;
	assert!(nothing_more.is_err(), "slow member should have missed the second frame");
}

#[tokio::test]
async fn a_send_after_join_reaches_the_new_member() {
	let registry = GroupRegistry::new(RegistryConfig {
		subscriber_queue_capacity: 16,
	});

	let group = GroupName::Chat(ChatId::new(1));
	let mut early = registry.join(group).await;
	let mut late = registry.join(group).await;

	registry.send(&group, notification("hello")).await;

	for rx in [&mut early, &mut late] {
		let frame = timeout(Duration::from_millis(250), rx.recv())
			.await
			.expect("expected frame")
			.expect("channel open");
		assert_eq!(frame_text(&frame), "hello");
	}

	let counts = registry.group_member_counts().await;
	assert_eq!(counts.get(&group).copied(), Some(2));
}
