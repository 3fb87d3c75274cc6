#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parley_domain::GroupName;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tracing::debug;

use crate::server::frames::Frame;

/// Fan-out registry: named groups of connections that receive broadcast
/// frames.
///
/// Joining hands back a bounded receiver; dropping that receiver is the only
/// unregistration path, so a connection leaves exactly once no matter which
/// side observes the close first.
#[derive(Debug, Clone)]
pub struct GroupRegistry {
	inner: Arc<Mutex<Inner>>,
	cfg: RegistryConfig,
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
	/// Maximum number of queued frames per subscriber.
	pub subscriber_queue_capacity: usize,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self {
			subscriber_queue_capacity: 1024,
		}
	}
}

impl GroupRegistry {
	pub fn new(cfg: RegistryConfig) -> Self {
		Self {
			inner: Arc::new(Mutex::new(Inner::default())),
			cfg,
		}
	}

	/// Join a group, creating it if this is the first member.
	pub async fn join(&self, group: GroupName) -> mpsc::Receiver<Frame> {
		let (tx, rx) = mpsc::channel(self.cfg.subscriber_queue_capacity);

		let mut inner = self.inner.lock().await;
		let entry = inner.groups.entry(group).or_default();

		prune_closed_members(entry);

		entry.members.push(tx);
		debug!(group = %group, members = entry.members.len(), "registry: joined");

		rx
	}

	/// Drop closed members and remove the group once it is empty.
	pub async fn leave(&self, group: &GroupName) {
		let mut inner = self.inner.lock().await;
		if let Some(entry) = inner.groups.get_mut(group) {
			prune_closed_members(entry);

			if entry.members.is_empty() {
				inner.groups.remove(group);
			}
		}
	}

	/// Broadcast a frame to every live member of a group.
	///
	/// Best effort: a member with a full queue misses this frame, a closed
	/// member is pruned, and neither outcome affects delivery to the rest.
	/// Sending to a group with no members is a no-op.
	pub async fn send(&self, group: &GroupName, frame: Frame) {
		let mut inner = self.inner.lock().await;
		let Some(entry) = inner.groups.get_mut(group) else {
			return;
		};

		prune_closed_members(entry);

		if entry.members.is_empty() {
			inner.groups.remove(group);
			return;
		}

		let mut dropped: u64 = 0;

		for member in &entry.members {
			match member.try_send(frame.clone()) {
				Ok(()) => {}
				Err(mpsc::error::TrySendError::Full(_)) => dropped += 1,
				Err(mpsc::error::TrySendError::Closed(_)) => {}
			}
		}

		prune_closed_members(entry);

		if entry.members.is_empty() {
			inner.groups.remove(group);
		}

		if dropped > 0 {
			metrics::counter!("parley_server_fanout_dropped_total").increment(dropped);
			debug!(group = %group, dropped, "registry: dropped frames for slow members");
		}
	}

	/// Acquire the group's publish gate.
	///
	/// A publisher holds this across its persist-then-broadcast pair so that
	/// the broadcast order within a group matches the persisted order even
	/// with concurrent publishers.
	pub async fn gate(&self, group: &GroupName) -> OwnedMutexGuard<()> {
		let gate = {
			let mut inner = self.inner.lock().await;
			inner.groups.entry(*group).or_default().gate.clone()
		};
		gate.lock_owned().await
	}

	/// Snapshot of live member counts per group.
	pub async fn group_member_counts(&self) -> HashMap<GroupName, usize> {
		let inner = self.inner.lock().await;
		inner
			.groups
			.iter()
			.map(|(k, v)| (*k, v.members.iter().filter(|m| !m.is_closed()).count()))
			.collect()
	}
}

#[derive(Debug, Default)]
struct Inner {
	groups: HashMap<GroupName, GroupEntry>,
}

#[derive(Debug, Default)]
struct GroupEntry {
	members: Vec<mpsc::Sender<Frame>>,
	gate: Arc<Mutex<()>>,
}

fn prune_closed_members(entry: &mut GroupEntry) {
	entry.members.retain(|m| !m.is_closed());
}
