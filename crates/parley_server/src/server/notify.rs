#![forbid(unsafe_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parley_domain::{GroupName, NotificationKind, UserId};
use parley_store::{NotificationRecord, Store};
use tracing::{debug, warn};

use crate::server::frames::Frame;
use crate::server::registry::GroupRegistry;

/// Outbound push delivery seam. The real transport (APNs/FCM relay) lives
/// outside this system; tests inject a recording implementation.
#[async_trait]
pub trait PushSender: Send + Sync {
	async fn send(&self, token: &str, title: &str, body: &str) -> anyhow::Result<()>;
}

/// Push sender used when no relay is configured. Logs and succeeds.
pub struct DisabledPush;

#[async_trait]
impl PushSender for DisabledPush {
	async fn send(&self, _token: &str, title: &str, _body: &str) -> anyhow::Result<()> {
		debug!(title, "push delivery disabled; dropping");
		Ok(())
	}
}

/// Notification dispatcher: persist, then deliver.
///
/// The persisted record is the source of truth. Live fan-out and push are
/// both best effort on top of it; their failures never roll the record back.
#[derive(Clone)]
pub struct Dispatcher {
	store: Store,
	registry: GroupRegistry,
	push: Arc<dyn PushSender>,
}

impl Dispatcher {
	pub fn new(store: Store, registry: GroupRegistry, push: Arc<dyn PushSender>) -> Self {
		Self { store, registry, push }
	}

	/// Persist a notification, fan it out to the recipient's live sockets,
	/// then attempt one push per registered device token.
	pub async fn notify(
		&self,
		user: UserId,
		title: &str,
		body: &str,
		kind: NotificationKind,
	) -> anyhow::Result<NotificationRecord> {
		let record = self.store.create_notification(user, title, body, kind).await?;
		metrics::counter!("parley_server_notifications_total").increment(1);

		self.registry
			.send(&GroupName::User(user), Frame::Notification { message: body.to_string() })
			.await;

		for token in self.store.push_tokens_for_user(user).await? {
			if let Err(e) = self.push.send(&token.token, title, body).await {
				metrics::counter!("parley_server_push_failures_total").increment(1);
				warn!(user = %user, error = %e, "push delivery failed");
			}
		}

		Ok(record)
	}

	/// Register a device push token for the user. Idempotent per token value.
	pub async fn register_token(&self, user: UserId, token: &str, device_id: Option<&str>) -> anyhow::Result<()> {
		self.store.upsert_push_token(user, token, device_id).await
	}
}
