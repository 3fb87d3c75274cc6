#![forbid(unsafe_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parley_domain::{ChatId, MessageFirstPermission, NotificationKind, UserId};
use parley_store::{ChatRecord, MessageRecord, Store, UserRecord};
use serde::Serialize;
use tracing::debug;

use crate::server::error::ApiError;
use crate::server::notify::Dispatcher;

/// Decides whether a new direct chat starts open or as a pending request.
#[async_trait]
pub trait RequestPolicy: Send + Sync {
	async fn direct_starts_open(&self, store: &Store, initiator: UserId, target: UserId) -> anyhow::Result<bool>;
}

/// Default policy: open when the target already follows the initiator back,
/// otherwise open only if the target lets anyone message first.
pub struct FollowBackPolicy;

#[async_trait]
impl RequestPolicy for FollowBackPolicy {
	async fn direct_starts_open(&self, store: &Store, initiator: UserId, target: UserId) -> anyhow::Result<bool> {
		if store.follows(target, initiator).await? {
			return Ok(true);
		}

		let settings = store.chat_settings(target).await?;
		Ok(settings.message_first_permission == MessageFirstPermission::Anyone)
	}
}

/// A chat as listed to a participant: row fields plus the caller-relative
/// unread count and the member roster.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSummary {
	#[serde(flatten)]
	pub chat: ChatRecord,
	pub participants: Vec<UserRecord>,
	pub unread_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatDetail {
	#[serde(flatten)]
	pub summary: ChatSummary,
	pub messages: Vec<MessageRecord>,
}

/// Chat lifecycle: direct-chat creation with request gating, accept/block,
/// group creation, listing and deletion.
#[derive(Clone)]
pub struct ChatService {
	store: Store,
	notifier: Dispatcher,
	policy: Arc<dyn RequestPolicy>,
}

impl ChatService {
	pub fn new(store: Store, notifier: Dispatcher, policy: Arc<dyn RequestPolicy>) -> Self {
		Self { store, notifier, policy }
	}

	/// Create-or-fetch the direct chat with `target_username`.
	///
	/// Returns the chat and whether this call created it. A blocked pair is
	/// rejected outright rather than re-opening a request.
	pub async fn open_direct(&self, actor: UserId, target_username: &str) -> Result<(ChatSummary, bool), ApiError> {
		let Some(target) = self.store.user_by_username(target_username).await? else {
			return Err(ApiError::NotFound("user not found".to_string()));
		};

		if target.id == actor {
			return Err(ApiError::Validation("cannot open a chat with yourself".to_string()));
		}

		if self.store.block_exists_between(actor, target.id).await? {
			return Err(ApiError::Validation("chat unavailable".to_string()));
		}

		let open = self.policy.direct_starts_open(&self.store, actor, target.id).await?;
		let (chat, created) = self.store.create_direct_chat(actor, target.id, !open, actor).await?;

		if created && chat.is_request {
			let actor_name = self.display_name(actor).await?;
			self.notifier
				.notify(
					target.id,
					"Chat request",
					&format!("{actor_name} wants to chat with you"),
					NotificationKind::ChatRequest,
				)
				.await?;
		}

		Ok((self.summarize(chat, actor).await?, created))
	}

	/// Chats visible to the caller, newest first. Pending requests aimed at
	/// the caller are excluded here and listed by [`ChatService::list_requests`].
	pub async fn list_chats(&self, actor: UserId) -> Result<Vec<ChatSummary>, ApiError> {
		let mut out = Vec::new();
		for chat in self.store.chats_for_user(actor).await? {
			out.push(self.summarize(chat, actor).await?);
		}
		Ok(out)
	}

	/// Pending requests where the caller is the passive recipient.
	pub async fn list_requests(&self, actor: UserId) -> Result<Vec<ChatSummary>, ApiError> {
		let mut out = Vec::new();
		for chat in self.store.request_chats_for(actor).await? {
			out.push(self.summarize(chat, actor).await?);
		}
		Ok(out)
	}

	/// Full chat view. Opening the detail marks everything in it read.
	pub async fn detail(&self, actor: UserId, chat_id: ChatId) -> Result<ChatDetail, ApiError> {
		let chat = self.participant_chat(actor, chat_id).await?;

		self.store.mark_all_read(chat_id, actor).await?;

		let messages = self.store.messages_chronological(chat_id).await?;
		Ok(ChatDetail {
			summary: self.summarize(chat, actor).await?,
			messages,
		})
	}

	/// Accept a pending request, notifying the requester.
	///
	/// Accepting an already-open direct chat is a no-op returning the open
	/// chat. The requester cannot accept their own request.
	pub async fn accept(&self, actor: UserId, chat_id: ChatId) -> Result<ChatSummary, ApiError> {
		let Some(chat) = self.store.chat_by_id(chat_id).await? else {
			return Err(ApiError::NotFound("chat not found".to_string()));
		};

		if !self.store.is_participant(chat_id, actor).await? {
			return Err(ApiError::Permission("not a participant of this chat".to_string()));
		}

		if chat.is_request {
			if chat.request_user_id == Some(actor) {
				return Err(ApiError::Permission("the requester cannot accept their own request".to_string()));
			}

			if self.store.accept_request(chat_id).await?
				&& let Some(requester) = chat.request_user_id
			{
				let actor_name = self.display_name(actor).await?;
				self.notifier
					.notify(
						requester,
						"Chat request accepted",
						&format!("{actor_name} accepted your chat request"),
						NotificationKind::ChatAccept,
					)
					.await?;
			}
		}

		let Some(chat) = self.store.chat_by_id(chat_id).await? else {
			return Err(ApiError::NotFound("chat not found".to_string()));
		};
		Ok(self.summarize(chat, actor).await?)
	}

	/// Block the requester of a pending request and delete the chat.
	pub async fn block(&self, actor: UserId, chat_id: ChatId) -> Result<(), ApiError> {
		let Some(chat) = self.store.chat_by_id(chat_id).await? else {
			return Err(ApiError::NotFound("chat not found".to_string()));
		};

		if !self.store.is_participant(chat_id, actor).await? {
			return Err(ApiError::Permission("not a participant of this chat".to_string()));
		}

		if !chat.is_request {
			return Err(ApiError::Permission("only pending requests can be blocked".to_string()));
		}

		let Some(requester) = chat.request_user_id else {
			return Err(ApiError::Permission("request has no requester".to_string()));
		};

		if requester == actor {
			return Err(ApiError::Permission("the requester cannot block their own request".to_string()));
		}

		self.store.add_block(actor, requester).await?;
		self.store.delete_chat(chat_id).await?;
		debug!(chat = %chat_id, blocker = %actor, blocked = %requester, "request blocked");
		Ok(())
	}

	/// Delete a chat. Group chats may only be deleted by their owner; either
	/// participant may delete a direct chat.
	pub async fn delete(&self, actor: UserId, chat_id: ChatId) -> Result<(), ApiError> {
		let Some(chat) = self.store.chat_by_id(chat_id).await? else {
			return Err(ApiError::NotFound("chat not found".to_string()));
		};

		if !self.store.is_participant(chat_id, actor).await? {
			return Err(ApiError::Permission("not a participant of this chat".to_string()));
		}

		if chat.is_group && chat.owner_id != Some(actor) {
			return Err(ApiError::Permission("only the owner can delete a group chat".to_string()));
		}

		self.store.delete_chat(chat_id).await?;
		Ok(())
	}

	/// Create a group chat. Unknown and blocked members are skipped, never an
	/// error; an optional content plan bulk-adds its active subscribers.
	pub async fn create_group(
		&self,
		actor: UserId,
		name: &str,
		image: Option<&str>,
		members: &[UserId],
		content_plan: Option<&str>,
	) -> Result<ChatSummary, ApiError> {
		let name = name.trim();
		if name.is_empty() {
			return Err(ApiError::Validation("group name must not be empty".to_string()));
		}

		let mut roster: Vec<UserId> = Vec::new();
		for candidate in members {
			if *candidate == actor || roster.contains(candidate) {
				continue;
			}
			if self.store.user_by_id(*candidate).await?.is_none() {
				debug!(user = %candidate, "skipping unknown group member");
				continue;
			}
			if self.store.block_exists_between(actor, *candidate).await? {
				debug!(user = %candidate, "skipping blocked group member");
				continue;
			}
			roster.push(*candidate);
		}

		if let Some(plan_name) = content_plan {
			let Some(plan) = self.store.plan_by_owner_and_name(actor, plan_name).await? else {
				return Err(ApiError::Validation("unknown content plan".to_string()));
			};
			for subscriber in self.store.active_plan_subscribers(plan.id).await? {
				if subscriber != actor && !roster.contains(&subscriber) {
					roster.push(subscriber);
				}
			}
		}

		let chat = self.store.create_group_chat(actor, name, image, &roster).await?;
		Ok(self.summarize(chat, actor).await?)
	}

	async fn participant_chat(&self, actor: UserId, chat_id: ChatId) -> Result<ChatRecord, ApiError> {
		let Some(chat) = self.store.chat_by_id(chat_id).await? else {
			return Err(ApiError::NotFound("chat not found".to_string()));
		};

		// Non-participants get the same answer as a missing chat.
		if !self.store.is_participant(chat_id, actor).await? {
			return Err(ApiError::NotFound("chat not found".to_string()));
		}

		Ok(chat)
	}

	async fn summarize(&self, chat: ChatRecord, actor: UserId) -> Result<ChatSummary, ApiError> {
		let participants = self.store.participants(chat.id).await?;
		let unread_count = self.store.unread_count(chat.id, actor).await?;
		Ok(ChatSummary {
			chat,
			participants,
			unread_count,
		})
	}

	async fn display_name(&self, user: UserId) -> anyhow::Result<String> {
		Ok(self
			.store
			.user_by_id(user)
			.await?
			.map(|u| u.username)
			.unwrap_or_else(|| user.to_string()))
	}
}
