#![forbid(unsafe_code)]

use parley_domain::{ChatId, UserId};
use parley_store::{MessageRecord, Store};
use serde::Serialize;

use crate::server::error::ApiError;
use crate::server::frames::InboundFrame;

/// One page of a chat's history, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
	pub count: u64,
	pub page: u32,
	pub page_size: u32,
	pub results: Vec<MessageRecord>,
}

/// Message persistence and read tracking on behalf of the gateway and the
/// HTTP surface. Messages are immutable once appended.
#[derive(Clone)]
pub struct MessageService {
	store: Store,
}

impl MessageService {
	pub fn new(store: Store) -> Self {
		Self { store }
	}

	/// Persist an inbound frame as a message from `sender`.
	///
	/// The sender must be a current participant. The sender's own read
	/// receipt is recorded on the way in, so their unread count never
	/// includes their own messages.
	pub async fn append(&self, sender: UserId, chat: ChatId, frame: &InboundFrame) -> Result<MessageRecord, ApiError> {
		if !self.store.is_participant(chat, sender).await? {
			return Err(ApiError::Permission("not a participant of this chat".to_string()));
		}

		if frame.is_empty() {
			return Err(ApiError::Validation("message must carry text or media".to_string()));
		}

		if frame.media.is_none() && (frame.media_type.is_some() || frame.media_aspect_ratio.is_some()) {
			return Err(ApiError::Validation("media metadata without media".to_string()));
		}

		let content = frame.message.as_deref().map(str::trim).filter(|m| !m.is_empty());
		let message = self
			.store
			.append_message(
				chat,
				sender,
				content,
				frame.media.as_deref(),
				frame.media_type,
				frame.media_aspect_ratio,
			)
			.await?;

		self.store.mark_read(message.id, sender).await?;
		metrics::counter!("parley_server_messages_total").increment(1);

		Ok(message)
	}

	/// Paginated history for a participant, newest first. Non-participants
	/// get the same answer as a missing chat.
	pub async fn page(&self, actor: UserId, chat: ChatId, page: u32, page_size: u32) -> Result<MessagePage, ApiError> {
		if self.store.chat_by_id(chat).await?.is_none() || !self.store.is_participant(chat, actor).await? {
			return Err(ApiError::NotFound("chat not found".to_string()));
		}

		let page = page.max(1);
		let (results, count) = self.store.messages_page(chat, page, page_size).await?;

		Ok(MessagePage {
			count,
			page,
			page_size,
			results,
		})
	}
}
