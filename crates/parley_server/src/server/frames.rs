#![forbid(unsafe_code)]

use parley_domain::MediaType;
use parley_store::MessageRecord;
use serde::{Deserialize, Serialize};

/// Client-to-server frame on a chat socket.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundFrame {
	pub message: Option<String>,
	pub media: Option<String>,
	pub media_type: Option<MediaType>,
	pub media_aspect_ratio: Option<f64>,
}

impl InboundFrame {
	/// A frame carrying neither text nor media is ignored, not an error.
	pub fn is_empty(&self) -> bool {
		self.message.as_deref().is_none_or(|m| m.trim().is_empty()) && self.media.as_deref().is_none_or(str::is_empty)
	}
}

/// A persisted message as broadcast: the stored row plus the sender's
/// display name resolved at connect time.
#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
	#[serde(flatten)]
	pub record: MessageRecord,
	pub sender_username: String,
}

/// Server-to-client frame, fanned out through the registry.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Frame {
	/// A persisted chat message, broadcast to the chat group.
	ChatMessage { message: WireMessage, user: String },

	/// A notification body, broadcast to the recipient's user group.
	Notification { message: String },
}
