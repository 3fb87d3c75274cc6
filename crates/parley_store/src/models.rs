#![forbid(unsafe_code)]

use parley_domain::{ChatId, MediaType, MessageFirstPermission, MessageId, NotificationId, NotificationKind, UserId};
use serde::Serialize;

/// Minimal projection of the out-of-scope user service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
	pub id: UserId,
	pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRecord {
	pub id: ChatId,
	pub name: String,
	pub is_group: bool,
	/// Set only for group chats.
	pub owner_id: Option<UserId>,
	pub is_request: bool,
	/// Who initiated an unaccepted direct chat. Meaningful only while
	/// `is_request` is true.
	pub request_user_id: Option<UserId>,
	pub image: Option<String>,
	pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
	pub id: MessageId,
	pub chat_id: ChatId,
	/// Nullable: the sender may be removed from the system while the message
	/// is retained.
	pub sender_id: Option<UserId>,
	pub content: Option<String>,
	pub media: Option<String>,
	pub media_type: Option<MediaType>,
	pub media_aspect_ratio: Option<f64>,
	pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRecord {
	pub id: NotificationId,
	pub user_id: UserId,
	pub title: String,
	pub body: String,
	pub kind: NotificationKind,
	pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTokenRecord {
	pub id: i64,
	pub user_id: UserId,
	pub token: String,
	pub device_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChatSettingRecord {
	pub user_id: UserId,
	pub message_first_permission: MessageFirstPermission,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPlanRecord {
	pub id: i64,
	pub owner_id: UserId,
	pub name: String,
	pub status: String,
}
