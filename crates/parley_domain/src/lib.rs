#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("not a valid numeric id: {0}")]
	InvalidNumber(String),
	#[error("unknown variant: {0}")]
	UnknownVariant(String),
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

macro_rules! numeric_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(i64);

		impl $name {
			/// Wrap a store-assigned id.
			pub const fn new(id: i64) -> Self {
				Self(id)
			}

			pub const fn as_i64(self) -> i64 {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl FromStr for $name {
			type Err = ParseIdError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				let s = s.trim();
				if s.is_empty() {
					return Err(ParseIdError::Empty);
				}
				s.parse::<i64>()
					.map(Self)
					.map_err(|_| ParseIdError::InvalidNumber(s.to_string()))
			}
		}
	};
}

numeric_id! {
	/// Store-assigned user identity. Monotonically increasing per process.
	UserId
}

numeric_id! {
	/// Store-assigned chat identity.
	ChatId
}

numeric_id! {
	/// Store-assigned message identity. Ordering ties on `created_at` break on this.
	MessageId
}

numeric_id! {
	/// Store-assigned notification identity.
	NotificationId
}

/// Identity resolved from a bearer credential at connect time.
///
/// Bound to a connection handle once, never re-derived mid-connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
	User(UserId),
	Anonymous,
}

impl Identity {
	pub const fn is_authenticated(self) -> bool {
		matches!(self, Identity::User(_))
	}

	pub const fn user_id(self) -> Option<UserId> {
		match self {
			Identity::User(id) => Some(id),
			Identity::Anonymous => None,
		}
	}
}

/// A named broadcast scope: a chat, or a user's personal notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupName {
	Chat(ChatId),
	User(UserId),
}

impl GroupName {
	/// Prefix for chat-scoped groups.
	pub const CHAT_PREFIX: &'static str = "chat:";
	/// Prefix for per-user notification groups.
	pub const USER_PREFIX: &'static str = "user:";

	/// Parse a `chat:<id>` or `user:<id>` group name.
	pub fn parse(s: &str) -> Result<Self, ParseIdError> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		if let Some(rest) = s.strip_prefix(Self::CHAT_PREFIX) {
			return Ok(GroupName::Chat(rest.parse()?));
		}
		if let Some(rest) = s.strip_prefix(Self::USER_PREFIX) {
			return Ok(GroupName::User(rest.parse()?));
		}

		Err(ParseIdError::InvalidFormat("expected chat:<id> or user:<id>".into()))
	}
}

impl fmt::Display for GroupName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			GroupName::Chat(id) => write!(f, "{}{}", Self::CHAT_PREFIX, id),
			GroupName::User(id) => write!(f, "{}{}", Self::USER_PREFIX, id),
		}
	}
}

impl FromStr for GroupName {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		GroupName::parse(s)
	}
}

/// Type tag for message media attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
	Image,
	Video,
	File,
	Voice,
}

impl MediaType {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			MediaType::Image => "image",
			MediaType::Video => "video",
			MediaType::File => "file",
			MediaType::Voice => "voice",
		}
	}
}

impl fmt::Display for MediaType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for MediaType {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		match s.to_ascii_lowercase().as_str() {
			"image" => Ok(MediaType::Image),
			"video" => Ok(MediaType::Video),
			"file" => Ok(MediaType::File),
			"voice" => Ok(MediaType::Voice),
			other => Err(ParseIdError::UnknownVariant(other.to_string())),
		}
	}
}

/// Type tag for out-of-band notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
	Follow,
	Content,
	Mention,
	ChatRequest,
	ChatAccept,
}

impl NotificationKind {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			NotificationKind::Follow => "follow",
			NotificationKind::Content => "content",
			NotificationKind::Mention => "mention",
			NotificationKind::ChatRequest => "chat_request",
			NotificationKind::ChatAccept => "chat_accept",
		}
	}
}

impl fmt::Display for NotificationKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for NotificationKind {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		match s.to_ascii_lowercase().as_str() {
			"follow" => Ok(NotificationKind::Follow),
			"content" => Ok(NotificationKind::Content),
			"mention" => Ok(NotificationKind::Mention),
			"chat_request" => Ok(NotificationKind::ChatRequest),
			"chat_accept" => Ok(NotificationKind::ChatAccept),
			other => Err(ParseIdError::UnknownVariant(other.to_string())),
		}
	}
}

/// Per-user setting: who may open a direct chat without it becoming a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFirstPermission {
	#[default]
	Anyone,
	Followers,
	Nobody,
}

impl MessageFirstPermission {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			MessageFirstPermission::Anyone => "anyone",
			MessageFirstPermission::Followers => "followers",
			MessageFirstPermission::Nobody => "nobody",
		}
	}
}

impl fmt::Display for MessageFirstPermission {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for MessageFirstPermission {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		match s.to_ascii_lowercase().as_str() {
			"anyone" => Ok(MessageFirstPermission::Anyone),
			"followers" => Ok(MessageFirstPermission::Followers),
			"nobody" => Ok(MessageFirstPermission::Nobody),
			other => Err(ParseIdError::UnknownVariant(other.to_string())),
		}
	}
}

/// String wrapper that never prints its contents.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner secret string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretString(<redacted>)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	#[test]
	fn group_name_parse_roundtrip() {
		let g = GroupName::parse("chat:42").unwrap();
		assert_eq!(g, GroupName::Chat(ChatId::new(42)));
		assert_eq!(g.to_string(), "chat:42");

		let g = GroupName::parse("user:7").unwrap();
		assert_eq!(g, GroupName::User(UserId::new(7)));
		assert_eq!(g.to_string(), "user:7");
	}

	#[test]
	fn group_name_rejects_bad_input() {
		assert!(GroupName::parse("").is_err());
		assert!(GroupName::parse("room:1").is_err());
		assert!(GroupName::parse("chat:").is_err());
		assert!(GroupName::parse("chat:abc").is_err());
	}

	#[test]
	fn media_type_parse_and_display() {
		assert_eq!("image".parse::<MediaType>().unwrap(), MediaType::Image);
		assert_eq!("VOICE".parse::<MediaType>().unwrap(), MediaType::Voice);
		assert_eq!(MediaType::Video.to_string(), "video");
		assert!("gif".parse::<MediaType>().is_err());
	}

	#[test]
	fn message_first_permission_defaults_to_anyone() {
		assert_eq!(MessageFirstPermission::default(), MessageFirstPermission::Anyone);
		assert_eq!("followers".parse::<MessageFirstPermission>().unwrap(), MessageFirstPermission::Followers);
	}

	#[test]
	fn identity_accessors() {
		assert!(Identity::User(UserId::new(1)).is_authenticated());
		assert!(!Identity::Anonymous.is_authenticated());
		assert_eq!(Identity::Anonymous.user_id(), None);
	}

	#[test]
	fn secret_string_redacts_debug() {
		let s = SecretString::new("hunter2");
		assert_eq!(format!("{s:?}"), "SecretString(<redacted>)");
		assert_eq!(s.expose(), "hunter2");
	}

	#[test]
	fn ids_serialize_transparently() {
		assert_eq!(serde_json::to_string(&ChatId::new(5)).unwrap(), "5");
		let id: UserId = serde_json::from_str("12").unwrap();
		assert_eq!(id, UserId::new(12));
	}

	proptest! {
		#[test]
		fn group_name_display_parse_roundtrip(id in 0i64..i64::MAX, chat in any::<bool>()) {
			let g = if chat {
				GroupName::Chat(ChatId::new(id))
			} else {
				GroupName::User(UserId::new(id))
			};
			prop_assert_eq!(GroupName::parse(&g.to_string()).unwrap(), g);
		}

		#[test]
		fn numeric_id_display_parse_roundtrip(id in any::<i64>()) {
			let uid = UserId::new(id);
			prop_assert_eq!(uid.to_string().parse::<UserId>().unwrap(), uid);
		}
	}
}
