#![forbid(unsafe_code)]

use anyhow::Context as _;
use parley_domain::{MessageFirstPermission, UserId};

use crate::models::ChatSettingRecord;
use crate::{Store, unix_ms_now};

impl Store {
	/// A user's chat settings, falling back to defaults when they have never
	/// saved any.
	pub async fn chat_settings(&self, user: UserId) -> anyhow::Result<ChatSettingRecord> {
		let row: Option<(String,)> =
			sqlx::query_as("SELECT message_first_permission FROM chat_settings WHERE user_id = ?")
				.bind(user.as_i64())
				.fetch_optional(self.pool())
				.await
				.context("select chat settings")?;

		let message_first_permission = match row {
			Some((raw,)) => raw.parse().context("parse stored message permission")?,
			None => MessageFirstPermission::default(),
		};

		Ok(ChatSettingRecord { user_id: user, message_first_permission })
	}

	pub async fn set_chat_settings(
		&self,
		user: UserId,
		message_first_permission: MessageFirstPermission,
	) -> anyhow::Result<ChatSettingRecord> {
		sqlx::query(
			"INSERT INTO chat_settings (user_id, message_first_permission, created_at) VALUES (?, ?, ?) \
			ON CONFLICT (user_id) DO UPDATE SET message_first_permission = excluded.message_first_permission",
		)
		.bind(user.as_i64())
		.bind(message_first_permission.as_str())
		.bind(unix_ms_now())
		.execute(self.pool())
		.await
		.context("upsert chat settings")?;

		Ok(ChatSettingRecord { user_id: user, message_first_permission })
	}
}
