#![forbid(unsafe_code)]

use anyhow::Context as _;
use parley_domain::{ChatId, UserId};

use crate::models::{ChatRecord, UserRecord};
use crate::{Store, unix_ms_now};

const CHAT_COLUMNS: &str = "id, name, is_group, owner_id, is_request, request_user_id, image, created_at";

type ChatRow = (i64, String, i64, Option<i64>, i64, Option<i64>, Option<String>, i64);

fn chat_from_row(row: ChatRow) -> ChatRecord {
	let (id, name, is_group, owner_id, is_request, request_user_id, image, created_at) = row;
	ChatRecord {
		id: ChatId::new(id),
		name,
		is_group: is_group != 0,
		owner_id: owner_id.map(UserId::new),
		is_request: is_request != 0,
		request_user_id: request_user_id.map(UserId::new),
		image,
		created_at,
	}
}

/// Order-independent key for the participant pair of a direct chat.
pub fn direct_key(a: UserId, b: UserId) -> String {
	let (lo, hi) = if a.as_i64() <= b.as_i64() { (a, b) } else { (b, a) };
	format!("{lo}:{hi}")
}

impl Store {
	/// Find-or-create the direct chat between `a` and `b`.
	///
	/// The unordered pair is unique at the schema level (`direct_key`), so a
	/// concurrent duplicate creation lands on the existing row instead of
	/// producing a second chat. Returns the chat and whether it was created
	/// by this call.
	pub async fn create_direct_chat(
		&self,
		a: UserId,
		b: UserId,
		is_request: bool,
		request_user: UserId,
	) -> anyhow::Result<(ChatRecord, bool)> {
		let key = direct_key(a, b);
		let now = unix_ms_now();

		let mut tx = self.pool().begin().await.context("begin direct chat tx")?;

		let res = sqlx::query(
			"INSERT INTO chats (name, is_group, is_request, request_user_id, direct_key, created_at) \
			VALUES ('', 0, ?, ?, ?, ?) \
			ON CONFLICT (direct_key) DO NOTHING",
		)
		.bind(is_request as i64)
		.bind(if is_request { Some(request_user.as_i64()) } else { None })
		.bind(&key)
		.bind(now)
		.execute(&mut *tx)
		.await
		.context("insert direct chat")?;

		let created = res.rows_affected() == 1;

		let row: ChatRow = sqlx::query_as(&format!("SELECT {CHAT_COLUMNS} FROM chats WHERE direct_key = ?"))
			.bind(&key)
			.fetch_one(&mut *tx)
			.await
			.context("select direct chat by pair key")?;
		let chat = chat_from_row(row);

		if created {
			for user in [a, b] {
				sqlx::query("INSERT OR IGNORE INTO chat_participants (chat_id, user_id, created_at) VALUES (?, ?, ?)")
					.bind(chat.id.as_i64())
					.bind(user.as_i64())
					.bind(now)
					.execute(&mut *tx)
					.await
					.context("insert direct chat participant")?;
			}
		}

		tx.commit().await.context("commit direct chat tx")?;
		Ok((chat, created))
	}

	/// Create a group chat owned by `owner` with the given members. The owner
	/// is always a participant; duplicate members are skipped.
	pub async fn create_group_chat(
		&self,
		owner: UserId,
		name: &str,
		image: Option<&str>,
		members: &[UserId],
	) -> anyhow::Result<ChatRecord> {
		let now = unix_ms_now();

		let mut tx = self.pool().begin().await.context("begin group chat tx")?;

		let res = sqlx::query("INSERT INTO chats (name, is_group, owner_id, image, created_at) VALUES (?, 1, ?, ?, ?)")
			.bind(name)
			.bind(owner.as_i64())
			.bind(image)
			.bind(now)
			.execute(&mut *tx)
			.await
			.context("insert group chat")?;
		let chat_id = res.last_insert_rowid();

		for user in std::iter::once(owner).chain(members.iter().copied()) {
			sqlx::query("INSERT OR IGNORE INTO chat_participants (chat_id, user_id, created_at) VALUES (?, ?, ?)")
				.bind(chat_id)
				.bind(user.as_i64())
				.bind(now)
				.execute(&mut *tx)
				.await
				.context("insert group chat participant")?;
		}

		tx.commit().await.context("commit group chat tx")?;

		Ok(ChatRecord {
			id: ChatId::new(chat_id),
			name: name.to_string(),
			is_group: true,
			owner_id: Some(owner),
			is_request: false,
			request_user_id: None,
			image: image.map(str::to_string),
			created_at: now,
		})
	}

	pub async fn chat_by_id(&self, id: ChatId) -> anyhow::Result<Option<ChatRecord>> {
		let row: Option<ChatRow> = sqlx::query_as(&format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?"))
			.bind(id.as_i64())
			.fetch_optional(self.pool())
			.await
			.context("select chat by id")?;
		Ok(row.map(chat_from_row))
	}

	pub async fn is_participant(&self, chat: ChatId, user: UserId) -> anyhow::Result<bool> {
		let row: Option<(i64,)> =
			sqlx::query_as("SELECT 1 FROM chat_participants WHERE chat_id = ? AND user_id = ?")
				.bind(chat.as_i64())
				.bind(user.as_i64())
				.fetch_optional(self.pool())
				.await
				.context("select chat participant")?;
		Ok(row.is_some())
	}

	pub async fn participants(&self, chat: ChatId) -> anyhow::Result<Vec<UserRecord>> {
		let rows: Vec<(i64, String)> = sqlx::query_as(
			"SELECT u.id, u.username FROM users u \
			JOIN chat_participants p ON p.user_id = u.id \
			WHERE p.chat_id = ? ORDER BY u.id",
		)
		.bind(chat.as_i64())
		.fetch_all(self.pool())
		.await
		.context("select chat participants")?;

		Ok(rows
			.into_iter()
			.map(|(id, username)| UserRecord { id: UserId::new(id), username })
			.collect())
	}

	/// Chats visible to `user`: direct-open and group chats plus request
	/// chats the user initiated. Request chats where the user is the passive
	/// recipient surface only via [`Store::request_chats_for`].
	pub async fn chats_for_user(&self, user: UserId) -> anyhow::Result<Vec<ChatRecord>> {
		let rows: Vec<ChatRow> = sqlx::query_as(&format!(
			"SELECT c.{} FROM chats c \
			JOIN chat_participants p ON p.chat_id = c.id \
			WHERE p.user_id = ? AND (c.is_request = 0 OR c.request_user_id = ?) \
			ORDER BY c.created_at DESC, c.id DESC",
			CHAT_COLUMNS.replace(", ", ", c.")
		))
		.bind(user.as_i64())
		.bind(user.as_i64())
		.fetch_all(self.pool())
		.await
		.context("select chats for user")?;

		Ok(rows.into_iter().map(chat_from_row).collect())
	}

	/// Pending request chats where `user` is the passive recipient.
	pub async fn request_chats_for(&self, user: UserId) -> anyhow::Result<Vec<ChatRecord>> {
		let rows: Vec<ChatRow> = sqlx::query_as(&format!(
			"SELECT c.{} FROM chats c \
			JOIN chat_participants p ON p.chat_id = c.id \
			WHERE p.user_id = ? AND c.is_request = 1 AND c.request_user_id <> ? \
			ORDER BY c.created_at DESC, c.id DESC",
			CHAT_COLUMNS.replace(", ", ", c.")
		))
		.bind(user.as_i64())
		.bind(user.as_i64())
		.fetch_all(self.pool())
		.await
		.context("select request chats for user")?;

		Ok(rows.into_iter().map(chat_from_row).collect())
	}

	/// Flip a pending request to open. Returns false if the chat was not a
	/// pending request (already accepted, or not found).
	pub async fn accept_request(&self, chat: ChatId) -> anyhow::Result<bool> {
		let res = sqlx::query("UPDATE chats SET is_request = 0 WHERE id = ? AND is_request = 1")
			.bind(chat.as_i64())
			.execute(self.pool())
			.await
			.context("accept request chat")?;
		Ok(res.rows_affected() > 0)
	}

	/// Delete a chat; messages, reads and participant rows cascade.
	pub async fn delete_chat(&self, chat: ChatId) -> anyhow::Result<bool> {
		let res = sqlx::query("DELETE FROM chats WHERE id = ?")
			.bind(chat.as_i64())
			.execute(self.pool())
			.await
			.context("delete chat")?;
		Ok(res.rows_affected() > 0)
	}
}
