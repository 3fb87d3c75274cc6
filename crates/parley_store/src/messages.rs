#![forbid(unsafe_code)]

use anyhow::Context as _;
use parley_domain::{ChatId, MediaType, MessageId, UserId};

use crate::models::MessageRecord;
use crate::{Store, unix_ms_now};

type MessageRow = (i64, i64, Option<i64>, Option<String>, Option<String>, Option<String>, Option<f64>, i64);

fn message_from_row(row: MessageRow) -> anyhow::Result<MessageRecord> {
	let (id, chat_id, sender_id, content, media, media_type, media_aspect_ratio, created_at) = row;
	let media_type = media_type
		.map(|t| t.parse::<MediaType>())
		.transpose()
		.context("parse stored media type")?;

	Ok(MessageRecord {
		id: MessageId::new(id),
		chat_id: ChatId::new(chat_id),
		sender_id: sender_id.map(UserId::new),
		content,
		media,
		media_type,
		media_aspect_ratio,
		created_at,
	})
}

impl Store {
	/// Append a message to a chat. Permission checks happen above the store.
	pub async fn append_message(
		&self,
		chat: ChatId,
		sender: UserId,
		content: Option<&str>,
		media: Option<&str>,
		media_type: Option<MediaType>,
		media_aspect_ratio: Option<f64>,
	) -> anyhow::Result<MessageRecord> {
		let now = unix_ms_now();

		let res = sqlx::query(
			"INSERT INTO messages (chat_id, sender_id, content, media, media_type, media_aspect_ratio, created_at) \
			VALUES (?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(chat.as_i64())
		.bind(sender.as_i64())
		.bind(content)
		.bind(media)
		.bind(media_type.map(|t| t.as_str()))
		.bind(media_aspect_ratio)
		.bind(now)
		.execute(self.pool())
		.await
		.context("insert message")?;

		Ok(MessageRecord {
			id: MessageId::new(res.last_insert_rowid()),
			chat_id: chat,
			sender_id: Some(sender),
			content: content.map(str::to_string),
			media: media.map(str::to_string),
			media_type,
			media_aspect_ratio,
			created_at: now,
		})
	}

	pub async fn message_by_id(&self, id: MessageId) -> anyhow::Result<Option<MessageRecord>> {
		let row: Option<MessageRow> = sqlx::query_as(
			"SELECT id, chat_id, sender_id, content, media, media_type, media_aspect_ratio, created_at \
			FROM messages WHERE id = ?",
		)
		.bind(id.as_i64())
		.fetch_optional(self.pool())
		.await
		.context("select message by id")?;

		row.map(message_from_row).transpose()
	}

	/// One page of a chat's history, newest first, plus the total count.
	/// `page` is 1-based.
	pub async fn messages_page(&self, chat: ChatId, page: u32, page_size: u32) -> anyhow::Result<(Vec<MessageRecord>, u64)> {
		let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE chat_id = ?")
			.bind(chat.as_i64())
			.fetch_one(self.pool())
			.await
			.context("count chat messages")?;

		let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);
		let rows: Vec<MessageRow> = sqlx::query_as(
			"SELECT id, chat_id, sender_id, content, media, media_type, media_aspect_ratio, created_at \
			FROM messages WHERE chat_id = ? \
			ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
		)
		.bind(chat.as_i64())
		.bind(i64::from(page_size))
		.bind(offset)
		.fetch_all(self.pool())
		.await
		.context("select chat message page")?;

		let messages = rows.into_iter().map(message_from_row).collect::<anyhow::Result<_>>()?;
		Ok((messages, total as u64))
	}

	/// The full chat history in send order.
	pub async fn messages_chronological(&self, chat: ChatId) -> anyhow::Result<Vec<MessageRecord>> {
		let rows: Vec<MessageRow> = sqlx::query_as(
			"SELECT id, chat_id, sender_id, content, media, media_type, media_aspect_ratio, created_at \
			FROM messages WHERE chat_id = ? ORDER BY created_at ASC, id ASC",
		)
		.bind(chat.as_i64())
		.fetch_all(self.pool())
		.await
		.context("select chat messages")?;

		rows.into_iter().map(message_from_row).collect()
	}

	/// Record that `user` has read a single message. Idempotent.
	pub async fn mark_read(&self, message: MessageId, user: UserId) -> anyhow::Result<()> {
		sqlx::query("INSERT OR IGNORE INTO message_reads (message_id, user_id, created_at) VALUES (?, ?, ?)")
			.bind(message.as_i64())
			.bind(user.as_i64())
			.bind(unix_ms_now())
			.execute(self.pool())
			.await
			.context("insert message read")?;
		Ok(())
	}

	/// Mark every message in the chat read for `user`, in one statement so
	/// messages landing mid-call are either fully included or untouched.
	pub async fn mark_all_read(&self, chat: ChatId, user: UserId) -> anyhow::Result<u64> {
		let res = sqlx::query(
			"INSERT OR IGNORE INTO message_reads (message_id, user_id, created_at) \
			SELECT id, ?, ? FROM messages WHERE chat_id = ?",
		)
		.bind(user.as_i64())
		.bind(unix_ms_now())
		.bind(chat.as_i64())
		.execute(self.pool())
		.await
		.context("mark chat read")?;
		Ok(res.rows_affected())
	}

	/// Messages in the chat that `user` has not read. Own messages count as
	/// unread until marked, so senders mark their own sends on write.
	pub async fn unread_count(&self, chat: ChatId, user: UserId) -> anyhow::Result<u64> {
		let (count,): (i64,) = sqlx::query_as(
			"SELECT COUNT(*) FROM messages m \
			WHERE m.chat_id = ? AND NOT EXISTS ( \
				SELECT 1 FROM message_reads r WHERE r.message_id = m.id AND r.user_id = ? \
			)",
		)
		.bind(chat.as_i64())
		.bind(user.as_i64())
		.fetch_one(self.pool())
		.await
		.context("count unread messages")?;
		Ok(count as u64)
	}
}
