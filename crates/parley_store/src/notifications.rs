#![forbid(unsafe_code)]

use anyhow::Context as _;
use parley_domain::{NotificationId, NotificationKind, UserId};

use crate::models::{NotificationRecord, PushTokenRecord};
use crate::{Store, unix_ms_now};

impl Store {
	/// Persist a notification before any delivery attempt is made.
	pub async fn create_notification(
		&self,
		user: UserId,
		title: &str,
		body: &str,
		kind: NotificationKind,
	) -> anyhow::Result<NotificationRecord> {
		let now = unix_ms_now();

		let res = sqlx::query("INSERT INTO notifications (user_id, title, body, kind, created_at) VALUES (?, ?, ?, ?, ?)")
			.bind(user.as_i64())
			.bind(title)
			.bind(body)
			.bind(kind.as_str())
			.bind(now)
			.execute(self.pool())
			.await
			.context("insert notification")?;

		Ok(NotificationRecord {
			id: NotificationId::new(res.last_insert_rowid()),
			user_id: user,
			title: title.to_string(),
			body: body.to_string(),
			kind,
			created_at: now,
		})
	}

	/// A user's notifications, newest first.
	pub async fn notifications_for_user(&self, user: UserId) -> anyhow::Result<Vec<NotificationRecord>> {
		let rows: Vec<(i64, i64, String, String, String, i64)> = sqlx::query_as(
			"SELECT id, user_id, title, body, kind, created_at FROM notifications \
			WHERE user_id = ? ORDER BY created_at DESC, id DESC",
		)
		.bind(user.as_i64())
		.fetch_all(self.pool())
		.await
		.context("select notifications for user")?;

		rows.into_iter()
			.map(|(id, user_id, title, body, kind, created_at)| {
				Ok(NotificationRecord {
					id: NotificationId::new(id),
					user_id: UserId::new(user_id),
					title,
					body,
					kind: kind.parse().context("parse stored notification kind")?,
					created_at,
				})
			})
			.collect()
	}

	/// Register a device push token for `user`.
	///
	/// A token re-registered by another account moves to that account, and a
	/// device that rotates its token loses the old one. Both happen in one
	/// transaction so a device never holds two live tokens.
	pub async fn upsert_push_token(&self, user: UserId, token: &str, device_id: Option<&str>) -> anyhow::Result<()> {
		let mut tx = self.pool().begin().await.context("begin push token tx")?;

		if let Some(device) = device_id {
			sqlx::query("DELETE FROM push_tokens WHERE device_id = ? AND token <> ?")
				.bind(device)
				.bind(token)
				.execute(&mut *tx)
				.await
				.context("drop stale device tokens")?;
		}

		sqlx::query(
			"INSERT INTO push_tokens (user_id, token, device_id, created_at) VALUES (?, ?, ?, ?) \
			ON CONFLICT (token) DO UPDATE SET user_id = excluded.user_id, device_id = excluded.device_id",
		)
		.bind(user.as_i64())
		.bind(token)
		.bind(device_id)
		.bind(unix_ms_now())
		.execute(&mut *tx)
		.await
		.context("upsert push token")?;

		tx.commit().await.context("commit push token tx")?;
		Ok(())
	}

	pub async fn push_tokens_for_user(&self, user: UserId) -> anyhow::Result<Vec<PushTokenRecord>> {
		let rows: Vec<(i64, i64, String, Option<String>)> =
			sqlx::query_as("SELECT id, user_id, token, device_id FROM push_tokens WHERE user_id = ? ORDER BY id")
				.bind(user.as_i64())
				.fetch_all(self.pool())
				.await
				.context("select push tokens for user")?;

		Ok(rows
			.into_iter()
			.map(|(id, user_id, token, device_id)| PushTokenRecord {
				id,
				user_id: UserId::new(user_id),
				token,
				device_id,
			})
			.collect())
	}

	pub async fn delete_push_token(&self, user: UserId, token: &str) -> anyhow::Result<bool> {
		let res = sqlx::query("DELETE FROM push_tokens WHERE user_id = ? AND token = ?")
			.bind(user.as_i64())
			.bind(token)
			.execute(self.pool())
			.await
			.context("delete push token")?;
		Ok(res.rows_affected() > 0)
	}
}
