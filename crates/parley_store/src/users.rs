#![forbid(unsafe_code)]

use anyhow::Context as _;
use parley_domain::UserId;

use crate::models::UserRecord;
use crate::{Store, unix_ms_now};

impl Store {
	/// Create a user row. The user service proper is an external collaborator;
	/// this projection exists for display names and membership checks.
	pub async fn create_user(&self, username: &str) -> anyhow::Result<UserRecord> {
		let res = sqlx::query("INSERT INTO users (username, created_at) VALUES (?, ?)")
			.bind(username)
			.bind(unix_ms_now())
			.execute(self.pool())
			.await
			.context("insert user")?;

		Ok(UserRecord {
			id: UserId::new(res.last_insert_rowid()),
			username: username.to_string(),
		})
	}

	pub async fn user_by_id(&self, id: UserId) -> anyhow::Result<Option<UserRecord>> {
		let row: Option<(i64, String)> = sqlx::query_as("SELECT id, username FROM users WHERE id = ?")
			.bind(id.as_i64())
			.fetch_optional(self.pool())
			.await
			.context("select user by id")?;

		Ok(row.map(|(id, username)| UserRecord { id: UserId::new(id), username }))
	}

	pub async fn user_by_username(&self, username: &str) -> anyhow::Result<Option<UserRecord>> {
		let row: Option<(i64, String)> = sqlx::query_as("SELECT id, username FROM users WHERE username = ?")
			.bind(username)
			.fetch_optional(self.pool())
			.await
			.context("select user by username")?;

		Ok(row.map(|(id, username)| UserRecord { id: UserId::new(id), username }))
	}

	/// Record that `follower` follows `following`. Idempotent.
	pub async fn add_follow(&self, follower: UserId, following: UserId) -> anyhow::Result<()> {
		sqlx::query("INSERT OR IGNORE INTO user_follows (follower_id, following_id, created_at) VALUES (?, ?, ?)")
			.bind(follower.as_i64())
			.bind(following.as_i64())
			.bind(unix_ms_now())
			.execute(self.pool())
			.await
			.context("insert follow")?;
		Ok(())
	}

	pub async fn follows(&self, follower: UserId, following: UserId) -> anyhow::Result<bool> {
		let row: Option<(i64,)> =
			sqlx::query_as("SELECT 1 FROM user_follows WHERE follower_id = ? AND following_id = ?")
				.bind(follower.as_i64())
				.bind(following.as_i64())
				.fetch_optional(self.pool())
				.await
				.context("select follow")?;
		Ok(row.is_some())
	}

	/// Record that `blocker` blocks `blocked`. Blocking twice is a no-op.
	pub async fn add_block(&self, blocker: UserId, blocked: UserId) -> anyhow::Result<()> {
		sqlx::query("INSERT OR IGNORE INTO user_blocks (blocker_id, blocked_id, created_at) VALUES (?, ?, ?)")
			.bind(blocker.as_i64())
			.bind(blocked.as_i64())
			.bind(unix_ms_now())
			.execute(self.pool())
			.await
			.context("insert block")?;
		Ok(())
	}

	/// Whether a block exists between the pair, in either direction.
	pub async fn block_exists_between(&self, a: UserId, b: UserId) -> anyhow::Result<bool> {
		let row: Option<(i64,)> = sqlx::query_as(
			"SELECT 1 FROM user_blocks \
			WHERE (blocker_id = ? AND blocked_id = ?) OR (blocker_id = ? AND blocked_id = ?)",
		)
		.bind(a.as_i64())
		.bind(b.as_i64())
		.bind(b.as_i64())
		.bind(a.as_i64())
		.fetch_optional(self.pool())
		.await
		.context("select block")?;
		Ok(row.is_some())
	}
}
