#![forbid(unsafe_code)]

//! Durable state for chats, messages, notifications and push tokens.
//!
//! Single SQLite backend behind [`Store`]; every write is a single atomic
//! statement or a short transaction, so each step is safe to retry on its own.

mod chats;
mod messages;
mod models;
mod notifications;
mod plans;
mod settings;
mod users;

use std::str::FromStr as _;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context as _;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use crate::models::{
	ChatRecord, ChatSettingRecord, ContentPlanRecord, MessageRecord, NotificationRecord, PushTokenRecord, UserRecord,
};

/// Handle to the durable store. Cheap to clone.
#[derive(Clone)]
pub struct Store {
	pool: sqlx::SqlitePool,
}

impl Store {
	/// Connect to `sqlite:...` and run pending migrations.
	pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
		let opts = SqliteConnectOptions::from_str(database_url)
			.context("parse sqlite database url")?
			.create_if_missing(true)
			.foreign_keys(true);

		let pool = SqlitePoolOptions::new()
			.connect_with(opts)
			.await
			.context("connect sqlite")?;

		sqlx::migrate!().run(&pool).await.context("run sqlite migrations")?;
		tracing::debug!(database_url, "sqlite migrations applied");

		Ok(Self { pool })
	}

	/// In-memory store for tests. Single connection so every statement sees
	/// the same database.
	pub async fn connect_in_memory() -> anyhow::Result<Self> {
		let opts = SqliteConnectOptions::from_str("sqlite::memory:")
			.context("parse in-memory sqlite url")?
			.foreign_keys(true);

		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.connect_with(opts)
			.await
			.context("connect in-memory sqlite")?;

		sqlx::migrate!().run(&pool).await.context("run sqlite migrations")?;

		Ok(Self { pool })
	}

	pub(crate) fn pool(&self) -> &sqlx::SqlitePool {
		&self.pool
	}
}

/// Current Unix time in milliseconds.
pub(crate) fn unix_ms_now() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or(Duration::from_secs(0))
		.as_millis() as i64
}
