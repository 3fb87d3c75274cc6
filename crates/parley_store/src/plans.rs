#![forbid(unsafe_code)]

use anyhow::Context as _;
use parley_domain::UserId;

use crate::models::ContentPlanRecord;
use crate::{Store, unix_ms_now};

impl Store {
	pub async fn create_plan(&self, owner: UserId, name: &str) -> anyhow::Result<ContentPlanRecord> {
		let res = sqlx::query("INSERT INTO content_plans (owner_id, name, created_at) VALUES (?, ?, ?)")
			.bind(owner.as_i64())
			.bind(name)
			.bind(unix_ms_now())
			.execute(self.pool())
			.await
			.context("insert content plan")?;

		Ok(ContentPlanRecord {
			id: res.last_insert_rowid(),
			owner_id: owner,
			name: name.to_string(),
			status: "active".to_string(),
		})
	}

	/// Subscribe `user` to a plan. Resubscribing reactivates a lapsed row.
	pub async fn subscribe_to_plan(&self, plan: i64, user: UserId) -> anyhow::Result<()> {
		sqlx::query(
			"INSERT INTO plan_subscribers (plan_id, user_id, status) VALUES (?, ?, 'active') \
			ON CONFLICT (plan_id, user_id) DO UPDATE SET status = 'active'",
		)
		.bind(plan)
		.bind(user.as_i64())
		.execute(self.pool())
		.await
		.context("insert plan subscriber")?;
		Ok(())
	}

	pub async fn plan_by_owner_and_name(&self, owner: UserId, name: &str) -> anyhow::Result<Option<ContentPlanRecord>> {
		let row: Option<(i64, i64, String, String)> =
			sqlx::query_as("SELECT id, owner_id, name, status FROM content_plans WHERE owner_id = ? AND name = ?")
				.bind(owner.as_i64())
				.bind(name)
				.fetch_optional(self.pool())
				.await
				.context("select plan by owner and name")?;

		Ok(row.map(|(id, owner_id, name, status)| ContentPlanRecord {
			id,
			owner_id: UserId::new(owner_id),
			name,
			status,
		}))
	}

	/// Users with an active subscription to an active plan; the audience for
	/// plan-scoped content notifications.
	pub async fn active_plan_subscribers(&self, plan: i64) -> anyhow::Result<Vec<UserId>> {
		let rows: Vec<(i64,)> = sqlx::query_as(
			"SELECT s.user_id FROM plan_subscribers s \
			JOIN content_plans p ON p.id = s.plan_id \
			WHERE s.plan_id = ? AND s.status = 'active' AND p.status = 'active' \
			ORDER BY s.user_id",
		)
		.bind(plan)
		.fetch_all(self.pool())
		.await
		.context("select active plan subscribers")?;

		Ok(rows.into_iter().map(|(id,)| UserId::new(id)).collect())
	}
}
