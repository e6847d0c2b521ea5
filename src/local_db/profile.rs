//! # Profile, Rewards and Subscription Operations
//!
//! Storage for the coordinator-owned record kinds. Each kind has a
//! connection-level writer the resource coordinator composes into one
//! transaction with the matching sync-state row, plus pool-level readers for
//! the UI collaborator.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::local_db::sync_state::parse_optional_ts;
use crate::local_db::{LocalDatabase, Result};
use crate::shared::models::{RewardsProfile, Subscription, UserProfile};

impl LocalDatabase {
    /// Load the stored user profile, if one has been synced
    pub async fn get_profile(&self) -> Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT id, name, email, member_since FROM user_profile LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(row_to_profile(&row)?)),
            None => Ok(None),
        }
    }

    /// Load the stored rewards profile for a rider
    pub async fn get_rewards(&self, user_id: &str) -> Result<Option<RewardsProfile>> {
        let row = sqlx::query(
            "SELECT user_id, points, lifetime_points, level FROM rewards_profile WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(RewardsProfile {
                user_id: row.try_get("user_id")?,
                points: row.try_get("points")?,
                lifetime_points: row.try_get("lifetime_points")?,
                level: row.try_get("level")?,
            })),
            None => Ok(None),
        }
    }

    /// Load the stored subscriptions for a rider
    pub async fn get_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>> {
        let rows = sqlx::query(
            "SELECT id, user_id, plan_name, active, renews_at
             FROM subscriptions WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Subscription {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    plan_name: row.try_get("plan_name")?,
                    active: row.try_get("active")?,
                    renews_at: parse_optional_ts(row.try_get("renews_at")?)?,
                })
            })
            .collect()
    }
}

/// Write the user profile (single-row table)
pub(crate) async fn write_profile(
    conn: &mut SqliteConnection,
    profile: &UserProfile,
) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO user_profile (id, name, email, member_since, updated_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&profile.id)
    .bind(&profile.name)
    .bind(profile.email.as_deref())
    .bind(profile.member_since.map(|t| t.to_rfc3339()))
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

/// Write the rewards profile
pub(crate) async fn write_rewards(
    conn: &mut SqliteConnection,
    rewards: &RewardsProfile,
) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO rewards_profile
            (user_id, points, lifetime_points, level, updated_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&rewards.user_id)
    .bind(rewards.points)
    .bind(rewards.lifetime_points)
    .bind(rewards.level.as_deref())
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

/// Replace a rider's subscriptions with the freshly fetched set
pub(crate) async fn replace_subscriptions(
    conn: &mut SqliteConnection,
    user_id: &str,
    subscriptions: &[Subscription],
) -> Result<()> {
    sqlx::query("DELETE FROM subscriptions WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    for sub in subscriptions {
        sqlx::query(
            "INSERT INTO subscriptions (id, user_id, plan_name, active, renews_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&sub.id)
        .bind(&sub.user_id)
        .bind(&sub.plan_name)
        .bind(sub.active)
        .bind(sub.renews_at.map(|t| t.to_rfc3339()))
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn row_to_profile(row: &SqliteRow) -> Result<UserProfile> {
    Ok(UserProfile {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        member_since: parse_optional_ts(row.try_get("member_since")?)?,
    })
}
