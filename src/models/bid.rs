use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "bid_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Bid {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub bidder_id: Uuid,
    pub amount: Money,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bid {
    pub async fn insert(
        conn: &mut PgConnection,
        ticket_id: Uuid,
        bidder_id: Uuid,
        amount: Money,
    ) -> Result<Self, sqlx::Error> {
        let bid = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO bids (ticket_id, bidder_id, amount)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(ticket_id)
        .bind(bidder_id)
        .bind(amount)
        .fetch_one(conn)
        .await?;

        Ok(bid)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let bid = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM bids WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(bid)
    }

    /// Re-reads the bid inside a transaction, after its ticket has been locked
    pub async fn lock_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let bid = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM bids WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(bid)
    }

    /// Highest amount among bids that are still standing (pending or accepted)
    pub async fn highest_standing(
        conn: &mut PgConnection,
        ticket_id: Uuid,
    ) -> Result<Option<Money>, sqlx::Error> {
        let highest: Option<Money> = sqlx::query_scalar(
            r#"
            SELECT MAX(amount) FROM bids
            WHERE ticket_id = $1 AND status IN ('PENDING', 'ACCEPTED')
            "#,
        )
        .bind(ticket_id)
        .fetch_one(conn)
        .await?;

        Ok(highest)
    }

    pub async fn list_by_ticket(pool: &PgPool, ticket_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let bids = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM bids
            WHERE ticket_id = $1
            ORDER BY amount DESC, created_at ASC
            "#,
        )
        .bind(ticket_id)
        .fetch_all(pool)
        .await?;

        Ok(bids)
    }

    pub async fn list_by_bidder(pool: &PgPool, bidder_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let bids = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM bids
            WHERE bidder_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(bidder_id)
        .fetch_all(pool)
        .await?;

        Ok(bids)
    }

    pub async fn set_status(
        conn: &mut PgConnection,
        id: Uuid,
        status: BidStatus,
    ) -> Result<Self, sqlx::Error> {
        let bid = sqlx::query_as::<_, Self>(
            r#"
            UPDATE bids
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_one(conn)
        .await?;

        Ok(bid)
    }

    /// Closes every pending bid on a ticket; returns how many were rejected
    pub async fn reject_pending(conn: &mut PgConnection, ticket_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE bids
            SET status = 'REJECTED', updated_at = NOW()
            WHERE ticket_id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(ticket_id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }
}
