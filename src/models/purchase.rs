use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "purchase_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseStatus {
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Purchase {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub bid_id: Option<Uuid>,
    pub amount: Money,
    pub status: PurchaseStatus,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub ticket_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub bid_id: Option<Uuid>,
    pub amount: Money,
    pub payment_reference: Option<String>,
}

impl Purchase {
    pub async fn insert(conn: &mut PgConnection, data: NewPurchase) -> Result<Self, sqlx::Error> {
        let purchase = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO purchases (ticket_id, buyer_id, seller_id, bid_id, amount, payment_reference)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.ticket_id)
        .bind(data.buyer_id)
        .bind(data.seller_id)
        .bind(data.bid_id)
        .bind(data.amount)
        .bind(data.payment_reference)
        .fetch_one(conn)
        .await?;

        Ok(purchase)
    }

    pub async fn find_by_ticket(pool: &PgPool, ticket_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let purchase = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM purchases WHERE ticket_id = $1
            "#,
        )
        .bind(ticket_id)
        .fetch_optional(pool)
        .await?;

        Ok(purchase)
    }

    pub async fn list_by_buyer(pool: &PgPool, buyer_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let purchases = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM purchases
            WHERE buyer_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(buyer_id)
        .fetch_all(pool)
        .await?;

        Ok(purchases)
    }
}
