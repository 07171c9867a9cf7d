use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "ticket_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Available,
    Reserved,
    Sold,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "listing_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingType {
    DirectSale,
    Auction,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub seller_id: Uuid,
    pub buyer_id: Option<Uuid>,
    pub price: Money,
    pub status: TicketStatus,
    pub listing_type: ListingType,
    pub end_time: Option<DateTime<Utc>>,
    pub is_listed: bool,
    pub section: Option<String>,
    #[serde(rename = "row")]
    pub row_label: Option<String>,
    pub seat: Option<String>,
    pub resold_from: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Price and sale mechanics of a listing.
///
/// An auction always carries its end time; a direct sale never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingTerms {
    DirectSale { price: Money },
    Auction { price: Money, end_time: DateTime<Utc> },
}

impl ListingTerms {
    pub fn price(&self) -> Money {
        match self {
            ListingTerms::DirectSale { price } | ListingTerms::Auction { price, .. } => *price,
        }
    }

    pub fn listing_type(&self) -> ListingType {
        match self {
            ListingTerms::DirectSale { .. } => ListingType::DirectSale,
            ListingTerms::Auction { .. } => ListingType::Auction,
        }
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        match self {
            ListingTerms::DirectSale { .. } => None,
            ListingTerms::Auction { end_time, .. } => Some(*end_time),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatInfo {
    pub section: Option<String>,
    pub row: Option<String>,
    pub seat: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub event_id: Uuid,
    pub seller_id: Uuid,
    pub terms: ListingTerms,
    pub seat: SeatInfo,
    pub resold_from: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub event_id: Option<Uuid>,
    pub listing_type: Option<ListingType>,
}

impl Ticket {
    pub fn seat_info(&self) -> SeatInfo {
        SeatInfo {
            section: self.section.clone(),
            row: self.row_label.clone(),
            seat: self.seat.clone(),
        }
    }

    pub async fn insert(conn: &mut PgConnection, data: NewTicket) -> Result<Self, sqlx::Error> {
        let ticket = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO tickets (
                event_id, seller_id, price, listing_type, end_time,
                section, row_label, seat, resold_from
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(data.event_id)
        .bind(data.seller_id)
        .bind(data.terms.price())
        .bind(data.terms.listing_type())
        .bind(data.terms.end_time())
        .bind(data.seat.section)
        .bind(data.seat.row)
        .bind(data.seat.seat)
        .bind(data.resold_from)
        .fetch_one(conn)
        .await?;

        Ok(ticket)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let ticket = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM tickets WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(ticket)
    }

    /// Loads the ticket and holds its row lock until the transaction ends
    pub async fn lock_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let ticket = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM tickets WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(ticket)
    }

    /// Listed tickets still open for sale
    pub async fn list_open(pool: &PgPool, filter: &TicketFilter) -> Result<Vec<Self>, sqlx::Error> {
        let tickets = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM tickets
            WHERE status = 'AVAILABLE'
              AND is_listed = TRUE
              AND ($1::UUID IS NULL OR event_id = $1)
              AND ($2::listing_type IS NULL OR listing_type = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.event_id)
        .bind(filter.listing_type)
        .fetch_all(pool)
        .await?;

        Ok(tickets)
    }

    pub async fn list_by_seller(pool: &PgPool, seller_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let tickets = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM tickets
            WHERE seller_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(seller_id)
        .fetch_all(pool)
        .await?;

        Ok(tickets)
    }

    /// Tickets the user holds but is not currently selling: purchases that
    /// have not been resold, and their own cancelled listings
    pub async fn list_held_by(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let tickets = sqlx::query_as::<_, Self>(
            r#"
            SELECT t.* FROM tickets t
            WHERE (
                t.status = 'SOLD'
                AND t.buyer_id = $1
                AND NOT EXISTS (SELECT 1 FROM tickets r WHERE r.resold_from = t.id)
            ) OR (
                t.status = 'AVAILABLE'
                AND t.seller_id = $1
                AND t.is_listed = FALSE
            )
            ORDER BY t.updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(tickets)
    }

    pub async fn is_resold(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let resold: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM tickets WHERE resold_from = $1)
            "#,
        )
        .bind(id)
        .fetch_one(conn)
        .await?;

        Ok(resold)
    }

    pub async fn mark_sold(
        conn: &mut PgConnection,
        id: Uuid,
        buyer_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let ticket = sqlx::query_as::<_, Self>(
            r#"
            UPDATE tickets
            SET status = 'SOLD', buyer_id = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'AVAILABLE'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(buyer_id)
        .fetch_one(conn)
        .await?;

        Ok(ticket)
    }

    pub async fn unlist(conn: &mut PgConnection, id: Uuid) -> Result<Self, sqlx::Error> {
        let ticket = sqlx::query_as::<_, Self>(
            r#"
            UPDATE tickets
            SET is_listed = FALSE, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(conn)
        .await?;

        Ok(ticket)
    }

    /// Puts an unlisted ticket back on sale under new terms
    pub async fn relist(
        conn: &mut PgConnection,
        id: Uuid,
        terms: ListingTerms,
    ) -> Result<Self, sqlx::Error> {
        let ticket = sqlx::query_as::<_, Self>(
            r#"
            UPDATE tickets
            SET is_listed = TRUE, price = $2, listing_type = $3, end_time = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(terms.price())
        .bind(terms.listing_type())
        .bind(terms.end_time())
        .fetch_one(conn)
        .await?;

        Ok(ticket)
    }

    /// Administrative status change out of AVAILABLE. Returns `None` when the
    /// ticket is missing or has already left AVAILABLE.
    pub async fn set_status(
        pool: &PgPool,
        id: Uuid,
        status: TicketStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        let ticket = sqlx::query_as::<_, Self>(
            r#"
            UPDATE tickets
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'AVAILABLE'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(pool)
        .await?;

        Ok(ticket)
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM tickets WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
