use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::{auth::AuthSession, session::AppState};
use crate::error::Result;
use crate::models::{
    bid::Bid,
    money::Money,
    ticket::{ListingTerms, ListingType, SeatInfo, Ticket, TicketFilter},
};
use crate::services::{
    lifecycle,
    marketplace::{self, CreateListing, Sale, TicketDetail},
    payment::{CardDetails, CardInput},
};

/// Listing terms as submitted; parsed into [`ListingTerms`] before use
#[derive(Debug, Deserialize)]
pub struct ListingTermsRequest {
    pub listing_type: ListingType,
    pub price: Money,
    pub end_time: Option<DateTime<Utc>>,
}

impl ListingTermsRequest {
    fn parse(self, now: DateTime<Utc>) -> Result<ListingTerms> {
        Ok(lifecycle::parse_listing_terms(
            self.listing_type,
            self.price,
            self.end_time,
            now,
        )?)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateListingRequest {
    pub event_id: Uuid,
    #[serde(flatten)]
    pub terms: ListingTermsRequest,
    #[serde(flatten)]
    pub seat: SeatInfo,
}

#[derive(Debug, Deserialize)]
pub struct ListTicketsQuery {
    pub event_id: Option<Uuid>,
    pub listing_type: Option<ListingType>,
}

/// List tickets currently on sale
async fn list_tickets(
    State(state): State<AppState>,
    Query(params): Query<ListTicketsQuery>,
) -> Result<Json<Vec<Ticket>>> {
    let tickets = Ticket::list_open(
        &state.pool,
        &TicketFilter {
            event_id: params.event_id,
            listing_type: params.listing_type,
        },
    )
    .await?;

    Ok(Json(tickets))
}

async fn create_listing(
    State(state): State<AppState>,
    session: AuthSession,
    payload: std::result::Result<Json<CreateListingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Ticket>)> {
    let Json(req) = payload?;
    let terms = req.terms.parse(Utc::now())?;

    let ticket = marketplace::create_listing(
        &state.pool,
        &session.user,
        CreateListing {
            event_id: req.event_id,
            terms,
            seat: req.seat,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketDetail>> {
    let detail = marketplace::ticket_detail(&state.pool, id).await?;

    Ok(Json(detail))
}

async fn purchase_ticket(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<Uuid>,
    payload: std::result::Result<Json<CardInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Sale>)> {
    let Json(input) = payload?;
    let card = CardDetails::parse(input, Utc::now().date_naive())?;

    let sale = marketplace::purchase_ticket(
        &state.pool,
        state.payments.as_ref(),
        &state.notifier,
        &session.user,
        id,
        card,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(sale)))
}

async fn cancel_listing(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>> {
    let ticket = marketplace::cancel_listing(&state.pool, &session.user, id).await?;

    Ok(Json(ticket))
}

async fn resell_ticket(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<Uuid>,
    payload: std::result::Result<Json<ListingTermsRequest>, JsonRejection>,
) -> Result<Json<Ticket>> {
    let Json(req) = payload?;
    let terms = req.parse(Utc::now())?;

    let ticket = marketplace::resell_ticket(&state.pool, &session.user, id, terms).await?;

    Ok(Json(ticket))
}

async fn ticket_bids(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Bid>>> {
    let bids = marketplace::visible_bids(&state.pool, &session.user, id).await?;

    Ok(Json(bids))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_listing))
        .route("/api/tickets/:id", get(get_ticket))
        .route("/api/tickets/:id/purchase", post(purchase_ticket))
        .route("/api/tickets/:id/cancel-listing", put(cancel_listing))
        .route("/api/tickets/:id/resell", put(resell_ticket))
        .route("/api/tickets/:id/bids", get(ticket_bids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_create_request_parses_flattened_fields() {
        let end = Utc::now() + Duration::hours(1);
        let body = serde_json::json!({
            "event_id": Uuid::new_v4(),
            "listing_type": "AUCTION",
            "price": 10_000,
            "end_time": end,
            "section": "B",
            "row": "12",
        });

        let req: CreateListingRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.seat.section.as_deref(), Some("B"));
        assert_eq!(req.seat.row.as_deref(), Some("12"));
        assert_eq!(req.seat.seat, None);

        let terms = req.terms.parse(Utc::now()).unwrap();
        assert_eq!(terms.price(), Money::from_major(100));
        assert_eq!(terms.listing_type(), ListingType::Auction);
    }

    #[test]
    fn test_unknown_listing_type_is_rejected() {
        let body = serde_json::json!({
            "event_id": Uuid::new_v4(),
            "listing_type": "RAFFLE",
            "price": 500,
        });

        assert!(serde_json::from_value::<CreateListingRequest>(body).is_err());
    }

    #[test]
    fn test_fractional_price_is_rejected() {
        let body = serde_json::json!({
            "listing_type": "DIRECT_SALE",
            "price": 99.5,
        });

        assert!(serde_json::from_value::<ListingTermsRequest>(body).is_err());
    }
}
