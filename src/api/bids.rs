use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::{auth::AuthSession, session::AppState};
use crate::error::Result;
use crate::models::{bid::Bid, money::Money};
use crate::services::marketplace::{self, AcceptedBid};

#[derive(Debug, Deserialize)]
pub struct PlaceBidRequest {
    pub amount: Money,
}

/// Place a bid on an auction ticket (the path ID is the ticket)
async fn place_bid(
    State(state): State<AppState>,
    session: AuthSession,
    Path(ticket_id): Path<Uuid>,
    payload: std::result::Result<Json<PlaceBidRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Bid>)> {
    let Json(req) = payload?;

    let bid = marketplace::place_bid(&state.pool, &session.user, ticket_id, req.amount).await?;

    Ok((StatusCode::CREATED, Json(bid)))
}

async fn accept_bid(
    State(state): State<AppState>,
    session: AuthSession,
    Path(bid_id): Path<Uuid>,
) -> Result<Json<AcceptedBid>> {
    let accepted =
        marketplace::accept_bid(&state.pool, &state.notifier, &session.user, bid_id).await?;

    Ok(Json(accepted))
}

async fn reject_bid(
    State(state): State<AppState>,
    session: AuthSession,
    Path(bid_id): Path<Uuid>,
) -> Result<Json<Bid>> {
    let bid = marketplace::reject_bid(&state.pool, &session.user, bid_id).await?;

    Ok(Json(bid))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/bids/:id", post(place_bid))
        .route("/api/bids/:id/accept", put(accept_bid))
        .route("/api/bids/:id/reject", put(reject_bid))
}
