use axum::{extract::State, routing::get, Json, Router};

use crate::api::middleware::{auth::AuthSession, session::AppState};
use crate::error::Result;
use crate::models::{bid::Bid, purchase::Purchase, ticket::Ticket, user::User};

async fn profile(session: AuthSession) -> Json<User> {
    Json(session.user)
}

/// Every ticket the caller has listed, in any state
async fn my_listings(State(state): State<AppState>, session: AuthSession) -> Result<Json<Vec<Ticket>>> {
    let tickets = Ticket::list_by_seller(&state.pool, session.user.id).await?;

    Ok(Json(tickets))
}

/// Tickets the caller holds and is not currently selling
async fn my_tickets(State(state): State<AppState>, session: AuthSession) -> Result<Json<Vec<Ticket>>> {
    let tickets = Ticket::list_held_by(&state.pool, session.user.id).await?;

    Ok(Json(tickets))
}

async fn my_bids(State(state): State<AppState>, session: AuthSession) -> Result<Json<Vec<Bid>>> {
    let bids = Bid::list_by_bidder(&state.pool, session.user.id).await?;

    Ok(Json(bids))
}

async fn my_purchases(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<Vec<Purchase>>> {
    let purchases = Purchase::list_by_buyer(&state.pool, session.user.id).await?;

    Ok(Json(purchases))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/me", get(profile))
        .route("/api/me/listings", get(my_listings))
        .route("/api/me/tickets", get(my_tickets))
        .route("/api/me/bids", get(my_bids))
        .route("/api/me/purchases", get(my_purchases))
}
