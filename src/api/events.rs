use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::session::AppState;
use crate::error::{AppError, Result};
use crate::models::{
    event::{Event, EventFilter},
    ticket::{Ticket, TicketFilter},
};

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    pub category: Option<String>,
    pub upcoming_only: Option<bool>,
}

/// List events, soonest first
async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<ListEventsQuery>,
) -> Result<Json<Vec<Event>>> {
    let filter = EventFilter {
        category: params.category.filter(|c| !c.trim().is_empty()),
        upcoming_only: params.upcoming_only.unwrap_or(false),
    };

    let events = Event::list(&state.pool, &filter).await?;

    Ok(Json(events))
}

async fn get_event(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Event>> {
    let event = Event::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    Ok(Json(event))
}

/// Open listings for one event
async fn event_tickets(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Ticket>>> {
    Event::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    let tickets = Ticket::list_open(
        &state.pool,
        &TicketFilter {
            event_id: Some(id),
            listing_type: None,
        },
    )
    .await?;

    Ok(Json(tickets))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/events", get(list_events))
        .route("/api/events/:id", get(get_event))
        .route("/api/events/:id/tickets", get(event_tickets))
}
