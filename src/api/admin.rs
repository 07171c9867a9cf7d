use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::{auth::AdminSession, session::AppState};
use crate::error::{AppError, Result};
use crate::models::{
    event::{CreateEventData, Event, UpdateEventData},
    ticket::{Ticket, TicketStatus},
    user::{CreateUserData, User, UserRole},
};
use crate::services::token;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub display_name: String,
    pub role: Option<UserRole>,
}

#[derive(Debug, Serialize)]
pub struct AccessTokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub venue: String,
    pub starts_at: DateTime<Utc>,
    pub capacity: i32,
    pub category: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub venue: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub capacity: Option<i32>,
    pub category: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetTicketStatusRequest {
    pub status: TicketStatus,
}

fn required(field: &str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn optional(field: &str, value: Option<String>) -> Result<Option<String>> {
    value.map(|v| required(field, v)).transpose()
}

fn positive_capacity(capacity: i32) -> Result<i32> {
    if capacity <= 0 {
        return Err(AppError::Validation(
            "Capacity must be a positive number".to_string(),
        ));
    }
    Ok(capacity)
}

fn validate_email(email: String) -> Result<String> {
    let email = required("Email", email)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::Validation("Email address is invalid".to_string())),
    }
}

// Users

async fn list_users(State(state): State<AppState>, _admin: AdminSession) -> Result<Json<Vec<User>>> {
    let users = User::list(&state.pool).await?;

    Ok(Json(users))
}

async fn create_user(
    State(state): State<AppState>,
    admin: AdminSession,
    payload: std::result::Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>)> {
    let Json(req) = payload?;
    let email = validate_email(req.email)?;
    let display_name = required("Display name", req.display_name)?;

    if User::find_by_email(&state.pool, &email).await?.is_some() {
        return Err(AppError::Conflict("Email is already registered".to_string()));
    }

    let user = User::create(
        &state.pool,
        CreateUserData {
            email,
            display_name,
            role: req.role.unwrap_or(UserRole::User),
        },
    )
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("Email is already registered".to_string())
        }
        other => AppError::Database(other),
    })?;

    tracing::info!(user_id = %user.id, admin_id = %admin.user.id, role = ?user.role, "User created");

    Ok((StatusCode::CREATED, Json(user)))
}

async fn set_banned(state: &AppState, admin: &AdminSession, id: Uuid, banned: bool) -> Result<User> {
    let target = User::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if target.is_admin() {
        return Err(AppError::Forbidden("Admins cannot be banned".to_string()));
    }

    let user = User::set_banned(&state.pool, id, banned)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    tracing::info!(user_id = %user.id, admin_id = %admin.user.id, banned, "User ban status changed");

    Ok(user)
}

async fn ban_user(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(id): Path<Uuid>,
) -> Result<Json<User>> {
    Ok(Json(set_banned(&state, &admin, id, true).await?))
}

async fn unban_user(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(id): Path<Uuid>,
) -> Result<Json<User>> {
    Ok(Json(set_banned(&state, &admin, id, false).await?))
}

async fn verify_email(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<Uuid>,
) -> Result<Json<User>> {
    User::mark_email_verified(&state.pool, id).await?;

    let user = User::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Mints a bearer token for a user, for operators working without the
/// identity service. Banned users get none.
async fn issue_user_token(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<AccessTokenResponse>)> {
    let user = User::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    if user.banned {
        return Err(AppError::Forbidden("User is banned".to_string()));
    }

    let now = Utc::now();
    let ttl = chrono::Duration::hours(state.config.token_ttl_hours);
    let token = token::issue_token(&state.token_key, user.id, ttl, now)
        .map_err(|e| AppError::Internal(e.into()))?;

    tracing::info!(user_id = %user.id, admin_id = %admin.user.id, "Access token issued");

    Ok((
        StatusCode::CREATED,
        Json(AccessTokenResponse {
            token,
            expires_at: now + ttl,
        }),
    ))
}

// Events

async fn create_event(
    State(state): State<AppState>,
    admin: AdminSession,
    payload: std::result::Result<Json<CreateEventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Event>)> {
    let Json(req) = payload?;

    let event = Event::create(
        &state.pool,
        CreateEventData {
            title: required("Title", req.title)?,
            venue: required("Venue", req.venue)?,
            starts_at: req.starts_at,
            capacity: positive_capacity(req.capacity)?,
            category: required("Category", req.category)?,
            description: req.description,
        },
    )
    .await?;

    tracing::info!(event_id = %event.id, title = %event.title, admin_id = %admin.user.id, "Event created");

    Ok((StatusCode::CREATED, Json(event)))
}

async fn update_event(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<Uuid>,
    payload: std::result::Result<Json<UpdateEventRequest>, JsonRejection>,
) -> Result<Json<Event>> {
    let Json(req) = payload?;

    let event = Event::update(
        &state.pool,
        id,
        UpdateEventData {
            title: optional("Title", req.title)?,
            venue: optional("Venue", req.venue)?,
            starts_at: req.starts_at,
            capacity: req.capacity.map(positive_capacity).transpose()?,
            category: optional("Category", req.category)?,
            description: req.description,
        },
    )
    .await?
    .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    tracing::info!(event_id = %event.id, "Event updated");

    Ok(Json(event))
}

async fn delete_event(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    if !Event::delete(&state.pool, id).await? {
        return Err(AppError::NotFound("Event not found".to_string()));
    }

    tracing::info!(event_id = %id, "Event deleted");

    Ok(StatusCode::NO_CONTENT)
}

// Tickets

async fn delete_ticket(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    if !Ticket::delete(&state.pool, id).await? {
        return Err(AppError::NotFound("Ticket not found".to_string()));
    }

    tracing::info!(ticket_id = %id, admin_id = %admin.user.id, "Ticket deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Statuses an admin may move an AVAILABLE ticket into. Transitions never
/// lead back to AVAILABLE, and SOLD requires a purchase.
fn override_target(status: TicketStatus) -> Result<TicketStatus> {
    match status {
        TicketStatus::Reserved | TicketStatus::Expired => Ok(status),
        TicketStatus::Available => Err(AppError::Validation(
            "Tickets return to sale only by relisting".to_string(),
        )),
        TicketStatus::Sold => Err(AppError::Validation(
            "Tickets can only be sold through a purchase".to_string(),
        )),
    }
}

async fn set_ticket_status(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<Uuid>,
    payload: std::result::Result<Json<SetTicketStatusRequest>, JsonRejection>,
) -> Result<Json<Ticket>> {
    let Json(req) = payload?;
    let status = override_target(req.status)?;

    let Some(ticket) = Ticket::set_status(&state.pool, id, status).await? else {
        let exists = Ticket::find_by_id(&state.pool, id).await?.is_some();
        return Err(if exists {
            AppError::Conflict("Only available tickets can change status".to_string())
        } else {
            AppError::NotFound("Ticket not found".to_string())
        });
    };

    tracing::info!(ticket_id = %ticket.id, status = ?ticket.status, "Ticket status overridden");

    Ok(Json(ticket))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/users", get(list_users).post(create_user))
        .route("/api/admin/users/:id/ban", put(ban_user))
        .route("/api/admin/users/:id/unban", put(unban_user))
        .route("/api/admin/users/:id/verify-email", put(verify_email))
        .route("/api/admin/users/:id/token", post(issue_user_token))
        .route("/api/admin/events", post(create_event))
        .route(
            "/api/admin/events/:id",
            put(update_event).delete(delete_event),
        )
        .route("/api/admin/tickets/:id", delete(delete_ticket))
        .route("/api/admin/tickets/:id/status", put(set_ticket_status))
}
