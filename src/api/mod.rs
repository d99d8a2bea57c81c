use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::post;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};

use crate::db::{self, repository};
use crate::error::AppError;
use crate::models::*;
use crate::state::AppState;

#[derive(Deserialize)]
struct ActorRequest {
    actor_id: i64,
}

#[derive(Deserialize)]
struct UpdateRequest {
    student_id: i64,
    #[serde(flatten)]
    changes: UpdateBookingRequest,
}

#[derive(Deserialize)]
struct NotificationQueryParams {
    #[serde(default)]
    unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    pub booking: Booking,
}

impl ActionResponse {
    fn ok(message: &str, booking: Booking) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
            booking,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/users", post(create_user))
        .route("/users/{id}/notifications", get(list_notifications))
        .route("/notifications/{id}/read", post(mark_read))
        .route("/subjects", post(create_subject))
        .route("/subjects/{id}/topics", post(create_topic))
        .route("/bookings", post(create_booking))
        .route("/bookings/{id}", get(get_booking).patch(update_booking))
        .route("/bookings/{id}/accept", post(accept_booking))
        .route("/bookings/{id}/reject", post(reject_booking))
        .route("/bookings/{id}/cancel", post(cancel_booking))
        .route("/bookings/{id}/complete", post(complete_booking))
        .route("/students/{id}/bookings/upcoming", get(student_upcoming))
        .route("/students/{id}/bookings/history", get(student_history))
        .route("/tutors/{id}/requests", get(tutor_requests))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<NewUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let username = req.username.trim().to_string();
    if username.is_empty() {
        return Err(AppError::Validation("Username must not be empty.".to_string()));
    }

    let req = NewUserRequest { username, ..req };
    match repository::insert_user(&state.db, req, state.clock.now()).await {
        Ok(user) => Ok((StatusCode::CREATED, Json(user))),
        Err(e) if db::is_unique_violation(&e) => {
            Err(AppError::Conflict("Username already exists.".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

async fn create_subject(
    State(state): State<AppState>,
    Json(req): Json<NewSubjectRequest>,
) -> Result<(StatusCode, Json<Subject>), AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Subject name must not be empty.".to_string()));
    }

    match repository::insert_subject(&state.db, name).await {
        Ok(subject) => Ok((StatusCode::CREATED, Json(subject))),
        Err(e) if db::is_unique_violation(&e) => {
            Err(AppError::Conflict("Subject already exists.".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

async fn create_topic(
    State(state): State<AppState>,
    Path(subject_id): Path<i64>,
    Json(req): Json<NewTopicRequest>,
) -> Result<(StatusCode, Json<Topic>), AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Topic name must not be empty.".to_string()));
    }
    repository::find_subject_by_id(&state.db, subject_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Subject not found.".to_string()))?;

    match repository::insert_topic(&state.db, subject_id, name).await {
        Ok(topic) => Ok((StatusCode::CREATED, Json(topic))),
        Err(e) if db::is_unique_violation(&e) => {
            Err(AppError::Conflict("Topic already exists for this subject.".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<NewBookingRequest>,
) -> Result<(StatusCode, Json<ActionResponse>), AppError> {
    let booking = state.bookings.create_request(req).await?;
    Ok((
        StatusCode::CREATED,
        ActionResponse::ok("Tutoring request sent.", booking),
    ))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookingDetails>, AppError> {
    let details = state.bookings.get(&id).await?;
    Ok(Json(details))
}

async fn update_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let booking = state
        .bookings
        .update(req.student_id, &id, req.changes)
        .await?;
    Ok(ActionResponse::ok("Tutoring session updated.", booking))
}

async fn accept_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let booking = state.bookings.accept(req.actor_id, &id).await?;
    Ok(ActionResponse::ok("Tutoring session confirmed.", booking))
}

async fn reject_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let booking = state.bookings.reject(req.actor_id, &id).await?;
    Ok(ActionResponse::ok("Tutoring request rejected.", booking))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let booking = state.bookings.cancel(req.actor_id, &id).await?;
    Ok(ActionResponse::ok("Tutoring session canceled.", booking))
}

async fn complete_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let booking = state.bookings.complete(req.actor_id, &id).await?;
    Ok(ActionResponse::ok("Tutoring session completed.", booking))
}

async fn student_upcoming(
    State(state): State<AppState>,
    Path(student_id): Path<i64>,
) -> Result<Json<Vec<BookingDetails>>, AppError> {
    let rows = state.bookings.upcoming_for_student(student_id).await?;
    Ok(Json(rows))
}

async fn student_history(
    State(state): State<AppState>,
    Path(student_id): Path<i64>,
    Query(filter): Query<HistoryFilter>,
) -> Result<Json<Vec<BookingDetails>>, AppError> {
    let rows = state.bookings.history_for_student(student_id, &filter).await?;
    Ok(Json(rows))
}

async fn tutor_requests(
    State(state): State<AppState>,
    Path(tutor_id): Path<i64>,
) -> Result<Json<Vec<BookingDetails>>, AppError> {
    let rows = state.bookings.pending_for_tutor(tutor_id).await?;
    Ok(Json(rows))
}

async fn list_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(params): Query<NotificationQueryParams>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let rows =
        repository::find_notifications_by_user(&state.db, user_id, params.unread_only).await?;
    Ok(Json(rows))
}

async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let ok = repository::mark_notification_read(&state.db, id).await?;
    if ok {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Notification not found.".to_string()))
    }
}
