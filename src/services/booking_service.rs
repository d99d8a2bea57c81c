use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveTime};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::db::repository;
use crate::error::AppError;
use crate::models::{
    Booking, BookingDetails, BookingStatus, HistoryFilter, NewBooking, NewBookingRequest,
    NotificationKind, Role, Subject, Topic, UpdateBookingRequest, User,
};
use crate::notify::Notifier;
use crate::services::conflict::{self, SLOT_TAKEN};

const NOT_FOUND: &str = "Tutoring session not found.";
const NOT_YOUR_TUTORING: &str = "You are not the tutor of this session.";
const NOT_YOUR_BOOKING: &str = "You are not the student of this session.";

/// Dates are stored as `YYYY-MM-DD` text and compared as strings; chrono
/// writes later years with a sign prefix that breaks that ordering.
const MAX_YEAR: i32 = 9999;

/// Owns the booking state machine. Every write is a guarded single-statement
/// update, so a concurrent change shows up as a lost write instead of an
/// illegal transition.
pub struct BookingService {
    db: SqlitePool,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl BookingService {
    pub fn new(db: SqlitePool, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            notifier,
            clock,
        }
    }

    pub async fn create_request(&self, req: NewBookingRequest) -> Result<Booking, AppError> {
        if req.date < self.clock.today() {
            return Err(AppError::Validation(
                "Cannot request a session for a past date.".to_string(),
            ));
        }
        ensure_storable(req.date)?;

        let student = repository::find_user_by_id(&self.db, req.student_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Student not found.".to_string()))?;

        let tutor = self
            .resolve_user(&req.tutor)
            .await?
            .ok_or_else(|| AppError::Validation("Tutor not found.".to_string()))?;
        if tutor.role != Role::Tutor {
            return Err(AppError::Validation(format!(
                "User {} is a {}, not a tutor.",
                tutor.username,
                tutor.role.as_str()
            )));
        }
        if tutor.id == student.id {
            return Err(AppError::Validation(
                "You cannot book a session with yourself.".to_string(),
            ));
        }

        let subject = self
            .resolve_subject(&req.subject)
            .await?
            .ok_or_else(|| AppError::Validation("Subject not found.".to_string()))?;

        let topic = match non_empty(req.topic.as_deref()) {
            Some(reference) => Some(self.require_topic(subject.id, reference).await?),
            None => None,
        };

        conflict::ensure_slot_free(&self.db, tutor.id, req.date, req.time, None).await?;

        let booking = repository::insert_booking(
            &self.db,
            NewBooking {
                student_id: student.id,
                tutor_id: tutor.id,
                subject_id: subject.id,
                topic_id: topic.as_ref().map(|t| t.id),
                date: req.date,
                time: req.time,
            },
            self.clock.now(),
        )
        .await?;

        info!(
            "Booking {} requested by student {} with tutor {} on {} {}",
            booking.id, student.id, tutor.id, booking.date, booking.time
        );

        let message = format!(
            "New tutoring request from {} for {}{} on {} at {}.",
            student.username,
            subject.name,
            topic.map(|t| format!(" ({})", t.name)).unwrap_or_default(),
            fmt_date(booking.date),
            fmt_time(booking.time),
        );
        self.dispatch(tutor.id, message, NotificationKind::TutoringRequest)
            .await;

        Ok(booking)
    }

    /// `unconfirmed -> confirmed`. When several pending requests share a
    /// slot, the first accepted one wins.
    pub async fn accept(&self, tutor_id: i64, booking_id: &str) -> Result<Booking, AppError> {
        let booking = self.load(booking_id).await?;
        if booking.tutor_id != tutor_id {
            return Err(AppError::Unauthorized(NOT_YOUR_TUTORING.to_string()));
        }
        if booking.status != BookingStatus::Unconfirmed {
            return Err(AppError::InvalidState(
                "Only unconfirmed sessions can be accepted.".to_string(),
            ));
        }

        conflict::ensure_slot_free(
            &self.db,
            tutor_id,
            booking.date,
            booking.time,
            Some(&booking.id),
        )
        .await?;

        let now = self.clock.now();
        if !repository::confirm_if_slot_free(&self.db, &booking.id, now).await? {
            return Err(self
                .explain_lost_write(&booking.id, &[BookingStatus::Unconfirmed], SLOT_TAKEN)
                .await);
        }

        info!("Booking {} confirmed by tutor {}", booking.id, tutor_id);

        let details = repository::find_booking_details(&self.db, &booking.id).await?;
        let message = match details {
            Some(d) => format!(
                "{} confirmed your {} session on {} at {}.",
                d.tutor_username,
                d.subject_name,
                fmt_date(d.date),
                fmt_time(d.time)
            ),
            None => "Your tutoring session was confirmed.".to_string(),
        };
        self.dispatch(booking.student_id, message, NotificationKind::TutoringConfirmed)
            .await;

        Ok(Booking {
            status: BookingStatus::Confirmed,
            updated_at: now,
            ..booking
        })
    }

    /// `unconfirmed -> canceled` on the tutor's side.
    pub async fn reject(&self, tutor_id: i64, booking_id: &str) -> Result<Booking, AppError> {
        let booking = self.load(booking_id).await?;
        if booking.tutor_id != tutor_id {
            return Err(AppError::Unauthorized(NOT_YOUR_TUTORING.to_string()));
        }
        if booking.status != BookingStatus::Unconfirmed {
            return Err(AppError::InvalidState(
                "Only unconfirmed sessions can be rejected.".to_string(),
            ));
        }

        let details = repository::find_booking_details(&self.db, &booking.id).await?;
        let updated = self
            .transition(booking, BookingStatus::Canceled, &[BookingStatus::Unconfirmed])
            .await?;

        info!("Booking {} rejected by tutor {}", updated.id, tutor_id);

        let message = match details {
            Some(d) => format!(
                "{} declined your {} request for {} at {}.",
                d.tutor_username,
                d.subject_name,
                fmt_date(d.date),
                fmt_time(d.time)
            ),
            None => "Your tutoring request was declined.".to_string(),
        };
        self.dispatch(updated.student_id, message, NotificationKind::TutoringRejected)
            .await;

        Ok(updated)
    }

    /// `{unconfirmed, confirmed} -> canceled` on the student's side.
    pub async fn cancel(&self, student_id: i64, booking_id: &str) -> Result<Booking, AppError> {
        let booking = self.load(booking_id).await?;
        if booking.student_id != student_id {
            return Err(AppError::Unauthorized(NOT_YOUR_BOOKING.to_string()));
        }
        if booking.status.is_terminal() {
            return Err(AppError::InvalidState(
                "This session is already canceled or completed.".to_string(),
            ));
        }

        // taken before the write so the message never depends on the new row
        let snapshot = repository::find_booking_details(&self.db, &booking.id).await?;

        let updated = self
            .transition(
                booking,
                BookingStatus::Canceled,
                &[BookingStatus::Unconfirmed, BookingStatus::Confirmed],
            )
            .await?;

        info!("Booking {} canceled by student {}", updated.id, student_id);

        let message = match snapshot {
            Some(s) => format!(
                "{} canceled the {} session on {} at {}.",
                s.student_username,
                s.subject_name,
                fmt_date(s.date),
                fmt_time(s.time)
            ),
            None => "A tutoring session was canceled.".to_string(),
        };
        self.dispatch(updated.tutor_id, message, NotificationKind::TutoringCanceled)
            .await;

        Ok(updated)
    }

    /// Student path: only once the session time has passed.
    pub async fn complete_as_student(
        &self,
        student_id: i64,
        booking_id: &str,
    ) -> Result<Booking, AppError> {
        let booking = self.load(booking_id).await?;
        if booking.status != BookingStatus::Confirmed {
            return Err(only_confirmed_complete());
        }
        if booking.student_id != student_id {
            return Err(AppError::Unauthorized(NOT_YOUR_BOOKING.to_string()));
        }
        if !booking.has_started(self.clock.now()) {
            return Err(AppError::InvalidState(
                "Cannot mark as completed before the session time.".to_string(),
            ));
        }

        let updated = self
            .transition(booking, BookingStatus::Completed, &[BookingStatus::Confirmed])
            .await?;
        info!("Booking {} completed by student {}", updated.id, student_id);

        self.notify_completed(&updated, updated.tutor_id).await;
        Ok(updated)
    }

    /// Tutor path: no session-time check.
    pub async fn complete_as_tutor(
        &self,
        tutor_id: i64,
        booking_id: &str,
    ) -> Result<Booking, AppError> {
        let booking = self.load(booking_id).await?;
        if booking.status != BookingStatus::Confirmed {
            return Err(only_confirmed_complete());
        }
        if booking.tutor_id != tutor_id {
            return Err(AppError::Unauthorized(NOT_YOUR_TUTORING.to_string()));
        }

        let updated = self
            .transition(booking, BookingStatus::Completed, &[BookingStatus::Confirmed])
            .await?;
        info!("Booking {} completed by tutor {}", updated.id, tutor_id);

        self.notify_completed(&updated, updated.student_id).await;
        Ok(updated)
    }

    /// Dispatches on the actor's role.
    pub async fn complete(&self, actor_id: i64, booking_id: &str) -> Result<Booking, AppError> {
        let role = repository::find_role(&self.db, actor_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;

        match role {
            Role::Student => self.complete_as_student(actor_id, booking_id).await,
            Role::Tutor => self.complete_as_tutor(actor_id, booking_id).await,
            Role::Admin => Err(AppError::Unauthorized(
                "Only the student or tutor of a session can complete it.".to_string(),
            )),
        }
    }

    /// Reschedules and/or changes the topic. A changed date or time sends the
    /// booking back to the tutor for confirmation.
    pub async fn update(
        &self,
        student_id: i64,
        booking_id: &str,
        req: UpdateBookingRequest,
    ) -> Result<Booking, AppError> {
        let now = self.clock.now();
        let booking = self.load(booking_id).await?;
        if booking.student_id != student_id {
            return Err(AppError::Unauthorized(NOT_YOUR_BOOKING.to_string()));
        }
        if booking.status.is_terminal() {
            return Err(AppError::InvalidState(
                "Canceled or completed sessions cannot be updated.".to_string(),
            ));
        }
        if booking.has_started(now) {
            return Err(AppError::InvalidState(
                "Cannot update a session whose time has already passed.".to_string(),
            ));
        }

        let date = req.date.unwrap_or(booking.date);
        let time = req.time.unwrap_or(booking.time);
        if date < now.date() {
            return Err(AppError::Validation(
                "The new date cannot be in the past.".to_string(),
            ));
        }
        ensure_storable(date)?;

        let topic_id = match non_empty(req.topic.as_deref()) {
            Some(reference) => Some(self.require_topic(booking.subject_id, reference).await?.id),
            None => booking.topic_id,
        };

        conflict::ensure_slot_free(&self.db, booking.tutor_id, date, time, Some(&booking.id))
            .await?;

        let reschedule = date != booking.date || time != booking.time;
        let written = repository::update_schedule(
            &self.db,
            &booking.id,
            date,
            time,
            topic_id,
            reschedule,
            now,
        )
        .await?;
        if !written {
            return Err(self
                .explain_lost_write(
                    &booking.id,
                    &[BookingStatus::Unconfirmed, BookingStatus::Confirmed],
                    "The session changed while it was being updated.",
                )
                .await);
        }

        let updated = self.load(&booking.id).await?;
        info!(
            "Booking {} updated by student {} (rescheduled: {}, status: {})",
            updated.id, student_id, reschedule, updated.status
        );

        let subject = repository::find_subject_by_id(&self.db, updated.subject_id)
            .await?
            .map(|s| s.name)
            .unwrap_or_else(|| "tutoring".to_string());
        let message = if reschedule {
            format!(
                "The {} session was moved to {} at {}. Please confirm it again.",
                subject,
                fmt_date(updated.date),
                fmt_time(updated.time)
            )
        } else {
            format!(
                "The {} session on {} at {} was updated.",
                subject,
                fmt_date(updated.date),
                fmt_time(updated.time)
            )
        };
        self.dispatch(updated.tutor_id, message, NotificationKind::TutoringUpdated)
            .await;

        Ok(updated)
    }

    pub async fn get(&self, booking_id: &str) -> Result<BookingDetails, AppError> {
        repository::find_booking_details(&self.db, booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(NOT_FOUND.to_string()))
    }

    pub async fn upcoming_for_student(
        &self,
        student_id: i64,
    ) -> Result<Vec<BookingDetails>, AppError> {
        let rows =
            repository::find_upcoming_by_student(&self.db, student_id, self.clock.today()).await?;
        Ok(rows)
    }

    pub async fn history_for_student(
        &self,
        student_id: i64,
        filter: &HistoryFilter,
    ) -> Result<Vec<BookingDetails>, AppError> {
        let rows =
            repository::find_history_by_student(&self.db, student_id, self.clock.today(), filter)
                .await?;
        Ok(rows)
    }

    pub async fn pending_for_tutor(&self, tutor_id: i64) -> Result<Vec<BookingDetails>, AppError> {
        let rows = repository::find_pending_by_tutor(&self.db, tutor_id).await?;
        Ok(rows)
    }

    async fn load(&self, booking_id: &str) -> Result<Booking, AppError> {
        repository::find_booking_by_id(&self.db, booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(NOT_FOUND.to_string()))
    }

    async fn transition(
        &self,
        booking: Booking,
        next: BookingStatus,
        allowed_from: &[BookingStatus],
    ) -> Result<Booking, AppError> {
        debug_assert!(allowed_from.iter().all(|s| s.can_transition_to(next)));

        let now = self.clock.now();
        if !repository::update_status(&self.db, &booking.id, next, allowed_from, now).await? {
            return Err(self
                .explain_lost_write(
                    &booking.id,
                    allowed_from,
                    "The session changed while it was being updated.",
                )
                .await);
        }

        Ok(Booking {
            status: next,
            updated_at: now,
            ..booking
        })
    }

    /// Builds the error for a guarded write that matched no row: either the
    /// status moved under us, or the guard itself (the slot) failed.
    async fn explain_lost_write(
        &self,
        booking_id: &str,
        expected: &[BookingStatus],
        otherwise: &str,
    ) -> AppError {
        match repository::find_booking_by_id(&self.db, booking_id).await {
            Ok(Some(current)) if !expected.contains(&current.status) => {
                debug!("Booking {} is now {}", booking_id, current.status);
                AppError::InvalidState(format!("The session is already {}.", current.status))
            }
            Ok(Some(_)) => AppError::Conflict(otherwise.to_string()),
            Ok(None) => AppError::NotFound(NOT_FOUND.to_string()),
            Err(e) => AppError::Database(e),
        }
    }

    async fn notify_completed(&self, booking: &Booking, recipient: i64) {
        let message = match repository::find_booking_details(&self.db, &booking.id).await {
            Ok(Some(d)) => format!(
                "The {} session on {} at {} was marked as completed.",
                d.subject_name,
                fmt_date(d.date),
                fmt_time(d.time)
            ),
            _ => "A tutoring session was marked as completed.".to_string(),
        };
        self.dispatch(recipient, message, NotificationKind::TutoringCompleted)
            .await;
    }

    /// Notification failures never fail the operation that triggered them.
    async fn dispatch(&self, user_id: i64, message: String, kind: NotificationKind) {
        if let Err(e) = self.notifier.notify(user_id, &message, kind).await {
            warn!("Failed to send {} to user {}: {}", kind, user_id, e);
        }
    }

    async fn resolve_user(&self, reference: &str) -> Result<Option<User>, AppError> {
        let reference = reference.trim();
        if let Ok(id) = reference.parse::<i64>() {
            if let Some(user) = repository::find_user_by_id(&self.db, id).await? {
                return Ok(Some(user));
            }
        }
        Ok(repository::find_user_by_username(&self.db, reference).await?)
    }

    /// Numeric id first, then name.
    async fn resolve_subject(&self, reference: &str) -> Result<Option<Subject>, AppError> {
        let reference = reference.trim();
        if let Ok(id) = reference.parse::<i64>() {
            if let Some(subject) = repository::find_subject_by_id(&self.db, id).await? {
                return Ok(Some(subject));
            }
        }
        Ok(repository::find_subject_by_name(&self.db, reference).await?)
    }

    async fn require_topic(&self, subject_id: i64, reference: &str) -> Result<Topic, AppError> {
        if let Ok(id) = reference.parse::<i64>() {
            if let Some(topic) = repository::find_topic_by_id(&self.db, subject_id, id).await? {
                return Ok(topic);
            }
        }
        repository::find_topic_by_name(&self.db, subject_id, reference)
            .await?
            .ok_or_else(|| AppError::Validation("Topic not found for this subject.".to_string()))
    }
}

fn only_confirmed_complete() -> AppError {
    AppError::InvalidState("Only confirmed sessions can be marked as completed.".to_string())
}

fn ensure_storable(date: NaiveDate) -> Result<(), AppError> {
    if date.year() > MAX_YEAR {
        return Err(AppError::Validation(format!(
            "Dates after the year {} are not supported.",
            MAX_YEAR
        )));
    }
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn fmt_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn fmt_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}
