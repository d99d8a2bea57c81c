use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor};
use uuid::Uuid;

use crate::models::{
    Booking, BookingDetails, BookingStatus, HistoryFilter, NewBooking, NewUserRequest,
    Notification, NotificationKind, ReminderKind, Role, Subject, Topic, User,
};

macro_rules! booking_select {
    ($tail:literal) => {
        concat!(
            "SELECT id, student_id, tutor_id, subject_id, topic_id, date, time, status, ",
            "reminder_1day_sent_at, reminder_30min_sent_at, created_at, updated_at ",
            "FROM bookings ",
            $tail
        )
    };
}

macro_rules! details_select {
    ($tail:literal) => {
        concat!(
            "SELECT b.id, b.student_id, s.username AS student_username, ",
            "b.tutor_id, t.username AS tutor_username, ",
            "b.subject_id, sub.name AS subject_name, ",
            "b.topic_id, tp.name AS topic_name, ",
            "b.date, b.time, b.status ",
            "FROM bookings b ",
            "JOIN users s ON s.id = b.student_id ",
            "JOIN users t ON t.id = b.tutor_id ",
            "JOIN subjects sub ON sub.id = b.subject_id ",
            "LEFT JOIN topics tp ON tp.id = b.topic_id ",
            $tail
        )
    };
}

// ---- bookings ----

pub async fn find_booking_by_id<'e, E>(db: E, id: &str) -> Result<Option<Booking>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Booking>(booking_select!("WHERE id = ?1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn find_booking_details<'e, E>(
    db: E,
    id: &str,
) -> Result<Option<BookingDetails>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, BookingDetails>(details_select!("WHERE b.id = ?1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn insert_booking<'e, E>(
    db: E,
    new: NewBooking,
    now: NaiveDateTime,
) -> Result<Booking, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let id = Uuid::new_v4().to_string();
    let status = BookingStatus::Unconfirmed;

    sqlx::query(
        r#"
        INSERT INTO bookings
            (id, student_id, tutor_id, subject_id, topic_id, date, time, status,
            reminder_1day_sent_at, reminder_30min_sent_at, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, NULL, ?9, ?9)
        "#,
    )
    .bind(&id)
    .bind(new.student_id)
    .bind(new.tutor_id)
    .bind(new.subject_id)
    .bind(new.topic_id)
    .bind(new.date)
    .bind(new.time)
    .bind(status)
    .bind(now)
    .execute(db)
    .await?;

    Ok(Booking {
        id,
        student_id: new.student_id,
        tutor_id: new.tutor_id,
        subject_id: new.subject_id,
        topic_id: new.topic_id,
        date: new.date,
        time: new.time,
        status,
        reminder_1day_sent_at: None,
        reminder_30min_sent_at: None,
        created_at: now,
        updated_at: now,
    })
}

/// Moves `id` to `next` only if its current status is one of `allowed_from`.
/// Returns whether the row was changed.
pub async fn update_status<'e, E>(
    db: E,
    id: &str,
    next: BookingStatus,
    allowed_from: &[BookingStatus],
    now: NaiveDateTime,
) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    if allowed_from.is_empty() {
        return Ok(false);
    }

    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE bookings SET status = ");
    qb.push_bind(next)
        .push(", updated_at = ")
        .push_bind(now)
        .push(" WHERE id = ")
        .push_bind(id)
        .push(" AND status IN (");
    let mut statuses = qb.separated(", ");
    for status in allowed_from {
        statuses.push_bind(*status);
    }
    statuses.push_unseparated(")");

    let result = qb.build().execute(db).await?.rows_affected();
    Ok(result > 0)
}

/// `unconfirmed -> confirmed` as a single statement, guarded by the slot
/// being free. A lost race surfaces as `false`, never as a second
/// confirmed booking.
pub async fn confirm_if_slot_free<'e, E>(
    db: E,
    id: &str,
    now: NaiveDateTime,
) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE bookings
        SET status = 'confirmed',
            updated_at = ?1
        WHERE id = ?2
          AND status = 'unconfirmed'
          AND NOT EXISTS (
              SELECT 1 FROM bookings other
              WHERE other.tutor_id = bookings.tutor_id
                AND other.date = bookings.date
                AND other.time = bookings.time
                AND other.status = 'confirmed'
                AND other.id <> bookings.id
          )
        "#,
    )
    .bind(now)
    .bind(id)
    .execute(db)
    .await;

    match result {
        Ok(done) => Ok(done.rows_affected() > 0),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Writes a new schedule for a non-terminal booking. With `reschedule` the
/// booking drops back to `unconfirmed` and its reminder markers are cleared.
pub async fn update_schedule<'e, E>(
    db: E,
    id: &str,
    date: NaiveDate,
    time: NaiveTime,
    topic_id: Option<i64>,
    reschedule: bool,
    now: NaiveDateTime,
) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE bookings
        SET date = ?1,
            time = ?2,
            topic_id = ?3,
            status = CASE WHEN ?4 THEN 'unconfirmed' ELSE status END,
            reminder_1day_sent_at = CASE WHEN ?4 THEN NULL ELSE reminder_1day_sent_at END,
            reminder_30min_sent_at = CASE WHEN ?4 THEN NULL ELSE reminder_30min_sent_at END,
            updated_at = ?5
        WHERE id = ?6
          AND status IN ('unconfirmed', 'confirmed')
        "#,
    )
    .bind(date)
    .bind(time)
    .bind(topic_id)
    .bind(reschedule)
    .bind(now)
    .bind(id)
    .execute(db)
    .await?
    .rows_affected();

    Ok(result > 0)
}

pub async fn has_confirmed_conflict<'e, E>(
    db: E,
    tutor_id: i64,
    date: NaiveDate,
    time: NaiveTime,
    exclude_id: Option<&str>,
) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let hits = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM bookings
        WHERE tutor_id = ?1
          AND date = ?2
          AND time = ?3
          AND status = 'confirmed'
          AND (?4 IS NULL OR id <> ?4)
        "#,
    )
    .bind(tutor_id)
    .bind(date)
    .bind(time)
    .bind(exclude_id)
    .fetch_one(db)
    .await?;

    Ok(hits > 0)
}

pub async fn find_upcoming_confirmed_by_tutor<'e, E>(
    db: E,
    tutor_id: i64,
    today: NaiveDate,
) -> Result<Vec<Booking>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Booking>(booking_select!(
        "WHERE tutor_id = ?1 AND date >= ?2 AND status = 'confirmed' ORDER BY date, time"
    ))
    .bind(tutor_id)
    .bind(today)
    .fetch_all(db)
    .await
}

/// Every tutor with a booking dated `today` or later, whatever its status.
pub async fn find_distinct_tutor_ids_with_future_bookings<'e, E>(
    db: E,
    today: NaiveDate,
) -> Result<Vec<i64>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_scalar::<_, i64>(
        "SELECT DISTINCT tutor_id FROM bookings WHERE date >= ?1 ORDER BY tutor_id",
    )
    .bind(today)
    .fetch_all(db)
    .await
}

pub async fn find_upcoming_by_student<'e, E>(
    db: E,
    student_id: i64,
    today: NaiveDate,
) -> Result<Vec<BookingDetails>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, BookingDetails>(details_select!(
        "WHERE b.student_id = ?1 AND b.date >= ?2 \
         AND b.status IN ('unconfirmed', 'confirmed') \
         ORDER BY b.date, b.time"
    ))
    .bind(student_id)
    .bind(today)
    .fetch_all(db)
    .await
}

/// Past or finished sessions of a student, newest first.
pub async fn find_history_by_student<'e, E>(
    db: E,
    student_id: i64,
    today: NaiveDate,
    filter: &HistoryFilter,
) -> Result<Vec<BookingDetails>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let mut qb = QueryBuilder::<Sqlite>::new(details_select!("WHERE b.student_id = "));
    qb.push_bind(student_id)
        .push(" AND (b.date < ")
        .push_bind(today)
        .push(" OR b.status IN ('canceled', 'completed'))");

    if let Some(status) = filter.status {
        qb.push(" AND b.status = ").push_bind(status);
    }
    if let Some(subject_id) = filter.subject_id {
        qb.push(" AND b.subject_id = ").push_bind(subject_id);
    }
    if let Some(from) = filter.from {
        qb.push(" AND b.date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND b.date <= ").push_bind(to);
    }
    qb.push(" ORDER BY b.date DESC, b.time DESC");

    qb.build_query_as::<BookingDetails>().fetch_all(db).await
}

/// Requests still waiting for the tutor's answer.
pub async fn find_pending_by_tutor<'e, E>(
    db: E,
    tutor_id: i64,
) -> Result<Vec<BookingDetails>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, BookingDetails>(details_select!(
        "WHERE b.tutor_id = ?1 AND b.status = 'unconfirmed' ORDER BY b.date, b.time"
    ))
    .bind(tutor_id)
    .fetch_all(db)
    .await
}

/// Marks `kind` as sent for a confirmed booking. Only the first caller gets
/// `true`.
pub async fn claim_reminder<'e, E>(
    db: E,
    id: &str,
    kind: ReminderKind,
    now: NaiveDateTime,
) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let sql = match kind {
        ReminderKind::OneDay => {
            "UPDATE bookings SET reminder_1day_sent_at = ?1 \
             WHERE id = ?2 AND status = 'confirmed' AND reminder_1day_sent_at IS NULL"
        }
        ReminderKind::ThirtyMinutes => {
            "UPDATE bookings SET reminder_30min_sent_at = ?1 \
             WHERE id = ?2 AND status = 'confirmed' AND reminder_30min_sent_at IS NULL"
        }
    };

    let result = sqlx::query(sql)
        .bind(now)
        .bind(id)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result > 0)
}

// ---- users ----

pub async fn insert_user<'e, E>(
    db: E,
    req: NewUserRequest,
    now: NaiveDateTime,
) -> Result<User, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let id = sqlx::query("INSERT INTO users (username, role, created_at) VALUES (?1, ?2, ?3)")
        .bind(&req.username)
        .bind(req.role)
        .bind(now)
        .execute(db)
        .await?
        .last_insert_rowid();

    Ok(User {
        id,
        username: req.username,
        role: req.role,
        created_at: now,
    })
}

pub async fn find_user_by_id<'e, E>(db: E, id: i64) -> Result<Option<User>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, User>("SELECT id, username, role, created_at FROM users WHERE id = ?1")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn find_user_by_username<'e, E>(
    db: E,
    username: &str,
) -> Result<Option<User>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, User>(
        "SELECT id, username, role, created_at FROM users WHERE username = ?1",
    )
    .bind(username)
    .fetch_optional(db)
    .await
}

pub async fn find_role<'e, E>(db: E, id: i64) -> Result<Option<Role>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_scalar::<_, Role>("SELECT role FROM users WHERE id = ?1")
        .bind(id)
        .fetch_optional(db)
        .await
}

// ---- subjects / topics ----

pub async fn insert_subject<'e, E>(db: E, name: &str) -> Result<Subject, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let id = sqlx::query("INSERT INTO subjects (name) VALUES (?1)")
        .bind(name)
        .execute(db)
        .await?
        .last_insert_rowid();

    Ok(Subject {
        id,
        name: name.to_string(),
    })
}

pub async fn find_subject_by_id<'e, E>(db: E, id: i64) -> Result<Option<Subject>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Subject>("SELECT id, name FROM subjects WHERE id = ?1")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn find_subject_by_name<'e, E>(
    db: E,
    name: &str,
) -> Result<Option<Subject>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Subject>("SELECT id, name FROM subjects WHERE name = ?1")
        .bind(name)
        .fetch_optional(db)
        .await
}

pub async fn insert_topic<'e, E>(db: E, subject_id: i64, name: &str) -> Result<Topic, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let id = sqlx::query("INSERT INTO topics (subject_id, name) VALUES (?1, ?2)")
        .bind(subject_id)
        .bind(name)
        .execute(db)
        .await?
        .last_insert_rowid();

    Ok(Topic {
        id,
        subject_id,
        name: name.to_string(),
    })
}

pub async fn find_topic_by_id<'e, E>(
    db: E,
    subject_id: i64,
    id: i64,
) -> Result<Option<Topic>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Topic>(
        "SELECT id, subject_id, name FROM topics WHERE id = ?1 AND subject_id = ?2",
    )
    .bind(id)
    .bind(subject_id)
    .fetch_optional(db)
    .await
}

pub async fn find_topic_by_name<'e, E>(
    db: E,
    subject_id: i64,
    name: &str,
) -> Result<Option<Topic>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Topic>(
        "SELECT id, subject_id, name FROM topics WHERE name = ?1 AND subject_id = ?2",
    )
    .bind(name)
    .bind(subject_id)
    .fetch_optional(db)
    .await
}

// ---- notifications ----

pub async fn insert_notification<'e, E>(
    db: E,
    user_id: i64,
    message: &str,
    kind: NotificationKind,
    now: NaiveDateTime,
) -> Result<i64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let id = sqlx::query(
        "INSERT INTO notifications (user_id, message, kind, is_read, created_at) \
         VALUES (?1, ?2, ?3, 0, ?4)",
    )
    .bind(user_id)
    .bind(message)
    .bind(kind)
    .bind(now)
    .execute(db)
    .await?
    .last_insert_rowid();

    Ok(id)
}

pub async fn find_notifications_by_user<'e, E>(
    db: E,
    user_id: i64,
    unread_only: bool,
) -> Result<Vec<Notification>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Notification>(
        r#"
        SELECT id, user_id, message, kind, is_read, created_at
        FROM notifications
        WHERE user_id = ?1
          AND (?2 = 0 OR is_read = 0)
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(user_id)
    .bind(unread_only)
    .fetch_all(db)
    .await
}

pub async fn mark_notification_read<'e, E>(db: E, id: i64) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?1")
        .bind(id)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result > 0)
}
