use chrono::{NaiveDate, NaiveTime};
use sqlx::SqlitePool;

use crate::db::repository;
use crate::error::AppError;

pub const SLOT_TAKEN: &str = "The tutor already has a confirmed session at this date and time.";

/// Slots are points in time: only a confirmed booking of the same tutor at
/// exactly `date` and `time` holds it. Used by create, accept and update.
pub async fn ensure_slot_free(
    db: &SqlitePool,
    tutor_id: i64,
    date: NaiveDate,
    time: NaiveTime,
    exclude_id: Option<&str>,
) -> Result<(), AppError> {
    if repository::has_confirmed_conflict(db, tutor_id, date, time, exclude_id).await? {
        return Err(AppError::Conflict(SLOT_TAKEN.to_string()));
    }
    Ok(())
}
