use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Event type recorded with every notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
pub enum NotificationKind {
    #[serde(rename = "TUTORING_REQUEST")]
    #[sqlx(rename = "TUTORING_REQUEST")]
    TutoringRequest,
    #[serde(rename = "TUTORING_CONFIRMED")]
    #[sqlx(rename = "TUTORING_CONFIRMED")]
    TutoringConfirmed,
    #[serde(rename = "TUTORING_REJECTED")]
    #[sqlx(rename = "TUTORING_REJECTED")]
    TutoringRejected,
    #[serde(rename = "TUTORING_CANCELED")]
    #[sqlx(rename = "TUTORING_CANCELED")]
    TutoringCanceled,
    #[serde(rename = "TUTORING_COMPLETED")]
    #[sqlx(rename = "TUTORING_COMPLETED")]
    TutoringCompleted,
    #[serde(rename = "TUTORING_UPDATED")]
    #[sqlx(rename = "TUTORING_UPDATED")]
    TutoringUpdated,
    #[serde(rename = "reminder_1day")]
    #[sqlx(rename = "reminder_1day")]
    Reminder1Day,
    #[serde(rename = "reminder_30min")]
    #[sqlx(rename = "reminder_30min")]
    Reminder30Min,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TutoringRequest => "TUTORING_REQUEST",
            NotificationKind::TutoringConfirmed => "TUTORING_CONFIRMED",
            NotificationKind::TutoringRejected => "TUTORING_REJECTED",
            NotificationKind::TutoringCanceled => "TUTORING_CANCELED",
            NotificationKind::TutoringCompleted => "TUTORING_COMPLETED",
            NotificationKind::TutoringUpdated => "TUTORING_UPDATED",
            NotificationKind::Reminder1Day => "reminder_1day",
            NotificationKind::Reminder30Min => "reminder_30min",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub kind: NotificationKind,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}
