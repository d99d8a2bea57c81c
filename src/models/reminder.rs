use chrono::{Duration, NaiveDateTime};

use super::NotificationKind;

/// Reminder sent ahead of a confirmed session, at most once per booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderKind {
    OneDay,
    ThirtyMinutes,
}

impl ReminderKind {
    pub const ALL: [ReminderKind; 2] = [ReminderKind::OneDay, ReminderKind::ThirtyMinutes];

    pub fn lead_time(&self) -> Duration {
        match self {
            ReminderKind::OneDay => Duration::hours(24),
            ReminderKind::ThirtyMinutes => Duration::minutes(30),
        }
    }

    pub fn notification_kind(&self) -> NotificationKind {
        match self {
            ReminderKind::OneDay => NotificationKind::Reminder1Day,
            ReminderKind::ThirtyMinutes => NotificationKind::Reminder30Min,
        }
    }

    /// The threshold `starts_at - lead_time` has been reached.
    pub fn is_due(&self, starts_at: NaiveDateTime, now: NaiveDateTime) -> bool {
        starts_at - self.lead_time() <= now
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReminderKind::OneDay => "tomorrow",
            ReminderKind::ThirtyMinutes => "in 30 minutes",
        }
    }
}
