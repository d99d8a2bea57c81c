use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle state of a tutoring session.
///
/// `unconfirmed -> {confirmed, canceled}`, `confirmed -> {canceled, completed}`.
/// `canceled` and `completed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BookingStatus {
    Unconfirmed,
    Confirmed,
    Canceled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Unconfirmed => "unconfirmed",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Canceled => "canceled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Canceled | BookingStatus::Completed)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Unconfirmed, Confirmed)
                | (Unconfirmed, Canceled)
                | (Confirmed, Canceled)
                | (Confirmed, Completed)
        )
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: String,
    pub student_id: i64,
    pub tutor_id: i64,
    pub subject_id: i64,
    pub topic_id: Option<i64>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: BookingStatus,
    pub reminder_1day_sent_at: Option<NaiveDateTime>,
    pub reminder_30min_sent_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    /// Absolute start of the session in platform-local time.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn has_started(&self, now: NaiveDateTime) -> bool {
        self.starts_at() <= now
    }
}

/// Booking joined with the names of everything it references.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BookingDetails {
    pub id: String,
    pub student_id: i64,
    pub student_username: String,
    pub tutor_id: i64,
    pub tutor_username: String,
    pub subject_id: i64,
    pub subject_name: String,
    pub topic_id: Option<i64>,
    pub topic_name: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: BookingStatus,
}

/// Student-facing request. `tutor`, `subject` and `topic` accept either a
/// numeric id or a name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBookingRequest {
    pub student_id: i64,
    pub tutor: String,
    pub subject: String,
    pub topic: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// Fully resolved row to insert.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub student_id: i64,
    pub tutor_id: i64,
    pub subject_id: i64,
    pub topic_id: Option<i64>,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBookingRequest {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub topic: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub status: Option<BookingStatus>,
    pub subject_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    const ALL: [BookingStatus; 4] = [Unconfirmed, Confirmed, Canceled, Completed];

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [Canceled, Completed] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_allowed_transitions() {
        assert!(Unconfirmed.can_transition_to(Confirmed));
        assert!(Unconfirmed.can_transition_to(Canceled));
        assert!(Confirmed.can_transition_to(Canceled));
        assert!(Confirmed.can_transition_to(Completed));

        assert!(!Unconfirmed.can_transition_to(Completed));
        assert!(!Confirmed.can_transition_to(Unconfirmed));
        assert!(!Confirmed.can_transition_to(Confirmed));
    }

    #[test]
    fn test_status_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Confirmed).unwrap(), "\"confirmed\"");
        let parsed: BookingStatus = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(parsed, Canceled);
    }

    #[test]
    fn test_has_started() {
        let booking = Booking {
            id: "b1".to_string(),
            student_id: 1,
            tutor_id: 2,
            subject_id: 1,
            topic_id: None,
            date: NaiveDate::from_ymd_opt(2025, 12, 25).unwrap(),
            time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            status: Confirmed,
            reminder_1day_sent_at: None,
            reminder_30min_sent_at: None,
            created_at: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap().and_hms_opt(9, 0, 0).unwrap(),
            updated_at: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap().and_hms_opt(9, 0, 0).unwrap(),
        };

        let before = NaiveDate::from_ymd_opt(2025, 12, 25).unwrap().and_hms_opt(13, 59, 0).unwrap();
        let exactly = booking.starts_at();
        assert!(!booking.has_started(before));
        assert!(booking.has_started(exactly));
    }
}
