pub mod booking;
pub mod notification;
pub mod reminder;
pub mod subject;
pub mod user;

pub use booking::{
    Booking, BookingDetails, BookingStatus, HistoryFilter, NewBooking, NewBookingRequest,
    UpdateBookingRequest,
};
pub use notification::{Notification, NotificationKind};
pub use reminder::ReminderKind;
pub use subject::{NewSubjectRequest, NewTopicRequest, Subject, Topic};
pub use user::{NewUserRequest, Role, User};
