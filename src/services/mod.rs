pub mod booking_service;
pub mod conflict;
pub mod scheduler;

pub use booking_service::BookingService;
pub use scheduler::{ReminderScheduler, ReminderStats, SchedulerHandle};
