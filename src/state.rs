use std::sync::Arc;

use sqlx::SqlitePool;

use crate::clock::Clock;
use crate::services::BookingService;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub bookings: Arc<BookingService>,
    pub clock: Arc<dyn Clock>,
}
