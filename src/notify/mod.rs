use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::db::repository;
use crate::error::AppError;
use crate::models::NotificationKind;

/// One-way channel for telling a user that something happened.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: i64, message: &str, kind: NotificationKind)
        -> Result<(), AppError>;
}

/// Stores notifications in the user's inbox table.
pub struct SqlNotifier {
    db: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqlNotifier {
    pub fn new(db: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }
}

#[async_trait]
impl Notifier for SqlNotifier {
    async fn notify(
        &self,
        user_id: i64,
        message: &str,
        kind: NotificationKind,
    ) -> Result<(), AppError> {
        let id =
            repository::insert_notification(&self.db, user_id, message, kind, self.clock.now())
                .await?;
        debug!("Stored notification {} ({}) for user {}", id, kind, user_id);
        Ok(())
    }
}

pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(
        &self,
        user_id: i64,
        message: &str,
        kind: NotificationKind,
    ) -> Result<(), AppError> {
        info!("[noop] notify user {} ({}): {}", user_id, kind, message);
        Ok(())
    }
}
