use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::db::repository;
use crate::error::AppError;
use crate::models::{Booking, ReminderKind};
use crate::notify::Notifier;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderStats {
    pub tutors_scanned: usize,
    pub bookings_checked: usize,
    pub one_day_sent: usize,
    pub thirty_minutes_sent: usize,
}

/// リマインダースケジューラー
/// 確定済みセッションの前日・30分前に講師へ通知する
pub struct ReminderScheduler {
    db: SqlitePool,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

/// Running scheduler. Dropping the handle also ends the loop, but only
/// `stop` waits for the task to finish.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub async fn stop(self) {
        // the receiver may already be gone if the task ended on its own
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Reminder scheduler task ended abnormally: {}", e);
        }
        info!("Reminder scheduler stopped");
    }
}

impl ReminderScheduler {
    pub fn new(
        db: SqlitePool,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            db,
            notifier,
            clock,
            interval,
        }
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.start(rx));
        SchedulerHandle { shutdown, task }
    }

    /// 停止シグナルを受けるまで定期実行（初回は即時）
    pub async fn start(self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting reminder scheduler (interval: {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(stats) => {
                            if stats.one_day_sent + stats.thirty_minutes_sent > 0 {
                                info!(
                                    "Reminder sweep sent {} one-day and {} 30-minute reminders",
                                    stats.one_day_sent, stats.thirty_minutes_sent
                                );
                            } else {
                                debug!("Reminder sweep: {:?}", stats);
                            }
                        }
                        Err(e) => {
                            // エラーが発生してもループは継続
                            warn!("Reminder sweep failed: {:?}", e);
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// One sweep over every tutor with upcoming bookings.
    pub async fn run_once(&self) -> Result<ReminderStats, AppError> {
        let now = self.clock.now();
        let today = now.date();
        let mut stats = ReminderStats::default();

        let tutor_ids =
            repository::find_distinct_tutor_ids_with_future_bookings(&self.db, today).await?;

        for tutor_id in tutor_ids {
            stats.tutors_scanned += 1;
            let bookings =
                repository::find_upcoming_confirmed_by_tutor(&self.db, tutor_id, today).await?;

            for booking in bookings {
                stats.bookings_checked += 1;
                let starts_at = booking.starts_at();

                for kind in ReminderKind::ALL {
                    if !kind.is_due(starts_at, now) {
                        continue;
                    }
                    if !repository::claim_reminder(&self.db, &booking.id, kind, now).await? {
                        continue;
                    }
                    self.send(&booking, kind).await;
                    match kind {
                        ReminderKind::OneDay => stats.one_day_sent += 1,
                        ReminderKind::ThirtyMinutes => stats.thirty_minutes_sent += 1,
                    }
                }
            }
        }

        Ok(stats)
    }

    async fn send(&self, booking: &Booking, kind: ReminderKind) {
        let subject = match repository::find_subject_by_id(&self.db, booking.subject_id).await {
            Ok(Some(s)) => s.name,
            _ => "tutoring".to_string(),
        };
        let message = format!(
            "Reminder: your {} session is {} ({} at {}).",
            subject,
            kind.label(),
            fmt_date(booking.date),
            booking.time.format("%H:%M")
        );

        if let Err(e) = self
            .notifier
            .notify(booking.tutor_id, &message, kind.notification_kind())
            .await
        {
            warn!(
                "Failed to send {} for booking {}: {}",
                kind.notification_kind(),
                booking.id,
                e
            );
        }
    }
}

fn fmt_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
