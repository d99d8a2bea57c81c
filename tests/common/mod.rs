#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::SqlitePool;

use tutoring_backend::clock::{Clock, ManualClock};
use tutoring_backend::db::{self, repository};
use tutoring_backend::error::AppError;
use tutoring_backend::models::{NewUserRequest, NotificationKind, Role, Subject, User};
use tutoring_backend::notify::Notifier;
use tutoring_backend::services::BookingService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub user_id: i64,
    pub message: String,
    pub kind: NotificationKind,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, user_id: i64) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.user_id == user_id)
            .collect()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent().iter().filter(|s| s.kind == kind).count()
    }

    pub fn last(&self) -> Option<Sent> {
        self.sent().last().cloned()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        user_id: i64,
        message: &str,
        kind: NotificationKind,
    ) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(Sent {
            user_id,
            message: message.to_string(),
            kind,
        });
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _: i64, _: &str, _: NotificationKind) -> Result<(), AppError> {
        Err(AppError::Database(sqlx::Error::PoolClosed))
    }
}

pub fn at(month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, month, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, day).unwrap()
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

pub async fn setup_test_db() -> SqlitePool {
    let pool = db::connect_in_memory()
        .await
        .expect("Failed to create database");
    db::MIGRATOR
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

pub async fn add_user(pool: &SqlitePool, username: &str, role: Role) -> User {
    repository::insert_user(
        pool,
        NewUserRequest {
            username: username.to_string(),
            role,
        },
        at(11, 1, 9, 0),
    )
    .await
    .expect("Failed to insert user")
}

pub struct Harness {
    pub pool: SqlitePool,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: BookingService,
    pub student: User,
    pub other_student: User,
    pub tutor: User,
    pub subject: Subject,
}

impl Harness {
    /// 2025-12-20 10:00, two students, one tutor, subject "Math".
    pub async fn new() -> Self {
        Self::with_notifier(Arc::new(RecordingNotifier::default())).await
    }

    pub async fn with_notifier(notifier: Arc<RecordingNotifier>) -> Self {
        let pool = setup_test_db().await;
        let clock = Arc::new(ManualClock::new(at(12, 20, 10, 0)));

        let student = add_user(&pool, "hanako", Role::Student).await;
        let other_student = add_user(&pool, "taro", Role::Student).await;
        let tutor = add_user(&pool, "tanaka", Role::Tutor).await;
        let subject = repository::insert_subject(&pool, "Math")
            .await
            .expect("Failed to insert subject");

        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let dyn_notifier: Arc<dyn Notifier> = notifier.clone();
        let service = BookingService::new(pool.clone(), dyn_notifier, dyn_clock);

        Self {
            pool,
            clock,
            notifier,
            service,
            student,
            other_student,
            tutor,
            subject,
        }
    }

    pub fn dyn_clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn dyn_notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }
}
