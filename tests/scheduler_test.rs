mod common;

use std::time::Duration;

use common::{Harness, add_user, at, date, time};
use tutoring_backend::models::{
    Booking, NewBookingRequest, NotificationKind, Role, UpdateBookingRequest, User,
};
use tutoring_backend::services::{ReminderScheduler, ReminderStats};

async fn confirmed(h: &Harness, student: &User, tutor: &User, day: u32, hour: u32) -> Booking {
    let booking = h
        .service
        .create_request(NewBookingRequest {
            student_id: student.id,
            tutor: tutor.username.clone(),
            subject: "Math".to_string(),
            topic: None,
            date: date(12, day),
            time: time(hour, 0),
        })
        .await
        .expect("create failed");
    h.service
        .accept(tutor.id, &booking.id)
        .await
        .expect("accept failed")
}

fn scheduler(h: &Harness, interval: Duration) -> ReminderScheduler {
    ReminderScheduler::new(h.pool.clone(), h.dyn_notifier(), h.dyn_clock(), interval)
}

#[tokio::test]
async fn test_one_day_reminder_sent_once() {
    let h = Harness::new().await;
    confirmed(&h, &h.student, &h.tutor, 21, 14).await;
    let scheduler = scheduler(&h, Duration::from_secs(60));

    // 20 時間前
    h.clock.set(at(12, 20, 18, 0));
    let stats = scheduler.run_once().await.expect("sweep failed");
    assert_eq!(stats.one_day_sent, 1);
    assert_eq!(stats.thirty_minutes_sent, 0);

    let reminders = h.notifier.sent_to(h.tutor.id);
    let last = reminders.last().unwrap();
    assert_eq!(last.kind, NotificationKind::Reminder1Day);
    assert!(last.message.contains("2025-12-21"));

    // 1 分後の再実行では重複しない
    h.clock.advance(chrono::Duration::minutes(1));
    let stats = scheduler.run_once().await.expect("sweep failed");
    assert_eq!(stats.one_day_sent, 0);
    assert_eq!(h.notifier.count(NotificationKind::Reminder1Day), 1);
}

#[tokio::test]
async fn test_nothing_due_outside_window() {
    let h = Harness::new().await;
    confirmed(&h, &h.student, &h.tutor, 23, 14).await;
    let scheduler = scheduler(&h, Duration::from_secs(60));

    let stats = scheduler.run_once().await.expect("sweep failed");
    assert_eq!(
        stats,
        ReminderStats {
            tutors_scanned: 1,
            bookings_checked: 1,
            one_day_sent: 0,
            thirty_minutes_sent: 0,
        }
    );
}

#[tokio::test]
async fn test_thirty_minute_reminder_sent_once() {
    let h = Harness::new().await;
    confirmed(&h, &h.student, &h.tutor, 21, 14).await;
    let scheduler = scheduler(&h, Duration::from_secs(60));

    h.clock.set(at(12, 20, 18, 0));
    scheduler.run_once().await.unwrap();

    h.clock.set(at(12, 21, 13, 29));
    let stats = scheduler.run_once().await.unwrap();
    assert_eq!(stats.thirty_minutes_sent, 0);

    h.clock.set(at(12, 21, 13, 30));
    let stats = scheduler.run_once().await.unwrap();
    assert_eq!(stats.thirty_minutes_sent, 1);
    assert_eq!(stats.one_day_sent, 0);

    h.clock.set(at(12, 21, 13, 45));
    let stats = scheduler.run_once().await.unwrap();
    assert_eq!(stats.thirty_minutes_sent, 0);

    assert_eq!(h.notifier.count(NotificationKind::Reminder1Day), 1);
    assert_eq!(h.notifier.count(NotificationKind::Reminder30Min), 1);
}

#[tokio::test]
async fn test_both_reminders_for_late_confirmation() {
    let h = Harness::new().await;
    h.clock.set(at(12, 21, 13, 40));
    confirmed(&h, &h.student, &h.tutor, 21, 14).await;

    let stats = scheduler(&h, Duration::from_secs(60)).run_once().await.unwrap();
    assert_eq!(stats.one_day_sent, 1);
    assert_eq!(stats.thirty_minutes_sent, 1);
}

#[tokio::test]
async fn test_unconfirmed_bookings_are_not_reminded() {
    let h = Harness::new().await;
    h.service
        .create_request(NewBookingRequest {
            student_id: h.student.id,
            tutor: h.tutor.username.clone(),
            subject: "Math".to_string(),
            topic: None,
            date: date(12, 21),
            time: time(14, 0),
        })
        .await
        .unwrap();

    h.clock.set(at(12, 21, 13, 45));
    let stats = scheduler(&h, Duration::from_secs(60)).run_once().await.unwrap();
    assert_eq!(stats.tutors_scanned, 1);
    assert_eq!(stats.bookings_checked, 0);
    assert_eq!(h.notifier.count(NotificationKind::Reminder30Min), 0);
}

#[tokio::test]
async fn test_each_booking_gets_its_own_reminder() {
    let h = Harness::new().await;
    let second_tutor = add_user(&h.pool, "suzuki", Role::Tutor).await;
    confirmed(&h, &h.student, &h.tutor, 21, 14).await;
    confirmed(&h, &h.student, &h.tutor, 21, 16).await;
    confirmed(&h, &h.other_student, &second_tutor, 21, 14).await;

    h.clock.set(at(12, 20, 18, 0));
    let stats = scheduler(&h, Duration::from_secs(60)).run_once().await.unwrap();
    assert_eq!(stats.tutors_scanned, 2);
    assert_eq!(stats.one_day_sent, 3);

    let first_tutor = h
        .notifier
        .sent_to(h.tutor.id)
        .into_iter()
        .filter(|s| s.kind == NotificationKind::Reminder1Day)
        .count();
    assert_eq!(first_tutor, 2);
    assert_eq!(h.notifier.sent_to(second_tutor.id).len(), 2);
}

#[tokio::test]
async fn test_rescheduled_booking_is_reminded_again() {
    let h = Harness::new().await;
    let booking = confirmed(&h, &h.student, &h.tutor, 21, 14).await;
    let scheduler = scheduler(&h, Duration::from_secs(60));

    h.clock.set(at(12, 20, 18, 0));
    scheduler.run_once().await.unwrap();

    h.service
        .update(
            h.student.id,
            &booking.id,
            UpdateBookingRequest {
                date: Some(date(12, 22)),
                ..Default::default()
            },
        )
        .await
        .expect("update failed");
    h.service.accept(h.tutor.id, &booking.id).await.expect("accept failed");

    h.clock.set(at(12, 21, 15, 0));
    let stats = scheduler.run_once().await.unwrap();
    assert_eq!(stats.one_day_sent, 1);
    assert_eq!(h.notifier.count(NotificationKind::Reminder1Day), 2);
}

#[tokio::test]
async fn test_scheduler_short_interval() {
    let h = Harness::new().await;
    confirmed(&h, &h.student, &h.tutor, 21, 14).await;
    h.clock.set(at(12, 20, 18, 0));

    // 50ms 間隔で起動し、複数回実行されても通知は 1 回だけ
    let handle = scheduler(&h, Duration::from_millis(50)).spawn();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(handle.is_running());
    handle.stop().await;

    assert_eq!(h.notifier.count(NotificationKind::Reminder1Day), 1);
}

#[tokio::test]
async fn test_scheduler_survives_failing_sweeps() {
    let h = Harness::new().await;
    let scheduler = scheduler(&h, Duration::from_millis(20));
    h.pool.close().await;

    let handle = scheduler.spawn();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(handle.is_running());

    handle.stop().await;
}

#[tokio::test]
async fn test_dropping_handle_stops_scheduler() {
    let h = Harness::new().await;
    h.clock.set(at(12, 20, 18, 0));

    let handle = scheduler(&h, Duration::from_millis(20)).spawn();
    tokio::time::sleep(Duration::from_millis(60)).await;
    drop(handle);

    // 停止後に確定したセッションには通知しない
    confirmed(&h, &h.student, &h.tutor, 21, 14).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.notifier.count(NotificationKind::Reminder1Day), 0);
}

#[tokio::test]
async fn test_scheduler_stops_promptly_with_long_interval() {
    let h = Harness::new().await;
    let started = std::time::Instant::now();

    let handle = scheduler(&h, Duration::from_secs(3600)).spawn();
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.stop().await;

    assert!(started.elapsed() < Duration::from_secs(5));
}
