use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutoring_backend::api::router;
use tutoring_backend::clock::{Clock, SystemClock};
use tutoring_backend::config::AppConfig;
use tutoring_backend::db;
use tutoring_backend::notify::{Notifier, SqlNotifier};
use tutoring_backend::services::{BookingService, ReminderScheduler};
use tutoring_backend::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tutoring_backend=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::new_from_env()?;

    let pool = db::connect(&config.database_url).await?;
    db::MIGRATOR.run(&pool).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifier: Arc<dyn Notifier> = Arc::new(SqlNotifier::new(pool.clone(), clock.clone()));

    let bookings = Arc::new(BookingService::new(
        pool.clone(),
        notifier.clone(),
        clock.clone(),
    ));

    let scheduler = if config.reminders_enabled {
        let scheduler = ReminderScheduler::new(
            pool.clone(),
            notifier.clone(),
            clock.clone(),
            config.reminder_interval,
        );
        Some(scheduler.spawn())
    } else {
        info!("Reminder scheduler disabled");
        None
    };

    let state = AppState {
        db: pool.clone(),
        bookings,
        clock,
    };

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
        })
        .await?;

    if let Some(handle) = scheduler {
        handle.stop().await;
    }
    pool.close().await;

    Ok(())
}
