use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::notifications::NotificationReceiver;
use appointment_cell::{
    AppointmentStore, BroadcastNotifier, InMemoryAppointmentStore, SchedulingConfig, SchedulingState,
    SupabaseAppointmentStore,
};
use availability_cell::{
    AvailabilityService, AvailabilityState, AvailabilityStore, InMemoryAvailabilityStore,
    SupabaseAvailabilityStore,
};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::clock::SystemClock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic scheduling API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());
    let scheduling = SchedulingConfig::from_app_config(&config);

    let (appointments, availability): (Arc<dyn AppointmentStore>, Arc<dyn AvailabilityStore>) =
        if config.is_configured() {
            let supabase = Arc::new(SupabaseClient::new(&config));
            (
                Arc::new(SupabaseAppointmentStore::new(supabase.clone(), config.store_token())),
                Arc::new(SupabaseAvailabilityStore::new(supabase, config.store_token())),
            )
        } else {
            warn!("Supabase is not configured, keeping schedules in memory");
            (
                Arc::new(InMemoryAppointmentStore::new()),
                Arc::new(InMemoryAvailabilityStore::new()),
            )
        };

    let notifier = Arc::new(BroadcastNotifier::default());
    tokio::spawn(log_notifications(notifier.subscribe()));

    let clock = Arc::new(SystemClock::new(config.practice_utc_offset_minutes));

    let scheduling_state = Arc::new(SchedulingState::new(
        config.clone(),
        appointments,
        availability.clone(),
        notifier,
        clock,
        scheduling,
    ));
    let availability_state = Arc::new(AvailabilityState {
        config: config.clone(),
        service: AvailabilityService::new(availability, scheduling.store_timeout),
    });

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(scheduling_state, availability_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .await
        .context("server terminated unexpectedly")?;

    Ok(())
}

/// Stand-in consumer until a delivery service subscribes to scheduling events.
async fn log_notifications(mut events: NotificationReceiver) {
    loop {
        match events.recv().await {
            Ok(event) => info!(
                appointment_id = %event.appointment_id,
                event_type = ?event.event_type,
                recipients = event.recipients.len(),
                "Scheduling notification dispatched"
            ),
            Err(RecvError::Lagged(skipped)) => warn!("Notification log skipped {} events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}
