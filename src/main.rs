mod config;
mod middleware;

mod db;
mod error;
mod models;
mod routes;
mod scheduling;

use std::sync::Arc;

use crate::{config::Config, models::AppState};
use crate::scheduling::{
    catalog::{MemoryCatalog, PgCatalog, ServiceCatalog},
    clock::{Clock, SystemClock},
    events::EventBus,
    memory_store::MemoryAppointments,
    pg_store::PgAppointments,
    service::SchedulingService,
    slots::SlotGrid,
    store::{AppointmentRepository, AppointmentStore},
};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::{header, HeaderName};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;

    let catalog: Arc<dyn ServiceCatalog>;
    let appointments: Arc<dyn AppointmentRepository>;
    match cfg.database_url.as_deref() {
        Some(url) => {
            let pool = db::connect_pg(url, cfg.db_max_connections).await?;
            db::run_migrations(&pool).await?;
            catalog = Arc::new(PgCatalog::new(pool.clone()));
            appointments = Arc::new(PgAppointments::new(pool, cfg.booking_retry_attempts));
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores (data is lost on restart)");
            catalog = Arc::new(MemoryCatalog::new());
            appointments = Arc::new(MemoryAppointments::new());
        }
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(cfg.campus_offset));
    let events = EventBus::new();
    let grid = SlotGrid::new(cfg.window);
    let store = Arc::new(AppointmentStore::new(appointments, grid, clock.clone(), events.clone()));
    let scheduler = Arc::new(SchedulingService::new(catalog, store, grid, clock));

    let (catalog_backend, appointment_backend) = scheduler.backend_tags();
    tracing::info!(
        catalog_backend,
        appointment_backend,
        window_start = %cfg.window.start,
        window_end = %cfg.window.end,
        campus_offset = %cfg.campus_offset,
        "scheduler ready"
    );

    let state = AppState { scheduler, events };

    // Identity headers come from the campus gateway; browsers still need them allowed on preflight.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-caller-id"),
            HeaderName::from_static("x-caller-role"),
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
