use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wayfare_api::{app, AppState, AuthConfig};
use wayfare_core::notify::{EventSink, LogNotifier, Notifier};
use wayfare_core::repository::ReferenceData;
use wayfare_order::BookingService;
use wayfare_store::app_config::Config;
use wayfare_store::{DbClient, EventProducer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wayfare_api=debug,wayfare_order=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting Wayfare API on port {}", config.server.port);

    let settings = config.booking.settings()?;

    let db = DbClient::new(&config.database).await?;
    db.migrate().await?;

    let (notifier, events): (Arc<dyn Notifier>, Arc<dyn EventSink>) = match &config.kafka {
        Some(kafka) => {
            let producer = Arc::new(EventProducer::new(kafka)?);
            (producer.clone(), producer)
        }
        None => {
            tracing::warn!("No kafka section configured, notifications go to the log only");
            (Arc::new(LogNotifier), Arc::new(LogNotifier))
        }
    };

    let reference: Arc<dyn ReferenceData> = Arc::new(db.reference_data());
    let service = BookingService::new(db.booking_store(), reference, notifier, events, settings);

    let state = AppState::new(
        Arc::new(service),
        AuthConfig { secret: config.auth.jwt_secret.clone() },
    )?;

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
