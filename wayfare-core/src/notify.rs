use async_trait::async_trait;
use uuid::Uuid;
use wayfare_shared::BookingEvent;

/// Fire-and-forget user notifications. Callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        body: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Outbound domain events, published after commit.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &BookingEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Sink that only writes to the log; used when no broker is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        body: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!("Notification for {}: {} - {}", user_id, title, body);
        Ok(())
    }
}

#[async_trait]
impl EventSink for LogNotifier {
    async fn emit(&self, event: &BookingEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!("Booking event for trip {}: {:?}", event.trip_id(), event);
        Ok(())
    }
}
