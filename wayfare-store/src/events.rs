use async_trait::async_trait;
use chrono::Utc;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;
use wayfare_core::notify::{EventSink, Notifier};
use wayfare_shared::{BookingEvent, NotificationEvent};

use crate::app_config::KafkaConfig;

/// Publishes user notifications and booking events as JSON. Notifications
/// are keyed by user, booking events by trip.
#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
    notification_topic: String,
    event_topic: String,
}

impl EventProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            notification_topic: config.notification_topic.clone(),
            event_topic: config.event_topic.clone(),
        })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Notifier for EventProducer {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        body: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let event = NotificationEvent {
            user_id,
            title: title.to_string(),
            body: body.to_string(),
            timestamp: Utc::now().timestamp(),
        };
        let payload = serde_json::to_string(&event)?;
        self.publish(&self.notification_topic, &user_id.to_string(), &payload).await?;
        Ok(())
    }
}

#[async_trait]
impl EventSink for EventProducer {
    async fn emit(&self, event: &BookingEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let payload = serde_json::to_string(event)?;
        self.publish(&self.event_topic, &event.trip_id().to_string(), &payload).await?;
        Ok(())
    }
}
