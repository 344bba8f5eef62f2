use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{opts, Encoder, IntCounterVec, Registry, TextEncoder};
use wayfare_core::{CoreError, CoreResult};

use crate::state::AppState;

/// Per-operation outcome counters, exported at `/metrics`.
pub struct ApiMetrics {
    registry: Registry,
    operations: IntCounterVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let operations = IntCounterVec::new(
            opts!("wayfare_operations_total", "Booking operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations.clone()))?;
        Ok(Self { registry, operations })
    }

    pub fn record<T>(&self, operation: &str, result: &CoreResult<T>) {
        self.operations
            .with_label_values(&[operation, outcome(result)])
            .inc();
    }

    pub fn count(&self, operation: &str, outcome: &str) -> u64 {
        self.operations.with_label_values(&[operation, outcome]).get()
    }

    pub fn export(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

fn outcome<T>(result: &CoreResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(CoreError::NotFound(_)) => "not_found",
        Err(CoreError::ValidationError(_)) => "validation",
        Err(CoreError::InsufficientFunds { .. }) => "insufficient_funds",
        Err(CoreError::Forbidden(_)) => "forbidden",
        Err(CoreError::Conflict(_)) => "conflict",
        Err(CoreError::InternalError(_)) => "internal",
    }
}

pub async fn export(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcomes_are_counted_per_operation() {
        let metrics = ApiMetrics::new().unwrap();
        metrics.record::<()>("book_trip", &Ok(()));
        metrics.record::<()>("book_trip", &Err(CoreError::InsufficientFunds { required_cents: 1, available_cents: 0 }));
        metrics.record::<()>("book_trip", &Ok(()));

        assert_eq!(metrics.count("book_trip", "ok"), 2);
        assert_eq!(metrics.count("book_trip", "insufficient_funds"), 1);
        assert!(metrics.export().contains("wayfare_operations_total"));
    }
}
