use std::sync::Arc;
use wayfare_order::BookingOperations;

use crate::metrics::ApiMetrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub booking: Arc<dyn BookingOperations>,
    pub auth: AuthConfig,
    pub metrics: Arc<ApiMetrics>,
}

impl AppState {
    pub fn new(booking: Arc<dyn BookingOperations>, auth: AuthConfig) -> Result<Self, prometheus::Error> {
        Ok(Self {
            booking,
            auth,
            metrics: Arc::new(ApiMetrics::new()?),
        })
    }
}
