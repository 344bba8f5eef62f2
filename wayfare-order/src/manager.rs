use crate::models::{Order, OrderStatus};
use wayfare_core::CoreError;

/// Order state transitions. Persisting the result is the caller's job.
pub struct OrderManager;

impl OrderManager {
    /// Transition: Pending → Confirmed (wallet debited)
    pub fn confirm(order: &mut Order) -> Result<(), OrderError> {
        if order.status != OrderStatus::Pending {
            return Err(OrderError::InvalidTransition {
                from: order.status.as_str().to_string(),
                to: OrderStatus::Confirmed.as_str().to_string(),
            });
        }
        order.update_status(OrderStatus::Confirmed);
        Ok(())
    }

    /// Cancel an order (any status except Cancelled)
    pub fn cancel(order: &mut Order) -> Result<(), OrderError> {
        if order.status == OrderStatus::Cancelled {
            return Err(OrderError::AlreadyCancelled(order.id.to_string()));
        }
        order.update_status(OrderStatus::Cancelled);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order already cancelled: {0}")]
    AlreadyCancelled(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl From<OrderError> for CoreError {
    fn from(err: OrderError) -> Self {
        CoreError::Conflict(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_order_lifecycle() {
        let mut order = Order::new(Uuid::new_v4(), 8_000, "USD");
        assert_eq!(order.status, OrderStatus::Pending);

        // Pending → Confirmed
        OrderManager::confirm(&mut order).unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);

        // Confirmed → Cancelled
        OrderManager::cancel(&mut order).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut order = Order::new(Uuid::new_v4(), 8_000, "USD");
        OrderManager::confirm(&mut order).unwrap();
        assert!(OrderManager::confirm(&mut order).is_err());

        OrderManager::cancel(&mut order).unwrap();
        let err: CoreError = OrderManager::cancel(&mut order).unwrap_err().into();
        assert!(matches!(err, CoreError::Conflict(_)));
    }
}
