use thiserror::Error;
use uuid::Uuid;

use super::workflow::{OrderStatus, PaymentStatus};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Insufficient stock for product {product_id}: {available} available")]
    InsufficientStock { product_id: Uuid, available: i32 },

    /// Lost an optimistic-concurrency race. The whole batch may be retried.
    #[error("Concurrent update conflict: {0}")]
    ConcurrentConflict(String),

    #[error("Stock update timed out for product {0}")]
    StockTimeout(Uuid),

    #[error("Illegal status transition from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("Illegal payment status transition from {from} to {to}")]
    IllegalPaymentTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Order is already cancelled")]
    AlreadyCancelled,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Invoice number already in use: {0}")]
    DuplicateInvoice(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConcurrentConflict(msg.into())
    }

    /// Errors raised by the stock path that leave the caller free to retry the
    /// whole batch.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentConflict(_) | Self::StockTimeout(_) | Self::DuplicateInvoice(_)
        )
    }
}
