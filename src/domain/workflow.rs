use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::errors::DomainError;

const ACTOR_ID_MAX: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Placed,
    Packed,
    AssignedToBus,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Placed => "PLACED",
            Self::Packed => "PACKED",
            Self::AssignedToBus => "ASSIGNED_TO_BUS",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLACED" => Ok(Self::Placed),
            "PACKED" => Ok(Self::Packed),
            "ASSIGNED_TO_BUS" => Ok(Self::AssignedToBus),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(DomainError::Internal(format!("unknown order status '{other}'"))),
        }
    }
}

/// Legal `(current, requested)` pairs. Anything absent is illegal.
///
/// `Placed` is only ever the initial state. `AssignedToBus` may be re-entered
/// so retried logistics updates succeed.
const TRANSITIONS: &[(OrderStatus, OrderStatus)] = &[
    (OrderStatus::Placed, OrderStatus::Packed),
    (OrderStatus::Placed, OrderStatus::Cancelled),
    (OrderStatus::Packed, OrderStatus::AssignedToBus),
    (OrderStatus::Packed, OrderStatus::Cancelled),
    (OrderStatus::AssignedToBus, OrderStatus::AssignedToBus),
    (OrderStatus::AssignedToBus, OrderStatus::Delivered),
    (OrderStatus::AssignedToBus, OrderStatus::Cancelled),
];

/// Looks up the next state for a requested transition.
pub fn next_status(current: OrderStatus, requested: OrderStatus) -> Result<OrderStatus, DomainError> {
    if current == OrderStatus::Cancelled && requested == OrderStatus::Cancelled {
        return Err(DomainError::AlreadyCancelled);
    }
    if TRANSITIONS.contains(&(current, requested)) {
        Ok(requested)
    } else {
        Err(DomainError::IllegalTransition {
            from: current,
            to: requested,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Payment status machine. A cancelled order only accepts a refund.
    pub fn transition(self, to: PaymentStatus, order: OrderStatus) -> Result<PaymentStatus, DomainError> {
        use PaymentStatus::*;

        let allowed = match (self, to) {
            (Paid, Refunded) => true,
            _ if order == OrderStatus::Cancelled => false,
            (Pending, Paid) | (Pending, Failed) | (Failed, Paid) => true,
            _ => false,
        };
        if allowed {
            Ok(to)
        } else {
            Err(DomainError::IllegalPaymentTransition { from: self, to })
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "FAILED" => Ok(Self::Failed),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(DomainError::Internal(format!("unknown payment status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Customer,
    Staff,
    Admin,
    System,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Staff => "staff",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}

impl FromStr for ActorRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "staff" => Ok(Self::Staff),
            "admin" => Ok(Self::Admin),
            "system" => Ok(Self::System),
            other => Err(DomainError::Internal(format!("unknown actor role '{other}'"))),
        }
    }
}

/// Who triggered a change. Identity is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    /// Rejects identifiers wider than the event log column.
    pub fn validate(&self) -> Result<(), DomainError> {
        super::order::check_length("actor id", &self.id, ACTOR_ID_MAX)
    }

    pub fn system() -> Self {
        Self::new("system", ActorRole::System)
    }
}

/// Append-only record of one status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub actor: Actor,
    pub note: String,
    pub system_generated: bool,
    pub created_at: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(order_id: Uuid, status: OrderStatus, actor: &Actor, note: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            status,
            actor: actor.clone(),
            note: note.into(),
            system_generated: actor.role == ActorRole::System,
            created_at: Utc::now(),
        }
    }
}
