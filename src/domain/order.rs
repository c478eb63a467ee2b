use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::catalog::StockTarget;
use super::errors::DomainError;
use super::pricing::round_money;
use super::tax::TaxSplit;
use super::workflow::{OrderStatus, PaymentStatus};

/// A priced, taxed line produced by a successful reservation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservedLineItem {
    pub product_id: Uuid,
    pub model_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub gst_rate: BigDecimal,
    pub tax: TaxSplit,
    pub line_total: BigDecimal,
    /// On-demand lines never consumed stock and are never restored.
    pub on_demand: bool,
}

impl ReservedLineItem {
    pub fn subtotal(&self) -> BigDecimal {
        &self.unit_price * BigDecimal::from(self.quantity)
    }

    pub fn stock_target(&self) -> StockTarget {
        StockTarget::from_selection(self.product_id, self.model_id, self.variant_id)
    }

    fn without_tax(&self) -> Self {
        Self {
            tax: TaxSplit::zero(),
            line_total: round_money(&self.subtotal()),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuestContact {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Exactly one of a registered user or an embedded guest contact.
#[derive(Debug, Clone, PartialEq)]
pub enum Customer {
    Registered(Uuid),
    Guest(GuestContact),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CashOnDelivery,
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CashOnDelivery => "CASH_ON_DELIVERY",
            Self::Online => "ONLINE",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CASH_ON_DELIVERY" => Ok(Self::CashOnDelivery),
            "ONLINE" => Ok(Self::Online),
            other => Err(DomainError::Internal(format!("unknown payment method '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub invoice_number: String,
    pub customer: Customer,
    pub shipping_address: String,
    pub billing_address: String,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub lines: Vec<ReservedLineItem>,
    pub subtotal: BigDecimal,
    pub tax_total: BigDecimal,
    pub grand_total: BigDecimal,
    pub tax_exempt: bool,
    pub created_at: DateTime<Utc>,
}

/// Everything the aggregate builder needs besides the reserved lines.
#[derive(Debug, Clone)]
pub struct OrderDetails {
    pub customer: Customer,
    pub shipping_address: String,
    pub billing_address: String,
    pub payment_method: PaymentMethod,
}

/// Column widths of the guest contact fields.
const GUEST_TEXT_MAX: usize = 255;
const GUEST_PHONE_MAX: usize = 50;

pub(crate) fn check_length(field: &str, value: &str, max: usize) -> Result<(), DomainError> {
    if value.chars().count() > max {
        return Err(DomainError::invalid(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

impl OrderDetails {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.shipping_address.trim().is_empty() {
            return Err(DomainError::invalid("shipping address is required"));
        }
        if let Customer::Guest(contact) = &self.customer {
            if contact.name.trim().is_empty() || contact.email.trim().is_empty() {
                return Err(DomainError::invalid("guest contact needs a name and an email"));
            }
            check_length("guest name", &contact.name, GUEST_TEXT_MAX)?;
            check_length("guest email", &contact.email, GUEST_TEXT_MAX)?;
            if let Some(phone) = &contact.phone {
                check_length("guest phone", phone, GUEST_PHONE_MAX)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Totals {
    pub subtotal: BigDecimal,
    pub tax_total: BigDecimal,
    pub grand_total: BigDecimal,
}

impl Totals {
    pub fn of(lines: &[ReservedLineItem]) -> Self {
        let zero = BigDecimal::from(0);
        let subtotal = lines.iter().fold(zero.clone(), |acc, l| acc + l.subtotal());
        let tax_total = lines.iter().fold(zero.clone(), |acc, l| acc + l.tax.total());
        let grand_total = lines.iter().fold(zero, |acc, l| acc + &l.line_total);
        Self {
            subtotal: round_money(&subtotal),
            tax_total: round_money(&tax_total),
            grand_total: round_money(&grand_total),
        }
    }
}

impl Order {
    /// Assembles a freshly reserved order in the `Placed` state.
    pub fn place(
        invoice_number: String,
        details: OrderDetails,
        lines: Vec<ReservedLineItem>,
    ) -> Result<Self, DomainError> {
        if lines.is_empty() {
            return Err(DomainError::invalid("an order needs at least one line"));
        }
        details.validate()?;

        let totals = Totals::of(&lines);
        Ok(Self {
            id: Uuid::new_v4(),
            invoice_number,
            customer: details.customer,
            shipping_address: details.shipping_address,
            billing_address: details.billing_address,
            payment_method: details.payment_method,
            status: OrderStatus::Placed,
            payment_status: PaymentStatus::Pending,
            lines,
            subtotal: totals.subtotal,
            tax_total: totals.tax_total,
            grand_total: totals.grand_total,
            tax_exempt: false,
            created_at: Utc::now(),
        })
    }

    /// Tax-exempt correction: zero every tax component and recompute totals.
    pub fn exempt_from_tax(&self) -> Result<Self, DomainError> {
        if self.status == OrderStatus::Cancelled {
            return Err(DomainError::AlreadyCancelled);
        }
        if self.tax_exempt {
            return Err(DomainError::invalid("order is already tax exempt"));
        }

        let lines: Vec<ReservedLineItem> = self.lines.iter().map(|l| l.without_tax()).collect();
        let totals = Totals::of(&lines);
        Ok(Self {
            lines,
            subtotal: totals.subtotal,
            tax_total: totals.tax_total,
            grand_total: totals.grand_total,
            tax_exempt: true,
            ..self.clone()
        })
    }

    /// Lines whose stock must come back when the order is cancelled.
    pub fn restorable_lines(&self) -> impl Iterator<Item = &ReservedLineItem> {
        self.lines.iter().filter(|l| !l.on_demand)
    }
}
