use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::ports::InvoiceNumbers;

/// Formats `INV-YYYYMMDD-NNNN`.
pub fn format_invoice_number(date: NaiveDate, suffix: u32) -> String {
    format!("INV-{}-{:04}", date.format("%Y%m%d"), suffix % 10_000)
}

/// Random four-digit suffixes. Collisions are caught by the unique index and
/// retried by the order service.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomInvoiceNumbers;

impl InvoiceNumbers for RandomInvoiceNumbers {
    fn next(&self, date: NaiveDate) -> String {
        let suffix = (Uuid::new_v4().as_u128() % 10_000) as u32;
        format_invoice_number(date, suffix)
    }
}
