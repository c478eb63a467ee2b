use bigdecimal::{BigDecimal, RoundingMode};

use super::ports::TaxPolicy;
use super::pricing::round_money;

/// GST components for one line. At most one of the CGST+SGST pair and IGST
/// is nonzero.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxSplit {
    pub cgst: BigDecimal,
    pub sgst: BigDecimal,
    pub igst: BigDecimal,
}

impl TaxSplit {
    pub fn zero() -> Self {
        Self {
            cgst: BigDecimal::from(0),
            sgst: BigDecimal::from(0),
            igst: BigDecimal::from(0),
        }
    }

    pub fn total(&self) -> BigDecimal {
        &self.cgst + &self.sgst + &self.igst
    }
}

/// Splits the line tax into CGST/SGST (intra-state) or IGST (inter-state).
///
/// The line tax is rounded to the currency unit first. For the intra-state
/// split CGST takes the half-up half and SGST the remainder, so the parts
/// always sum to the rounded line tax.
pub fn split(
    unit_price: &BigDecimal,
    quantity: i32,
    gst_rate: &BigDecimal,
    is_intra_state: bool,
) -> TaxSplit {
    let gross = unit_price * BigDecimal::from(quantity);
    let line_tax = round_money(&(gross * gst_rate / BigDecimal::from(100)));

    if is_intra_state {
        let cgst =
            (line_tax.clone() / BigDecimal::from(2)).with_scale_round(2, RoundingMode::HalfUp);
        let sgst = &line_tax - &cgst;
        TaxSplit {
            cgst,
            sgst,
            igst: BigDecimal::from(0),
        }
    } else {
        TaxSplit {
            cgst: BigDecimal::from(0),
            sgst: BigDecimal::from(0),
            igst: line_tax,
        }
    }
}

/// Classifies a shipping address as intra-state when it mentions the seller's
/// home state (case-insensitive substring match).
///
/// This is a crude approximation over a free-text field, not a jurisdiction
/// lookup. An address that merely names a street after the home state is
/// misclassified.
#[derive(Debug, Clone)]
pub struct HomeStatePolicy {
    home_state: String,
}

impl HomeStatePolicy {
    pub fn new(home_state: impl Into<String>) -> Self {
        Self {
            home_state: home_state.into().trim().to_lowercase(),
        }
    }
}

impl TaxPolicy for HomeStatePolicy {
    fn is_intra_state(&self, shipping_address: &str) -> bool {
        !self.home_state.is_empty() && shipping_address.to_lowercase().contains(&self.home_state)
    }
}
