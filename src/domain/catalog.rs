use bigdecimal::BigDecimal;
use uuid::Uuid;

use super::errors::DomainError;

/// A purchasable sub-entity of a product or model, with its own stock counter.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogVariant {
    pub id: Uuid,
    pub price: Option<BigDecimal>,
    pub stock: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogModel {
    pub id: Uuid,
    pub price: Option<BigDecimal>,
    /// Aggregate stock for the model when no variant is selected.
    pub stock: i32,
    pub variants: Vec<CatalogVariant>,
}

/// Read-only view of a product as served by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub product_id: Uuid,
    pub mrp: BigDecimal,
    pub selling_price: Option<BigDecimal>,
    pub gst_rate: BigDecimal,
    pub on_demand: bool,
    pub stock: i32,
    pub models: Vec<CatalogModel>,
    /// Flat variants, used when the product has no models.
    pub variants: Vec<CatalogVariant>,
}

impl CatalogEntry {
    pub fn model(&self, id: Uuid) -> Option<&CatalogModel> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Looks a variant up under the selected model, or in the flat list when
    /// no model was selected.
    pub fn variant(&self, model_id: Option<Uuid>, id: Uuid) -> Option<&CatalogVariant> {
        match model_id.and_then(|m| self.model(m)) {
            Some(model) => model.variants.iter().find(|v| v.id == id),
            None => self.variants.iter().find(|v| v.id == id),
        }
    }

    /// Resolves which stock counter governs a selection and how much it holds.
    ///
    /// Precedence: a selected variant's own counter, then the selected model's
    /// aggregate, then the base product counter.
    pub fn stock_for(
        &self,
        model_id: Option<Uuid>,
        variant_id: Option<Uuid>,
    ) -> Result<(StockTarget, i32), DomainError> {
        if let Some(model_id) = model_id {
            if self.model(model_id).is_none() {
                return Err(DomainError::invalid(format!(
                    "model {model_id} does not belong to product {}",
                    self.product_id
                )));
            }
        }

        if let Some(variant_id) = variant_id {
            let variant = self.variant(model_id, variant_id).ok_or_else(|| {
                DomainError::invalid(format!(
                    "variant {variant_id} does not belong to product {}",
                    self.product_id
                ))
            })?;
            return Ok((
                StockTarget::Variant {
                    product_id: self.product_id,
                    variant_id,
                },
                variant.stock,
            ));
        }

        if let Some(model) = model_id.and_then(|m| self.model(m)) {
            return Ok((
                StockTarget::Model {
                    product_id: self.product_id,
                    model_id: model.id,
                },
                model.stock,
            ));
        }

        Ok((StockTarget::Product(self.product_id), self.stock))
    }
}

/// The exact counter a reservation decrements and a compensation restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StockTarget {
    Product(Uuid),
    Model { product_id: Uuid, model_id: Uuid },
    Variant { product_id: Uuid, variant_id: Uuid },
}

impl StockTarget {
    /// Rebuilds the target from the ids stored on an order line.
    pub fn from_selection(product_id: Uuid, model_id: Option<Uuid>, variant_id: Option<Uuid>) -> Self {
        match (model_id, variant_id) {
            (_, Some(variant_id)) => Self::Variant {
                product_id,
                variant_id,
            },
            (Some(model_id), None) => Self::Model {
                product_id,
                model_id,
            },
            (None, None) => Self::Product(product_id),
        }
    }

    pub fn product_id(&self) -> Uuid {
        match *self {
            Self::Product(id) => id,
            Self::Model { product_id, .. } | Self::Variant { product_id, .. } => product_id,
        }
    }
}

/// Client-supplied line item. Lives only for one reservation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub model_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    /// Never used for pricing; kept as an audit hint.
    pub declared_price: Option<BigDecimal>,
}

impl LineItemRequest {
    pub fn new(product_id: Uuid, quantity: i32) -> Self {
        Self {
            product_id,
            quantity,
            model_id: None,
            variant_id: None,
            declared_price: None,
        }
    }

    pub fn with_model(mut self, model_id: Uuid) -> Self {
        self.model_id = Some(model_id);
        self
    }

    pub fn with_variant(mut self, variant_id: Uuid) -> Self {
        self.variant_id = Some(variant_id);
        self
    }

    pub fn with_declared_price(mut self, price: BigDecimal) -> Self {
        self.declared_price = Some(price);
        self
    }
}
