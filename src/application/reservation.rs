use std::collections::{HashMap, HashSet};

use bigdecimal::BigDecimal;
use uuid::Uuid;

use crate::domain::catalog::{CatalogEntry, LineItemRequest, StockTarget};
use crate::domain::errors::DomainError;
use crate::domain::order::ReservedLineItem;
use crate::domain::ports::{CatalogService, StockLedger};
use crate::domain::pricing::{resolve_unit_price, round_money, PricingContext};
use crate::domain::tax;

const RESTORE_ATTEMPTS: usize = 3;

/// Adds `quantity` back to `target`, retrying transient storage failures.
pub fn restore_stock(
    ledger: &dyn StockLedger,
    target: &StockTarget,
    quantity: i32,
) -> Result<(), DomainError> {
    let mut attempt = 1;
    loop {
        match ledger.increment(target, quantity) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < RESTORE_ATTEMPTS => {
                log::warn!(
                    "Restoring {} units to {:?} failed (attempt {}): {}",
                    quantity,
                    target,
                    attempt,
                    e
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Every decrement taken so far in one batch, replayed in reverse on failure.
///
/// Dropping a log that still holds entries compensates them, so an early
/// return or a panic between reservation and commit cannot orphan stock.
pub struct CompensationLog<'a> {
    ledger: &'a dyn StockLedger,
    taken: Vec<(StockTarget, i32)>,
}

impl<'a> CompensationLog<'a> {
    pub fn new(ledger: &'a dyn StockLedger) -> Self {
        Self {
            ledger,
            taken: Vec::new(),
        }
    }

    pub fn record(&mut self, target: StockTarget, quantity: i32) {
        self.taken.push((target, quantity));
    }

    pub fn len(&self) -> usize {
        self.taken.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }

    /// Restores every recorded decrement, newest first. Returns how many
    /// restorations could not be applied.
    pub fn unwind(&mut self) -> usize {
        let mut failed = 0;
        while let Some((target, quantity)) = self.taken.pop() {
            if let Err(e) = restore_stock(self.ledger, &target, quantity) {
                failed += 1;
                log::error!(
                    "Compensation lost: {} units for {:?} were not restored: {}",
                    quantity,
                    target,
                    e
                );
            }
        }
        failed
    }

    /// Forgets the recorded decrements; they now belong to a persisted order.
    pub fn disarm(&mut self) {
        self.taken.clear();
    }
}

impl Drop for CompensationLog<'_> {
    fn drop(&mut self) {
        if !self.taken.is_empty() {
            log::warn!(
                "Reservation dropped before commit, compensating {} decrement(s)",
                self.taken.len()
            );
            self.unwind();
        }
    }
}

/// Stock held for an order that has not been persisted yet.
pub struct Reservation<'a> {
    lines: Vec<ReservedLineItem>,
    journal: CompensationLog<'a>,
}

impl<'a> Reservation<'a> {
    pub fn lines(&self) -> &[ReservedLineItem] {
        &self.lines
    }

    /// Hands the lines over for good; nothing will be compensated.
    pub fn commit(self) -> Vec<ReservedLineItem> {
        let Reservation { lines, mut journal } = self;
        journal.disarm();
        lines
    }

    /// Gives all held stock back.
    pub fn release(self) {
        let Reservation { mut journal, .. } = self;
        let restored = journal.len();
        let failed = journal.unwind();
        log::info!(
            "Released reservation: {} decrement(s) restored, {} failed",
            restored - failed,
            failed
        );
    }
}

struct PlannedLine<'e> {
    entry: &'e CatalogEntry,
    request: &'e LineItemRequest,
    target: StockTarget,
    available: i32,
    unit_price: BigDecimal,
}

pub struct ReservationCoordinator<'a> {
    catalog: &'a dyn CatalogService,
    ledger: &'a dyn StockLedger,
}

impl<'a> ReservationCoordinator<'a> {
    pub fn new(catalog: &'a dyn CatalogService, ledger: &'a dyn StockLedger) -> Self {
        Self { catalog, ledger }
    }

    /// Reserves stock for every request or for none of them.
    ///
    /// Input, catalog lookups, selections and prices are all checked before the
    /// first decrement. Decrements then run in request order; the first failure
    /// compensates everything taken so far and is returned.
    pub fn reserve(
        &self,
        requests: &[LineItemRequest],
        ctx: &PricingContext,
    ) -> Result<Reservation<'a>, DomainError> {
        validate(requests)?;

        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = requests
            .iter()
            .map(|r| r.product_id)
            .filter(|id| seen.insert(*id))
            .collect();
        let entries = self.catalog.fetch(&ids)?;
        if let Some(missing) = ids.iter().find(|id| !entries.contains_key(*id)) {
            return Err(DomainError::ProductNotFound(*missing));
        }

        let plan = requests
            .iter()
            .map(|request| plan_line(&entries[&request.product_id], request, ctx))
            .collect::<Result<Vec<_>, _>>()?;

        let mut journal = CompensationLog::new(self.ledger);
        let mut claimed: HashMap<StockTarget, i32> = HashMap::new();

        for line in &plan {
            if line.entry.on_demand {
                log::debug!("Product {} is on demand, no stock taken", line.entry.product_id);
                continue;
            }

            let quantity = line.request.quantity;
            let available = line.available - claimed.get(&line.target).copied().unwrap_or(0);
            if available < quantity {
                return Err(abort(
                    &mut journal,
                    DomainError::InsufficientStock {
                        product_id: line.entry.product_id,
                        available: available.max(0),
                    },
                ));
            }

            match self.ledger.try_decrement(&line.target, quantity) {
                Ok(true) => {
                    log::debug!("Reserved {} units of {:?}", quantity, line.target);
                    journal.record(line.target, quantity);
                    *claimed.entry(line.target).or_insert(0) += quantity;
                }
                Ok(false) => {
                    return Err(abort(
                        &mut journal,
                        DomainError::conflict(format!(
                            "stock for product {} changed during reservation",
                            line.entry.product_id
                        )),
                    ));
                }
                Err(e) => return Err(abort(&mut journal, e)),
            }
        }

        let lines = plan.into_iter().map(|line| price_line(line, ctx)).collect();
        Ok(Reservation { lines, journal })
    }
}

fn validate(requests: &[LineItemRequest]) -> Result<(), DomainError> {
    if requests.is_empty() {
        return Err(DomainError::invalid("at least one line item is required"));
    }
    for (i, r) in requests.iter().enumerate() {
        if r.product_id.is_nil() {
            return Err(DomainError::invalid(format!("line {}: missing product reference", i + 1)));
        }
        if r.quantity <= 0 {
            return Err(DomainError::invalid(format!(
                "line {}: quantity must be positive, got {}",
                i + 1,
                r.quantity
            )));
        }
    }
    Ok(())
}

fn plan_line<'e>(
    entry: &'e CatalogEntry,
    request: &'e LineItemRequest,
    ctx: &PricingContext,
) -> Result<PlannedLine<'e>, DomainError> {
    let (target, available) = entry.stock_for(request.model_id, request.variant_id)?;
    let unit_price = resolve_unit_price(
        entry,
        request.model_id,
        request.variant_id,
        ctx.is_wholesale,
        &ctx.wholesale_discount_pct,
    )?;

    if let Some(declared) = &request.declared_price {
        if *declared != unit_price {
            log::warn!(
                "Declared price {} for product {} ignored, catalog price is {}",
                declared,
                entry.product_id,
                unit_price
            );
        }
    }

    Ok(PlannedLine {
        entry,
        request,
        target,
        available,
        unit_price,
    })
}

fn price_line(line: PlannedLine<'_>, ctx: &PricingContext) -> ReservedLineItem {
    let quantity = line.request.quantity;
    let split = tax::split(&line.unit_price, quantity, &line.entry.gst_rate, ctx.is_intra_state);
    let gross = &line.unit_price * BigDecimal::from(quantity);
    let line_total = round_money(&(gross + split.total()));

    ReservedLineItem {
        product_id: line.entry.product_id,
        model_id: line.request.model_id,
        variant_id: line.request.variant_id,
        quantity,
        unit_price: line.unit_price,
        gst_rate: line.entry.gst_rate.clone(),
        tax: split,
        line_total,
        on_demand: line.entry.on_demand,
    }
}

fn abort(journal: &mut CompensationLog<'_>, err: DomainError) -> DomainError {
    if !journal.is_empty() {
        log::warn!(
            "Reservation failed ({}), compensating {} decrement(s)",
            err,
            journal.len()
        );
        journal.unwind();
    }
    err
}
