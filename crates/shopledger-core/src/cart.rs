//! # Cart & Pricing
//!
//! The Building state of a sale attempt: a local draft of cart lines, plus
//! the pure pricing math applied during validation. No I/O here; the engine
//! fetches items and feeds them in.
//!
//! ## Pricing Formula (per line)
//! ```text
//! unit_after_discount = selling_price - resolved_discount
//! line_subtotal       = unit_after_discount * quantity
//! line_tax            = line_subtotal * tax_rate
//! line_total          = line_subtotal + line_tax
//! ```
//! Percentage discounts are resolved against the selling price first. The
//! sale total is the sum of line totals.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Discount, Money};
use crate::types::InventoryItem;
use crate::{MAX_LINE_QUANTITY, MAX_SALE_LINES};

// =============================================================================
// Cart Line
// =============================================================================

/// One line of a sale being built. Ephemeral and client-local: exists only
/// until commit, never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Item being sold.
    pub item_id: String,

    /// Quantity to sell. Must be positive by validation time.
    pub quantity: i64,

    /// Line-level discount override. `None` falls back to the item's
    /// catalog discount.
    pub discount: Option<Discount>,
}

impl CartLine {
    /// Creates a line with no discount override.
    pub fn new(item_id: impl Into<String>, quantity: i64) -> Self {
        CartLine {
            item_id: item_id.into(),
            quantity,
            discount: None,
        }
    }

    /// Creates a line with an explicit discount.
    pub fn with_discount(item_id: impl Into<String>, quantity: i64, discount: Discount) -> Self {
        CartLine {
            item_id: item_id.into(),
            quantity,
            discount: Some(discount),
        }
    }
}

// =============================================================================
// Sale Draft (Building state)
// =============================================================================

/// A sale attempt in its Building state.
///
/// Pure local state: lines can be added, updated, and removed freely, and
/// abandoning the draft has no side effects. Lines are unique by item id;
/// adding the same item again increases its quantity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaleDraft {
    pub lines: Vec<CartLine>,
}

impl SaleDraft {
    /// Creates an empty draft.
    pub fn new() -> Self {
        SaleDraft { lines: Vec::new() }
    }

    /// Adds a line, merging quantities when the item is already present.
    pub fn add_line(&mut self, line: CartLine) -> CoreResult<()> {
        if line.quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }

        if let Some(existing) = self.lines.iter_mut().find(|l| l.item_id == line.item_id) {
            let merged = existing.quantity + line.quantity;
            if merged > MAX_LINE_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: merged,
                    max: MAX_LINE_QUANTITY,
                });
            }
            existing.quantity = merged;
            if line.discount.is_some() {
                existing.discount = line.discount;
            }
            return Ok(());
        }

        if self.lines.len() >= MAX_SALE_LINES {
            return Err(CoreError::SaleTooLarge {
                max: MAX_SALE_LINES,
            });
        }
        if line.quantity > MAX_LINE_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: line.quantity,
                max: MAX_LINE_QUANTITY,
            });
        }

        self.lines.push(line);
        Ok(())
    }

    /// Sets the quantity of an existing line; zero removes it.
    pub fn update_quantity(&mut self, item_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_line(item_id);
        }
        if quantity < 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }
        if quantity > MAX_LINE_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_LINE_QUANTITY,
            });
        }

        match self.lines.iter_mut().find(|l| l.item_id == item_id) {
            Some(line) => {
                line.quantity = quantity;
                Ok(())
            }
            None => Err(CoreError::ItemNotFound(item_id.to_string())),
        }
    }

    /// Removes a line by item id.
    pub fn remove_line(&mut self, item_id: &str) -> CoreResult<()> {
        let before = self.lines.len();
        self.lines.retain(|l| l.item_id != item_id);
        if self.lines.len() == before {
            return Err(CoreError::ItemNotFound(item_id.to_string()));
        }
        Ok(())
    }

    /// Abandons the draft. No side effects beyond local state.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

// =============================================================================
// Line Pricing (Validating state)
// =============================================================================

/// The priced form of one cart line, computed against the current item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinePricing {
    pub item_id: String,
    pub quantity: i64,

    /// Selling price in cents before discount (frozen snapshot).
    pub unit_price_cents: i64,

    /// Unit price after the resolved discount.
    pub unit_after_discount_cents: i64,

    /// `unit_after_discount * quantity`.
    pub subtotal_cents: i64,

    /// Tax on the subtotal at the item's rate.
    pub tax_cents: i64,

    /// `subtotal + tax`.
    pub total_cents: i64,

    /// The discount that was applied (frozen for the sale line).
    pub discount: Discount,
}

/// Prices one cart line against the current state of its item.
///
/// Rejects non-positive quantities and quantities above current stock. This
/// is the optimistic local check; the store-level conditional decrement
/// remains the final arbiter at commit time.
pub fn price_line(item: &InventoryItem, line: &CartLine) -> CoreResult<LinePricing> {
    if line.quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }
    if !item.in_stock(line.quantity) {
        return Err(CoreError::InsufficientStock {
            item_id: item.id.clone(),
            available: item.quantity,
            requested: line.quantity,
        });
    }

    let discount = line.discount.unwrap_or(item.discount);
    let unit_price = item.price();
    let unit_after_discount = unit_price - discount.resolve(unit_price);
    let subtotal = unit_after_discount.multiply_quantity(line.quantity);
    let tax = subtotal.calculate_tax(item.tax_rate());
    let total = subtotal + tax;

    Ok(LinePricing {
        item_id: item.id.clone(),
        quantity: line.quantity,
        unit_price_cents: unit_price.cents(),
        unit_after_discount_cents: unit_after_discount.cents(),
        subtotal_cents: subtotal.cents(),
        tax_cents: tax.cents(),
        total_cents: total.cents(),
        discount,
    })
}

/// Sums priced lines into sale totals.
pub fn sale_totals(lines: &[LinePricing]) -> (Money, Money, Money) {
    let subtotal = Money::from_cents(lines.iter().map(|l| l.subtotal_cents).sum());
    let tax = Money::from_cents(lines.iter().map(|l| l.tax_cents).sum());
    let total = Money::from_cents(lines.iter().map(|l| l.total_cents).sum());
    (subtotal, tax, total)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_item(id: &str, quantity: i64, price_cents: i64, tax_rate_bps: u32) -> InventoryItem {
        InventoryItem {
            id: id.to_string(),
            shop_id: "shop-1".to_string(),
            name: format!("Item {id}"),
            sku: format!("SKU-{id}"),
            category_id: None,
            creator_id: "u1".to_string(),
            quantity,
            cost_cents: 0,
            price_cents,
            tax_rate_bps,
            discount: Discount::none(),
            image_urls: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_draft_add_and_merge() {
        let mut draft = SaleDraft::new();
        draft.add_line(CartLine::new("a", 2)).unwrap();
        draft.add_line(CartLine::new("a", 3)).unwrap();

        assert_eq!(draft.line_count(), 1);
        assert_eq!(draft.lines[0].quantity, 5);
    }

    #[test]
    fn test_draft_rejects_non_positive_quantity() {
        let mut draft = SaleDraft::new();
        assert!(draft.add_line(CartLine::new("a", 0)).is_err());
        assert!(draft.add_line(CartLine::new("a", -1)).is_err());
        assert!(draft.is_empty());
    }

    #[test]
    fn test_draft_update_zero_removes() {
        let mut draft = SaleDraft::new();
        draft.add_line(CartLine::new("a", 2)).unwrap();
        draft.update_quantity("a", 0).unwrap();
        assert!(draft.is_empty());
    }

    #[test]
    fn test_price_line_taxed_no_discount() {
        // quantity 5, price 10.00, tax 10%, no discount; sell 3
        let item = test_item("a", 5, 1000, 1000);
        let pricing = price_line(&item, &CartLine::new("a", 3)).unwrap();

        assert_eq!(pricing.subtotal_cents, 3000); // 30.00
        assert_eq!(pricing.tax_cents, 300); // 3.00
        assert_eq!(pricing.total_cents, 3300); // 33.00
    }

    #[test]
    fn test_price_line_percentage_discount() {
        // 10.00 with 10% line discount -> unit 9.00, qty 2 -> 18.00, tax 10% -> 1.80
        let item = test_item("a", 10, 1000, 1000);
        let line = CartLine::with_discount("a", 2, Discount::percentage_bps(1000));
        let pricing = price_line(&item, &line).unwrap();

        assert_eq!(pricing.unit_after_discount_cents, 900);
        assert_eq!(pricing.subtotal_cents, 1800);
        assert_eq!(pricing.tax_cents, 180);
        assert_eq!(pricing.total_cents, 1980);
    }

    #[test]
    fn test_price_line_falls_back_to_catalog_discount() {
        let mut item = test_item("a", 10, 1000, 0);
        item.discount = Discount::flat_cents(100);
        let pricing = price_line(&item, &CartLine::new("a", 1)).unwrap();

        assert_eq!(pricing.unit_after_discount_cents, 900);
    }

    #[test]
    fn test_price_line_oversized_discount_floors_at_free() {
        // Flat 15.00 off a 10.00 item: the line is free, never negative.
        let item = test_item("a", 10, 1000, 1000);
        let line = CartLine::with_discount("a", 3, Discount::flat_cents(1500));
        let pricing = price_line(&item, &line).unwrap();

        assert_eq!(pricing.unit_after_discount_cents, 0);
        assert_eq!(pricing.subtotal_cents, 0);
        assert_eq!(pricing.tax_cents, 0);
        assert_eq!(pricing.total_cents, 0);
    }

    #[test]
    fn test_price_line_insufficient_stock() {
        let item = test_item("a", 2, 1000, 0);
        let err = price_line(&item, &CartLine::new("a", 3)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock {
                available: 2,
                requested: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_sale_totals_sum_lines() {
        let item_a = test_item("a", 5, 1000, 1000);
        let item_b = test_item("b", 5, 250, 0);
        let lines = vec![
            price_line(&item_a, &CartLine::new("a", 3)).unwrap(),
            price_line(&item_b, &CartLine::new("b", 2)).unwrap(),
        ];

        let (subtotal, tax, total) = sale_totals(&lines);
        assert_eq!(subtotal.cents(), 3500);
        assert_eq!(tax.cents(), 300);
        assert_eq!(total.cents(), 3800);
    }
}
