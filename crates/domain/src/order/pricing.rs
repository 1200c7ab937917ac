//! Order totals.

use serde::{Deserialize, Serialize};

use super::{Money, OrderItem, TaxRate};

/// Tax and shipping rules applied at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    pub tax_rate: TaxRate,
    /// Subtotals at or above this amount ship free.
    pub free_shipping_threshold: Money,
    pub flat_shipping: Money,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: TaxRate::default(),
            free_shipping_threshold: Money::from_dollars(50),
            flat_shipping: Money::from_cents(999),
        }
    }
}

impl PricingPolicy {
    /// Computes the totals for a subtotal.
    ///
    /// Amounts are exact cents; only the tax is rounded.
    pub fn price_subtotal(&self, subtotal: Money) -> Pricing {
        let tax = self.tax_rate.apply(subtotal);
        let shipping = if subtotal >= self.free_shipping_threshold {
            Money::zero()
        } else {
            self.flat_shipping
        };

        Pricing {
            subtotal,
            tax,
            tax_rate: self.tax_rate,
            shipping,
            total: subtotal + tax + shipping,
        }
    }

    /// Computes the totals for a list of items.
    pub fn price_items(&self, items: &[OrderItem]) -> Pricing {
        self.price_subtotal(items.iter().map(OrderItem::total_price).sum())
    }
}

/// Totals of an order draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub subtotal: Money,
    pub tax: Money,
    pub tax_rate: TaxRate,
    pub shipping: Money,
    pub total: Money,
}
