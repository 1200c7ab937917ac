//! Payload types shared by the orchestrator-facing steps.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use domain::Money;
use inventory_store::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

/// A line item as sent by the orchestrator.
///
/// Every field is optional so one malformed item can be skipped without
/// rejecting the whole request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemInput {
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    /// Unit price snapshotted at validation.
    #[serde(default)]
    pub price: Option<Money>,
}

impl LineItemInput {
    pub fn new(product_id: impl Into<ProductId>, quantity: i64) -> Self {
        Self {
            product_id: Some(product_id.into()),
            quantity: Some(quantity),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = Some(name.into());
        self
    }

    pub fn with_price(mut self, price: Money) -> Self {
        self.price = Some(price);
        self
    }

    /// Returns the well-formed line, or None if the product ID is missing or
    /// blank or the quantity is not a positive integer.
    pub fn parse(&self) -> Option<ParsedLine> {
        let product_id = self.product_id.as_ref().filter(|p| !p.is_blank())?;
        let quantity = u32::try_from(self.quantity?).ok().filter(|q| *q > 0)?;
        Some(ParsedLine {
            product_id: product_id.clone(),
            product_name: self.product_name.clone(),
            quantity,
            price: self.price,
        })
    }
}

/// A well-formed line item.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub product_id: ProductId,
    pub product_name: Option<String>,
    pub quantity: u32,
    pub price: Option<Money>,
}

/// Parses line items, logging and dropping malformed ones. Lines naming the
/// same product are merged: quantities are summed and the first name and
/// price seen are kept.
pub(crate) fn parse_lines(order_id: &OrderId, items: &[LineItemInput]) -> Vec<ParsedLine> {
    let mut merged: Vec<ParsedLine> = Vec::new();
    let mut positions: HashMap<ProductId, usize> = HashMap::new();

    for (index, item) in items.iter().enumerate() {
        let Some(line) = item.parse() else {
            tracing::warn!(%order_id, index, ?item, "skipping invalid line item");
            continue;
        };

        match positions.get(&line.product_id) {
            Some(&pos) => {
                let existing = &mut merged[pos];
                match existing.quantity.checked_add(line.quantity) {
                    Some(total) => existing.quantity = total,
                    None => tracing::warn!(%order_id, index, "skipping line item: quantity overflow"),
                }
                if existing.product_name.is_none() {
                    existing.product_name = line.product_name;
                }
                if existing.price.is_none() {
                    existing.price = line.price;
                }
            }
            None => {
                positions.insert(line.product_id.clone(), merged.len());
                merged.push(line);
            }
        }
    }

    merged
}

/// A product and quantity reported back by reserve and release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
}

/// Result of a call whose `action` names a different step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotApplicable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl NotApplicable {
    pub(crate) fn new(order_id: Option<OrderId>, action: &str, step: &str) -> Self {
        Self {
            order_id,
            message: format!("Action {action} not applicable for {step}"),
            timestamp: Utc::now(),
        }
    }
}

/// Returns the action if the payload names a step other than `step`.
pub(crate) fn foreign_action<'a>(action: Option<&'a str>, step: &str) -> Option<&'a str> {
    action.filter(|a| !a.is_empty() && *a != step)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_malformed_lines() {
        assert!(LineItemInput::new("p1", 2).parse().is_some());
        assert!(LineItemInput::new("p1", 0).parse().is_none());
        assert!(LineItemInput::new("p1", -1).parse().is_none());
        assert!(LineItemInput::new(" ", 1).parse().is_none());
        assert!(
            LineItemInput {
                quantity: Some(1),
                ..Default::default()
            }
            .parse()
            .is_none()
        );
    }

    #[test]
    fn duplicate_products_are_merged() {
        let order = OrderId::new("o-1");
        let lines = parse_lines(
            &order,
            &[
                LineItemInput::new("p1", 2),
                LineItemInput::new("p2", 1).with_name("Mug"),
                LineItemInput::new("p1", 3).with_name("Tee"),
                LineItemInput::new("p3", 0),
            ],
        );

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].product_id.as_str(), "p1");
        assert_eq!(lines[0].quantity, 5);
        assert_eq!(lines[0].product_name.as_deref(), Some("Tee"));
        assert_eq!(lines[1].product_name.as_deref(), Some("Mug"));
    }

    #[test]
    fn line_items_deserialize_leniently() {
        let item: LineItemInput = serde_json::from_value(serde_json::json!({
            "productId": "p1",
            "quantity": 2,
            "price": 15.0
        }))
        .unwrap();
        let line = item.parse().unwrap();
        assert_eq!(line.quantity, 2);
        assert_eq!(line.price.unwrap().cents(), 1500);
        assert!(line.product_name.is_none());
    }

    #[test]
    fn foreign_actions() {
        assert_eq!(foreign_action(Some("release"), "reserve"), Some("release"));
        assert_eq!(foreign_action(Some("reserve"), "reserve"), None);
        assert_eq!(foreign_action(None, "reserve"), None);
    }
}
