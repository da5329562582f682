use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use paychain_core::{LineItem, Money};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub category: String,
    pub amount: Money,
    pub items: Vec<LineItem>,
}

impl Allocation {
    /// `name xN subtotal, ...` at listed prices.
    pub fn item_summary(&self) -> String {
        self.items
            .iter()
            .map(|item| format!("{} x{} {}", item.name, item.quantity, item.listed_subtotal()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Spread `target` over the item categories in proportion to listed
/// subtotals. Each item's share is rounded to cents (banker's rounding); the
/// rounding drift goes to the largest category, the first one in name order
/// on ties, so the allocations always sum to `target` exactly.
///
/// Returns categories in name order, or nothing when the listed total is
/// zero.
pub fn allocate(items: &[LineItem], target: Money) -> Vec<Allocation> {
    let listed_total: Decimal = items.iter().map(LineItem::listed_subtotal).sum();
    if listed_total.is_zero() {
        return Vec::new();
    }
    let scale = target.as_decimal() / listed_total;

    let mut by_category: BTreeMap<&str, (Money, Vec<LineItem>)> = BTreeMap::new();
    for item in items {
        let effective = Money::from_decimal(item.listed_subtotal() * scale);
        let slot = by_category
            .entry(item.category.as_str())
            .or_insert_with(|| (Money::zero(), Vec::new()));
        slot.0 += effective;
        slot.1.push(item.clone());
    }

    let mut allocations: Vec<Allocation> = by_category
        .into_iter()
        .map(|(category, (amount, items))| Allocation {
            category: category.to_string(),
            amount,
            items,
        })
        .collect();

    let residual = target - allocations.iter().map(|a| a.amount).sum::<Money>();
    if !residual.is_zero() {
        if let Some(largest) = largest_index(&allocations) {
            allocations[largest].amount += residual;
        }
    }

    allocations
}

/// First index holding the maximum amount.
fn largest_index(allocations: &[Allocation]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, a) in allocations.iter().enumerate() {
        match best {
            Some(b) if allocations[b].amount >= a.amount => {}
            _ => best = Some(i),
        }
    }
    best
}
