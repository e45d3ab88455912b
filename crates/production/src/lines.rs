//! Submitted order lines.

use serde::{Deserialize, Serialize};

use shopfloor_core::DomainError;
use shopfloor_products::ProductId;

/// A line as submitted by the caller, before ids are allocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Price in smallest currency unit, as seen by the submitter.
    pub unit_price: u64,
}

impl LineRequest {
    pub fn new(product_id: ProductId, quantity: i64, unit_price: u64) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }
}

/// Collapse lines for the same product into one, summing quantities.
///
/// The first occurrence keeps its position and unit price. A combined
/// quantity that does not fit in an `i64` is rejected.
pub fn merge_lines(lines: Vec<LineRequest>) -> Result<Vec<LineRequest>, DomainError> {
    let mut merged: Vec<LineRequest> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or_else(|| {
                    DomainError::validation(format!(
                        "combined quantity for product {} is out of range",
                        line.product_id
                    ))
                })?;
            }
            None => merged.push(line),
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[test]
    fn duplicate_products_are_summed() {
        let a = ProductId::generate();
        let b = ProductId::generate();
        let merged = merge_lines(vec![
            LineRequest::new(a, 2, 10),
            LineRequest::new(b, 1, 7),
            LineRequest::new(a, 3, 10),
        ])
        .unwrap();

        assert_eq!(
            merged,
            vec![LineRequest::new(a, 5, 10), LineRequest::new(b, 1, 7)]
        );
    }

    #[test]
    fn combined_quantity_past_i64_is_rejected() {
        let a = ProductId::generate();
        let err = merge_lines(vec![
            LineRequest::new(a, i64::MAX, 10),
            LineRequest::new(a, 1, 10),
        ])
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let merged = merge_lines(vec![
            LineRequest::new(a, i64::MAX - 1, 10),
            LineRequest::new(a, 1, 10),
        ])
        .unwrap();
        assert_eq!(merged, vec![LineRequest::new(a, i64::MAX, 10)]);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: merging preserves per-product totals and leaves each
        /// product exactly once, in first-occurrence order.
        #[test]
        fn merge_preserves_totals(
            picks in prop::collection::vec((0usize..4, 1i64..50), 0..30)
        ) {
            let products: Vec<ProductId> = (0..4).map(|_| ProductId::generate()).collect();
            let lines: Vec<LineRequest> = picks
                .iter()
                .map(|(i, q)| LineRequest::new(products[*i], *q, 10))
                .collect();

            let mut expected: HashMap<ProductId, i64> = HashMap::new();
            let mut first_seen: Vec<ProductId> = Vec::new();
            for line in &lines {
                *expected.entry(line.product_id).or_default() += line.quantity;
                if !first_seen.contains(&line.product_id) {
                    first_seen.push(line.product_id);
                }
            }

            let merged = merge_lines(lines).unwrap();
            let order: Vec<ProductId> = merged.iter().map(|l| l.product_id).collect();
            prop_assert_eq!(order, first_seen);
            for line in &merged {
                prop_assert_eq!(Some(&line.quantity), expected.get(&line.product_id));
            }
        }
    }
}
