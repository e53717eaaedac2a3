//! Cart pricing. Pure and deterministic: totals recomputed at verification
//! time must match the totals recorded at order-creation time.

use crate::config::CheckoutConfig;
use crate::errors::ServiceError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cart line frozen with its prices at checkout time. Later catalog price
/// changes never alter an in-flight order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub name: String,
    /// Discounted unit price the customer pays
    pub unit_price: Decimal,
    /// Listed unit price (MRP) at snapshot time
    pub unit_mrp: Decimal,
    pub quantity: i32,
}

impl PricedLine {
    /// Listed line total; order items sum these into the order subtotal.
    pub fn line_total(&self) -> Decimal {
        (self.unit_mrp * Decimal::from(self.quantity)).round_dp(2)
    }

    /// The line's share of savings off the listed price, clamped at zero.
    pub fn line_discount(&self) -> Decimal {
        ((self.unit_mrp - self.unit_price).max(Decimal::ZERO) * Decimal::from(self.quantity))
            .round_dp(2)
    }
}

/// Threshold-based delivery fee rule, sourced from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFeeRule {
    pub fee: Decimal,
    pub free_threshold: Decimal,
}

impl From<&CheckoutConfig> for DeliveryFeeRule {
    fn from(cfg: &CheckoutConfig) -> Self {
        Self {
            fee: cfg.delivery_fee,
            free_threshold: cfg.free_delivery_threshold,
        }
    }
}

/// Computed cart totals. Invariant: `total = subtotal - discount + delivery_fee`,
/// where `subtotal` is the listed (pre-discount) goods total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
}

impl CartTotals {
    /// What the customer pays for the goods alone.
    pub fn goods_payable(&self) -> Decimal {
        self.subtotal - self.discount
    }
}

/// Prices a frozen snapshot. The delivery fee applies when the payable goods
/// amount is below the free-delivery threshold.
pub fn price_cart(lines: &[PricedLine], rule: &DeliveryFeeRule) -> CartTotals {
    let subtotal: Decimal = lines.iter().map(PricedLine::line_total).sum();
    let discount: Decimal = lines.iter().map(PricedLine::line_discount).sum();
    let payable = subtotal - discount;

    let delivery_fee = if lines.is_empty() || payable >= rule.free_threshold {
        Decimal::ZERO
    } else {
        rule.fee
    };

    CartTotals {
        subtotal,
        discount,
        delivery_fee,
        total: payable + delivery_fee,
    }
}

/// Converts a 2-dp monetary amount to the gateway's integer minor units.
/// Any value that cannot be represented exactly is rejected rather than
/// rounded: a silent rounding mismatch here would desynchronise the charged
/// amount from the stored order total.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    let scaled = (amount * Decimal::ONE_HUNDRED).normalize();
    if scaled.scale() > 0 {
        return Err(ServiceError::InvalidInput(format!(
            "amount {} is not representable in minor units",
            amount
        )));
    }
    scaled.to_i64().ok_or_else(|| {
        ServiceError::InvalidInput(format!("amount {} overflows minor units", amount))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn rule() -> DeliveryFeeRule {
        DeliveryFeeRule {
            fee: dec!(49),
            free_threshold: dec!(500),
        }
    }

    fn line(price: Decimal, mrp: Decimal, qty: i32) -> PricedLine {
        PricedLine {
            product_id: Uuid::new_v4(),
            name: "Paracetamol 500mg".to_string(),
            unit_price: price,
            unit_mrp: mrp,
            quantity: qty,
        }
    }

    #[test]
    fn cart_below_threshold_pays_delivery_fee() {
        let totals = price_cart(&[line(dec!(300), dec!(300), 1)], &rule());
        assert_eq!(totals.subtotal, dec!(300));
        assert_eq!(totals.discount, dec!(0));
        assert_eq!(totals.delivery_fee, dec!(49));
        assert_eq!(totals.total, dec!(349));
    }

    #[test]
    fn cart_at_threshold_ships_free() {
        let totals = price_cart(&[line(dec!(600), dec!(600), 1)], &rule());
        assert_eq!(totals.delivery_fee, dec!(0));
        assert_eq!(totals.total, dec!(600));
    }

    #[rstest]
    #[case(dec!(499.99), dec!(49))]
    #[case(dec!(500), dec!(0))]
    #[case(dec!(500.01), dec!(0))]
    fn threshold_boundary(#[case] price: Decimal, #[case] expected_fee: Decimal) {
        let totals = price_cart(&[line(price, price, 1)], &rule());
        assert_eq!(totals.delivery_fee, expected_fee);
    }

    #[test]
    fn mrp_savings_are_recorded_as_discount() {
        let totals = price_cart(&[line(dec!(80), dec!(100), 2)], &rule());
        assert_eq!(totals.subtotal, dec!(200));
        assert_eq!(totals.discount, dec!(40));
        assert_eq!(totals.goods_payable(), dec!(160));
        assert_eq!(totals.delivery_fee, dec!(49));
        assert_eq!(
            totals.total,
            totals.subtotal - totals.discount + totals.delivery_fee
        );
    }

    #[test]
    fn discount_is_clamped_when_price_exceeds_mrp() {
        // Data anomaly: selling above MRP. The customer is charged the
        // listed price, never a negative discount.
        let totals = price_cart(&[line(dec!(120), dec!(100), 1)], &rule());
        assert_eq!(totals.discount, dec!(0));
        assert_eq!(totals.goods_payable(), dec!(100));
    }

    #[test]
    fn threshold_applies_to_payable_amount_not_listed_total() {
        // Listed 520, payable 480: still below the free-delivery threshold.
        let totals = price_cart(&[line(dec!(480), dec!(520), 1)], &rule());
        assert_eq!(totals.delivery_fee, dec!(49));
    }

    #[test]
    fn empty_cart_prices_to_zero() {
        let totals = price_cart(&[], &rule());
        assert_eq!(totals.subtotal, dec!(0));
        assert_eq!(totals.delivery_fee, dec!(0));
        assert_eq!(totals.total, dec!(0));
    }

    #[test]
    fn minor_units_are_exact() {
        assert_eq!(to_minor_units(dec!(349)).unwrap(), 34900);
        assert_eq!(to_minor_units(dec!(349.50)).unwrap(), 34950);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
        assert_eq!(to_minor_units(dec!(0)).unwrap(), 0);
    }

    #[test]
    fn minor_units_reject_sub_paise_amounts() {
        assert!(to_minor_units(dec!(349.005)).is_err());
        assert!(to_minor_units(dec!(0.001)).is_err());
    }
}
