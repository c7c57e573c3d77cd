use serde::{Deserialize, Serialize};

use crate::{Currency, Money, Result, Totals};

/// Tax and shipping rules applied when an order is placed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pricing {
    /// Tax rate in basis points, applied to the discounted subtotal.
    pub tax_rate_bps: u32,
    /// Flat shipping charge per order.
    pub shipping_flat: Money,
    /// Orders whose subtotal reaches this amount ship free.
    pub free_shipping_threshold: Option<Money>,
    pub currency: Currency,
}

impl Pricing {
    /// Computes the order totals for a subtotal and discount.
    ///
    /// The discount is capped at the subtotal so the total never goes
    /// negative.
    pub fn quote(&self, subtotal: Money, discount: Money) -> Result<Totals> {
        let discount = discount.max(Money::zero()).min(subtotal);
        let taxable = subtotal - discount;
        let tax = taxable.apply_bps(self.tax_rate_bps);

        let ships_free = self
            .free_shipping_threshold
            .is_some_and(|threshold| subtotal >= threshold);
        let shipping = if ships_free {
            Money::zero()
        } else {
            self.shipping_flat
        };

        Totals::compute(subtotal, tax, shipping, discount)
    }
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            tax_rate_bps: 0,
            shipping_flat: Money::zero(),
            free_shipping_threshold: None,
            currency: Currency::Usd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pricing_is_pass_through() {
        let totals = Pricing::default()
            .quote(Money::from_cents(4_500), Money::zero())
            .unwrap();
        assert_eq!(totals.total, Money::from_cents(4_500));
        assert!(totals.tax.is_zero());
        assert!(totals.shipping.is_zero());
    }

    #[test]
    fn test_tax_shipping_and_discount() {
        let pricing = Pricing {
            tax_rate_bps: 1_000,
            shipping_flat: Money::from_cents(599),
            free_shipping_threshold: Some(Money::from_cents(10_000)),
            currency: Currency::Usd,
        };

        let totals = pricing
            .quote(Money::from_cents(5_000), Money::from_cents(1_000))
            .unwrap();
        assert_eq!(totals.tax, Money::from_cents(400));
        assert_eq!(totals.shipping, Money::from_cents(599));
        assert_eq!(totals.total, Money::from_cents(5_000 + 400 + 599 - 1_000));
        assert!(totals.validate().is_ok());

        let free = pricing.quote(Money::from_cents(10_000), Money::zero()).unwrap();
        assert!(free.shipping.is_zero());
        assert_eq!(free.total, Money::from_cents(11_000));
    }

    #[test]
    fn test_discount_capped_at_subtotal() {
        let totals = Pricing::default()
            .quote(Money::from_cents(300), Money::from_cents(900))
            .unwrap();
        assert_eq!(totals.discount, Money::from_cents(300));
        assert!(totals.total.is_zero());
    }
}
