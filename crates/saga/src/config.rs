use std::time::Duration;

use orders::Pricing;

/// Saga tuning: call timeouts and the pricing rules applied at checkout.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// Upper bound on every inventory call.
    pub inventory_timeout: Duration,
    /// Upper bound on every payment gateway call.
    pub payment_timeout: Duration,
    pub pricing: Pricing,
}

impl SagaConfig {
    pub fn with_inventory_timeout(mut self, timeout: Duration) -> Self {
        self.inventory_timeout = timeout;
        self
    }

    pub fn with_payment_timeout(mut self, timeout: Duration) -> Self {
        self.payment_timeout = timeout;
        self
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            inventory_timeout: Duration::from_secs(5),
            payment_timeout: Duration::from_secs(15),
            pricing: Pricing::default(),
        }
    }
}
