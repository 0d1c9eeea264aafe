//! Order pricing.
//!
//! [`price_order`] is a pure function of the cart, the chosen shipping option
//! and the [`PricingPolicy`]. Tax is charged on the pre-discount subtotal.

use serde::{Deserialize, Serialize};

use crate::{Cart, Money};

/// Delivery speed chosen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShippingOption {
    #[default]
    Standard,
    Express,
    Overnight,
}

impl ShippingOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingOption::Standard => "standard",
            ShippingOption::Express => "express",
            ShippingOption::Overnight => "overnight",
        }
    }
}

impl std::fmt::Display for ShippingOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat shipping cost per option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRates {
    pub standard: Money,
    pub express: Money,
    pub overnight: Money,
}

impl ShippingRates {
    pub fn rate_for(&self, option: ShippingOption) -> Money {
        match option {
            ShippingOption::Standard => self.standard,
            ShippingOption::Express => self.express,
            ShippingOption::Overnight => self.overnight,
        }
    }
}

impl Default for ShippingRates {
    fn default() -> Self {
        Self {
            standard: Money::from_major(10),
            express: Money::from_major(20),
            overnight: Money::from_major(50),
        }
    }
}

/// Tax rate and shipping table applied at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Tax rate in basis points (1000 = 10%).
    pub tax_rate_bps: u32,
    pub shipping: ShippingRates,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate_bps: 1_000,
            shipping: ShippingRates::default(),
        }
    }
}

/// Prices frozen into an order when it is placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingSnapshot {
    pub subtotal: Money,
    pub tax_amount: Money,
    pub shipping_cost: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
}

/// `total = subtotal + tax + shipping - discount`, all in minor units.
pub fn price_order(cart: &Cart, option: ShippingOption, policy: &PricingPolicy) -> PricingSnapshot {
    let subtotal = cart.subtotal();
    let tax_amount = subtotal.percent_bps(policy.tax_rate_bps);
    let shipping_cost = policy.shipping.rate_for(option);
    let discount_amount = cart.discount();

    PricingSnapshot {
        subtotal,
        tax_amount,
        shipping_cost,
        discount_amount,
        total_amount: subtotal + tax_amount + shipping_cost - discount_amount,
    }
}
