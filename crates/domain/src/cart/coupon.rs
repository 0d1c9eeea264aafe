//! Coupon lookup and evaluation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Money;

/// How a coupon reduces the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "lowercase")]
pub enum CouponKind {
    /// Whole percent of the subtotal.
    Percentage(u32),
    /// Flat amount off.
    Fixed(Money),
}

/// A coupon as applied to a cart and frozen into an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    #[serde(flatten)]
    pub kind: CouponKind,
}

impl Coupon {
    /// Discount this coupon grants on `subtotal`, clamped to `[0, subtotal]`.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        let raw = match self.kind {
            CouponKind::Percentage(percent) => subtotal.percent_bps(percent.saturating_mul(100)),
            CouponKind::Fixed(amount) => amount,
        };
        raw.clamp_to(Money::zero(), subtotal)
    }
}

/// Table of redeemable coupon codes.
#[derive(Debug, Clone)]
pub struct CouponBook {
    coupons: HashMap<String, CouponKind>,
}

impl CouponBook {
    pub fn empty() -> Self {
        Self {
            coupons: HashMap::new(),
        }
    }

    /// Registers or replaces a code.
    pub fn with(mut self, code: impl Into<String>, kind: CouponKind) -> Self {
        self.coupons.insert(code.into(), kind);
        self
    }

    /// Looks up a code exactly as entered (surrounding whitespace ignored).
    pub fn lookup(&self, code: &str) -> Option<Coupon> {
        let code = code.trim();
        self.coupons.get(code).map(|kind| Coupon {
            code: code.to_string(),
            kind: *kind,
        })
    }
}

impl Default for CouponBook {
    /// `SAVE10` (10% off) and `FLAT50` (50.00 off).
    fn default() -> Self {
        Self::empty()
            .with("SAVE10", CouponKind::Percentage(10))
            .with("FLAT50", CouponKind::Fixed(Money::from_major(50)))
    }
}
