use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// Normalize a monetary value to 2 decimal places (BigDecimal `with_scale`
/// truncates or extends with zeros when reducing scale).
pub fn normalize_scale(value: &BigDecimal) -> BigDecimal {
    value.with_scale(2)
}

/// Extended total for a movement line: `quantity * unit_price`, normalized.
pub fn line_total(quantity: i32, unit_price: &BigDecimal) -> BigDecimal {
    normalize_scale(&(BigDecimal::from(quantity) * unit_price))
}

/// Monetary amount normalized to 2 decimal places on construction.
///
/// Binds and decodes as Postgres NUMERIC; serializes transparently as the
/// inner decimal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(from = "BigDecimal")]
#[sqlx(transparent)]
pub struct Money(BigDecimal);

impl Money {
    pub fn new(raw: BigDecimal) -> Self {
        Self(normalize_scale(&raw))
    }

    pub fn inner(&self) -> &BigDecimal {
        &self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < BigDecimal::from(0)
    }

    /// Extended total for `quantity` units at this unit price.
    pub fn line_total(&self, quantity: i32) -> Money {
        Money(line_total(quantity, &self.0))
    }
}

impl From<BigDecimal> for Money {
    fn from(value: BigDecimal) -> Self {
        Self::new(value)
    }
}
