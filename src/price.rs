//! Exact money amounts.
//!
//! Prices are kept as integer cents so that revenue totals and customer
//! spend always match a recount to the cent. On disk they are written as
//! plain JSON decimals (`29.99`), which is what older store files contain.

use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::LicenseError;

/// A non-negative amount in US dollars, stored as cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(u64);

impl Price {
    pub const ZERO: Price = Price(0);

    /// Largest accepted amount: one billion dollars.
    pub const MAX: Price = Price(100_000_000_000);

    pub const fn from_cents(cents: u64) -> Self {
        Price(cents)
    }

    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Convert a dollar amount, rounding to the nearest cent.
    ///
    /// Returns `None` for negative or non-finite input and for amounts
    /// above [`Price::MAX`].
    pub fn from_dollars(dollars: f64) -> Option<Self> {
        if !dollars.is_finite() || dollars < 0.0 {
            return None;
        }
        let cents = (dollars * 100.0).round();
        if cents > Price::MAX.0 as f64 {
            return None;
        }
        Some(Price(cents as u64))
    }

    pub fn as_dollars(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiply by a whole number of billing periods.
    ///
    /// Returns `None` when the product exceeds [`Price::MAX`].
    pub fn checked_times(&self, periods: u32) -> Option<Self> {
        self.0
            .checked_mul(u64::from(periods))
            .filter(|cents| *cents <= Price::MAX.0)
            .map(Price)
    }

    /// Subtract, clamping at zero.
    pub fn saturating_sub(&self, other: Price) -> Self {
        Price(self.0.saturating_sub(other.0))
    }
}

impl Add for Price {
    type Output = Price;

    fn add(self, rhs: Price) -> Price {
        Price(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Price>>(iter: I) -> Price {
        iter.fold(Price::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Price> for Price {
    fn sum<I: Iterator<Item = &'a Price>>(iter: I) -> Price {
        iter.copied().sum()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Price {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('$');
        trimmed
            .parse::<f64>()
            .ok()
            .and_then(Price::from_dollars)
            .ok_or_else(|| LicenseError::InvalidRequest(format!("invalid price: '{s}'")))
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_dollars())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let dollars = f64::deserialize(deserializer)?;
        Price::from_dollars(dollars)
            .ok_or_else(|| {
                de::Error::custom(format!(
                    "price must be between 0 and {}, got {dollars}",
                    Price::MAX
                ))
            })
    }
}
