//! Plan policy table.
//!
//! Every license is minted for one of a fixed set of plans. Each plan has
//! authoritative defaults for duration, device limit, price and feature set;
//! callers may override duration, devices and price per key.
//!
//! | plan | days | devices | price |
//! |---|---|---|---|
//! | trial | 7 | 1 | 0.00 |
//! | monthly | 30 | 1 | 29.99 |
//! | quarterly | 90 | 3 | 79.99 |
//! | lifetime | 36500 | 1 | 299.99 |
//! | multi_device | 365 | 6 | 499.99 |
//!
//! # Usage
//!
//! ```rust
//! use licstore::plans::{Plan, PlanOverrides};
//!
//! let plan: Plan = "quarterly".parse().unwrap();
//! let terms = plan.policy().terms(&PlanOverrides::default()).unwrap();
//! assert_eq!(terms.duration_days, 90);
//! assert!(plan.has_feature("batch_processing"));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{LicenseError, LicenseResult};
use crate::price::Price;

/// Longest validity a key may be minted with, in days (1000 years).
pub const MAX_DURATION_DAYS: u32 = 365_000;

/// A named license tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Trial,
    Monthly,
    Quarterly,
    Lifetime,
    MultiDevice,
}

/// Static defaults for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanPolicy {
    pub plan: Plan,
    /// Validity of one period in days
    pub duration_days: u32,
    /// Device slots per key
    pub max_devices: u32,
    /// Price of one period
    pub price: Price,
    /// Feature flags enabled by the plan
    pub features: &'static [&'static str],
    /// Whether the plan is sold in repeatable billing periods
    pub renewal_eligible: bool,
}

const TRIAL_FEATURES: &[&str] = &["basic_generation", "limited_workflows"];

const MONTHLY_FEATURES: &[&str] = &[
    "ai_generation",
    "unlimited_workflows",
    "api_access",
    "priority_support",
];

const QUARTERLY_FEATURES: &[&str] = &[
    "ai_generation",
    "unlimited_workflows",
    "api_access",
    "priority_support",
    "batch_processing",
];

const LIFETIME_FEATURES: &[&str] = &[
    "ai_generation",
    "unlimited_workflows",
    "api_access",
    "priority_support",
    "batch_processing",
    "lifetime_updates",
];

const MULTI_DEVICE_FEATURES: &[&str] = &[
    "ai_generation",
    "unlimited_workflows",
    "api_access",
    "priority_support",
    "batch_processing",
    "team_collaboration",
];

static POLICIES: [PlanPolicy; 5] = [
    PlanPolicy {
        plan: Plan::Trial,
        duration_days: 7,
        max_devices: 1,
        price: Price::ZERO,
        features: TRIAL_FEATURES,
        renewal_eligible: false,
    },
    PlanPolicy {
        plan: Plan::Monthly,
        duration_days: 30,
        max_devices: 1,
        price: Price::from_cents(2999),
        features: MONTHLY_FEATURES,
        renewal_eligible: true,
    },
    PlanPolicy {
        plan: Plan::Quarterly,
        duration_days: 90,
        max_devices: 3,
        price: Price::from_cents(7999),
        features: QUARTERLY_FEATURES,
        renewal_eligible: true,
    },
    PlanPolicy {
        plan: Plan::Lifetime,
        duration_days: 36500,
        max_devices: 1,
        price: Price::from_cents(29999),
        features: LIFETIME_FEATURES,
        renewal_eligible: false,
    },
    PlanPolicy {
        plan: Plan::MultiDevice,
        duration_days: 365,
        max_devices: 6,
        price: Price::from_cents(49999),
        features: MULTI_DEVICE_FEATURES,
        renewal_eligible: true,
    },
];

impl Plan {
    /// All plans in table order.
    pub const ALL: [Plan; 5] = [
        Plan::Trial,
        Plan::Monthly,
        Plan::Quarterly,
        Plan::Lifetime,
        Plan::MultiDevice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Trial => "trial",
            Plan::Monthly => "monthly",
            Plan::Quarterly => "quarterly",
            Plan::Lifetime => "lifetime",
            Plan::MultiDevice => "multi_device",
        }
    }

    /// Human-readable label for reports and messages.
    pub fn label(&self) -> &'static str {
        match self {
            Plan::Trial => "Trial",
            Plan::Monthly => "Monthly",
            Plan::Quarterly => "Quarterly",
            Plan::Lifetime => "Lifetime",
            Plan::MultiDevice => "Multi-Device",
        }
    }

    pub fn policy(&self) -> &'static PlanPolicy {
        match self {
            Plan::Trial => &POLICIES[0],
            Plan::Monthly => &POLICIES[1],
            Plan::Quarterly => &POLICIES[2],
            Plan::Lifetime => &POLICIES[3],
            Plan::MultiDevice => &POLICIES[4],
        }
    }

    /// Feature flags granted by this plan.
    pub fn features(&self) -> Vec<String> {
        self.policy().features.iter().map(|f| f.to_string()).collect()
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.policy().features.contains(&feature)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Plan::ALL
            .iter()
            .copied()
            .find(|plan| plan.as_str() == normalized)
            .ok_or_else(|| LicenseError::InvalidPlan(s.to_string()))
    }
}

/// Caller overrides applied on top of a plan's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOverrides {
    /// Exact validity in days; wins over `periods`
    pub duration_days: Option<u32>,
    /// Price of one period; multiplied by `periods`
    pub price: Option<Price>,
    pub max_devices: Option<u32>,
    /// Number of billing periods (renewable plans only)
    pub periods: Option<u32>,
}

/// Concrete terms a key is minted with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseTerms {
    pub duration_days: u32,
    pub max_devices: u32,
    pub price: Price,
    pub features: Vec<String>,
}

impl PlanPolicy {
    /// Resolve the terms for one key from the defaults and the overrides.
    pub fn terms(&self, overrides: &PlanOverrides) -> LicenseResult<LicenseTerms> {
        let periods = match overrides.periods {
            None => 1,
            Some(0) => {
                return Err(LicenseError::InvalidRequest(
                    "periods must be at least 1".to_string(),
                ))
            }
            Some(n) if n > 1 && !self.renewal_eligible => {
                return Err(LicenseError::InvalidRequest(format!(
                    "{} keys cannot be sold for multiple periods",
                    self.plan
                )))
            }
            Some(n) => n,
        };

        let duration_days = match overrides.duration_days {
            Some(0) => {
                return Err(LicenseError::InvalidRequest(
                    "duration_days must be at least 1".to_string(),
                ))
            }
            Some(days) => days,
            None => self
                .duration_days
                .checked_mul(periods)
                .unwrap_or(u32::MAX),
        };
        if duration_days > MAX_DURATION_DAYS {
            return Err(LicenseError::InvalidRequest(format!(
                "duration of {duration_days} days exceeds the maximum of {MAX_DURATION_DAYS}"
            )));
        }

        let max_devices = match overrides.max_devices {
            Some(0) => {
                return Err(LicenseError::InvalidRequest(
                    "max_devices must be at least 1".to_string(),
                ))
            }
            Some(devices) => devices,
            None => self.max_devices,
        };

        let rate = overrides.price.unwrap_or(self.price);
        let price = rate.checked_times(periods).ok_or_else(|| {
            LicenseError::InvalidRequest(format!("{rate} x {periods} periods is too large"))
        })?;

        Ok(LicenseTerms {
            duration_days,
            max_devices,
            price,
            features: self.plan.features(),
        })
    }
}
