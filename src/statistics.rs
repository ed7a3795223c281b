//! Store-wide statistics.
//!
//! Statistics are always derived from the records themselves. The counters
//! stored in the document (`statistics`) are recounted on every write and
//! only exist so that other tools reading the file see sensible numbers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::plans::Plan;
use crate::price::Price;
use crate::records::{LicenseRecord, LicenseStatus};
use crate::store::Store;

/// Aggregate counters as written to the `statistics` field of the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredCounters {
    pub total_keys_generated: u64,
    pub trial_keys: u64,
    pub monthly_keys: u64,
    pub quarterly_keys: u64,
    pub lifetime_keys: u64,
    pub multi_device_keys: u64,
    pub keys_activated: u64,
    pub revenue_tracked: Price,
}

impl StoredCounters {
    pub fn recount(keys: &[LicenseRecord]) -> Self {
        let mut counters = Self::default();
        for record in keys {
            counters.total_keys_generated += 1;
            match record.plan {
                Plan::Trial => counters.trial_keys += 1,
                Plan::Monthly => counters.monthly_keys += 1,
                Plan::Quarterly => counters.quarterly_keys += 1,
                Plan::Lifetime => counters.lifetime_keys += 1,
                Plan::MultiDevice => counters.multi_device_keys += 1,
            }
            if record.activated_at.is_some() || record.status == LicenseStatus::Activated {
                counters.keys_activated += 1;
            }
        }
        counters.revenue_tracked = revenue(keys);
        counters
    }
}

/// Answer to [`Store::get_statistics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseStatistics {
    pub total_keys: usize,
    /// Keys currently in the `activated` state
    pub active_keys: usize,
    pub assigned_keys: usize,
    pub expired_keys: usize,
    pub revoked_keys: usize,
    /// Sum of prices over sold, non-revoked keys
    pub total_revenue: Price,
    pub total_customers: usize,
    pub keys_by_plan: BTreeMap<Plan, usize>,
}

/// Sum of prices over keys in `assigned` or a later non-revoked state.
pub fn revenue(keys: &[LicenseRecord]) -> Price {
    keys.iter()
        .filter(|r| r.status.is_sold())
        .map(|r| r.price)
        .sum()
}

impl Store {
    /// Recount statistics from the current records.
    pub fn get_statistics(&self) -> LicenseStatistics {
        let keys = self.licenses();
        let count = |status: LicenseStatus| keys.iter().filter(|r| r.status == status).count();

        let mut keys_by_plan: BTreeMap<Plan, usize> =
            Plan::ALL.iter().map(|plan| (*plan, 0)).collect();
        for record in keys {
            *keys_by_plan.entry(record.plan).or_default() += 1;
        }

        LicenseStatistics {
            total_keys: keys.len(),
            active_keys: count(LicenseStatus::Activated),
            assigned_keys: count(LicenseStatus::Assigned),
            expired_keys: count(LicenseStatus::Expired),
            revoked_keys: count(LicenseStatus::Revoked),
            total_revenue: revenue(keys),
            total_customers: self.customers().len(),
            keys_by_plan,
        }
    }
}
