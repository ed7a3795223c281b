//! Plain-text operator report.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::plans::Plan;
use crate::price::Price;
use crate::statistics::{LicenseStatistics, StoredCounters};
use crate::store::Store;

/// Number of most recently created keys listed in the report.
pub const RECENT_KEYS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct RecentKey {
    pub key: String,
    pub plan: Plan,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of the store for operators.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminReport {
    pub generated_at: DateTime<Utc>,
    pub statistics: LicenseStatistics,
    /// Keys that have ever been activated
    pub keys_activated: u64,
    pub average_revenue_per_customer: Price,
    /// Percentage of keys ever activated
    pub activation_rate: f64,
    pub recent: Vec<RecentKey>,
}

/// Build the report for `store` as of `now`.
pub fn admin_report(store: &Store, now: DateTime<Utc>) -> AdminReport {
    let statistics = store.get_statistics();
    let counters = StoredCounters::recount(store.licenses());

    let customers = statistics.total_customers.max(1) as u64;
    let average = Price::from_cents(
        (statistics.total_revenue.cents() + customers / 2) / customers,
    );
    let activation_rate = if statistics.total_keys == 0 {
        0.0
    } else {
        counters.keys_activated as f64 / statistics.total_keys as f64 * 100.0
    };

    let mut recent: Vec<RecentKey> = store
        .licenses()
        .iter()
        .map(|r| RecentKey {
            key: r.key.clone(),
            plan: r.plan,
            created_at: r.created_at,
        })
        .collect();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    recent.truncate(RECENT_KEYS);

    AdminReport {
        generated_at: now,
        statistics,
        keys_activated: counters.keys_activated,
        average_revenue_per_customer: average,
        activation_rate,
        recent,
    }
}

impl fmt::Display for AdminReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.statistics;
        writeln!(f, "LICENSE ADMIN REPORT")?;
        writeln!(
            f,
            "Generated: {} UTC",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(f)?;

        writeln!(f, "OVERVIEW:")?;
        writeln!(f, "  Total Keys Generated: {}", stats.total_keys)?;
        writeln!(f, "  Assigned Keys: {}", stats.assigned_keys)?;
        writeln!(f, "  Active Keys: {}", stats.active_keys)?;
        writeln!(f, "  Expired Keys: {}", stats.expired_keys)?;
        writeln!(f, "  Revoked Keys: {}", stats.revoked_keys)?;
        writeln!(f, "  Total Customers: {}", stats.total_customers)?;
        writeln!(f, "  Revenue Tracked: ${}", stats.total_revenue)?;
        writeln!(f)?;

        writeln!(f, "KEY BREAKDOWN:")?;
        for (plan, count) in &stats.keys_by_plan {
            writeln!(f, "  {} Keys: {}", plan.label(), count)?;
        }
        writeln!(f)?;

        writeln!(f, "REVENUE ANALYSIS:")?;
        writeln!(
            f,
            "  Average Revenue per Customer: ${}",
            self.average_revenue_per_customer
        )?;
        writeln!(f, "  Activation Rate: {:.1}%", self.activation_rate)?;
        writeln!(f)?;

        writeln!(f, "RECENT ACTIVITY:")?;
        if self.recent.is_empty() {
            writeln!(f, "  (no keys)")?;
        }
        for key in &self.recent {
            writeln!(
                f,
                "  {} ({}) - {}",
                key.key,
                key.plan,
                key.created_at.format("%Y-%m-%d")
            )?;
        }
        Ok(())
    }
}
