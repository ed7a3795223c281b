//! Key minting.
//!
//! [`KeyGenerator`] turns a plan plus caller overrides into a fresh
//! [`LicenseRecord`] carrying a key that is unused in the target store.
//! [`Store::generate`] is the usual entry point; it mints and persists in one
//! step.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::config::LicenseConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::license_key::{generate_unique_license_key, LicenseKeyConfig};
use crate::logging::{log_license_event, LicenseEvent};
use crate::plans::{Plan, PlanOverrides};
use crate::records::LicenseRecord;
use crate::store::Store;

/// Mints license records with unique keys.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    key_config: LicenseKeyConfig,
    max_attempts: u32,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::from_config(&LicenseConfig::default())
    }
}

impl KeyGenerator {
    pub fn new(key_config: LicenseKeyConfig, max_attempts: u32) -> Self {
        Self {
            key_config,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &LicenseConfig) -> Self {
        Self::new(LicenseKeyConfig::from(config), config.max_generation_attempts)
    }

    pub fn key_config(&self) -> &LicenseKeyConfig {
        &self.key_config
    }

    /// Build a record for `plan`, drawing keys until `exists` reports one
    /// as unused.
    pub fn mint<F>(
        &self,
        plan: Plan,
        overrides: &PlanOverrides,
        created_at: DateTime<Utc>,
        exists: F,
    ) -> LicenseResult<LicenseRecord>
    where
        F: Fn(&str) -> bool,
    {
        let terms = plan.policy().terms(overrides)?;
        let key = generate_unique_license_key(&self.key_config, exists, self.max_attempts)?;
        LicenseRecord::new(key, plan, terms, created_at)
    }
}

impl Store {
    /// Mint a key for `plan` and persist it.
    pub fn generate(&mut self, plan: Plan, overrides: PlanOverrides) -> LicenseResult<LicenseRecord> {
        self.generate_at(plan, overrides, Utc::now())
    }

    /// [`Store::generate`] with the plan given by name.
    ///
    /// Fails with [`LicenseError::InvalidPlan`] for unknown names.
    pub fn generate_named(
        &mut self,
        plan: &str,
        overrides: PlanOverrides,
    ) -> LicenseResult<LicenseRecord> {
        let plan: Plan = plan.parse()?;
        self.generate(plan, overrides)
    }

    /// [`Store::generate`] with an explicit creation time.
    pub fn generate_at(
        &mut self,
        plan: Plan,
        overrides: PlanOverrides,
        created_at: DateTime<Utc>,
    ) -> LicenseResult<LicenseRecord> {
        let mut minted = self.generate_batch_at(plan, overrides, 1, created_at)?;
        minted
            .pop()
            .ok_or_else(|| LicenseError::InvalidRequest("no key was generated".to_string()))
    }

    /// Mint `count` keys of the same plan with a single write.
    pub fn generate_batch(
        &mut self,
        plan: Plan,
        overrides: PlanOverrides,
        count: usize,
    ) -> LicenseResult<Vec<LicenseRecord>> {
        self.generate_batch_at(plan, overrides, count, Utc::now())
    }

    fn generate_batch_at(
        &mut self,
        plan: Plan,
        overrides: PlanOverrides,
        count: usize,
        created_at: DateTime<Utc>,
    ) -> LicenseResult<Vec<LicenseRecord>> {
        if count == 0 {
            return Err(LicenseError::InvalidRequest(
                "count must be at least 1".to_string(),
            ));
        }
        // Reject bad overrides before touching the store.
        plan.policy().terms(&overrides)?;

        let minted = self.commit(|store| {
            let generator = store.generator.clone();
            let mut taken: HashSet<String> = HashSet::with_capacity(count);
            let mut minted = Vec::with_capacity(count);
            for _ in 0..count {
                let record = generator.mint(plan, &overrides, created_at, |key| {
                    store.contains_key(key) || taken.contains(key)
                })?;
                taken.insert(record.key.clone());
                minted.push(record);
            }
            for record in &minted {
                store.insert_license(record.clone());
            }
            Ok(minted)
        });

        let minted = match minted {
            Ok(minted) => minted,
            Err(e) => {
                tracing::warn!(plan = %plan, error = %e, "license generation failed");
                return Err(e);
            }
        };

        for record in &minted {
            let details = format!(
                "plan={} days={} devices={} price={}",
                record.plan, record.duration_days, record.max_devices, record.price
            );
            log_license_event(LicenseEvent::Generated, &record.key, Some(&details));
        }
        Ok(minted)
    }
}
