//! Operator-side state changes after assignment: activation, revocation and
//! the expiry sweep.

use chrono::{DateTime, Utc};

use crate::errors::{LicenseError, LicenseResult};
use crate::logging::{log_license_binding_event, log_license_event, LicenseEvent};
use crate::records::{timestamp, LicenseStatus};
use crate::store::Store;

impl Store {
    /// Activate `key` on the device identified by `hardware_id`.
    ///
    /// Returns `true` when the device was newly bound, `false` when it was
    /// already bound. Device limits are enforced strictly here.
    pub fn activate(&mut self, key: &str, hardware_id: &str) -> LicenseResult<bool> {
        self.activate_at(key, hardware_id, Utc::now())
    }

    pub fn activate_at(
        &mut self,
        key: &str,
        hardware_id: &str,
        now: DateTime<Utc>,
    ) -> LicenseResult<bool> {
        let hardware_id = hardware_id.trim();
        if hardware_id.is_empty() {
            return Err(LicenseError::InvalidRequest(
                "hardware id cannot be empty".to_string(),
            ));
        }

        let idx = self.license_index(key)?;
        let record = &self.doc.keys[idx];
        match record.status {
            LicenseStatus::Revoked => return Err(LicenseError::Revoked(record.key.clone())),
            LicenseStatus::Expired => {
                return Err(LicenseError::InvalidTransition {
                    key: record.key.clone(),
                    from: record.status.to_string(),
                    to: LicenseStatus::Activated.to_string(),
                })
            }
            _ => {}
        }
        if record.is_expired_at(now) {
            return Err(LicenseError::ValidationFailed(format!(
                "license {} expired on {}",
                record.key,
                timestamp::format(&record.expiry_date)
            )));
        }
        if !record.is_bound_to(hardware_id) && record.free_device_slots() == 0 {
            return Err(LicenseError::DeviceLimitReached {
                key: record.key.clone(),
                max_devices: record.max_devices,
            });
        }

        let (key, newly_bound) = self.commit(|store| {
            let record = &mut store.doc.keys[idx];
            let newly_bound = record.bind_device(hardware_id)?;
            record.transition(LicenseStatus::Activated)?;
            if record.activated_at.is_none() {
                record.activated_at = Some(now);
            }
            Ok((record.key.clone(), newly_bound))
        })?;

        if newly_bound {
            log_license_binding_event(LicenseEvent::Bound, &key, hardware_id);
        }
        log_license_event(LicenseEvent::Activated, &key, None);
        Ok(newly_bound)
    }

    /// Revoke `key`. Revocation is terminal.
    ///
    /// If the key had been sold, its price is taken off the owner's
    /// `total_spent`; the key stays in the owner's purchase history.
    pub fn revoke(&mut self, key: &str) -> LicenseResult<()> {
        self.revoke_at(key, Utc::now())
    }

    pub fn revoke_at(&mut self, key: &str, now: DateTime<Utc>) -> LicenseResult<()> {
        let idx = self.license_index(key)?;
        let record = &self.doc.keys[idx];
        if record.status == LicenseStatus::Revoked {
            return Err(LicenseError::Revoked(record.key.clone()));
        }
        let refund = record.status.is_sold().then_some(record.price);
        let owner = self.owner_index(idx);

        let key = self.commit(|store| {
            let record = &mut store.doc.keys[idx];
            record.transition(LicenseStatus::Revoked)?;
            record.revoked_at = Some(now);
            let key = record.key.clone();

            if let (Some(price), Some(owner)) = (refund, owner) {
                let customer = &mut store.doc.customers[owner];
                customer.total_spent = customer.total_spent.saturating_sub(price);
            }
            Ok(key)
        })?;

        log_license_event(LicenseEvent::Revoked, &key, None);
        Ok(())
    }

    /// Move every assigned or activated key whose expiry date has passed to
    /// `expired`. Returns the number of keys changed.
    pub fn expire_overdue(&mut self, now: DateTime<Utc>) -> LicenseResult<usize> {
        let overdue: Vec<usize> = self
            .licenses()
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                matches!(r.status, LicenseStatus::Assigned | LicenseStatus::Activated)
                    && r.is_expired_at(now)
            })
            .map(|(i, _)| i)
            .collect();

        if overdue.is_empty() {
            tracing::debug!("no overdue licenses");
            return Ok(0);
        }

        let expired = self.commit(|store| {
            let mut keys = Vec::with_capacity(overdue.len());
            for &idx in &overdue {
                let record = &mut store.doc.keys[idx];
                record.transition(LicenseStatus::Expired)?;
                keys.push(record.key.clone());
            }
            Ok(keys)
        })?;

        for key in &expired {
            log_license_event(LicenseEvent::Expired, key, None);
        }
        tracing::info!(count = expired.len(), "expired overdue licenses");
        Ok(expired.len())
    }
}
