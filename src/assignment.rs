//! Customers and key assignment.

use chrono::{DateTime, Utc};

use crate::errors::{LicenseError, LicenseResult};
use crate::logging::{log_license_event, LicenseEvent};
use crate::records::{normalize_email, CustomerRecord, LicenseStatus, NewCustomer};
use crate::store::Store;

impl Store {
    /// Create a customer, or return the existing record for that email.
    ///
    /// An existing record is returned unchanged; the descriptive fields of
    /// `customer` are ignored in that case.
    pub fn create_customer(&mut self, customer: NewCustomer) -> LicenseResult<CustomerRecord> {
        let email = normalize_email(&customer.email)?;
        if let Some(idx) = self.customer_index(&email) {
            return Ok(self.doc.customers[idx].clone());
        }

        let record = CustomerRecord::new(customer, Utc::now())?;
        let created = self.commit(|store| {
            store.insert_customer(record.clone());
            Ok(record)
        })?;
        log_license_event(LicenseEvent::CustomerCreated, &created.email, None);
        Ok(created)
    }

    /// Look up a customer by email (case-insensitive).
    pub fn lookup_customer(&self, email: &str) -> Option<&CustomerRecord> {
        let email = normalize_email(email).ok()?;
        self.customer_index(&email).map(|i| &self.doc.customers[i])
    }

    /// The customer a key was assigned to, if any.
    pub fn customer_for_key(&self, key: &str) -> Option<&CustomerRecord> {
        let idx = self.license_index(key).ok()?;
        self.owner_index(idx).map(|i| &self.doc.customers[i])
    }

    /// Hand a freshly generated key to a customer.
    ///
    /// The customer is created with a placeholder name if the email is new.
    /// Fails with [`LicenseError::KeyNotFound`], [`LicenseError::Revoked`] or
    /// [`LicenseError::AlreadyAssigned`]; on failure neither the key nor any
    /// customer is modified.
    pub fn assign(&mut self, key: &str, customer_email: &str) -> LicenseResult<()> {
        self.assign_at(key, customer_email, Utc::now())
    }

    pub fn assign_at(
        &mut self,
        key: &str,
        customer_email: &str,
        now: DateTime<Utc>,
    ) -> LicenseResult<()> {
        match self.try_assign(key, customer_email, now) {
            Ok((key, created)) => {
                let email = customer_email.trim().to_lowercase();
                if created {
                    log_license_event(LicenseEvent::CustomerCreated, &email, Some("implicit"));
                }
                log_license_event(
                    LicenseEvent::Assigned,
                    &key,
                    Some(&format!("customer={email}")),
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(key = %key, customer = %customer_email, error = %e, "assignment failed");
                Err(e)
            }
        }
    }

    fn try_assign(
        &mut self,
        key: &str,
        customer_email: &str,
        now: DateTime<Utc>,
    ) -> LicenseResult<(String, bool)> {
        let email = normalize_email(customer_email)?;
        let idx = self.license_index(key)?;

        let record = &self.doc.keys[idx];
        match record.status {
            LicenseStatus::Generated => {}
            LicenseStatus::Revoked => return Err(LicenseError::Revoked(record.key.clone())),
            _ => {
                return Err(LicenseError::AlreadyAssigned {
                    key: record.key.clone(),
                    owner: record
                        .customer_email
                        .clone()
                        .unwrap_or_else(|| "an unknown customer".to_string()),
                })
            }
        }

        let new_customer = match self.customer_index(&email) {
            Some(_) => None,
            None => Some(CustomerRecord::new(NewCustomer::with_email(&email), now)?),
        };
        let created = new_customer.is_some();

        let key = self.commit(|store| store.apply_assignment(idx, &email, new_customer, now))?;
        Ok((key, created))
    }

    /// Attach the generated key at `idx` to `email`, inserting `new_customer`
    /// first when given. Callers check the key status beforehand.
    pub(crate) fn apply_assignment(
        &mut self,
        idx: usize,
        email: &str,
        new_customer: Option<CustomerRecord>,
        now: DateTime<Utc>,
    ) -> LicenseResult<String> {
        let customer_idx = match new_customer {
            Some(customer) => self.insert_customer(customer),
            None => self
                .customer_index(email)
                .ok_or_else(|| LicenseError::InvalidRequest(format!("unknown customer {email}")))?,
        };

        let record = &mut self.doc.keys[idx];
        record.transition(LicenseStatus::Assigned)?;
        record.customer_email = Some(email.to_string());
        record.assigned_at = Some(now);
        let (key, price) = (record.key.clone(), record.price);

        let customer = &mut self.doc.customers[customer_idx];
        customer.keys_purchased.push(key.clone());
        customer.total_spent = customer.total_spent + price;
        customer.last_contact = Some(now);
        Ok(key)
    }
}
