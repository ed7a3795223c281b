//! License and customer records as persisted in the store document.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{LicenseError, LicenseResult};
use crate::plans::{LicenseTerms, Plan};
use crate::price::Price;

/// Lifecycle state of a license key.
///
/// States only move forward (`generated` → `assigned` → `activated` →
/// `expired`); `revoked` is reachable from every state and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    Generated,
    Assigned,
    Activated,
    Expired,
    Revoked,
}

impl LicenseStatus {
    fn rank(&self) -> u8 {
        match self {
            LicenseStatus::Generated => 0,
            LicenseStatus::Assigned => 1,
            LicenseStatus::Activated => 2,
            LicenseStatus::Expired => 3,
            LicenseStatus::Revoked => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Generated => "generated",
            LicenseStatus::Assigned => "assigned",
            LicenseStatus::Activated => "activated",
            LicenseStatus::Expired => "expired",
            LicenseStatus::Revoked => "revoked",
        }
    }

    /// Whether a record in this state may move to `next`.
    ///
    /// Staying in the same state is allowed except for `revoked`.
    pub fn can_transition_to(&self, next: LicenseStatus) -> bool {
        match (self, next) {
            (LicenseStatus::Revoked, _) => false,
            (_, LicenseStatus::Revoked) => true,
            (current, next) => next.rank() >= current.rank(),
        }
    }

    /// Whether the key has been sold, i.e. counts towards revenue.
    pub fn is_sold(&self) -> bool {
        matches!(
            self,
            LicenseStatus::Assigned | LicenseStatus::Activated | LicenseStatus::Expired
        )
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single license key and everything known about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// Opaque token, `PREFIX-XXXX-XXXX-XXXX-XXXX`
    pub key: String,
    /// Plan the key was minted for
    #[serde(rename = "type")]
    pub plan: Plan,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub expiry_date: DateTime<Utc>,
    pub duration_days: u32,
    pub max_devices: u32,
    pub price: Price,
    pub features: Vec<String>,
    pub status: LicenseStatus,
    #[serde(default)]
    pub activation_count: u32,
    #[serde(default)]
    pub hardware_ids: Vec<String>,
    /// Normalized email of the owning customer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl LicenseRecord {
    /// Build a fresh record; `expiry_date` is derived from `duration_days`.
    ///
    /// Fails with [`LicenseError::InvalidRequest`] when the expiry falls
    /// outside the representable date range.
    pub fn new(
        key: String,
        plan: Plan,
        terms: LicenseTerms,
        created_at: DateTime<Utc>,
    ) -> LicenseResult<Self> {
        let expiry_date = Duration::try_days(i64::from(terms.duration_days))
            .and_then(|span| created_at.checked_add_signed(span))
            .ok_or_else(|| {
                LicenseError::InvalidRequest(format!(
                    "{} days from {} is out of range",
                    terms.duration_days, created_at
                ))
            })?;
        Ok(Self {
            key,
            plan,
            created_at,
            expiry_date,
            duration_days: terms.duration_days,
            max_devices: terms.max_devices,
            price: terms.price,
            features: terms.features,
            status: LicenseStatus::Generated,
            activation_count: 0,
            hardware_ids: Vec::new(),
            customer_email: None,
            assigned_at: None,
            activated_at: None,
            revoked_at: None,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry_date
    }

    /// Whole days left until expiry; negative once expired.
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expiry_date - now).num_days()
    }

    pub fn is_bound_to(&self, hardware_id: &str) -> bool {
        self.hardware_ids.iter().any(|id| id == hardware_id)
    }

    pub fn free_device_slots(&self) -> u32 {
        self.max_devices.saturating_sub(self.hardware_ids.len() as u32)
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    /// Move to `next`, enforcing the forward-only lifecycle.
    pub fn transition(&mut self, next: LicenseStatus) -> LicenseResult<()> {
        if self.status == LicenseStatus::Revoked {
            return Err(LicenseError::Revoked(self.key.clone()));
        }
        if !self.status.can_transition_to(next) {
            return Err(LicenseError::InvalidTransition {
                key: self.key.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Record a device fingerprint, consuming one slot.
    ///
    /// Returns `true` when the fingerprint was newly added.
    pub fn bind_device(&mut self, hardware_id: &str) -> LicenseResult<bool> {
        if self.is_bound_to(hardware_id) {
            return Ok(false);
        }
        if self.free_device_slots() == 0 {
            return Err(LicenseError::DeviceLimitReached {
                key: self.key.clone(),
                max_devices: self.max_devices,
            });
        }
        self.hardware_ids.push(hardware_id.to_string());
        self.activation_count = self.activation_count.saturating_add(1);
        Ok(true)
    }
}

/// Contact details of a buyer, keyed by normalized email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Keys in purchase order
    #[serde(default, deserialize_with = "purchased_keys")]
    pub keys_purchased: Vec<String>,
    /// Sum of prices of the non-revoked keys in `keys_purchased`
    #[serde(default)]
    pub total_spent: Price,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    pub last_contact: Option<DateTime<Utc>>,
}

/// Input for creating a customer.
#[derive(Debug, Clone, Default)]
pub struct NewCustomer {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
}

impl NewCustomer {
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }
}

/// Name recorded for customers created implicitly during assignment.
pub const PLACEHOLDER_CUSTOMER_NAME: &str = "Customer";

impl CustomerRecord {
    pub fn new(customer: NewCustomer, created_at: DateTime<Utc>) -> LicenseResult<Self> {
        let email = normalize_email(&customer.email)?;
        let name = customer
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| PLACEHOLDER_CUSTOMER_NAME.to_string());

        Ok(Self {
            id: Uuid::new_v4(),
            email,
            name,
            phone: non_empty(customer.phone),
            company: non_empty(customer.company),
            created_at,
            keys_purchased: Vec::new(),
            total_spent: Price::ZERO,
            last_contact: None,
        })
    }

    pub fn owns(&self, key: &str) -> bool {
        self.keys_purchased.iter().any(|k| k == key)
    }
}

/// Accept both plain key strings and the `{"key": ..., "price": ...}`
/// entries written by older admin tools.
fn purchased_keys<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Key(String),
        Detailed { key: String },
    }

    let entries = Vec::<Entry>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            Entry::Key(key) | Entry::Detailed { key } => key,
        })
        .collect())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Lowercase and trim an email address, rejecting obviously malformed input.
pub fn normalize_email(email: &str) -> LicenseResult<String> {
    let normalized = email.trim().to_lowercase();
    let valid = match normalized.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !normalized.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(normalized)
    } else {
        Err(LicenseError::InvalidRequest(format!(
            "invalid customer email: '{email}'"
        )))
    }
}

/// Timestamp codec.
///
/// Writes RFC 3339 in UTC. Reads RFC 3339, naive ISO 8601
/// (`2025-01-01T12:00:00.123456`) and `2025-01-01 12:00:00`; naive values
/// are taken as UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: '{raw}'")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.serialize_str(&super::format(value)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                None => Ok(None),
                Some(raw) if raw.trim().is_empty() => Ok(None),
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid timestamp: '{raw}'"))),
            }
        }
    }
}
