//! Client-side license validation.
//!
//! The validator works on a single license file exported from the store (see
//! [`Store::export_license`](crate::store::Store::export_license)), never on
//! the full database. Its states:
//!
//! - `not_activated`: no license file present
//! - `active`: not past expiry and the device binding check passes
//! - `expired`: past `expiry_date`
//! - `invalid`: the file cannot be read or parsed, the key was revoked, or
//!   the binding check rejected this device
//!
//! Device binding is delegated to a [`BindingPolicy`]. The shipped
//! [`BindingMode::Permissive`] policy records fingerprints while slots are
//! free and keeps accepting once they are full; [`BindingMode::Strict`]
//! rejects unknown devices once every slot is taken.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{get_config, ValidatorConfig};
use crate::errors::{LicenseError, LicenseResult};
use crate::hardware::get_hardware_id;
use crate::license_key::parse_license_key;
use crate::logging::{log_license_binding_event, log_license_event, LicenseEvent};
use crate::plans::Plan;
use crate::records::{LicenseRecord, LicenseStatus};
use crate::store::write_json_atomic;

/// Outcome of checking one device against a license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingDecision {
    /// Fingerprint is already recorded
    AlreadyBound,
    /// A slot is free; record the fingerprint
    Bind,
    /// Accept without recording anything
    Accept,
    /// Refuse this device
    Reject(String),
}

impl BindingDecision {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, BindingDecision::Reject(_))
    }
}

/// Decides whether a device may use a license.
pub trait BindingPolicy: fmt::Debug + Send + Sync {
    fn check(&self, license: &LicenseRecord, fingerprint: &str) -> BindingDecision;
}

/// Built-in binding policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BindingMode {
    /// Bind while slots are free, accept any device once full
    #[default]
    Permissive,
    /// Bind while slots are free, reject unknown devices once full
    Strict,
}

impl BindingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingMode::Permissive => "permissive",
            BindingMode::Strict => "strict",
        }
    }
}

impl fmt::Display for BindingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BindingMode {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "permissive" => Ok(BindingMode::Permissive),
            "strict" => Ok(BindingMode::Strict),
            other => Err(LicenseError::ConfigError(format!(
                "unknown binding policy '{other}'"
            ))),
        }
    }
}

impl BindingPolicy for BindingMode {
    fn check(&self, license: &LicenseRecord, fingerprint: &str) -> BindingDecision {
        if license.is_bound_to(fingerprint) {
            return BindingDecision::AlreadyBound;
        }
        if license.free_device_slots() > 0 {
            return BindingDecision::Bind;
        }
        match self {
            BindingMode::Permissive => BindingDecision::Accept,
            BindingMode::Strict => BindingDecision::Reject(format!(
                "license is already bound to {} device(s)",
                license.max_devices
            )),
        }
    }
}

/// Validator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseState {
    NotActivated,
    Active,
    Expired,
    Invalid,
}

impl LicenseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseState::NotActivated => "not_activated",
            LicenseState::Active => "active",
            LicenseState::Expired => "expired",
            LicenseState::Invalid => "invalid",
        }
    }
}

impl fmt::Display for LicenseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer to [`Validator::status_report`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub state: LicenseState,
    pub key: Option<String>,
    pub plan: Option<Plan>,
    /// Whole days left; negative once expired
    pub days_until_expiry: Option<i64>,
    /// Why the license is not active
    pub reason: Option<String>,
}

impl StatusReport {
    fn not_activated() -> Self {
        Self {
            state: LicenseState::NotActivated,
            key: None,
            plan: None,
            days_until_expiry: None,
            reason: Some("no license file found".to_string()),
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            state: LicenseState::Invalid,
            key: None,
            plan: None,
            days_until_expiry: None,
            reason: Some(reason.into()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == LicenseState::Active
    }
}

/// Read a license file. A missing file is `Ok(None)`.
pub fn read_license_file(path: &Path) -> LicenseResult<Option<LicenseRecord>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let record: LicenseRecord = serde_json::from_str(&raw)
        .map_err(|e| LicenseError::ValidationFailed(format!("unreadable license file: {e}")))?;

    if parse_license_key(&record.key).is_none() {
        return Err(LicenseError::ValidationFailed(format!(
            "malformed license key '{}'",
            record.key
        )));
    }
    Ok(Some(record))
}

/// Write a license file atomically.
pub fn write_license_file(path: &Path, record: &LicenseRecord) -> LicenseResult<()> {
    write_json_atomic(path, record)
}

/// Checks the license file on this machine.
#[derive(Debug)]
pub struct Validator {
    license_path: PathBuf,
    fingerprint: String,
    policy: Box<dyn BindingPolicy>,
}

impl Validator {
    /// Validator for `license_path` using this machine's fingerprint and the
    /// permissive policy.
    pub fn new(license_path: impl Into<PathBuf>) -> Self {
        Self {
            license_path: license_path.into(),
            fingerprint: get_hardware_id(),
            policy: Box::new(BindingMode::default()),
        }
    }

    pub fn from_config(config: &ValidatorConfig) -> LicenseResult<Self> {
        let mode = config.binding_mode()?;
        Ok(Self::new(config.resolved_license_path()?).with_policy(mode))
    }

    /// Validator configured by `config.toml` / `LICSTORE_*`.
    pub fn from_default_config() -> LicenseResult<Self> {
        Self::from_config(&get_config()?.validator)
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub fn with_policy(mut self, policy: impl BindingPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn license_path(&self) -> &Path {
        &self.license_path
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Current state of the license file. Never writes.
    pub fn status_report(&self) -> StatusReport {
        self.status_report_at(Utc::now())
    }

    pub fn status_report_at(&self, now: DateTime<Utc>) -> StatusReport {
        match read_license_file(&self.license_path) {
            Ok(None) => StatusReport::not_activated(),
            Ok(Some(record)) => self.evaluate(&record, now).0,
            Err(e) => StatusReport::invalid(e.to_string()),
        }
    }

    fn evaluate(
        &self,
        record: &LicenseRecord,
        now: DateTime<Utc>,
    ) -> (StatusReport, Option<BindingDecision>) {
        let mut report = StatusReport {
            state: LicenseState::Active,
            key: Some(record.key.clone()),
            plan: Some(record.plan),
            days_until_expiry: Some(record.days_until_expiry(now)),
            reason: None,
        };

        if record.status == LicenseStatus::Revoked {
            report.state = LicenseState::Invalid;
            report.reason = Some("license has been revoked".to_string());
            return (report, None);
        }
        if record.is_expired_at(now) || record.status == LicenseStatus::Expired {
            report.state = LicenseState::Expired;
            report.reason = Some("license has expired".to_string());
            return (report, None);
        }

        let decision = self.policy.check(record, &self.fingerprint);
        if let BindingDecision::Reject(reason) = &decision {
            report.state = LicenseState::Invalid;
            report.reason = Some(reason.clone());
        }
        (report, Some(decision))
    }

    /// Validate the license for this device, recording the binding when a
    /// slot is consumed.
    ///
    /// Returns the report when the license is active and
    /// [`LicenseError::ValidationFailed`] otherwise.
    pub fn validate(&self) -> LicenseResult<StatusReport> {
        self.validate_at(Utc::now())
    }

    pub fn validate_at(&self, now: DateTime<Utc>) -> LicenseResult<StatusReport> {
        let path = self.license_path.display().to_string();
        let mut record = match read_license_file(&self.license_path) {
            Ok(Some(record)) => record,
            Ok(None) => return Err(fail(&path, "no license file found".to_string())),
            Err(e) => return Err(fail(&path, e.to_string())),
        };

        let (report, decision) = self.evaluate(&record, now);
        if !report.is_active() {
            let reason = report
                .reason
                .clone()
                .unwrap_or_else(|| report.state.to_string());
            return Err(fail(&record.key, reason));
        }

        if decision == Some(BindingDecision::Bind) {
            record.bind_device(&self.fingerprint)?;
            if record.status.can_transition_to(LicenseStatus::Activated) {
                record.transition(LicenseStatus::Activated)?;
            }
            if record.activated_at.is_none() {
                record.activated_at = Some(now);
            }
            write_license_file(&self.license_path, &record)?;
            log_license_binding_event(LicenseEvent::Bound, &record.key, &self.fingerprint);
        }

        log_license_event(LicenseEvent::Validated, &record.key, None);
        Ok(report)
    }
}

fn fail(subject: &str, reason: String) -> LicenseError {
    log_license_event(LicenseEvent::ValidationFailed, subject, Some(&reason));
    LicenseError::ValidationFailed(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::PlanOverrides;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn record(plan: Plan) -> LicenseRecord {
        let terms = plan.policy().terms(&PlanOverrides::default()).unwrap();
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        LicenseRecord::new("CNPRO-A2B3-C4D5-E6F7-G8H9".to_string(), plan, terms, created).unwrap()
    }

    fn setup(record: &LicenseRecord) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("license.json");
        write_license_file(&path, record).unwrap();
        (dir, path)
    }

    fn during() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 3, 0, 0, 0).unwrap()
    }

    #[test]
    fn missing_file_is_not_activated() {
        let dir = TempDir::new().unwrap();
        let validator = Validator::new(dir.path().join("none.json")).with_fingerprint("fp");
        assert_eq!(validator.status_report().state, LicenseState::NotActivated);
        assert!(matches!(
            validator.validate(),
            Err(LicenseError::ValidationFailed(_))
        ));
    }

    #[test]
    fn garbage_file_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("license.json");
        fs::write(&path, "definitely not json").unwrap();
        let report = Validator::new(&path).with_fingerprint("fp").status_report();
        assert_eq!(report.state, LicenseState::Invalid);
        assert!(report.reason.is_some());
    }

    #[test]
    fn status_report_does_not_bind() {
        let (_dir, path) = setup(&record(Plan::Monthly));
        let validator = Validator::new(&path).with_fingerprint("fp-1");
        let report = validator.status_report_at(during());
        assert_eq!(report.state, LicenseState::Active);
        assert_eq!(report.plan, Some(Plan::Monthly));
        assert_eq!(report.days_until_expiry, Some(28));

        let stored = read_license_file(&path).unwrap().unwrap();
        assert!(stored.hardware_ids.is_empty());
    }

    #[test]
    fn validate_binds_first_device() {
        let (_dir, path) = setup(&record(Plan::Monthly));
        let validator = Validator::new(&path).with_fingerprint("fp-1");
        validator.validate_at(during()).unwrap();

        let stored = read_license_file(&path).unwrap().unwrap();
        assert_eq!(stored.hardware_ids, vec!["fp-1".to_string()]);
        assert_eq!(stored.activation_count, 1);
        assert_eq!(stored.status, LicenseStatus::Activated);

        // Second run on the same device changes nothing.
        validator.validate_at(during()).unwrap();
        let again = read_license_file(&path).unwrap().unwrap();
        assert_eq!(again.activation_count, 1);
    }

    #[test]
    fn full_license_depends_on_policy() {
        let mut full = record(Plan::Monthly);
        full.bind_device("fp-owner").unwrap();
        let (_dir, path) = setup(&full);

        let permissive = Validator::new(&path).with_fingerprint("fp-other");
        assert!(permissive.validate_at(during()).is_ok());
        let stored = read_license_file(&path).unwrap().unwrap();
        assert_eq!(stored.hardware_ids, vec!["fp-owner".to_string()]);

        let strict = Validator::new(&path)
            .with_fingerprint("fp-other")
            .with_policy(BindingMode::Strict);
        assert_eq!(strict.status_report_at(during()).state, LicenseState::Invalid);
        assert!(strict.validate_at(during()).is_err());

        let owner = Validator::new(&path)
            .with_fingerprint("fp-owner")
            .with_policy(BindingMode::Strict);
        assert!(owner.validate_at(during()).is_ok());
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let rec = record(Plan::Trial);
        let (_dir, path) = setup(&rec);
        let validator = Validator::new(&path).with_fingerprint("fp");

        assert_eq!(
            validator.status_report_at(rec.expiry_date).state,
            LicenseState::Active
        );
        let report = validator.status_report_at(rec.expiry_date + Duration::seconds(1));
        assert_eq!(report.state, LicenseState::Expired);
        assert!(validator
            .validate_at(rec.expiry_date + Duration::days(1))
            .is_err());
    }

    #[test]
    fn revoked_license_is_invalid() {
        let mut rec = record(Plan::Lifetime);
        rec.transition(LicenseStatus::Revoked).unwrap();
        let (_dir, path) = setup(&rec);
        let report = Validator::new(&path).with_fingerprint("fp").status_report_at(during());
        assert_eq!(report.state, LicenseState::Invalid);
        assert_eq!(report.key.as_deref(), Some("CNPRO-A2B3-C4D5-E6F7-G8H9"));
    }

    #[test]
    fn binding_mode_parses() {
        assert_eq!("Strict".parse::<BindingMode>().unwrap(), BindingMode::Strict);
        assert_eq!(BindingMode::default(), BindingMode::Permissive);
        assert!("lenient".parse::<BindingMode>().is_err());
    }

    #[derive(Debug)]
    struct DenyAll;

    impl BindingPolicy for DenyAll {
        fn check(&self, _: &LicenseRecord, _: &str) -> BindingDecision {
            BindingDecision::Reject("denied".to_string())
        }
    }

    #[test]
    fn custom_policy_is_consulted() {
        let (_dir, path) = setup(&record(Plan::Quarterly));
        let validator = Validator::new(&path)
            .with_fingerprint("fp")
            .with_policy(DenyAll);
        let report = validator.status_report_at(during());
        assert_eq!(report.state, LicenseState::Invalid);
        assert_eq!(report.reason.as_deref(), Some("denied"));
    }
}
