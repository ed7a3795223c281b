use std::fs;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use licstore::config::LicenseStoreConfig;
use licstore::plans::{Plan, PlanOverrides};
use licstore::records::{LicenseRecord, LicenseStatus};
use licstore::store::Store;
use licstore::validator::{read_license_file, BindingMode, LicenseState, Validator};

fn exported(plan: Plan) -> (TempDir, std::path::PathBuf, LicenseRecord) {
    let dir = TempDir::new().unwrap();
    let mut store = Store::in_memory(&LicenseStoreConfig::default());
    let record = store.generate(plan, PlanOverrides::default()).unwrap();
    store.assign(&record.key, "client@example.com").unwrap();

    let path = dir.path().join("user_license.json");
    store.export_license(&record.key, &path).unwrap();
    let record = store.get_license(&record.key).unwrap().clone();
    (dir, path, record)
}

#[test]
fn fresh_license_reports_active() {
    let (_dir, path, record) = exported(Plan::Monthly);
    let validator = Validator::new(&path).with_fingerprint("device-1");

    let report = validator.status_report();
    assert_eq!(report.state, LicenseState::Active);
    assert_eq!(report.plan, Some(Plan::Monthly));
    assert_eq!(report.key.as_deref(), Some(record.key.as_str()));
    assert!(report.days_until_expiry.unwrap() >= 29);
}

#[test]
fn past_expiry_reports_expired() {
    let (_dir, path, mut record) = exported(Plan::Lifetime);

    record.expiry_date = Utc::now() - Duration::days(1);
    fs::write(&path, serde_json::to_string_pretty(&record).unwrap()).unwrap();

    let validator = Validator::new(&path).with_fingerprint("device-1");
    let report = validator.status_report();
    assert_eq!(report.state, LicenseState::Expired);
    assert!(report.days_until_expiry.unwrap() < 0);
    assert!(validator.validate().is_err());
}

#[test]
fn validate_records_devices_until_full() {
    let (_dir, path, _record) = exported(Plan::Quarterly);

    for device in ["d1", "d2", "d3"] {
        Validator::new(&path)
            .with_fingerprint(device)
            .validate()
            .unwrap();
    }
    let stored = read_license_file(&path).unwrap().unwrap();
    assert_eq!(stored.hardware_ids, vec!["d1", "d2", "d3"]);
    assert_eq!(stored.activation_count, 3);
    assert_eq!(stored.status, LicenseStatus::Activated);

    // A fourth device passes permissively but is not recorded...
    let report = Validator::new(&path)
        .with_fingerprint("d4")
        .validate()
        .unwrap();
    assert_eq!(report.state, LicenseState::Active);
    assert_eq!(
        read_license_file(&path).unwrap().unwrap().hardware_ids.len(),
        3
    );

    // ...and is refused under the strict policy.
    let strict = Validator::new(&path)
        .with_fingerprint("d4")
        .with_policy(BindingMode::Strict);
    assert_eq!(strict.status_report().state, LicenseState::Invalid);
    assert!(strict.validate().is_err());
}

#[test]
fn tampered_file_is_invalid() {
    let (_dir, path, _record) = exported(Plan::Trial);
    let raw = fs::read_to_string(&path).unwrap();
    fs::write(&path, &raw[..raw.len() / 2]).unwrap();

    let report = Validator::new(&path).with_fingerprint("d").status_report();
    assert_eq!(report.state, LicenseState::Invalid);
}

#[test]
fn revoked_license_fails_validation() {
    let dir = TempDir::new().unwrap();
    let mut store = Store::in_memory(&LicenseStoreConfig::default());
    let key = store
        .generate(Plan::Monthly, PlanOverrides::default())
        .unwrap()
        .key;
    store.revoke(&key).unwrap();
    let path = dir.path().join("license.json");
    store.export_license(&key, &path).unwrap();

    let validator = Validator::new(&path).with_fingerprint("d");
    assert_eq!(validator.status_report().state, LicenseState::Invalid);
    assert!(validator.validate().is_err());
}
