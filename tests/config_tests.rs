use std::env;

use serial_test::serial;

use licstore::config::LicenseStoreConfig;
use licstore::validator::BindingMode;

const VARS: &[&str] = &[
    "LICSTORE_STORE_PATH",
    "LICSTORE_LICENSE_KEY_PREFIX",
    "LICSTORE_VALIDATOR_LICENSE_PATH",
    "LICSTORE_BINDING_POLICY",
    "LICSTORE_LOGGING_ENABLED",
    "LICSTORE_LOG_LEVEL",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn env_overrides_defaults() {
    clear_env();
    env::set_var("LICSTORE_STORE_PATH", "/tmp/licstore-test/db.json");
    env::set_var("LICSTORE_LICENSE_KEY_PREFIX", "TESTX");
    env::set_var("LICSTORE_BINDING_POLICY", "strict");
    env::set_var("LICSTORE_LOGGING_ENABLED", "true");
    env::set_var("LICSTORE_LOG_LEVEL", "debug");

    let config = LicenseStoreConfig::load().unwrap();
    clear_env();

    assert_eq!(config.store.path.as_deref(), Some("/tmp/licstore-test/db.json"));
    assert_eq!(config.license.key_prefix, "TESTX");
    assert_eq!(config.validator.binding_mode().unwrap(), BindingMode::Strict);
    assert!(config.logging.enabled);
    assert_eq!(config.logging.level, "debug");
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn unparseable_logging_flag_is_ignored() {
    clear_env();
    env::set_var("LICSTORE_LOGGING_ENABLED", "sometimes");

    let config = LicenseStoreConfig::load().unwrap();
    clear_env();
    let baseline = LicenseStoreConfig::load().unwrap();

    assert_eq!(config.logging.enabled, baseline.logging.enabled);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn bad_policy_fails_validation() {
    clear_env();
    env::set_var("LICSTORE_BINDING_POLICY", "paranoid");

    let config = LicenseStoreConfig::load().unwrap();
    clear_env();

    assert!(config.validate().is_err());
}

#[test]
#[serial]
fn defaults_without_env() {
    clear_env();
    let config = LicenseStoreConfig::load().unwrap();

    // config.toml may exist in the working directory, so only check shape.
    assert!(!config.license.key_prefix.is_empty());
    assert!(config.license.key_segments > 0);
    assert!(config.store.resolved_path().is_ok() || config.store.path.is_none());
}
