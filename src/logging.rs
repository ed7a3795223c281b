//! Structured logging for licstore.
//!
//! Library code only emits `tracing` events; the binaries install a
//! subscriber with [`init_logging`]. License state changes go through
//! [`log_license_event`] so that every transition carries the same span
//! fields (`event`, `license_key`).

use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing::{info, info_span, warn};

use crate::config::LoggingConfig;

/// License state change event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    /// Key was minted
    Generated,
    /// Key was handed to a customer
    Assigned,
    /// Key was activated on a device
    Activated,
    /// A device fingerprint was recorded against the key
    Bound,
    /// Key passed its expiry date
    Expired,
    /// Key was revoked
    Revoked,
    /// Client-side validation succeeded
    Validated,
    /// Client-side validation failed
    ValidationFailed,
    /// A customer record was created
    CustomerCreated,
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseEvent::Generated => "generated",
            LicenseEvent::Assigned => "assigned",
            LicenseEvent::Activated => "activated",
            LicenseEvent::Bound => "bound",
            LicenseEvent::Expired => "expired",
            LicenseEvent::Revoked => "revoked",
            LicenseEvent::Validated => "validated",
            LicenseEvent::ValidationFailed => "validation_failed",
            LicenseEvent::CustomerCreated => "customer_created",
        };
        write!(f, "{}", s)
    }
}

/// Log a license state change event.
///
/// # Arguments
///
/// * `event` - The type of license event
/// * `license_key` - The license key (or customer email for `CustomerCreated`)
/// * `details` - Optional additional details about the event
pub fn log_license_event(event: LicenseEvent, license_key: &str, details: Option<&str>) {
    let span = info_span!(
        "license_event",
        event = %event,
        license_key = %license_key,
    );
    let _enter = span.enter();

    match event {
        LicenseEvent::ValidationFailed => {
            if let Some(d) = details {
                warn!(reason = %d, "License event occurred");
            } else {
                warn!("License event occurred");
            }
        }
        _ => {
            if let Some(d) = details {
                info!(details = %d, "License event occurred");
            } else {
                info!("License event occurred");
            }
        }
    }
}

/// Log a license event that involves a device fingerprint.
pub fn log_license_binding_event(event: LicenseEvent, license_key: &str, hardware_id: &str) {
    let span = info_span!(
        "license_binding",
        event = %event,
        license_key = %license_key,
        hardware_id = %hardware_id,
    );
    let _enter = span.enter();

    info!("License binding event occurred");
}

/// Install the global fmt subscriber described by `config`.
///
/// Does nothing when logging is disabled or a subscriber is already set.
pub fn init_logging(config: &LoggingConfig) {
    if !config.enabled {
        return;
    }

    let level = LevelFilter::from_str(&config.level).unwrap_or(LevelFilter::INFO);
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_snake_case() {
        assert_eq!(LicenseEvent::ValidationFailed.to_string(), "validation_failed");
        assert_eq!(LicenseEvent::CustomerCreated.to_string(), "customer_created");
        assert_eq!(LicenseEvent::Generated.to_string(), "generated");
    }

    #[test]
    fn logging_without_subscriber_is_harmless() {
        log_license_event(LicenseEvent::Assigned, "CNPRO-AAAA-BBBB-CCCC-DDDD", None);
        log_license_event(
            LicenseEvent::ValidationFailed,
            "CNPRO-AAAA-BBBB-CCCC-DDDD",
            Some("expired"),
        );
        log_license_binding_event(LicenseEvent::Bound, "CNPRO-AAAA-BBBB-CCCC-DDDD", "abc");
    }

    #[test]
    fn disabled_config_installs_nothing() {
        init_logging(&LoggingConfig::default());
    }
}
