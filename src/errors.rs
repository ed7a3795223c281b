//! Error types shared by every licstore component.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type LicenseResult<T> = Result<T, LicenseError>;

/// Everything that can go wrong while minting, assigning, persisting or
/// validating a license.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Unknown plan name requested.
    #[error("invalid plan: '{0}'")]
    InvalidPlan(String),

    /// Caller supplied an override or identifier that cannot be honoured.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Key does not exist in the store.
    #[error("license key not found: {0}")]
    KeyNotFound(String),

    /// Key has already been handed to a customer.
    #[error("license key {key} is already assigned to {owner}")]
    AlreadyAssigned { key: String, owner: String },

    /// Key was revoked; revocation is terminal.
    #[error("license key {0} has been revoked")]
    Revoked(String),

    /// Requested status change would move a license backwards.
    #[error("license key {key} cannot move from {from} to {to}")]
    InvalidTransition {
        key: String,
        from: String,
        to: String,
    },

    /// Every device slot of the license is taken.
    #[error("license key {key} is already bound to the maximum of {max_devices} device(s)")]
    DeviceLimitReached { key: String, max_devices: u32 },

    /// Could not find an unused token within the configured attempt budget.
    #[error("failed to generate a unique license key after {0} attempts")]
    KeySpaceExhausted(u32),

    /// Persisted store document could not be parsed.
    #[error("corrupt license store: {0}")]
    CorruptStore(String),

    /// Another process holds the store.
    #[error("license store is locked by another process (lock file {})", .0.display())]
    StoreLocked(PathBuf),

    /// Client-side license check failed (missing, expired, tampered, unbound).
    #[error("license validation failed: {0}")]
    ValidationFailed(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Underlying file I/O failed.
    #[error("storage error: {0}")]
    StorageError(#[from] std::io::Error),

    /// A record could not be encoded.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl LicenseError {
    /// True for errors caused by the state of a particular key rather than
    /// by the environment (I/O, config, locking).
    pub fn is_key_state_error(&self) -> bool {
        matches!(
            self,
            LicenseError::KeyNotFound(_)
                | LicenseError::AlreadyAssigned { .. }
                | LicenseError::Revoked(_)
                | LicenseError::InvalidTransition { .. }
                | LicenseError::DeviceLimitReached { .. }
        )
    }
}
