//! licstore - an offline license key store
//!
//! Mints plan-based license keys, assigns them to customers, keeps both in a
//! single JSON document, and validates exported license files on the end
//! user's machine.
//!
//! # Features
//!
//! - `cli` - the `licstore_admin` and `licstore_client` binaries. Enabled by default.
//!
//! # Example
//!
//! ```rust
//! use licstore::config::LicenseStoreConfig;
//! use licstore::plans::{Plan, PlanOverrides};
//! use licstore::store::Store;
//!
//! let mut store = Store::in_memory(&LicenseStoreConfig::default());
//! let key = store.generate(Plan::Trial, PlanOverrides::default()).unwrap().key;
//! store.assign(&key, "alice@example.com").unwrap();
//!
//! let alice = store.lookup_customer("alice@example.com").unwrap();
//! assert_eq!(alice.keys_purchased, vec![key]);
//! ```

// Ambient
pub mod config;
pub mod errors;
pub mod logging;

// Records and policy
pub mod license_key;
pub mod plans;
pub mod price;
pub mod records;

// Store and operations on it
pub mod assignment;
pub mod generator;
pub mod lifecycle;
pub mod report;
pub mod statistics;
pub mod store;

// Client side
pub mod hardware;
pub mod validator;

// Message handling around the store
pub mod delivery;
pub mod intake;

pub use errors::{LicenseError, LicenseResult};
pub use plans::{Plan, PlanOverrides};
pub use records::{CustomerRecord, LicenseRecord, LicenseStatus, NewCustomer};
pub use store::Store;
pub use validator::{LicenseState, Validator};
