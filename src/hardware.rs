//! Device fingerprinting.
//!
//! The fingerprint is a SHA-256 digest over whatever stable machine
//! properties the platform exposes (CPU model, board serial, machine id,
//! hostname, OS and architecture). Probes that fail contribute an empty
//! component, so the fingerprint is always produced; it is only as unique as
//! the probes that succeeded.

use sha2::{Digest, Sha256};

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
use linux as platform;
#[cfg(target_os = "macos")]
use macos as platform;
#[cfg(target_os = "windows")]
use windows as platform;

/// Number of hex characters in a fingerprint.
pub const FINGERPRINT_LEN: usize = 32;

/// Raw machine properties that feed the fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HardwareComponents {
    pub os: String,
    pub arch: String,
    pub hostname: String,
    pub machine_id: String,
    pub cpu_id: String,
    pub motherboard_id: String,
}

impl HardwareComponents {
    /// Probe the current machine.
    pub fn detect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            hostname: probe("hostname", hostname),
            machine_id: probe("machine_id", machine_id),
            cpu_id: probe("cpu_id", cpu_id),
            motherboard_id: probe("motherboard_id", motherboard_id),
        }
    }

    /// Hash the components into a fixed-length hex fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            &self.os,
            &self.arch,
            &self.hostname,
            &self.machine_id,
            &self.cpu_id,
            &self.motherboard_id,
        ] {
            hasher.update(part.trim().as_bytes());
            hasher.update([0u8]);
        }
        let digest = hasher.finalize();
        hex::encode(&digest[..FINGERPRINT_LEN / 2])
    }
}

/// Returns a stable identifier for the current machine.
pub fn get_hardware_id() -> String {
    HardwareComponents::detect().fingerprint()
}

type ProbeResult = Result<String, Box<dyn std::error::Error>>;

fn probe(name: &str, f: fn() -> ProbeResult) -> String {
    match f() {
        Ok(value) => value.trim().to_string(),
        Err(e) => {
            tracing::debug!(component = name, error = %e, "hardware probe failed");
            String::new()
        }
    }
}

fn hostname() -> ProbeResult {
    if let Some(name) = ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .filter(|name| !name.trim().is_empty())
    {
        return Ok(name);
    }
    let output = std::process::Command::new("hostname").output()?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn machine_id() -> ProbeResult {
    platform::get_machine_id()
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn cpu_id() -> ProbeResult {
    platform::get_cpu_id()
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn motherboard_id() -> ProbeResult {
    platform::get_motherboard_id()
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn machine_id() -> ProbeResult {
    Ok(String::new())
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn cpu_id() -> ProbeResult {
    Ok(String::new())
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn motherboard_id() -> ProbeResult {
    Ok(String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HardwareComponents {
        HardwareComponents {
            os: "linux".into(),
            arch: "x86_64".into(),
            hostname: "build-01".into(),
            machine_id: "0123456789abcdef".into(),
            cpu_id: "Example CPU".into(),
            motherboard_id: "MB-42".into(),
        }
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let fp = sample().fingerprint();
        assert_eq!(fp.len(), FINGERPRINT_LEN);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp, sample().fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_components() {
        let mut other = sample();
        other.motherboard_id = "MB-43".into();
        assert_ne!(sample().fingerprint(), other.fingerprint());
    }

    #[test]
    fn component_boundaries_matter() {
        let mut a = sample();
        a.hostname = "ab".into();
        a.machine_id = "c".into();
        let mut b = sample();
        b.hostname = "a".into();
        b.machine_id = "bc".into();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn current_machine_has_fingerprint() {
        assert_eq!(get_hardware_id().len(), FINGERPRINT_LEN);
    }
}
