//! License key generation and validation.
//!
//! Keys are human-readable tokens in the format `PREFIX-XXXX-XXXX-XXXX-XXXX`.
//!
//! # Features
//!
//! - Configurable prefix (default `CNPRO`)
//! - Configurable number of segments and segment length
//! - Excludes ambiguous characters (0, O, I, L, 1) for readability
//! - Format validation and normalization of hand-typed keys
//!
//! # Example
//!
//! ```rust
//! use licstore::license_key::{generate_license_key, validate_license_key_format, LicenseKeyConfig};
//!
//! let config = LicenseKeyConfig::default();
//! let key = generate_license_key(&config);
//! assert!(key.starts_with("CNPRO-"));
//! assert!(validate_license_key_format(&key, &config));
//! ```

use rand::Rng;

use crate::config::{get_config, LicenseConfig};
use crate::errors::{LicenseError, LicenseResult};

/// Character set for license key generation.
/// Excludes ambiguous characters: 0, O, I, L, 1
const LICENSE_KEY_CHARSET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Configuration for license key generation.
/// This is a convenience wrapper that can be constructed from `LicenseConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseKeyConfig {
    /// Product tag placed before the first dash
    pub prefix: String,
    /// Number of segments after the prefix
    pub segments: u8,
    /// Length of each segment
    pub segment_length: u8,
}

impl Default for LicenseKeyConfig {
    fn default() -> Self {
        Self::from(&LicenseConfig::default())
    }
}

impl From<&LicenseConfig> for LicenseKeyConfig {
    fn from(config: &LicenseConfig) -> Self {
        Self {
            prefix: config.key_prefix.clone(),
            segments: config.key_segments,
            segment_length: config.key_segment_length,
        }
    }
}

/// Generate a single segment of random characters.
fn generate_segment(length: u8) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..LICENSE_KEY_CHARSET.len());
            LICENSE_KEY_CHARSET[idx] as char
        })
        .collect()
}

/// Generate a license key with the given configuration.
///
/// The key is not checked against any store; use
/// [`generate_unique_license_key`] when uniqueness matters.
pub fn generate_license_key(config: &LicenseKeyConfig) -> String {
    let segments: Vec<String> = (0..config.segments)
        .map(|_| generate_segment(config.segment_length))
        .collect();

    format!("{}-{}", config.prefix, segments.join("-"))
}

/// Generate a license key using the global configuration.
pub fn generate_license_key_from_config() -> LicenseResult<String> {
    let config = get_config()?;
    let key_config = LicenseKeyConfig::from(&config.license);
    Ok(generate_license_key(&key_config))
}

/// Validate that a license key matches the expected format.
///
/// This validates:
/// - The first dash-separated part is exactly the prefix
/// - The key has the correct number of segments
/// - Each segment has the correct length
/// - All characters in segments are from the valid character set
pub fn validate_license_key_format(key: &str, config: &LicenseKeyConfig) -> bool {
    let parts: Vec<&str> = key.split('-').collect();

    if parts.len() != 1 + config.segments as usize {
        return false;
    }
    if parts[0] != config.prefix {
        return false;
    }

    parts[1..].iter().all(|segment| {
        segment.len() == config.segment_length as usize
            && segment.bytes().all(|b| LICENSE_KEY_CHARSET.contains(&b))
    })
}

/// Parse a license key and extract its components.
///
/// Returns `Some((prefix, segments))` if the key has at least one dash.
pub fn parse_license_key(key: &str) -> Option<(String, Vec<String>)> {
    let (prefix, rest) = key.split_once('-')?;
    if prefix.is_empty() {
        return None;
    }
    Some((
        prefix.to_string(),
        rest.split('-').map(str::to_string).collect(),
    ))
}

/// Clean up a key typed or pasted by a user.
///
/// Trims whitespace, uppercases, and repairs a prefix whose letter `O` was
/// typed as `0` or whose `I`/`L` was typed as `1`/`l` (`CNPR0-` → `CNPRO-`).
/// Segments are left alone: they never contain those characters, so a
/// mistyped segment simply fails the format check.
pub fn normalize_license_key(key: &str, config: &LicenseKeyConfig) -> String {
    let upper = key.trim().to_uppercase();
    let Some((prefix, rest)) = upper.split_once('-') else {
        return upper;
    };

    if prefix == config.prefix || prefix.len() != config.prefix.len() {
        return upper;
    }

    let repaired = prefix
        .chars()
        .zip(config.prefix.chars())
        .all(|(typed, expected)| typed == expected || is_lookalike(typed, expected));

    if repaired {
        format!("{}-{}", config.prefix, rest)
    } else {
        upper
    }
}

fn is_lookalike(typed: char, expected: char) -> bool {
    matches!(
        (typed, expected),
        ('0', 'O') | ('O', '0') | ('1', 'I') | ('1', 'L') | ('I', 'L') | ('L', 'I')
    )
}

/// Generate a license key that `exists` reports as unused.
///
/// Retries up to `max_attempts` times before giving up with
/// [`LicenseError::KeySpaceExhausted`].
pub fn generate_unique_license_key<F>(
    config: &LicenseKeyConfig,
    exists: F,
    max_attempts: u32,
) -> LicenseResult<String>
where
    F: Fn(&str) -> bool,
{
    for attempt in 1..=max_attempts {
        let key = generate_license_key(config);
        if !exists(&key) {
            return Ok(key);
        }
        tracing::debug!(attempt, "license key collision, regenerating");
    }

    Err(LicenseError::KeySpaceExhausted(max_attempts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_key_has_correct_format() {
        let config = LicenseKeyConfig::default();
        let key = generate_license_key(&config);

        assert!(key.starts_with("CNPRO-"));

        let parts: Vec<&str> = key.split('-').collect();
        assert_eq!(parts.len(), 5); // prefix + 4 segments

        for segment in &parts[1..] {
            assert_eq!(segment.len(), 4);
        }
    }

    #[test]
    fn generate_key_excludes_ambiguous_characters() {
        let config = LicenseKeyConfig::default();
        for _ in 0..100 {
            let key = generate_license_key(&config);

            let parts: Vec<&str> = key.split('-').collect();
            for segment in &parts[1..] {
                for ambiguous in ['0', 'O', 'I', 'L', '1'] {
                    assert!(
                        !segment.contains(ambiguous),
                        "Segment contains '{}': {}",
                        ambiguous,
                        segment
                    );
                }
            }
        }
    }

    #[test]
    fn generate_key_with_custom_config() {
        let config = LicenseKeyConfig {
            prefix: "TEST".to_string(),
            segments: 3,
            segment_length: 5,
        };
        let key = generate_license_key(&config);

        assert!(key.starts_with("TEST-"));
        let parts: Vec<&str> = key.split('-').collect();
        assert_eq!(parts.len(), 4);
        for segment in &parts[1..] {
            assert_eq!(segment.len(), 5);
        }
        assert!(validate_license_key_format(&key, &config));
    }

    #[test]
    fn validate_format_accepts_valid_key() {
        let config = LicenseKeyConfig::default();
        assert!(validate_license_key_format(
            "CNPRO-A2B3-C4D5-E6F7-G8H9",
            &config
        ));
    }

    #[test]
    fn validate_format_rejects_wrong_prefix() {
        let config = LicenseKeyConfig::default();
        assert!(!validate_license_key_format(
            "WRONG-A2B3-C4D5-E6F7-G8H9",
            &config
        ));
        assert!(!validate_license_key_format(
            "CNPROX-A2B3-C4D5-E6F7-G8H9",
            &config
        ));
    }

    #[test]
    fn validate_format_rejects_wrong_shape() {
        let config = LicenseKeyConfig::default();
        assert!(!validate_license_key_format("CNPRO-A2B3-C4D5", &config));
        assert!(!validate_license_key_format(
            "CNPRO-A2B3-C4D5-E6F7-G8H9-J2K3",
            &config
        ));
        assert!(!validate_license_key_format(
            "CNPRO-A2-C4D5-E6F7-G8H9",
            &config
        ));
    }

    #[test]
    fn validate_format_rejects_invalid_characters() {
        let config = LicenseKeyConfig::default();
        assert!(!validate_license_key_format(
            "CNPRO-AOOO-C4D5-E6F7-G8H9",
            &config
        ));
        assert!(!validate_license_key_format(
            "CNPRO-a2b3-C4D5-E6F7-G8H9",
            &config
        ));
    }

    #[test]
    fn parse_key_extracts_components() {
        let (prefix, segments) = parse_license_key("CNPRO-A2B3-C4D5-E6F7-G8H9").unwrap();
        assert_eq!(prefix, "CNPRO");
        assert_eq!(segments, vec!["A2B3", "C4D5", "E6F7", "G8H9"]);
    }

    #[test]
    fn parse_key_returns_none_for_invalid() {
        assert!(parse_license_key("INVALID").is_none());
        assert!(parse_license_key("").is_none());
        assert!(parse_license_key("-A2B3").is_none());
    }

    #[test]
    fn normalize_repairs_prefix_typos() {
        let config = LicenseKeyConfig::default();
        assert_eq!(
            normalize_license_key("  cnpro-a2b3-c4d5-e6f7-g8h9 ", &config),
            "CNPRO-A2B3-C4D5-E6F7-G8H9"
        );
        assert_eq!(
            normalize_license_key("CNPR0-A2B3-C4D5-E6F7-G8H9", &config),
            "CNPRO-A2B3-C4D5-E6F7-G8H9"
        );
        assert_eq!(
            normalize_license_key("WRONG-A2B3-C4D5-E6F7-G8H9", &config),
            "WRONG-A2B3-C4D5-E6F7-G8H9"
        );
    }

    #[test]
    fn unique_generation_skips_taken_keys() {
        let config = LicenseKeyConfig::default();
        let attempts = std::cell::Cell::new(0);
        let key = generate_unique_license_key(
            &config,
            |_| {
                attempts.set(attempts.get() + 1);
                attempts.get() < 3
            },
            5,
        )
        .unwrap();
        assert_eq!(attempts.get(), 3);
        assert!(validate_license_key_format(&key, &config));
    }

    #[test]
    fn unique_generation_gives_up() {
        let config = LicenseKeyConfig::default();
        assert!(matches!(
            generate_unique_license_key(&config, |_| true, 4),
            Err(LicenseError::KeySpaceExhausted(4))
        ));
    }

    #[test]
    fn generated_keys_are_unique() {
        let config = LicenseKeyConfig::default();
        let mut keys = std::collections::HashSet::new();

        for _ in 0..1000 {
            let key = generate_license_key(&config);
            assert!(keys.insert(key.clone()), "Duplicate key generated: {}", key);
        }
    }
}
