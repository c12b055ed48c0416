//! Key Validator Module
//!
//! Checks keys against the addressing rules of the backing store.
//! Validation is advisory by default: a warning is logged and the
//! operation proceeds. Strict mode turns the warning into an error.

use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::cache::MAX_KEY_LENGTH;
use crate::error::{CacheError, Result};
use crate::store::Addressing;

// == Key Warning ==
/// Reason a key is unsuitable for the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyWarning {
    /// Collection-style: matches `__.*__`
    ReservedName(String),
    /// Collection-style: consists only of periods
    DotsOnly(String),
    /// Collection-style: contains `/`
    ForwardSlash(String),
    /// Tree-style: contains one of `. $ # [ ] /` or an ASCII control character
    ForbiddenCharacter { key: String, ch: char },
    /// Longer than [`MAX_KEY_LENGTH`] characters
    TooLong { key: String, len: usize },
    /// Contains whitespace or control characters
    ControlCharacter(String),
}

impl fmt::Display for KeyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyWarning::ReservedName(key) => write!(
                f,
                "collection keys cannot match the pattern __.*__: {:?}",
                key
            ),
            KeyWarning::DotsOnly(key) => write!(
                f,
                "collection keys cannot consist solely of periods: {:?}",
                key
            ),
            KeyWarning::ForwardSlash(key) => {
                write!(f, "collection keys cannot contain a forward slash (/): {:?}", key)
            }
            KeyWarning::ForbiddenCharacter { key, ch } => write!(
                f,
                "tree keys cannot contain {:?} (forbidden: . $ # [ ] / and ASCII control characters): {:?}",
                ch, key
            ),
            KeyWarning::TooLong { key, len } => write!(
                f,
                "key is {} characters, longer than the {} character limit: {:?}",
                len, MAX_KEY_LENGTH, key
            ),
            KeyWarning::ControlCharacter(key) => {
                write!(f, "key contains whitespace or control characters: {:?}", key)
            }
        }
    }
}

// == Validation Mode ==
/// What happens when a key fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyValidationMode {
    /// Log a warning and continue
    #[default]
    Warn,
    /// Fail the operation with [`CacheError::InvalidKey`]
    Strict,
}

impl FromStr for KeyValidationMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(KeyValidationMode::Warn),
            "strict" => Ok(KeyValidationMode::Strict),
            other => Err(CacheError::Config(format!("unknown key validation mode: {}", other))),
        }
    }
}

// == Key Validator ==
#[derive(Debug, Clone, Copy)]
pub struct KeyValidator {
    addressing: Addressing,
    mode: KeyValidationMode,
}

impl KeyValidator {
    pub fn new(addressing: Addressing, mode: KeyValidationMode) -> Self {
        Self { addressing, mode }
    }

    pub fn mode(&self) -> KeyValidationMode {
        self.mode
    }

    // == Check ==
    /// Returns the first rule `key` violates, store rules before generic ones.
    pub fn check(&self, key: &str) -> Option<KeyWarning> {
        let store_rule = match self.addressing {
            Addressing::Collection => check_collection(key),
            Addressing::Tree { .. } => check_tree(key),
        };
        store_rule.or_else(|| check_generic(key))
    }

    // == Validate ==
    /// Applies the active mode to the outcome of [`KeyValidator::check`].
    ///
    /// In warn mode the warning is logged and returned; in strict mode it
    /// becomes an error.
    pub fn validate(&self, key: &str) -> Result<Option<KeyWarning>> {
        match self.check(key) {
            None => Ok(None),
            Some(warning) => match self.mode {
                KeyValidationMode::Warn => {
                    warn!(key = %key, "cache key warning: {}", warning);
                    Ok(Some(warning))
                }
                KeyValidationMode::Strict => Err(CacheError::InvalidKey(warning)),
            },
        }
    }
}

fn check_collection(key: &str) -> Option<KeyWarning> {
    if key.len() >= 4 && key.starts_with("__") && key.ends_with("__") {
        Some(KeyWarning::ReservedName(key.to_string()))
    } else if !key.is_empty() && key.chars().all(|c| c == '.') {
        Some(KeyWarning::DotsOnly(key.to_string()))
    } else if key.contains('/') {
        Some(KeyWarning::ForwardSlash(key.to_string()))
    } else {
        None
    }
}

fn check_tree(key: &str) -> Option<KeyWarning> {
    key.chars()
        .find(|c| matches!(c, '.' | '$' | '#' | '[' | ']' | '/') || c.is_ascii_control())
        .map(|ch| KeyWarning::ForbiddenCharacter {
            key: key.to_string(),
            ch,
        })
}

fn check_generic(key: &str) -> Option<KeyWarning> {
    let len = key.chars().count();
    if len > MAX_KEY_LENGTH {
        return Some(KeyWarning::TooLong {
            key: key.to_string(),
            len,
        });
    }
    if key.chars().any(|c| (c as u32) < 33 || c as u32 == 127) {
        return Some(KeyWarning::ControlCharacter(key.to_string()));
    }
    None
}
