//! Cache Module
//!
//! TTL cache semantics over a record store: serialization, key validation,
//! lazy expiry and the [`DocumentCache`] façade tying them together.

pub mod backend;
pub mod expiry;
mod facade;
mod serializer;
mod validator;


// Re-export public types
pub use backend::{
    backend_timeout, default_key_function, identity_key_function, CacheBackend, KeyFunction, Timeout,
};
pub use expiry::{Clock, ManualClock, SystemClock};
pub use facade::{AddMode, CacheOptions, DocumentCache};
pub use serializer::{Protocol, Serializer, FORMAT_VERSION};
pub use validator::{KeyValidationMode, KeyValidator, KeyWarning};

// == Public Constants ==
/// Keys longer than this many characters draw a warning
pub const MAX_KEY_LENGTH: usize = 250;

/// Default entry lifetime in seconds
pub const DEFAULT_TIMEOUT_SECS: i64 = 300;
