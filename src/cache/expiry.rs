//! Expiry Policy Module
//!
//! Converts relative timeouts into absolute expiry instants and evaluates
//! liveness. Expiry is lazy: nothing sweeps the store, readers compare the
//! stored instant against the current time.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

// == Constants ==
/// Unix seconds of 9999-12-31T23:59:59Z, the largest instant both
/// Firestore timestamps and the sentinel representation can carry.
pub const NEVER_EXPIRES_SECS: i64 = 253_402_300_799;

// == Sentinel ==
/// Returns the sentinel instant stored for records that never expire.
pub fn never() -> DateTime<Utc> {
    DateTime::from_timestamp(NEVER_EXPIRES_SECS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// The Unix epoch, read back for records whose expiry is missing or unreadable.
pub fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(0, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Returns true if `expires_at` is the no-expiry sentinel.
pub fn is_never(expires_at: DateTime<Utc>) -> bool {
    expires_at.timestamp() >= NEVER_EXPIRES_SECS
}

// == To Absolute ==
/// Converts a normalized timeout into an absolute expiry instant.
///
/// `None` maps to the sentinel. Otherwise the result is `now + timeout`,
/// truncated to whole seconds so values survive store round-trips unchanged.
///
/// # Arguments
/// * `timeout_secs` - Seconds from `now`, or `None` for no expiry
/// * `now` - The reference instant
pub fn to_absolute(timeout_secs: Option<i64>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(timeout) = timeout_secs else {
        return never();
    };

    let secs = now.timestamp().saturating_add(timeout);
    if secs >= NEVER_EXPIRES_SECS {
        return never();
    }

    // Large negative timeouts floor at the epoch so stores can still encode them.
    DateTime::from_timestamp(secs.max(0), 0).unwrap_or_else(epoch)
}

// == Is Live ==
/// A record is live while its expiry instant has not passed.
///
/// Boundary condition: a record expiring exactly at `now` is still live.
pub fn is_live(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at >= now
}

// == Clock ==
/// Source of the current time for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock with whole-second resolution.
///
/// Used to simulate the passage of time without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    secs: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `start` (sub-second precision dropped).
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            secs: AtomicI64::new(start.timestamp()),
        }
    }

    /// Moves the clock forward by `secs` seconds.
    pub fn advance(&self, secs: i64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }

    /// Jumps the clock to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        self.secs.store(instant.timestamp(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.secs.load(Ordering::SeqCst), 0)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
