use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Wall-clock version token: seconds since the UNIX epoch.
///
/// Every log append is stamped with one; callers pass them back to read a
/// key as it was at that moment. Ordering is total (`f64::total_cmp`), and
/// constructors reject NaN and infinities so the order agrees with `<`.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    /// Create a timestamp from seconds since the epoch.
    pub fn from_secs(secs: f64) -> Result<Self, TypeError> {
        if secs.is_finite() {
            Ok(Self(secs))
        } else {
            Err(TypeError::InvalidTimestamp(secs.to_string()))
        }
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Self(secs)
    }

    /// The zero timestamp (epoch).
    pub const fn zero() -> Self {
        Self(0.0)
    }

    pub fn as_secs(&self) -> f64 {
        self.0
    }

    /// The smallest timestamp strictly greater than this one.
    pub fn next_after(&self) -> Self {
        if self.0 <= 0.0 {
            return Self(f64::from_bits(1));
        }
        Self(f64::from_bits(self.0.to_bits() + 1))
    }

    /// Shift by a number of seconds.
    pub fn offset(&self, secs: f64) -> Self {
        Self(self.0 + secs)
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({:.6})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}
