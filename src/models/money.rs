use std::fmt;

use serde::{Deserialize, Serialize};

/// Minor units per major currency unit (paise per rupee).
pub const MINOR_PER_MAJOR: i64 = 100;

/// A monetary amount in integer minor units.
///
/// Stored as `BIGINT` and serialized as a plain integer so no amount ever
/// passes through floating point.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Money(i64);

impl Money {
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn from_major(major: i64) -> Self {
        Self(major * MINOR_PER_MAJOR)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Scales the amount by `numerator / denominator`, rounding up to the
    /// next minor unit. Returns `None` on overflow.
    pub fn scale_ceil(self, numerator: i64, denominator: i64) -> Option<Self> {
        let scaled = self.0.checked_mul(numerator)?;
        let rounded = scaled.checked_add(denominator - 1)? / denominator;
        Some(Self(rounded))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_PER_MAJOR.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / per, abs % per)
    }
}
