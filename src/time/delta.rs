// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A signed microsecond duration carrying explicit invalid/infinite sentinels.
//!
//! Unlike [`crate::time::Timestamp`], whose "unset" state is naturally
//! `Option<Timestamp>`, `TimeDelta` values are compared and arithmetic'd
//! against +infinity in the middle of a computation (e.g. a send-rate
//! sample becomes `+∞` directly when the sending interval collapses to
//! zero), so a dedicated sum type is used instead of wrapping every call
//! site in `Option`.

use crate::time::Timestamp;
use core::{cmp::Ordering, time::Duration};

#[derive(Clone, Copy, Debug)]
pub enum TimeDelta {
    /// The delta could not be computed (e.g. a sample derived from a
    /// missing send record).
    Invalid,
    /// A concrete signed microsecond delta.
    Finite(i64),
    /// A delta larger than can be meaningfully represented, e.g. the
    /// min-RTT filter before any sample has arrived.
    Infinite,
}

impl TimeDelta {
    pub const ZERO: Self = Self::Finite(0);

    #[inline]
    pub fn from_duration(d: Duration) -> Self {
        Self::Finite(d.as_micros().min(i64::MAX as u128) as i64)
    }

    /// The signed delta `later - earlier`, saturating rather than panicking
    /// when the clock appears to run backwards.
    #[inline]
    pub fn between(later: Timestamp, earlier: Timestamp) -> Self {
        if later >= earlier {
            Self::from_duration(later - earlier)
        } else {
            Self::from_duration(earlier - later).negate()
        }
    }

    #[inline]
    pub fn negate(self) -> Self {
        match self {
            Self::Finite(v) => Self::Finite(-v),
            other => other,
        }
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        !matches!(self, Self::Invalid)
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        matches!(self, Self::Finite(v) if v > 0) || matches!(self, Self::Infinite)
    }

    #[inline]
    pub fn as_micros(self) -> Option<i64> {
        match self {
            Self::Finite(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            Self::Finite(v) if v >= 0 => Some(Duration::from_micros(v as u64)),
            _ => None,
        }
    }

    #[inline]
    pub fn max(self, other: Self) -> Self {
        match self.partial_cmp(&other) {
            Some(Ordering::Less) => other,
            Some(_) => self,
            None => other, // prefer the comparable value when one side is Invalid
        }
    }

    #[inline]
    pub fn min(self, other: Self) -> Self {
        match self.partial_cmp(&other) {
            Some(Ordering::Greater) => other,
            Some(_) => self,
            None => other,
        }
    }
}

impl Default for TimeDelta {
    fn default() -> Self {
        Self::Invalid
    }
}

impl PartialEq for TimeDelta {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.partial_cmp(other), Some(Ordering::Equal))
    }
}

impl PartialOrd for TimeDelta {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Invalid, _) | (_, Self::Invalid) => None,
            (Self::Infinite, Self::Infinite) => Some(Ordering::Equal),
            (Self::Infinite, Self::Finite(_)) => Some(Ordering::Greater),
            (Self::Finite(_), Self::Infinite) => Some(Ordering::Less),
            (Self::Finite(a), Self::Finite(b)) => a.partial_cmp(b),
        }
    }
}

impl core::ops::Mul<u32> for TimeDelta {
    type Output = TimeDelta;

    fn mul(self, rhs: u32) -> Self::Output {
        match self {
            Self::Finite(v) => Self::Finite(v.saturating_mul(rhs as i64)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering() {
        assert!(TimeDelta::Infinite > TimeDelta::Finite(1_000_000));
        assert!(TimeDelta::Finite(1) > TimeDelta::Finite(0));
        assert_eq!(TimeDelta::Invalid.partial_cmp(&TimeDelta::ZERO), None);
    }

    #[test]
    fn between_handles_backwards_clock() {
        let t0 = unsafe { Timestamp::from_duration(Duration::from_micros(100)) };
        let t1 = unsafe { Timestamp::from_duration(Duration::from_micros(50)) };
        assert_eq!(TimeDelta::between(t1, t0), TimeDelta::Finite(-50));
        assert_eq!(TimeDelta::between(t0, t1), TimeDelta::Finite(50));
    }

    #[test]
    fn min_max_prefer_valid() {
        assert_eq!(
            TimeDelta::Invalid.max(TimeDelta::Finite(5)),
            TimeDelta::Finite(5)
        );
        assert_eq!(TimeDelta::Finite(5).max(TimeDelta::Finite(9)), TimeDelta::Finite(9));
    }
}
