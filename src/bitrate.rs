// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Bits-per-second rate with invalid/infinite sentinels.
//!
//! Grounded on `s2n-quic-core::recovery::bandwidth::Bandwidth` (a plain
//! bits-per-second newtype), extended with the `Invalid`/`Infinite` arms
//! spec.md §3 requires — a sampled send-rate becomes `+∞` directly when
//! the sampling interval collapses to zero or goes negative.

use crate::time::TimeDelta;
use core::cmp::Ordering;
use num_rational::Ratio;

#[derive(Clone, Copy, Debug)]
pub enum BitRate {
    Invalid,
    Finite(u64),
    Infinite,
}

impl BitRate {
    pub const ZERO: Self = Self::Finite(0);

    /// `bytes / interval`, per spec.md §3's "bytes / duration → rate".
    ///
    /// A non-positive interval produces `+∞`, matching the bandwidth
    /// sampler's `send_rate` computation in spec.md §4.C step 5.
    #[inline]
    pub fn from_bytes_and_interval(bytes: u64, interval: TimeDelta) -> Self {
        match interval {
            TimeDelta::Invalid => Self::Invalid,
            TimeDelta::Infinite => Self::ZERO,
            TimeDelta::Finite(us) if us <= 0 => Self::Infinite,
            TimeDelta::Finite(us) => {
                let bits_per_sec = (bytes as u128 * 8_000_000) / us as u128;
                Self::Finite(bits_per_sec.min(u64::MAX as u128) as u64)
            }
        }
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        !matches!(self, Self::Invalid)
    }

    #[inline]
    pub fn as_bits_per_second(self) -> Option<u64> {
        match self {
            Self::Finite(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn max(self, other: Self) -> Self {
        match self.partial_cmp(&other) {
            Some(Ordering::Less) => other,
            Some(_) => self,
            None => other,
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

    /// The bandwidth-delay product in bytes: `self × (rtt × gain)`.
    ///
    /// Returns `u64::MAX` (effectively "unconstrained") while either side
    /// of the product is not yet known finite, matching real BBR
    /// behavior before the first min-RTT sample has arrived.
    #[inline]
    pub fn bdp_bytes(self, rtt: TimeDelta, gain: Ratio<u64>) -> u64 {
        match (self, rtt) {
            (Self::Finite(bps), TimeDelta::Finite(us)) if us > 0 && *gain.denom() > 0 => {
                let bytes = (bps as u128 * us as u128 * *gain.numer() as u128)
                    / (8_000_000u128 * *gain.denom() as u128);
                bytes.min(u64::MAX as u128) as u64
            }
            _ => u64::MAX,
        }
    }
}

impl Default for BitRate {
    fn default() -> Self {
        Self::Invalid
    }
}

impl PartialEq for BitRate {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.partial_cmp(other), Some(Ordering::Equal))
    }
}

impl PartialOrd for BitRate {
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

impl core::ops::Mul<Ratio<u64>> for BitRate {
    type Output = BitRate;

    fn mul(self, rhs: Ratio<u64>) -> Self::Output {
        match self {
            Self::Finite(bps) if *rhs.denom() > 0 => {
                let scaled = (bps as u128 * *rhs.numer() as u128) / *rhs.denom() as u128;
                Self::Finite(scaled.min(u64::MAX as u128) as u64)
            }
            other => other,
        }
    }
}
