// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Smallest observed RTT, with the timestamp it was observed at so the
//! controller can force a re-probe once the estimate goes stale.

use crate::time::{TimeDelta, Timestamp};

#[derive(Clone, Copy, Debug, Default)]
pub struct Filter {
    min_rtt: TimeDelta,
    timestamp: Option<Timestamp>,
}

impl Filter {
    #[inline]
    pub fn get(&self) -> TimeDelta {
        self.min_rtt
    }

    #[inline]
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    /// Replaces the estimate only if `sample` is smaller than the current
    /// one, or none has been recorded yet.
    pub fn update(&mut self, sample: TimeDelta, at: Timestamp) {
        if self.timestamp.is_none() || sample < self.min_rtt {
            self.force_update(sample, at);
        }
    }

    /// Unconditionally replaces the estimate, used at window expiry.
    #[inline]
    pub fn force_update(&mut self, sample: TimeDelta, at: Timestamp) {
        self.min_rtt = sample;
        self.timestamp = Some(at);
    }
}
