// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tracks the max bandwidth sample across the last one to two rounds.
//! Simpler than the general windowed-max filter: only ever two slots,
//! advanced explicitly by the mode state machine at round boundaries
//! rather than aged out by elapsed time.

use crate::BitRate;

#[derive(Clone, Copy, Debug)]
pub struct Filter {
    /// `[0]` is the previous round's max, `[1]` is the current round's.
    max_bw: [BitRate; 2],
}

impl Default for Filter {
    /// Both slots start at `BitRate::ZERO`, not `BitRate::default()`
    /// (`Invalid`) — an unset filter must compare as "no bandwidth yet",
    /// not as incomparable, since `Model::estimated_bw` mins it against
    /// `bw_lo` unconditionally.
    fn default() -> Self {
        Self {
            max_bw: [BitRate::ZERO; 2],
        }
    }
}

impl Filter {
    pub fn update(&mut self, sample: BitRate) {
        self.max_bw[1] = self.max_bw[1].max(sample);
    }

    /// Shifts the current round into the previous-round slot and starts a
    /// fresh current-round accumulation, unless the current round never
    /// saw a sample.
    pub fn advance(&mut self) {
        if self.max_bw[1] > BitRate::ZERO {
            self.max_bw[0] = self.max_bw[1];
            self.max_bw[1] = BitRate::ZERO;
        }
    }

    #[inline]
    pub fn get(&self) -> BitRate {
        self.max_bw[0].max(self.max_bw[1])
    }
}
