// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//= https://tools.ietf.org/id/draft-cardwell-iccrg-bbr-congestion-control-02#4.5.1
//# Several aspects of the BBR algorithm depend on counting the progress of "packet-timed" round
//# trips, which start at the transmission of some segment, and then end at the acknowledgement
//# of that segment. BBR.round_count is a count of the number of these "packet-timed" round trips
//# elapsed so far.
//
// Declared from sequence numbers rather than delivered-byte totals: a
// round ends when the packet that was the most recently sent one at the
// start of the round is acknowledged.
#[derive(Clone, Debug, Default)]
pub struct Counter {
    last_sent: u64,
    end_of_round_trip: u64,
    count: u64,
}

impl Counter {
    /// The number of rounds counted since initialization
    #[inline]
    pub fn round_count(&self) -> u64 {
        self.count
    }

    #[inline]
    pub fn on_pkt_sent(&mut self, seq: u64) {
        self.last_sent = seq;
    }

    /// Returns true exactly when `seq` closes out the round that was open
    /// when it was sent.
    #[inline]
    pub fn on_pkt_acked(&mut self, seq: u64) -> bool {
        if seq > self.end_of_round_trip {
            self.count += 1;
            self.end_of_round_trip = self.last_sent;
            true
        } else {
            false
        }
    }

    /// Resets round-trip tracking without incrementing the round count,
    /// used when a mode transition wants a fresh round boundary (e.g.
    /// entering PROBE_BW's DOWN phase).
    #[inline]
    pub fn restart(&mut self) {
        self.end_of_round_trip = self.last_sent;
    }
}
