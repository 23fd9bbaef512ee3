// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tracks bytes acked above what the max-bandwidth estimate would predict,
//! within a rolling "aggregation epoch" — a receiver that batches acks
//! (delayed ACK, GRO, etc.) delivers bursts that look like extra
//! bandwidth unless this burstiness is subtracted back out when sizing
//! the congestion window.

use crate::{recovery::windowed_filter::WindowedMaxFilter, time::Timestamp, BitRate};
use num_rational::Ratio;

#[derive(Debug)]
struct Epoch {
    start_time: Timestamp,
    bytes_acked: u64,
}

#[derive(Debug)]
pub struct MaxAckHeightTracker {
    filter: WindowedMaxFilter<u64, u64>,
    threshold: Ratio<u64>,
    epoch: Option<Epoch>,
    epoch_count: u64,
}

impl MaxAckHeightTracker {
    /// `window_rounds`: the sliding window, in round-trip counts, over which
    /// the windowed-max filter retains its best/2nd/3rd best samples.
    pub fn new(window_rounds: u64, threshold: Ratio<u64>) -> Self {
        Self {
            filter: WindowedMaxFilter::new(window_rounds),
            threshold,
            epoch: None,
            epoch_count: 0,
        }
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.filter.get().unwrap_or(0)
    }

    /// The number of aggregation epochs opened so far, including the
    /// current one. Bursts that arrive within threshold of an ongoing
    /// epoch's expectation merge into it rather than starting a new one.
    #[inline]
    pub fn epoch_count(&self) -> u64 {
        self.epoch_count
    }

    pub fn reset(&mut self) {
        self.epoch = None;
    }

    fn open_epoch(&mut self, ack_time: Timestamp, bytes_acked: u64) {
        self.epoch = Some(Epoch {
            start_time: ack_time,
            bytes_acked,
        });
        self.epoch_count += 1;
    }

    /// Folds one ack into the current aggregation epoch and returns the
    /// bytes acked in this epoch above what `bw` would predict.
    pub fn update(&mut self, bw: BitRate, round: u64, ack_time: Timestamp, bytes_acked: u64) -> u64 {
        if self.epoch.is_none() {
            self.open_epoch(ack_time, bytes_acked);
            return 0;
        }

        let epoch = self.epoch.as_ref().unwrap();
        let elapsed = crate::time::TimeDelta::between(ack_time, epoch.start_time);
        let expected = expected_bytes(bw, elapsed);

        // Quiet check against the epoch's accumulation *before* folding in
        // this ack: a burst that's gone quiet relative to bw closes out and
        // a new epoch opens, seeded with this ack's bytes.
        if epoch.bytes_acked <= scale(self.threshold, expected) {
            self.open_epoch(ack_time, bytes_acked);
            return 0;
        }

        let epoch = self.epoch.as_mut().unwrap();
        epoch.bytes_acked = epoch.bytes_acked.saturating_add(bytes_acked);
        let extra = epoch.bytes_acked.saturating_sub(expected);
        self.filter.update(extra, round);
        extra
    }
}

/// `bw` applied over `elapsed`, in bytes. An invalid bandwidth or a
/// non-positive elapsed time predicts zero bytes.
fn expected_bytes(bw: BitRate, elapsed: crate::time::TimeDelta) -> u64 {
    let bps = bw.as_bits_per_second().unwrap_or(0) as u128;
    let us = elapsed.as_micros().unwrap_or(0).max(0) as u128;
    ((bps * us) / 8_000_000).min(u64::MAX as u128) as u64
}

fn scale(ratio: Ratio<u64>, value: u64) -> u64 {
    if *ratio.denom() == 0 {
        return value;
    }
    ((value as u128 * *ratio.numer() as u128) / *ratio.denom() as u128).min(u64::MAX as u128) as u64
}
