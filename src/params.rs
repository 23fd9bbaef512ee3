// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tunable parameters for the BBRv2 engine.
//!
//! The teacher threads these as free constants through `bbr.rs` and its
//! submodules (`BETA`, `LOSS_THRESH`, `HEADROOM`, ...); here they're
//! collected into data so the engine can be configured without
//! recompiling. Reading them from a file or CLI is explicitly out of
//! scope — only the values themselves are.

use core::time::Duration;
use num_rational::Ratio;

/// BBRv2 tunables. Construct with [`Params::default`] and override fields
/// as needed; all fields are `pub` since this is a plain configuration
/// value, not an invariant-carrying type.
#[derive(Clone, Debug)]
pub struct Params {
    /// Fraction the lower bounds (`bw_lo`, `inflight_lo`) are cut to on
    /// loss at the end of a round, when they aren't already below the
    /// latest observed sample.
    pub beta: Ratio<u64>,
    /// When true, `inflight_lo` is never adapted on loss.
    pub ignore_inflight_lo: bool,
    /// STARTUP: the bandwidth growth factor, round over round, below
    /// which the pipe is considered full.
    pub startup_full_bw_threshold: Ratio<u64>,
    /// STARTUP: number of consecutive rounds without growth before
    /// declaring the pipe full.
    pub startup_full_bw_rounds: u32,
    /// STARTUP: number of loss events within the round before considering
    /// exiting STARTUP due to excessive loss.
    pub startup_full_loss_count: u32,
    /// PROBE_BW: number of loss events within the round before
    /// `maybe_adapt_upper_bounds` considers the inflight too high.
    pub probe_bw_full_loss_count: u32,
    /// Fraction of inflight-at-send that bytes lost in a round may exceed
    /// before `is_inflight_too_high` is true.
    pub loss_threshold: Ratio<u64>,
    /// STARTUP/DRAIN cwnd and pacing gain magnitude (DRAIN uses the
    /// reciprocal for pacing).
    pub startup_gain: Ratio<u64>,
    pub probe_bw_cwnd_gain: Ratio<u64>,
    pub probe_bw_probe_inflight_gain: Ratio<u64>,
    pub probe_bw_pacing_gain_up: Ratio<u64>,
    pub probe_bw_pacing_gain_down: Ratio<u64>,
    pub probe_bw_pacing_gain_default: Ratio<u64>,
    /// Upper bound (exclusive) of the random number of rounds to wait
    /// before considering a new bandwidth probe.
    pub bw_probe_rand_rounds: u32,
    pub bw_probe_base: Duration,
    pub bw_probe_rand: Duration,
    /// Extra headroom given to `inflight_hi` before it's treated as a
    /// binding constraint.
    pub inflight_hi_headroom_fraction: Ratio<u64>,
    /// Window after which the min-RTT filter is force-expired.
    pub min_rtt_win: Duration,
    /// Maximum segment size, in bytes.
    pub mss: u32,
    pub probe_bw_probe_max_rounds: u32,
    pub probe_bw_probe_reno_gain: Ratio<u64>,
    pub probe_rtt_duration: Duration,
    pub probe_rtt_inflight_target_bdp_fraction: Ratio<u64>,
    /// Threshold the max-ack-height tracker's aggregation epoch must
    /// exceed (as a multiple of the expected delivery) before it's
    /// considered "still the same burst." Design Notes §9(b): 2.0 in
    /// the general case, 1.8 in some test derivations — exposed here as
    /// a plain field rather than two constants.
    pub max_ack_height_threshold: Ratio<u64>,
}

impl Params {
    /// `4 × MSS`, the floor below which cwnd never drops.
    #[inline]
    pub fn min_cwnd(&self) -> u32 {
        4 * self.mss
    }

    /// `10 × MSS`, matching RFC 9002's recommended initial window.
    #[inline]
    pub fn initial_cwnd(&self) -> u32 {
        (10 * self.mss).max(self.min_cwnd())
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            beta: Ratio::new(3, 10),
            ignore_inflight_lo: false,
            startup_full_bw_threshold: Ratio::new(5, 4),
            startup_full_bw_rounds: 3,
            startup_full_loss_count: 8,
            probe_bw_full_loss_count: 2,
            loss_threshold: Ratio::new(1, 50),
            startup_gain: Ratio::new(577, 200), // 2.885
            probe_bw_cwnd_gain: Ratio::new(2, 1),
            probe_bw_probe_inflight_gain: Ratio::new(5, 4),
            probe_bw_pacing_gain_up: Ratio::new(5, 4),
            probe_bw_pacing_gain_down: Ratio::new(3, 4),
            probe_bw_pacing_gain_default: Ratio::new(1, 1),
            bw_probe_rand_rounds: 2,
            bw_probe_base: Duration::from_secs(2),
            bw_probe_rand: Duration::from_secs(1),
            inflight_hi_headroom_fraction: Ratio::new(1, 100),
            min_rtt_win: Duration::from_secs(10),
            mss: 1460,
            probe_bw_probe_max_rounds: 63,
            probe_bw_probe_reno_gain: Ratio::new(1, 1),
            probe_rtt_duration: Duration::from_millis(200),
            probe_rtt_inflight_target_bdp_fraction: Ratio::new(1, 2),
            max_ack_height_threshold: Ratio::new(2, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let p = Params::default();
        assert_eq!(p.min_cwnd(), 4 * 1460);
        assert_eq!(*p.beta.numer(), 3);
        assert_eq!(*p.beta.denom(), 10);
        assert_eq!(*p.loss_threshold.numer(), 1);
        assert_eq!(*p.loss_threshold.denom(), 50);
    }
}
