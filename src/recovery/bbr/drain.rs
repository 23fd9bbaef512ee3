// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! DRAIN: a brief inverse-gain phase that bleeds off the queue STARTUP
//! built up, exited once inflight falls back to the estimated BDP.

use crate::{
    recovery::bbr::model::{CongestionEvent, Model},
    Params,
};
use num_rational::Ratio;

#[derive(Clone, Copy, Debug, Default)]
pub struct Drain;

impl Drain {
    #[inline]
    pub fn enter(&mut self) {}

    /// The reciprocal of STARTUP's gain: the same overshoot STARTUP grew
    /// inflight by, undone at the same rate.
    #[inline]
    pub fn pacing_gain(&self, params: &Params) -> Ratio<u64> {
        Ratio::new(*params.startup_gain.denom(), *params.startup_gain.numer())
    }

    #[inline]
    pub fn cwnd_gain(&self, params: &Params) -> Ratio<u64> {
        params.startup_gain
    }

    #[inline]
    pub fn cwnd_upper_limit(&self, model: &Model) -> u64 {
        model.inflight_lo()
    }

    /// Returns true once inflight has drained back down to the BDP, i.e.
    /// once DRAIN should hand off to PROBE_BW.
    pub fn on_congestion_event(&mut self, model: &Model, params: &Params, event: &CongestionEvent) -> bool {
        let drain_target = model
            .bdp(model.max_bw(), Ratio::new(1, 1))
            .max(params.min_cwnd() as u64);
        event.bytes_in_flight as u64 <= drain_target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacing_gain_is_reciprocal_of_startup_gain() {
        let params = Params::default();
        let drain = Drain::default();
        let gain = drain.pacing_gain(&params);
        assert_eq!(
            gain,
            Ratio::new(*params.startup_gain.denom(), *params.startup_gain.numer())
        );
    }
}
