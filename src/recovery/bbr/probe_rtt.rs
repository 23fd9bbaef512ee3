// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! PROBE_RTT: periodically shrinks inflight down near one BDP so the
//! min-RTT filter gets an uncongested sample, then hands back to
//! PROBE_BW.

use crate::{
    recovery::bbr::model::{CongestionEvent, Model},
    time::Timestamp,
    Params,
};
use num_rational::Ratio;

#[derive(Clone, Copy, Debug, Default)]
pub struct ProbeRtt {
    exit_time: Option<Timestamp>,
}

impl ProbeRtt {
    #[inline]
    pub fn enter(&mut self) {
        self.exit_time = None;
    }

    #[inline]
    pub fn pacing_gain(&self, _params: &Params) -> Ratio<u64> {
        Ratio::new(1, 1)
    }

    #[inline]
    pub fn cwnd_gain(&self, _params: &Params) -> Ratio<u64> {
        Ratio::new(1, 1)
    }

    pub fn cwnd_upper_limit(&self, model: &Model, params: &Params) -> u64 {
        let headroom = Ratio::new(1u64, 1) - params.inflight_hi_headroom_fraction;
        let inflight_hi_with_headroom = scale_u64(model.inflight_hi(), headroom);
        let inflight_target = self.inflight_target(model, params);
        model
            .inflight_lo()
            .min(inflight_hi_with_headroom)
            .min(inflight_target)
    }

    #[inline]
    fn inflight_target(&self, model: &Model, params: &Params) -> u64 {
        model.bdp(model.max_bw(), params.probe_rtt_inflight_target_bdp_fraction)
    }

    /// Returns true once PROBE_RTT should hand control back to PROBE_BW.
    pub fn on_congestion_event(&mut self, model: &Model, params: &Params, event: &CongestionEvent) -> bool {
        let inflight_target = self.inflight_target(model, params);

        if self.exit_time.is_none()
            && (event.bytes_in_flight as u64 <= inflight_target
                || event.bytes_in_flight <= params.min_cwnd())
        {
            self.exit_time = event.event_time.map(|t| t + params.probe_rtt_duration);
        }

        match (self.exit_time, event.event_time) {
            (Some(exit), Some(now)) => now > exit,
            _ => false,
        }
    }

    pub fn on_exit_quiescence(&self, now: Timestamp) -> bool {
        matches!(self.exit_time, Some(exit) if now > exit)
    }
}

fn scale_u64(value: u64, ratio: Ratio<u64>) -> u64 {
    if *ratio.denom() == 0 {
        return value;
    }
    ((value as u128 * *ratio.numer() as u128) / *ratio.denom() as u128).min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_clears_exit_time() {
        let mut p = ProbeRtt {
            exit_time: Some(unsafe { Timestamp::from_duration(core::time::Duration::from_secs(1)) }),
        };
        p.enter();
        assert!(p.exit_time.is_none());
    }
}
