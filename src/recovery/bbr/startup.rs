// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! STARTUP: the initial exponential-growth phase, exited once bandwidth
//! stops growing round over round or losses indicate the pipe is full.

use crate::{
    recovery::bbr::model::{CongestionEvent, Model},
    BitRate, Params,
};
use num_rational::Ratio;

#[derive(Clone, Debug)]
pub struct Startup {
    full_bw_baseline: BitRate,
    rounds_without_growth: u32,
    pub full_bw_reached: bool,
}

impl Default for Startup {
    fn default() -> Self {
        Self {
            full_bw_baseline: BitRate::ZERO,
            rounds_without_growth: 0,
            full_bw_reached: false,
        }
    }
}

impl Startup {
    #[inline]
    pub fn pacing_gain(&self, params: &Params) -> Ratio<u64> {
        params.startup_gain
    }

    #[inline]
    pub fn cwnd_gain(&self, params: &Params) -> Ratio<u64> {
        params.startup_gain
    }

    /// Returns true once the pipe is judged full, i.e. once STARTUP should
    /// hand off to DRAIN.
    pub fn on_congestion_event(
        &mut self,
        model: &mut Model,
        params: &Params,
        event: &CongestionEvent,
    ) -> bool {
        if self.full_bw_reached {
            return true;
        }

        if event.end_of_round_trip {
            self.check_full_bw_reached(model, params, event);
            self.check_excessive_losses(model, params, event);
        }

        self.full_bw_reached
    }

    fn check_full_bw_reached(&mut self, model: &Model, params: &Params, event: &CongestionEvent) {
        if event.last_sample_is_app_limited {
            return;
        }

        let threshold = self.full_bw_baseline * params.startup_full_bw_threshold;
        if model.max_bw() >= threshold {
            self.full_bw_baseline = model.max_bw();
            self.rounds_without_growth = 0;
            return;
        }

        self.rounds_without_growth += 1;
        if self.rounds_without_growth >= params.startup_full_bw_rounds {
            self.full_bw_reached = true;
        }
    }

    fn check_excessive_losses(&mut self, model: &mut Model, params: &Params, event: &CongestionEvent) {
        if self.full_bw_reached {
            return;
        }

        if model.loss_events_in_round() >= params.startup_full_loss_count
            && model.is_inflight_too_high(event, params)
        {
            model.set_inflight_hi(model.bdp(model.max_bw(), Ratio::new(1, 1)));
            self.full_bw_reached = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_not_reached() {
        let s = Startup::default();
        assert!(!s.full_bw_reached);
    }
}
