// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! PROBE_BW: the steady-state mode, cycling DOWN -> CRUISE -> REFILL ->
//! UP to continually re-probe for more bandwidth while bounding how much
//! the probe is allowed to queue.

use crate::{
    random::Generator,
    recovery::bbr::model::{CongestionEvent, Model},
    time::{TimeDelta, Timestamp},
    Params,
};
use num_rational::Ratio;
use num_traits::One;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Up,
    Down,
    Cruise,
    Refill,
}

#[derive(Clone, Debug)]
pub struct ProbeBw {
    phase: Phase,
    cycle_start: Option<Timestamp>,
    probe_wait_time: TimeDelta,
    rounds_since_probe: u32,
    rounds_in_phase: u32,
    opened_cycle_this_event: bool,

    last_cycle_probed_too_high: bool,
    last_cycle_stopped_risky_probe: bool,
    is_sample_from_probing: bool,
    has_advanced_max_bw: bool,

    probe_up_rounds: u32,
    probe_up_bytes: u64,
    probe_up_acked: u64,
}

impl Default for ProbeBw {
    fn default() -> Self {
        Self {
            phase: Phase::Down,
            cycle_start: None,
            probe_wait_time: TimeDelta::ZERO,
            rounds_since_probe: 0,
            rounds_in_phase: 0,
            opened_cycle_this_event: false,
            last_cycle_probed_too_high: false,
            last_cycle_stopped_risky_probe: false,
            is_sample_from_probing: false,
            has_advanced_max_bw: false,
            probe_up_rounds: 0,
            probe_up_bytes: u64::MAX,
            probe_up_acked: 0,
        }
    }
}

enum AdaptOutcome {
    Ok,
    ProbedTooHigh,
    InflightHighNotSet,
    InvalidSample,
}

impl ProbeBw {
    #[inline]
    pub fn is_probing(&self) -> bool {
        matches!(self.phase, Phase::Up | Phase::Refill)
    }

    #[inline]
    pub fn cwnd_upper_limit(&self, _model: &Model, _params: &Params) -> u64 {
        u64::MAX
    }

    #[inline]
    pub fn pacing_gain(&self, params: &Params) -> Ratio<u64> {
        match self.phase {
            Phase::Up => params.probe_bw_pacing_gain_up,
            Phase::Down => params.probe_bw_pacing_gain_down,
            Phase::Cruise | Phase::Refill => params.probe_bw_pacing_gain_default,
        }
    }

    #[inline]
    pub fn cwnd_gain(&self, params: &Params) -> Ratio<u64> {
        params.probe_bw_cwnd_gain
    }

    pub fn enter(&mut self, model: &mut Model, params: &Params, rng: &mut dyn Generator, t: Timestamp) {
        self.enter_probe_down(model, params, rng, t, false, false);
    }

    fn enter_probe_down(
        &mut self,
        model: &mut Model,
        params: &Params,
        rng: &mut dyn Generator,
        t: Timestamp,
        probed_too_high: bool,
        stopped_risky: bool,
    ) {
        self.last_cycle_probed_too_high = probed_too_high;
        self.last_cycle_stopped_risky_probe = stopped_risky;

        self.phase = Phase::Down;
        self.rounds_in_phase = 0;
        self.is_sample_from_probing = false;
        self.has_advanced_max_bw = false;
        self.opened_cycle_this_event = true;
        self.cycle_start = Some(t);

        self.rounds_since_probe = rng.gen_range_u32(params.bw_probe_rand_rounds.max(1));
        let rand_bound = params.bw_probe_rand.as_micros().min(u32::MAX as u128) as u32;
        let rand_us = rng.gen_range_u32(rand_bound);
        self.probe_wait_time =
            TimeDelta::from_duration(params.bw_probe_base) + TimeDelta::Finite(rand_us as i64);

        model.restart_round();
    }

    fn exit_probe_down(&mut self, model: &mut Model) {
        if !self.has_advanced_max_bw {
            model.advance_max_bw_filter();
            self.has_advanced_max_bw = true;
        }
    }

    fn enter_probe_cruise(&mut self, model: &mut Model) {
        if self.phase == Phase::Down {
            self.exit_probe_down(model);
        }
        self.phase = Phase::Cruise;
        self.rounds_in_phase = 0;
        if model.inflight_lo() > model.inflight_hi() {
            model.set_inflight_lo(model.inflight_hi());
        }
    }

    fn enter_probe_refill(&mut self, model: &mut Model) {
        if self.phase == Phase::Down {
            self.exit_probe_down(model);
        }
        self.phase = Phase::Refill;
        self.rounds_in_phase = 0;
        self.probe_up_rounds = 0;
        self.probe_up_bytes = u64::MAX;
        self.probe_up_acked = 0;
        model.reset_bw_lo();
        model.reset_inflight_lo();
    }

    fn enter_probe_up(&mut self, model: &mut Model, params: &Params, event: &CongestionEvent) {
        self.phase = Phase::Up;
        self.rounds_in_phase = 0;
        self.is_sample_from_probing = true;
        self.raise_inflight_hi(params, event);
        model.restart_round();
    }

    /// Runs the current phase's update logic, returning true iff control
    /// should hand back to PROBE_RTT this event.
    pub fn on_congestion_event(
        &mut self,
        model: &mut Model,
        params: &Params,
        rng: &mut dyn Generator,
        event: &CongestionEvent,
    ) -> bool {
        let opened_this_event = self.opened_cycle_this_event;
        self.opened_cycle_this_event = false;

        if event.end_of_round_trip {
            if !opened_this_event {
                self.rounds_since_probe += 1;
            }
            self.rounds_in_phase += 1;
        }

        match self.phase {
            Phase::Down => self.update_down(model, params, rng, event),
            Phase::Cruise => self.update_cruise(model, params, event),
            Phase::Refill => self.update_refill(model, params, event),
            Phase::Up => self.update_up(model, params, rng, event),
        }
    }

    fn update_down(
        &mut self,
        model: &mut Model,
        params: &Params,
        rng: &mut dyn Generator,
        event: &CongestionEvent,
    ) -> bool {
        if event.end_of_round_trip && !self.has_advanced_max_bw {
            self.is_sample_from_probing = false;
            if !event.last_sample_is_app_limited {
                model.advance_max_bw_filter();
                self.has_advanced_max_bw = true;
            }
            if self.last_cycle_stopped_risky_probe && !self.last_cycle_probed_too_high {
                self.enter_probe_refill(model);
                return false;
            }
        }

        if let AdaptOutcome::ProbedTooHigh = self.maybe_adapt_upper_bounds(model, params, event) {
            let t = event.event_time.unwrap();
            self.enter_probe_down(model, params, rng, t, true, false);
            return false;
        }

        if self.is_time_to_probe_bw(model, params, event) {
            self.enter_probe_refill(model);
            return false;
        }

        if let (Some(event_time), Some(cycle_start)) = (event.event_time, self.cycle_start) {
            if TimeDelta::between(event_time, cycle_start) > model.min_rtt() {
                let headroom = Ratio::<u64>::one() - params.inflight_hi_headroom_fraction;
                let inflight_hi_with_headroom = scale_u64(model.inflight_hi(), headroom);
                let prior_inflight = event.prior_bytes_in_flight as u64;

                if prior_inflight <= inflight_hi_with_headroom
                    && prior_inflight < model.bdp(model.max_bw(), Ratio::new(1, 1))
                {
                    self.enter_probe_cruise(model);
                    return false;
                }
            }
        }

        if model.maybe_min_rtt_expired(event, params) {
            return true;
        }

        false
    }

    fn update_cruise(&mut self, model: &mut Model, params: &Params, event: &CongestionEvent) -> bool {
        let _ = self.maybe_adapt_upper_bounds(model, params, event);
        if self.is_time_to_probe_bw(model, params, event) {
            self.enter_probe_refill(model);
        }
        false
    }

    fn update_refill(&mut self, model: &mut Model, params: &Params, event: &CongestionEvent) -> bool {
        let _ = self.maybe_adapt_upper_bounds(model, params, event);
        if self.rounds_in_phase > 0 && event.end_of_round_trip {
            self.enter_probe_up(model, params, event);
        }
        false
    }

    fn update_up(
        &mut self,
        model: &mut Model,
        params: &Params,
        rng: &mut dyn Generator,
        event: &CongestionEvent,
    ) -> bool {
        if let AdaptOutcome::ProbedTooHigh = self.maybe_adapt_upper_bounds(model, params, event) {
            let t = event.event_time.unwrap();
            self.enter_probe_down(model, params, rng, t, true, false);
            return false;
        }

        self.probe_inflight_high_upward(model, params, event);

        let prior_inflight = event.prior_bytes_in_flight as u64;
        let risky = if self.last_cycle_probed_too_high && prior_inflight >= model.inflight_hi() {
            true
        } else if self.rounds_in_phase > 1 {
            let bdp = model.bdp(model.max_bw(), Ratio::new(1, 1));
            let queuing_threshold = scale_u64(bdp, params.probe_bw_probe_inflight_gain)
                .saturating_add(2 * params.mss as u64);
            prior_inflight >= queuing_threshold
        } else {
            false
        };

        if risky {
            let t = event.event_time.unwrap();
            self.enter_probe_down(model, params, rng, t, false, true);
        }

        false
    }

    fn probe_inflight_high_upward(&mut self, model: &mut Model, params: &Params, event: &CongestionEvent) {
        if !model.cwnd_limited(event) || (event.prior_cwnd as u64) < model.inflight_hi() {
            return;
        }

        self.probe_up_acked = self.probe_up_acked.saturating_add(event.bytes_acked);
        while self.probe_up_bytes > 0 && self.probe_up_acked >= self.probe_up_bytes {
            let delta = self.probe_up_acked / self.probe_up_bytes;
            self.probe_up_acked -= delta * self.probe_up_bytes;
            let new_hi = model.inflight_hi().saturating_add(delta * params.mss as u64);
            model.set_inflight_hi(new_hi);
        }

        if event.end_of_round_trip {
            self.raise_inflight_hi(params, event);
        }
    }

    fn raise_inflight_hi(&mut self, params: &Params, event: &CongestionEvent) {
        self.probe_up_rounds = (self.probe_up_rounds + 1).min(30);
        let denom = 1u64.checked_shl(self.probe_up_rounds).unwrap_or(u64::MAX).max(1);
        self.probe_up_bytes = ((event.prior_cwnd as u64) / denom).max(params.mss as u64);
    }

    fn is_time_to_probe_bw(&self, model: &Model, params: &Params, event: &CongestionEvent) -> bool {
        let (Some(event_time), Some(cycle_start)) = (event.event_time, self.cycle_start) else {
            return false;
        };

        if TimeDelta::between(event_time, cycle_start) > self.probe_wait_time {
            return true;
        }

        let target_inflight = model.bdp(model.max_bw(), Ratio::new(1, 1));
        let rounds = scale_u64(
            (target_inflight / (params.mss.max(1) as u64)).max(1),
            params.probe_bw_probe_reno_gain,
        );
        let cap = rounds.min(params.probe_bw_probe_max_rounds as u64);
        self.rounds_since_probe as u64 >= cap
    }

    fn maybe_adapt_upper_bounds(&mut self, model: &mut Model, params: &Params, event: &CongestionEvent) -> AdaptOutcome {
        if !event.has_last_packet_send_state {
            return AdaptOutcome::InvalidSample;
        }

        if model.loss_events_in_round() >= params.probe_bw_full_loss_count
            && model.is_inflight_too_high(event, params)
        {
            if self.is_sample_from_probing {
                self.is_sample_from_probing = false;
                self.handle_inflight_too_high(model, params, event);
                return AdaptOutcome::ProbedTooHigh;
            }
            return AdaptOutcome::Ok;
        }

        if model.inflight_hi() == u64::MAX {
            return AdaptOutcome::InflightHighNotSet;
        }

        let inflight_at_send = event.last_packet_send_state.bytes_in_flight as u64;
        if inflight_at_send > model.inflight_hi() {
            model.set_inflight_hi(inflight_at_send);
        }
        AdaptOutcome::Ok
    }

    /// Cuts `inflight_hi` down to whichever is tighter of `(1-beta) x cwnd`
    /// or `(1-beta) x BDP`, never below the inflight the lost packet was
    /// actually sent into.
    fn handle_inflight_too_high(&mut self, model: &mut Model, params: &Params, event: &CongestionEvent) {
        if event.last_sample_is_app_limited {
            return;
        }

        let shrink = Ratio::<u64>::one() - params.beta;
        let cwnd_target = scale_u64(event.prior_cwnd as u64, shrink);
        let bdp_target = scale_u64(model.bdp(model.max_bw(), Ratio::new(1, 1)), shrink);
        let target = cwnd_target.min(bdp_target).max(1);

        let bytes_in_flight_at_send = event.last_packet_send_state.bytes_in_flight as u64;
        model.set_inflight_hi(bytes_in_flight_at_send.max(target));
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
    fn default_phase_is_down() {
        let p = ProbeBw::default();
        assert_eq!(p.phase, Phase::Down);
        assert!(!p.is_probing());
    }

    #[test]
    fn up_and_refill_are_probing_phases() {
        let mut p = ProbeBw::default();
        p.phase = Phase::Refill;
        assert!(p.is_probing());
        p.phase = Phase::Up;
        assert!(p.is_probing());
        p.phase = Phase::Cruise;
        assert!(!p.is_probing());
    }

    #[test]
    fn pacing_gain_varies_by_phase() {
        let params = Params::default();
        let mut p = ProbeBw::default();
        p.phase = Phase::Up;
        assert_eq!(p.pacing_gain(&params), params.probe_bw_pacing_gain_up);
        p.phase = Phase::Down;
        assert_eq!(p.pacing_gain(&params), params.probe_bw_pacing_gain_down);
        p.phase = Phase::Cruise;
        assert_eq!(p.pacing_gain(&params), params.probe_bw_pacing_gain_default);
    }
}
