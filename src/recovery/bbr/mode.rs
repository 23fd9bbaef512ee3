// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The top-level mode state machine: STARTUP -> DRAIN -> PROBE_BW <->
//! PROBE_RTT.
//!
//! A tagged-variant enum rather than a vtable: each arm owns its
//! sub-mode's state directly and dispatch is a match ladder, matching
//! the teacher's own preference for `bbr::State`'s plain enum over
//! dynamic dispatch. No mode holds a pointer back to the controller or
//! model; both are passed in at every call.

use crate::{
    random::Generator,
    recovery::bbr::{
        drain::Drain,
        model::{CongestionEvent, Model},
        probe_bw::ProbeBw,
        probe_rtt::ProbeRtt,
        startup::Startup,
    },
    time::Timestamp,
    Params,
};
use num_rational::Ratio;

#[derive(Clone, Debug)]
pub enum Mode {
    Startup(Startup),
    Drain(Drain),
    ProbeBw(ProbeBw),
    ProbeRtt(ProbeRtt),
}

impl Mode {
    #[inline]
    pub fn startup() -> Self {
        Self::Startup(Startup::default())
    }

    #[inline]
    pub fn is_probing(&self) -> bool {
        match self {
            Self::Startup(_) => true,
            Self::Drain(_) => false,
            Self::ProbeBw(p) => p.is_probing(),
            Self::ProbeRtt(_) => false,
        }
    }

    pub fn cwnd_upper_limit(&self, model: &Model, params: &Params) -> u64 {
        match self {
            Self::Startup(_) => u64::MAX,
            Self::Drain(d) => d.cwnd_upper_limit(model),
            Self::ProbeBw(p) => p.cwnd_upper_limit(model, params),
            Self::ProbeRtt(p) => p.cwnd_upper_limit(model, params),
        }
    }

    pub fn pacing_gain(&self, params: &Params) -> Ratio<u64> {
        match self {
            Self::Startup(s) => s.pacing_gain(params),
            Self::Drain(d) => d.pacing_gain(params),
            Self::ProbeBw(p) => p.pacing_gain(params),
            Self::ProbeRtt(p) => p.pacing_gain(params),
        }
    }

    pub fn cwnd_gain(&self, params: &Params) -> Ratio<u64> {
        match self {
            Self::Startup(s) => s.cwnd_gain(params),
            Self::Drain(d) => d.cwnd_gain(params),
            Self::ProbeBw(p) => p.cwnd_gain(params),
            Self::ProbeRtt(p) => p.cwnd_gain(params),
        }
    }

    /// Runs the current mode's event handling, internally driving any
    /// sub-phase transitions (PROBE_BW's UP/DOWN/CRUISE/REFILL), and
    /// returns the next mode, already entered, when a top-level
    /// transition is warranted.
    pub fn on_congestion_event(
        &mut self,
        model: &mut Model,
        params: &Params,
        rng: &mut dyn Generator,
        event: &mut CongestionEvent,
    ) -> Option<Mode> {
        let t = event.event_time.expect("event_time is set by Model::on_congestion_event");

        match self {
            Self::Startup(s) => {
                if s.on_congestion_event(model, params, event) {
                    let mut drain = Drain::default();
                    drain.enter();
                    Some(Self::Drain(drain))
                } else {
                    None
                }
            }
            Self::Drain(d) => {
                if d.on_congestion_event(model, params, event) {
                    let mut probe_bw = ProbeBw::default();
                    probe_bw.enter(model, params, rng, t);
                    Some(Self::ProbeBw(probe_bw))
                } else {
                    None
                }
            }
            Self::ProbeBw(p) => {
                if p.on_congestion_event(model, params, rng, event) {
                    let mut probe_rtt = ProbeRtt::default();
                    probe_rtt.enter();
                    Some(Self::ProbeRtt(probe_rtt))
                } else {
                    None
                }
            }
            Self::ProbeRtt(p) => {
                if p.on_congestion_event(model, params, event) {
                    let mut probe_bw = ProbeBw::default();
                    probe_bw.enter(model, params, rng, t);
                    Some(Self::ProbeBw(probe_bw))
                } else {
                    None
                }
            }
        }
    }

    pub fn on_exit_quiescence(
        &mut self,
        model: &mut Model,
        params: &Params,
        rng: &mut dyn Generator,
        now: Timestamp,
    ) -> Option<Mode> {
        match self {
            Self::ProbeRtt(p) if p.on_exit_quiescence(now) => {
                let mut probe_bw = ProbeBw::default();
                probe_bw.enter(model, params, rng, now);
                Some(Self::ProbeBw(probe_bw))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_startup_and_is_probing() {
        let mode = Mode::startup();
        assert!(mode.is_probing());
        assert!(matches!(mode, Mode::Startup(_)));
    }
}
