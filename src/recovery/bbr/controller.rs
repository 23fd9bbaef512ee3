// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The BBR controller: owns the model, the current mode, pacing rate,
//! and cwnd, and is the crate's one public entry point for a host
//! transport to drive.

use crate::{
    random::Generator,
    recovery::bandwidth::{AckedPacket, LostPacket},
    recovery::bbr::{
        model::{CongestionEvent, Model},
        mode::Mode,
    },
    time::{TimeDelta, Timestamp},
    BitRate, Params,
};

/// Bounds how many times a single `on_congestion_event` call may walk the
/// mode transition ladder (STARTUP -> DRAIN -> PROBE_BW -> PROBE_RTT is
/// the longest legal chain within one event).
const MAX_MODE_CHANGES: u32 = 4;

pub struct Controller<Rnd: Generator> {
    params: Params,
    rng: Rnd,
    init_cwnd: u32,
    cwnd: u32,
    pacing_rate: BitRate,
    model: Model,
    mode: Mode,
    full_bw_reached: bool,
    last_quiescence_start: Option<Timestamp>,
}

impl<Rnd: Generator> Controller<Rnd> {
    pub fn new(params: Params, rng: Rnd) -> Self {
        let init_cwnd = params.initial_cwnd();
        let model = Model::new(&params);

        Self {
            init_cwnd,
            cwnd: init_cwnd,
            pacing_rate: BitRate::ZERO,
            model,
            mode: Mode::startup(),
            full_bw_reached: false,
            last_quiescence_start: None,
            params,
            rng,
        }
    }

    #[inline]
    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    #[inline]
    pub fn pacing_rate(&self) -> BitRate {
        self.pacing_rate
    }

    #[inline]
    pub fn min_rtt(&self) -> TimeDelta {
        self.model.min_rtt()
    }

    #[inline]
    pub fn is_app_limited(&self) -> bool {
        self.model.is_app_limited()
    }

    #[inline]
    pub fn can_send(&self, bytes_in_flight: u32) -> u32 {
        self.cwnd.saturating_sub(bytes_in_flight)
    }

    pub fn on_packet_sent(
        &mut self,
        seq: u64,
        bytes: u32,
        bytes_in_flight: u32,
        t: Timestamp,
        retransmittable: bool,
    ) {
        if bytes_in_flight == 0 {
            self.mark_quiescence(t);
            self.on_exit_quiescence(t);
        }

        self.model.on_pkt_sent(seq, bytes, bytes_in_flight, t, retransmittable);
    }

    #[inline]
    pub fn on_pkt_neutered(&mut self, seq: u64) {
        self.model.on_pkt_neutered(seq);
    }

    #[inline]
    pub fn remove_obsolete_pkts(&mut self, up_to: u64) {
        self.model.remove_obsolete_pkts(up_to);
    }

    #[inline]
    pub fn on_app_limited(&mut self) {
        self.model.on_app_limited();
    }

    pub fn on_congestion_event(
        &mut self,
        prior_inflight: u32,
        t: Timestamp,
        acked: &[AckedPacket],
        lost: &[LostPacket],
    ) {
        let mut event = CongestionEvent {
            prior_cwnd: self.cwnd,
            prior_bytes_in_flight: prior_inflight,
            is_probing_for_bandwidth: self.mode.is_probing(),
            ..Default::default()
        };

        self.model
            .on_congestion_event(acked, lost, &mut event, &self.params, t);

        let mut changes_left = MAX_MODE_CHANGES;
        while changes_left > 0 {
            let next = self
                .mode
                .on_congestion_event(&mut self.model, &self.params, &mut self.rng, &mut event);

            let Some(next) = next else { break };

            if matches!(self.mode, Mode::Startup(_)) {
                self.full_bw_reached = true;
            }
            tracing::trace!(?next, "bbr mode transition");
            self.mode = next;
            changes_left -= 1;
        }
        if changes_left == 0 {
            tracing::debug!("bbr exhausted its mode-change budget for this event");
        }

        self.update_pacing_rate(event.bytes_acked);
        self.update_cwnd(event.bytes_acked);

        if event.bytes_in_flight == 0 {
            self.mark_quiescence(t);
            self.on_exit_quiescence(t);
        }
    }

    fn update_pacing_rate(&mut self, bytes_acked: u64) {
        let estimated_bw = self.model.estimated_bw();
        if estimated_bw == BitRate::ZERO {
            return;
        }

        if self.model.total_bytes_acked() == bytes_acked {
            // the very first ack this controller has ever processed
            self.pacing_rate = BitRate::from_bytes_and_interval(self.cwnd as u64, self.model.min_rtt());
            return;
        }

        let target = estimated_bw * self.mode.pacing_gain(&self.params);
        if self.full_bw_reached {
            self.pacing_rate = target;
        } else {
            self.pacing_rate = self.pacing_rate.max(target);
        }
    }

    fn update_cwnd(&mut self, bytes_acked: u64) {
        let gain = self.mode.cwnd_gain(&self.params);
        let mut target = self
            .model
            .bdp(self.model.estimated_bw(), gain)
            .max(self.params.min_cwnd() as u64);

        if self.full_bw_reached {
            target = target.saturating_add(self.model.max_ack_height());
            self.cwnd = (self.cwnd as u64)
                .saturating_add(bytes_acked)
                .min(target)
                .min(u32::MAX as u64) as u32;
        } else if (self.cwnd as u64) < target || (self.cwnd as u64) < 2 * self.init_cwnd as u64 {
            self.cwnd = (self.cwnd as u64)
                .saturating_add(bytes_acked)
                .min(u32::MAX as u64) as u32;
        }

        let upper = self.mode.cwnd_upper_limit(&self.model, &self.params);
        self.cwnd = (self.cwnd as u64).min(upper).min(u32::MAX as u64) as u32;
        self.cwnd = self.cwnd.max(self.params.min_cwnd());
    }

    #[cfg(test)]
    pub(crate) fn mode(&self) -> &Mode {
        &self.mode
    }

    #[cfg(test)]
    pub(crate) fn model(&self) -> &Model {
        &self.model
    }

    fn mark_quiescence(&mut self, t: Timestamp) {
        if self.last_quiescence_start.is_none() {
            self.last_quiescence_start = Some(t);
        }
    }

    fn on_exit_quiescence(&mut self, t: Timestamp) {
        let Some(start) = self.last_quiescence_start else {
            return;
        };

        let quiescence_start = if t < start { t } else { start };
        if let Some(next) =
            self.mode
                .on_exit_quiescence(&mut self.model, &self.params, &mut self.rng, quiescence_start)
        {
            self.mode = next;
        }
        self.last_quiescence_start = None;
    }
}
