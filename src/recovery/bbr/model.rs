// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Aggregates the bandwidth sampler and the round/min-rtt/max-bandwidth
//! filters into the network path model the mode state machine reads
//! from and adapts on loss.
//!
//! Mirrors the relationship the teacher's `data_rate::Model` and
//! `data_volume::Model` had to `bandwidth::Estimator` and `round::Counter`,
//! collapsed into a single aggregate per the controller/model split
//! described for this system: modes take `&Params` and `&mut Model`
//! rather than holding a pointer back into either.

use crate::{
    recovery::{
        bandwidth::{
            max_ack_height::MaxAckHeightTracker, AckedPacket, LostPacket, SendTimeState,
        },
        bandwidth::sampler::Sampler,
        bbr::{max_bandwidth, min_rtt, round},
    },
    time::{TimeDelta, Timestamp},
    BitRate, Params,
};
use num_rational::Ratio;
use num_traits::One;

/// The sliding window, in round-trip counts, the max-ack-height tracker's
/// internal windowed-max filter retains samples for.
const MAX_ACK_HEIGHT_FILTER_WINDOW_ROUNDS: u64 = 10;

/// Threaded through one `on_congestion_event` call: built by the
/// controller with the pre-event snapshot, filled in by [`Model`], and
/// read by the current mode to decide on a transition.
#[derive(Clone, Copy, Debug, Default)]
pub struct CongestionEvent {
    pub event_time: Option<Timestamp>,
    pub prior_cwnd: u32,
    pub prior_bytes_in_flight: u32,
    pub is_probing_for_bandwidth: bool,

    pub end_of_round_trip: bool,
    pub bytes_acked: u64,
    pub bytes_lost: u64,
    pub bytes_in_flight: u32,

    pub has_last_packet_send_state: bool,
    pub last_packet_send_state: SendTimeState,
    pub last_sample_is_app_limited: bool,
    pub sample_max_bandwidth: BitRate,
    pub sample_min_rtt: TimeDelta,
    pub sample_max_inflight: u64,
    pub extra_acked: u64,
}

#[derive(Clone, Debug)]
pub struct Model {
    round: round::Counter,
    min_rtt: min_rtt::Filter,
    max_bandwidth: max_bandwidth::Filter,
    sampler: Sampler,
    max_ack_height: MaxAckHeightTracker,

    /// Adaptive upper bound on bandwidth after loss; `BitRate::Infinite`
    /// while unset.
    bw_lo: BitRate,
    /// Adaptive lower bound on inflight after loss; `u64::MAX` while unset.
    inflight_lo: u64,
    /// Adaptive upper bound on inflight, raised while probing; `u64::MAX`
    /// while unset.
    inflight_hi: u64,

    latest_max_bw: BitRate,
    latest_max_inflight_bytes: u64,
    bytes_lost_in_round: u64,
    loss_events_in_round: u32,
}

impl Model {
    pub fn new(params: &Params) -> Self {
        Self {
            round: round::Counter::default(),
            min_rtt: min_rtt::Filter::default(),
            max_bandwidth: max_bandwidth::Filter::default(),
            sampler: Sampler::new(),
            max_ack_height: MaxAckHeightTracker::new(
                MAX_ACK_HEIGHT_FILTER_WINDOW_ROUNDS,
                params.max_ack_height_threshold,
            ),
            bw_lo: BitRate::Infinite,
            inflight_lo: u64::MAX,
            inflight_hi: u64::MAX,
            latest_max_bw: BitRate::ZERO,
            latest_max_inflight_bytes: 0,
            bytes_lost_in_round: 0,
            loss_events_in_round: 0,
        }
    }

    #[inline]
    pub fn round_count(&self) -> u64 {
        self.round.round_count()
    }

    #[inline]
    pub fn min_rtt(&self) -> TimeDelta {
        self.min_rtt.get()
    }

    #[inline]
    pub fn max_bw(&self) -> BitRate {
        self.max_bandwidth.get()
    }

    #[inline]
    pub fn estimated_bw(&self) -> BitRate {
        self.max_bandwidth.get().min(self.bw_lo)
    }

    #[inline]
    pub fn bw_lo(&self) -> BitRate {
        self.bw_lo
    }

    #[inline]
    pub fn inflight_lo(&self) -> u64 {
        self.inflight_lo
    }

    #[inline]
    pub fn inflight_hi(&self) -> u64 {
        self.inflight_hi
    }

    #[inline]
    pub fn set_inflight_hi(&mut self, value: u64) {
        self.inflight_hi = value;
    }

    #[inline]
    pub fn reset_inflight_hi(&mut self) {
        self.inflight_hi = u64::MAX;
    }

    #[inline]
    pub fn reset_bw_lo(&mut self) {
        self.bw_lo = BitRate::Infinite;
    }

    #[inline]
    pub fn reset_inflight_lo(&mut self) {
        self.inflight_lo = u64::MAX;
    }

    #[inline]
    pub fn set_inflight_lo(&mut self, value: u64) {
        self.inflight_lo = value;
    }

    #[inline]
    pub fn max_ack_height(&self) -> u64 {
        self.max_ack_height.get()
    }

    #[inline]
    pub fn total_bytes_acked(&self) -> u64 {
        self.sampler.total_bytes_acked()
    }

    #[inline]
    pub fn is_app_limited(&self) -> bool {
        self.sampler.is_app_limited()
    }

    #[inline]
    pub fn has_no_outstanding_packets(&self) -> bool {
        self.sampler.has_no_outstanding_packets()
    }

    /// Advances the max-bandwidth filter to the next round, used when a
    /// mode exits PROBE_BW's DOWN phase.
    #[inline]
    pub fn advance_max_bw_filter(&mut self) {
        self.max_bandwidth.advance();
    }

    /// Restarts round-trip tracking without counting a round, used when
    /// entering a new PROBE_BW cycle.
    #[inline]
    pub fn restart_round(&mut self) {
        self.round.restart();
    }

    pub fn on_pkt_sent(
        &mut self,
        seq: u64,
        bytes: u32,
        bytes_in_flight: u32,
        t: Timestamp,
        retransmittable: bool,
    ) {
        self.round.on_pkt_sent(seq);
        self.sampler
            .on_packet_sent(seq, bytes, bytes_in_flight, t, retransmittable);
    }

    #[inline]
    pub fn on_pkt_neutered(&mut self, seq: u64) {
        self.sampler.on_pkt_neutered(seq);
    }

    #[inline]
    pub fn remove_obsolete_pkts(&mut self, up_to: u64) {
        self.sampler.remove_obsolete_pkts(up_to);
    }

    #[inline]
    pub fn on_app_limited(&mut self) {
        self.sampler.on_app_limited();
    }

    /// Runs the sampler over one ack/loss batch and folds the result into
    /// the model's filters and per-round accumulators, then fills in
    /// `event` so the mode state machine can decide on a transition.
    pub fn on_congestion_event(
        &mut self,
        acked: &[AckedPacket],
        lost: &[LostPacket],
        event: &mut CongestionEvent,
        params: &Params,
        at_time: Timestamp,
    ) {
        event.event_time = Some(at_time);

        let prior_acked = self.sampler.total_bytes_acked();
        let prior_lost = self.sampler.total_bytes_lost();

        if let Some(largest_ack_seq) = acked.iter().map(|a| a.seq).max() {
            event.end_of_round_trip = self.round.on_pkt_acked(largest_ack_seq);
        }

        let sample = self.sampler.on_congestion_event(
            at_time,
            acked,
            lost,
            self.max_bandwidth.get(),
            self.bw_lo,
            self.round.round_count(),
            &mut self.max_ack_height,
        );

        event.has_last_packet_send_state = sample.has_last_packet_send_state;
        if sample.has_last_packet_send_state {
            event.last_packet_send_state = sample.last_packet_send_state;
            event.last_sample_is_app_limited = sample.last_sample_is_app_limited;
        }
        event.sample_max_bandwidth = sample.sample_max_bandwidth;
        event.sample_min_rtt = sample.sample_min_rtt;
        event.sample_max_inflight = sample.sample_max_inflight;
        event.extra_acked = sample.extra_acked;

        if prior_acked != self.sampler.total_bytes_acked()
            && (!sample.sample_max_bandwidth_is_app_limited
                || sample.sample_max_bandwidth > self.max_bandwidth.get())
        {
            self.max_bandwidth.update(sample.sample_max_bandwidth);
        }

        if event.sample_min_rtt.is_valid() {
            self.min_rtt.update(event.sample_min_rtt, at_time);
        }

        event.bytes_acked = self.sampler.total_bytes_acked() - prior_acked;
        event.bytes_lost = self.sampler.total_bytes_lost() - prior_lost;
        event.bytes_in_flight = (event.prior_bytes_in_flight as u64)
            .saturating_sub(event.bytes_acked)
            .saturating_sub(event.bytes_lost) as u32;

        if event.bytes_lost > 0 {
            self.bytes_lost_in_round = self.bytes_lost_in_round.saturating_add(event.bytes_lost);
            self.loss_events_in_round += 1;
        }

        self.latest_max_bw = self.latest_max_bw.max(event.sample_max_bandwidth);
        self.latest_max_inflight_bytes = self
            .latest_max_inflight_bytes
            .max(event.sample_max_inflight);

        if event.end_of_round_trip {
            self.adapt_lower_bounds(params, event);

            self.latest_max_bw = if event.sample_max_bandwidth > BitRate::ZERO {
                event.sample_max_bandwidth
            } else {
                BitRate::ZERO
            };
            self.latest_max_inflight_bytes = event.sample_max_inflight;
            self.bytes_lost_in_round = 0;
            self.loss_events_in_round = 0;
        }
    }

    #[inline]
    pub fn loss_events_in_round(&self) -> u32 {
        self.loss_events_in_round
    }

    /// Cuts `bw_lo`/`inflight_lo` in response to loss observed over the
    /// round just ended. Only called at round boundaries.
    fn adapt_lower_bounds(&mut self, params: &Params, event: &CongestionEvent) {
        if event.bytes_lost == 0 {
            return;
        }

        if self.bw_lo == BitRate::Infinite {
            self.bw_lo = self.max_bandwidth.get();
        }
        let decayed = self.bw_lo * (Ratio::one() - params.beta);
        self.bw_lo = self.latest_max_bw.max(decayed);

        if !params.ignore_inflight_lo {
            if self.inflight_lo == u64::MAX {
                self.inflight_lo = event.prior_cwnd as u64;
            }
            let decayed = scale_u64(self.inflight_lo, Ratio::one() - params.beta);
            self.inflight_lo = self.latest_max_inflight_bytes.max(decayed);
        }
    }

    /// True if bytes lost over the round exceed `loss_threshold` of the
    /// inflight volume the offending packet was sent into.
    pub fn is_inflight_too_high(&self, event: &CongestionEvent, params: &Params) -> bool {
        let bytes_in_flight_at_send = event.last_packet_send_state.bytes_in_flight as u64;
        if bytes_in_flight_at_send == 0 {
            return false;
        }
        let threshold = scale_u64(bytes_in_flight_at_send, params.loss_threshold);
        self.bytes_lost_in_round > threshold
    }

    /// Forces the min-RTT filter to accept a fresh sample once its window
    /// has elapsed, so a long stretch without a new low-water mark doesn't
    /// leave BDP estimates pinned to a stale, possibly too-small RTT.
    pub fn maybe_min_rtt_expired(&mut self, event: &CongestionEvent, params: &Params) -> bool {
        let (Some(ts), Some(event_time)) = (self.min_rtt.timestamp(), event.event_time) else {
            return false;
        };

        let win = TimeDelta::from_duration(params.min_rtt_win);
        if TimeDelta::between(event_time, ts) >= win && event.sample_min_rtt.is_valid() {
            self.min_rtt.force_update(event.sample_min_rtt, event_time);
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn cwnd_limited(&self, event: &CongestionEvent) -> bool {
        let prior_in_flight = event.bytes_in_flight as u64 + event.bytes_acked + event.bytes_lost;
        prior_in_flight >= event.prior_cwnd as u64
    }

    /// The bandwidth-delay product, in bytes, at the given gain.
    #[inline]
    pub fn bdp(&self, bw: BitRate, gain: Ratio<u64>) -> u64 {
        bw.bdp_bytes(self.min_rtt.get(), gain)
    }
}

fn scale_u64(value: u64, ratio: Ratio<u64>) -> u64 {
    if *ratio.denom() == 0 {
        return value;
    }
    ((value as u128 * *ratio.numer() as u128) / *ratio.denom() as u128).min(u64::MAX as u128) as u64
}
