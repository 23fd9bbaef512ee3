// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-packet bandwidth sampling.
//!
//! Grounded on `s2n-quic-core::recovery::bandwidth::Estimator`, rebuilt
//! around the send/ack bookkeeping Chromium's `BandwidthSampler` performs
//! (`bandwidth_sampler.cc`/`.h` in the original BBRv2 source): a map of
//! outstanding per-packet send records, a 2-slot "recent ack points"
//! window, and a small FIFO of A0 candidates used to anchor the ack-rate
//! half of each bandwidth sample.

use crate::{
    recovery::bandwidth::max_ack_height::MaxAckHeightTracker,
    time::{TimeDelta, Timestamp},
    BitRate,
};
use alloc::collections::{BTreeMap, VecDeque};

/// A snapshot of the sampler's running totals, captured either at send
/// time (embedded in a [`SendRecord`]) or returned alongside a bandwidth
/// sample to describe the state of the world when the sampled packet was
/// transmitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendTimeState {
    pub is_app_limited: bool,
    pub total_bytes_sent: u64,
    pub total_bytes_acked: u64,
    pub total_bytes_lost: u64,
    pub bytes_in_flight: u32,
}

#[derive(Clone, Copy, Debug)]
struct SendRecord {
    bytes: u32,
    sent_time: Timestamp,
    total_bytes_sent_at_last_acked_packet: u64,
    last_acked_packet_sent_time: Option<Timestamp>,
    last_acked_packet_ack_time: Option<Timestamp>,
    state: SendTimeState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct AckPoint {
    ack_time: Timestamp,
    total_bytes_acked: u64,
}

#[derive(Clone, Copy, Debug)]
struct RecentAckPoints {
    points: [AckPoint; 2],
}

impl RecentAckPoints {
    fn new(ack_time: Timestamp, total_bytes_acked: u64) -> Self {
        let p = AckPoint {
            ack_time,
            total_bytes_acked,
        };
        Self { points: [p, p] }
    }

    fn update(&mut self, ack_time: Timestamp, total_bytes_acked: u64) {
        debug_assert!(total_bytes_acked >= self.points[1].total_bytes_acked);

        if ack_time < self.points[1].ack_time {
            // the clock went backwards; keep the larger byte count but the
            // smaller timestamp rather than regressing either field
            self.points[1].ack_time = ack_time;
            self.points[1].total_bytes_acked = total_bytes_acked;
        } else if ack_time > self.points[1].ack_time {
            self.points[0] = self.points[1];
            self.points[1] = AckPoint {
                ack_time,
                total_bytes_acked,
            };
        } else {
            self.points[1].total_bytes_acked = total_bytes_acked;
        }
    }
}

/// A bandwidth/rtt measurement derived from a single acknowledged packet.
#[derive(Clone, Copy, Debug)]
pub struct BandwidthSample {
    pub bandwidth: BitRate,
    pub rtt: TimeDelta,
    pub is_app_limited: bool,
    pub state_at_send: SendTimeState,
}

impl BandwidthSample {
    fn invalid() -> Self {
        Self {
            bandwidth: BitRate::Invalid,
            rtt: TimeDelta::Invalid,
            is_app_limited: false,
            state_at_send: SendTimeState::default(),
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.bandwidth.is_valid()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AckedPacket {
    pub seq: u64,
    pub bytes: u32,
    pub recv_time: Timestamp,
}

#[derive(Clone, Copy, Debug)]
pub struct LostPacket {
    pub seq: u64,
    pub bytes: u32,
}

/// Everything the model needs out of one `on_congestion_event` call.
#[derive(Clone, Copy, Debug, Default)]
pub struct CongestionEventSample {
    pub has_last_packet_send_state: bool,
    pub last_packet_send_state: SendTimeState,
    pub last_sample_is_app_limited: bool,
    pub sample_max_bandwidth: BitRate,
    pub sample_max_bandwidth_is_app_limited: bool,
    pub sample_min_rtt: TimeDelta,
    pub sample_max_inflight: u64,
    pub extra_acked: u64,
}

#[derive(Clone, Debug, Default)]
pub struct Sampler {
    total_bytes_sent: u64,
    total_bytes_acked: u64,
    total_bytes_lost: u64,
    total_bytes_neutered: u64,
    last_sent_packet: u64,
    is_app_limited: bool,
    end_of_app_limited_phase: Option<u64>,
    send_records: BTreeMap<u64, SendRecord>,
    recent_ack_points: Option<RecentAckPoints>,
    a0_candidates: VecDeque<AckPoint>,
    last_acked_packet_sent_time: Option<Timestamp>,
    last_acked_packet_ack_time: Option<Timestamp>,
    total_bytes_sent_at_last_acked_packet: u64,
}

impl Sampler {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn total_bytes_sent(&self) -> u64 {
        self.total_bytes_sent
    }

    #[inline]
    pub fn total_bytes_acked(&self) -> u64 {
        self.total_bytes_acked
    }

    #[inline]
    pub fn total_bytes_lost(&self) -> u64 {
        self.total_bytes_lost
    }

    #[inline]
    pub fn is_app_limited(&self) -> bool {
        self.is_app_limited
    }

    #[inline]
    pub fn has_no_outstanding_packets(&self) -> bool {
        self.send_records.is_empty()
    }

    pub fn on_packet_sent(
        &mut self,
        seq: u64,
        bytes: u32,
        bytes_in_flight: u32,
        sent_time: Timestamp,
        retransmittable: bool,
    ) {
        self.last_sent_packet = seq;

        if !retransmittable {
            return;
        }

        self.total_bytes_sent = self.total_bytes_sent.saturating_add(bytes as u64);

        if bytes_in_flight == 0 {
            // resuming from quiescence: nothing useful can be inferred about
            // send/ack rate across the idle gap, so restart both anchors here
            self.last_acked_packet_ack_time = Some(sent_time);
            self.last_acked_packet_sent_time = Some(sent_time);
            self.total_bytes_sent_at_last_acked_packet = self.total_bytes_sent;
            self.recent_ack_points = Some(RecentAckPoints::new(sent_time, self.total_bytes_acked));
            self.a0_candidates.clear();
            self.a0_candidates.push_back(AckPoint {
                ack_time: sent_time,
                total_bytes_acked: self.total_bytes_acked,
            });
        }

        let state = SendTimeState {
            is_app_limited: self.is_app_limited,
            total_bytes_sent: self.total_bytes_sent,
            total_bytes_acked: self.total_bytes_acked,
            total_bytes_lost: self.total_bytes_lost,
            bytes_in_flight,
        };

        self.send_records.insert(
            seq,
            SendRecord {
                bytes,
                sent_time,
                total_bytes_sent_at_last_acked_packet: self.total_bytes_sent_at_last_acked_packet,
                last_acked_packet_sent_time: self.last_acked_packet_sent_time,
                last_acked_packet_ack_time: self.last_acked_packet_ack_time,
                state,
            },
        );
    }

    pub fn on_pkt_neutered(&mut self, seq: u64) {
        if let Some(record) = self.send_records.remove(&seq) {
            self.total_bytes_neutered = self.total_bytes_neutered.saturating_add(record.bytes as u64);
        }
    }

    pub fn remove_obsolete_pkts(&mut self, up_to: u64) {
        // BTreeMap::retain keeps amortized O(removed) cost and is idempotent:
        // calling this again with the same or smaller `up_to` removes nothing.
        self.send_records.retain(|&seq, _| seq >= up_to);
    }

    pub fn on_app_limited(&mut self) {
        self.is_app_limited = true;
        self.end_of_app_limited_phase = Some(self.last_sent_packet);
    }

    pub fn on_congestion_event(
        &mut self,
        ack_time: Timestamp,
        acked: &[AckedPacket],
        lost: &[LostPacket],
        max_bw: BitRate,
        bw_upper_bound: BitRate,
        round: u64,
        max_ack_height: &mut MaxAckHeightTracker,
    ) -> CongestionEventSample {
        let mut event = CongestionEventSample {
            sample_min_rtt: TimeDelta::Infinite,
            ..Default::default()
        };

        let mut last_lost: Option<(u64, SendTimeState)> = None;
        for l in lost {
            self.total_bytes_lost = self.total_bytes_lost.saturating_add(l.bytes as u64);
            match self.send_records.remove(&l.seq) {
                Some(record) => last_lost = Some((l.seq, record.state)),
                None => tracing::debug!(seq = l.seq, "loss reported for unknown packet; skipping"),
            }
        }

        let mut last_acked: Option<(u64, SendTimeState)> = None;
        let mut newly_acked_bytes = 0u64;

        for a in acked {
            newly_acked_bytes = newly_acked_bytes.saturating_add(a.bytes as u64);

            let sample = self.sample_bandwidth(a.seq, a.bytes, a.recv_time);
            if !sample.is_valid() {
                continue;
            }

            if sample.rtt.is_valid() {
                event.sample_min_rtt = event.sample_min_rtt.min(sample.rtt);
            }
            if sample.bandwidth > event.sample_max_bandwidth {
                event.sample_max_bandwidth = sample.bandwidth;
                event.sample_max_bandwidth_is_app_limited = sample.is_app_limited;
            }

            let max_inflight = self
                .total_bytes_acked
                .saturating_sub(sample.state_at_send.total_bytes_acked);
            event.sample_max_inflight = event.sample_max_inflight.max(max_inflight);

            event.last_sample_is_app_limited = sample.is_app_limited;
            last_acked = Some((a.seq, sample.state_at_send));
        }

        event.last_packet_send_state = match (last_acked, last_lost) {
            (Some((a_seq, a_state)), Some((l_seq, l_state))) => {
                event.has_last_packet_send_state = true;
                if a_seq >= l_seq {
                    a_state
                } else {
                    l_state
                }
            }
            (Some((_, a_state)), None) => {
                event.has_last_packet_send_state = true;
                a_state
            }
            (None, Some((_, l_state))) => {
                event.has_last_packet_send_state = true;
                l_state
            }
            (None, None) => SendTimeState::default(),
        };

        if newly_acked_bytes > 0 {
            let bw_for_height = max_bw.max(event.sample_max_bandwidth).min(bw_upper_bound);
            event.extra_acked =
                max_ack_height.update(bw_for_height, round, ack_time, newly_acked_bytes);

            if event.extra_acked == 0 {
                if let Some(rap) = &self.recent_ack_points {
                    self.a0_candidates.push_back(rap.points[0]);
                }
            }
        }

        event
    }

    /// Implements the per-ack sampling algorithm: looks up the packet's send
    /// record, derives send-rate and ack-rate, and returns the lesser of the
    /// two as the bandwidth sample (an invalid sample if no conclusion can
    /// be drawn, e.g. this is the very first ack the sampler has ever seen).
    fn sample_bandwidth(&mut self, seq: u64, bytes: u32, ack_time: Timestamp) -> BandwidthSample {
        let Some(record) = self.send_records.remove(&seq) else {
            tracing::debug!(seq, "ack for unknown packet; skipping");
            return BandwidthSample::invalid();
        };

        self.total_bytes_acked = self.total_bytes_acked.saturating_add(bytes as u64);

        match &mut self.recent_ack_points {
            Some(rap) => rap.update(ack_time, self.total_bytes_acked),
            None => {
                self.recent_ack_points = Some(RecentAckPoints::new(ack_time, self.total_bytes_acked))
            }
        }

        if self.is_app_limited {
            match self.end_of_app_limited_phase {
                None => self.is_app_limited = false,
                Some(mark) if seq > mark => self.is_app_limited = false,
                _ => {}
            }
        }

        let Some(last_acked_send_time) = record.last_acked_packet_sent_time else {
            // the very first sample has no prior packet to compare against
            self.last_acked_packet_sent_time = Some(record.sent_time);
            self.last_acked_packet_ack_time = Some(ack_time);
            self.total_bytes_sent_at_last_acked_packet = record.state.total_bytes_sent;
            return BandwidthSample::invalid();
        };

        let send_rate = if record.sent_time > last_acked_send_time {
            BitRate::from_bytes_and_interval(
                record.state.total_bytes_sent - record.total_bytes_sent_at_last_acked_packet,
                TimeDelta::between(record.sent_time, last_acked_send_time),
            )
        } else {
            BitRate::Infinite
        };

        let a0 = self
            .choose_a0(record.state.total_bytes_acked)
            .unwrap_or(AckPoint {
                ack_time: record
                    .last_acked_packet_ack_time
                    .unwrap_or(last_acked_send_time),
                total_bytes_acked: record.state.total_bytes_acked,
            });

        debug_assert!(
            a0.ack_time < ack_time,
            "the A0 anchor must precede the current ack"
        );

        let ack_rate = if ack_time > a0.ack_time {
            BitRate::from_bytes_and_interval(
                self.total_bytes_acked.saturating_sub(a0.total_bytes_acked),
                TimeDelta::between(ack_time, a0.ack_time),
            )
        } else {
            BitRate::Infinite
        };

        let bandwidth = send_rate.min(ack_rate);
        let rtt = TimeDelta::between(ack_time, record.sent_time);

        self.last_acked_packet_sent_time = Some(record.sent_time);
        self.last_acked_packet_ack_time = Some(ack_time);
        self.total_bytes_sent_at_last_acked_packet = record.state.total_bytes_sent;

        BandwidthSample {
            bandwidth,
            rtt,
            is_app_limited: record.state.is_app_limited,
            state_at_send: record.state,
        }
    }

    /// Scans the A0 candidate queue (oldest-to-newest, by construction) for
    /// the most recent entry whose `total_bytes_acked` does not exceed
    /// `target`, then drops everything older than it so the queue never
    /// grows past what future samples can still use.
    fn choose_a0(&mut self, target: u64) -> Option<AckPoint> {
        let mut chosen_idx = None;
        for (i, candidate) in self.a0_candidates.iter().enumerate() {
            if candidate.total_bytes_acked <= target {
                chosen_idx = Some(i);
            } else {
                break;
            }
        }

        let idx = chosen_idx?;
        let chosen = self.a0_candidates[idx];
        self.a0_candidates.drain(0..idx);
        Some(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    fn ts(us: u64) -> Timestamp {
        unsafe { Timestamp::from_duration(Duration::from_micros(us)) }
    }

    fn height() -> MaxAckHeightTracker {
        MaxAckHeightTracker::new(10, num_rational::Ratio::new(2, 1))
    }

    #[test]
    fn constant_rate_matches_send_interval() {
        let mut sampler = Sampler::new();
        let mut height = height();
        let mut in_flight = 0u32;

        for i in 1..=5u64 {
            let t = ts(i * 10_000);
            sampler.on_packet_sent(i, 1280, in_flight, t, true);
            in_flight += 1280;

            let event = sampler.on_congestion_event(
                t,
                &[AckedPacket {
                    seq: i,
                    bytes: 1280,
                    recv_time: t,
                }],
                &[],
                BitRate::ZERO,
                BitRate::Infinite,
                0,
                &mut height,
            );
            in_flight -= 1280;

            if i > 1 {
                assert!(event.has_last_packet_send_state);
                // 1280 bytes / 10ms = 1,024,000 bps
                assert_eq!(event.sample_max_bandwidth, BitRate::Finite(1_024_000));
            }
        }
    }

    /// Pipelined sends 1ms apart: packet `i` is acked in lockstep with
    /// packet `i+20` being sent, so every ack from 21 on reflects a steady
    /// 1280 B / 1ms send-and-ack rate.
    #[test]
    fn pipelined_sends_match_the_pacing_interval() {
        let mut sampler = Sampler::new();
        let mut height = height();
        let mut in_flight = 0u32;
        let expected = BitRate::from_bytes_and_interval(1280, TimeDelta::Finite(1_000));

        for i in 1..=20u64 {
            sampler.on_packet_sent(i, 1280, in_flight, ts(i * 1_000), true);
            in_flight += 1280;
        }

        for i in 1..=20u64 {
            let t = ts((20 + i) * 1_000);
            sampler.on_packet_sent(i + 20, 1280, in_flight, t, true);
            in_flight += 1280;

            let event = sampler.on_congestion_event(
                t,
                &[AckedPacket {
                    seq: i,
                    bytes: 1280,
                    recv_time: t,
                }],
                &[],
                BitRate::ZERO,
                BitRate::Infinite,
                0,
                &mut height,
            );
            in_flight -= 1280;
            assert_eq!(event.sample_max_bandwidth, expected);
        }

        for i in 21..=40u64 {
            let t = ts((20 + i) * 1_000);
            let event = sampler.on_congestion_event(
                t,
                &[AckedPacket {
                    seq: i,
                    bytes: 1280,
                    recv_time: t,
                }],
                &[],
                BitRate::ZERO,
                BitRate::Infinite,
                0,
                &mut height,
            );
            in_flight -= 1280;
            assert_eq!(event.sample_max_bandwidth, expected);
        }

        sampler.remove_obsolete_pkts(41);
        assert_eq!(in_flight, 0);
        assert!(sampler.has_no_outstanding_packets());
    }

    /// Same pipeline as [`pipelined_sends_match_the_pacing_interval`], but
    /// every odd sequence number among 1..40 is lost instead of acked: half
    /// as many bytes arrive per unit time, so the reported bandwidth halves.
    #[test]
    fn fifty_percent_loss_halves_reported_bandwidth() {
        let mut sampler = Sampler::new();
        let mut height = height();
        let mut in_flight = 0u32;
        let expected = BitRate::from_bytes_and_interval(1280, TimeDelta::Finite(2_000));

        for i in 1..=20u64 {
            sampler.on_packet_sent(i, 1280, in_flight, ts(i * 1_000), true);
            in_flight += 1280;
        }

        let mut last_event = None;
        for i in 1..=20u64 {
            let t = ts((20 + i) * 1_000);
            sampler.on_packet_sent(i + 20, 1280, in_flight, t, true);
            in_flight += 1280;

            let event = if i % 2 == 1 {
                sampler.on_congestion_event(
                    t,
                    &[],
                    &[LostPacket { seq: i, bytes: 1280 }],
                    BitRate::ZERO,
                    BitRate::Infinite,
                    0,
                    &mut height,
                )
            } else {
                sampler.on_congestion_event(
                    t,
                    &[AckedPacket {
                        seq: i,
                        bytes: 1280,
                        recv_time: t,
                    }],
                    &[],
                    BitRate::ZERO,
                    BitRate::Infinite,
                    0,
                    &mut height,
                )
            };
            in_flight -= 1280;
            if i % 2 == 0 {
                last_event = Some(event);
            }
        }

        for i in 21..=40u64 {
            let t = ts((20 + i) * 1_000);
            let event = if i % 2 == 1 {
                sampler.on_congestion_event(
                    t,
                    &[],
                    &[LostPacket { seq: i, bytes: 1280 }],
                    BitRate::ZERO,
                    BitRate::Infinite,
                    0,
                    &mut height,
                )
            } else {
                sampler.on_congestion_event(
                    t,
                    &[AckedPacket {
                        seq: i,
                        bytes: 1280,
                        recv_time: t,
                    }],
                    &[],
                    BitRate::ZERO,
                    BitRate::Infinite,
                    0,
                    &mut height,
                )
            };
            in_flight -= 1280;
            if i % 2 == 0 {
                last_event = Some(event);
            }
        }

        assert_eq!(last_event.unwrap().sample_max_bandwidth, expected);
    }

    #[test]
    fn remove_obsolete_pkts_is_idempotent() {
        let mut sampler = Sampler::new();
        sampler.on_packet_sent(1, 100, 0, ts(0), true);
        sampler.on_packet_sent(2, 100, 100, ts(1), true);
        sampler.remove_obsolete_pkts(3);
        assert!(sampler.has_no_outstanding_packets());
        sampler.remove_obsolete_pkts(3);
        assert!(sampler.has_no_outstanding_packets());
    }

    #[test]
    fn neutered_packet_does_not_count_as_acked_or_lost() {
        let mut sampler = Sampler::new();
        sampler.on_packet_sent(1, 100, 0, ts(0), true);
        sampler.on_pkt_neutered(1);
        assert_eq!(sampler.total_bytes_acked(), 0);
        assert_eq!(sampler.total_bytes_lost(), 0);
        assert!(sampler.has_no_outstanding_packets());
    }

    #[test]
    fn app_limited_flag_set_until_marked_packet_acked() {
        let mut sampler = Sampler::new();
        let mut height = height();
        sampler.on_packet_sent(1, 100, 0, ts(0), true);
        let _ = sampler.on_congestion_event(
            ts(1_000),
            &[AckedPacket {
                seq: 1,
                bytes: 100,
                recv_time: ts(1_000),
            }],
            &[],
            BitRate::ZERO,
            BitRate::Infinite,
            0,
            &mut height,
        );
        sampler.on_packet_sent(2, 100, 0, ts(2_000), true);
        sampler.on_app_limited();
        assert!(sampler.is_app_limited());

        sampler.on_packet_sent(3, 100, 100, ts(3_000), true);
        let _ = sampler.on_congestion_event(
            ts(4_000),
            &[AckedPacket {
                seq: 2,
                bytes: 100,
                recv_time: ts(4_000),
            }],
            &[],
            BitRate::ZERO,
            BitRate::Infinite,
            0,
            &mut height,
        );
        assert!(!sampler.is_app_limited());
    }
}
