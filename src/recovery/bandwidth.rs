// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

pub mod max_ack_height;
pub mod sampler;

pub use max_ack_height::MaxAckHeightTracker;
pub use sampler::{
    AckedPacket, CongestionEventSample, LostPacket, SendTimeState, Sampler,
};
