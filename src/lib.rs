// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod bitrate;
pub mod counter;
pub mod number;
pub mod params;
pub mod random;
pub mod recovery;
pub mod time;

pub use bitrate::BitRate;
pub use params::Params;
