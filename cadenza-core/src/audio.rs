// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `audio` module provides containers for planar PCM audio.

/// `SoundData` is a planar buffer of decoded PCM audio.
///
/// Samples are stored as `i64` regardless of the nominal bit depth. Intermediate codec stages
/// may require up to 33 bits per sample (stereo decorrelation widens the difference channel by
/// one bit), therefore a 64-bit sample type is used throughout.
#[derive(Clone, Debug, Default)]
pub struct SoundData {
    /// The sample rate in Hz.
    pub sample_rate: u32,
    /// The number of significant bits per sample.
    pub bits_per_sample: u32,
    /// One sample vector per channel. All channels have the same length.
    pub channels: Vec<Vec<i64>>,
}

impl SoundData {
    /// Instantiate an empty `SoundData` with `num_channels` channels.
    pub fn new(sample_rate: u32, bits_per_sample: u32, num_channels: usize) -> Self {
        SoundData { sample_rate, bits_per_sample, channels: vec![Vec::new(); num_channels] }
    }

    /// Gets the number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Gets the number of samples per channel.
    pub fn samples_per_channel(&self) -> usize {
        self.channels.first().map_or(0, |chan| chan.len())
    }
}
