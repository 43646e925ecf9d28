// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! WAV file input and output for the command-line tools.

use std::io;
use std::path::Path;

use cadenza_core::audio::SoundData;
use cadenza_core::errors::{invalid_input_error, CadenzaError, Result};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

fn hound_error(err: hound::Error) -> CadenzaError {
    match err {
        hound::Error::IoError(err) => CadenzaError::IoError(err),
        err => CadenzaError::IoError(io::Error::new(io::ErrorKind::InvalidData, err)),
    }
}

/// Reads an integer PCM WAV file into a planar sample buffer.
pub fn read_wav(path: &Path) -> Result<SoundData> {
    let mut reader = WavReader::open(path).map_err(hound_error)?;

    let spec = reader.spec();

    if spec.sample_format != SampleFormat::Int {
        return invalid_input_error("floating-point WAV is not supported");
    }

    if spec.channels == 0 {
        return invalid_input_error("WAV has no channels");
    }

    let num_channels = usize::from(spec.channels);

    let mut sound =
        SoundData::new(spec.sample_rate, u32::from(spec.bits_per_sample), num_channels);

    let frames = reader.duration() as usize;

    for channel in sound.channels.iter_mut() {
        channel.reserve(frames);
    }

    // WAV stores samples interleaved; deinterleave into one vector per channel.
    for (index, sample) in reader.samples::<i32>().enumerate() {
        let sample = sample.map_err(hound_error)?;
        sound.channels[index % num_channels].push(i64::from(sample));
    }

    if sound.channels.iter().any(|channel| channel.len() != frames) {
        return invalid_input_error("WAV sample data is incomplete");
    }

    Ok(sound)
}

/// Writes a planar sample buffer as an integer PCM WAV file.
pub fn write_wav(path: &Path, sound: &SoundData) -> Result<()> {
    let spec = WavSpec {
        channels: sound.num_channels() as u16,
        sample_rate: sound.sample_rate,
        bits_per_sample: sound.bits_per_sample as u16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec).map_err(hound_error)?;

    for index in 0..sound.samples_per_channel() {
        for channel in sound.channels.iter() {
            writer.write_sample(channel[index] as i32).map_err(hound_error)?;
        }
    }

    writer.finalize().map_err(hound_error)?;

    Ok(())
}
