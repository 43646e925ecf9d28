// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `decoder` module reconstructs PCM audio from the typed frame graph.

use cadenza_core::audio::SoundData;
use cadenza_core::errors::{invalid_input_error, invariant_error, Result};

use log::warn;

use crate::frame::{ChannelAssignment, Frame, Subframe, SubframeBody};
use crate::reader::FlacStream;

/// The coefficient vectors of the fixed polynomial predictors, drawn from the rows of Pascal's
/// triangle with alternating signs.
const FIXED_COEFFICIENTS: [&[i64]; 5] = [&[], &[1], &[2, -1], &[3, -3, 1], &[4, -6, 4, -1]];

/// Decodes every frame of a parsed stream into a planar PCM buffer.
pub fn decode_stream(stream: &FlacStream) -> Result<SoundData> {
    let info = &stream.stream_info;

    let mut sound =
        SoundData::new(info.sample_rate, info.bits_per_sample, info.channels as usize);

    for channel in sound.channels.iter_mut() {
        channel.reserve(info.total_samples as usize);
    }

    for frame in stream.frames.iter() {
        decode_frame(frame, &mut sound)?;
    }

    if info.total_samples != 0 && sound.samples_per_channel() as u64 != info.total_samples {
        warn!(
            "decoded {} samples per channel, but the stream information block declares {}",
            sound.samples_per_channel(),
            info.total_samples
        );
    }

    Ok(sound)
}

/// Decodes one frame, appending one block of samples to every channel of `sound`.
pub fn decode_frame(frame: &Frame, sound: &mut SoundData) -> Result<()> {
    let header = &frame.header;

    let num_channels = header.channel_assignment.num_channels() as usize;

    if num_channels != sound.num_channels() {
        return invariant_error(0, "frame channel count differs from the stream information");
    }

    if frame.subframes.len() != num_channels {
        return invalid_input_error("subframe count does not match the channel assignment");
    }

    let block_size = usize::from(header.block_size);

    let mut bufs = Vec::with_capacity(num_channels);

    for subframe in frame.subframes.iter() {
        bufs.push(decode_subframe(subframe, block_size)?);
    }

    // Invert the inter-channel decorrelation. The difference channel is channel 1 for the
    // LeftSide and MidSide assignments, and channel 0 for RightSide.
    match header.channel_assignment {
        ChannelAssignment::Independent(_) => (),
        ChannelAssignment::LeftSide => {
            let (left, side) = bufs.split_at_mut(1);

            // R = L - D.
            for (s, l) in side[0].iter_mut().zip(left[0].iter()) {
                *s = *l - *s;
            }
        }
        ChannelAssignment::RightSide => {
            let (side, right) = bufs.split_at_mut(1);

            // L = R + D.
            for (s, r) in side[0].iter_mut().zip(right[0].iter()) {
                *s += *r;
            }
        }
        ChannelAssignment::MidSide => {
            let (mid, side) = bufs.split_at_mut(1);

            // The stored mid channel is (L + R) / 2, which floors away one bit of precision.
            // That bit is recoverable: L + R and L - R have the same parity, so the low bit of
            // the side channel restores the low bit of L + R.
            for (m, s) in mid[0].iter_mut().zip(side[0].iter_mut()) {
                let mid = (*m << 1) | (*s & 1);
                let side = *s;
                *m = (mid + side) >> 1;
                *s = (mid - side) >> 1;
            }
        }
    }

    for (channel, buf) in sound.channels.iter_mut().zip(bufs) {
        channel.extend_from_slice(&buf);
    }

    Ok(())
}

fn decode_subframe(subframe: &Subframe, block_size: usize) -> Result<Vec<i64>> {
    let mut buf = match subframe.body {
        SubframeBody::Constant { value } => vec![value; block_size],
        SubframeBody::Verbatim { ref samples } => {
            if samples.len() != block_size {
                return invalid_input_error("verbatim sample count does not match block size");
            }
            samples.clone()
        }
        SubframeBody::Fixed { order, ref warmup, ref residual } => {
            let order = usize::from(order);

            if order > 4 || warmup.len() != order {
                return invalid_input_error("fixed subframe is malformed");
            }

            if residual.residuals.len() != block_size - order {
                return invalid_input_error("residual sample count does not match block size");
            }

            let mut buf = Vec::with_capacity(block_size);
            buf.extend_from_slice(warmup);
            buf.extend_from_slice(&residual.residuals);

            fixed_predict(order, &mut buf);

            buf
        }
        SubframeBody::Lpc { order, qlp_shift, ref qlp_coeffs, ref warmup, ref residual, .. } => {
            let order = usize::from(order);

            if order < 1 || order > 32 || warmup.len() != order || qlp_coeffs.len() != order {
                return invalid_input_error("lpc subframe is malformed");
            }

            if qlp_shift < 0 || qlp_shift > 15 {
                return invalid_input_error("lpc shift is out of bounds");
            }

            if residual.residuals.len() != block_size - order {
                return invalid_input_error("residual sample count does not match block size");
            }

            let mut buf = Vec::with_capacity(block_size);
            buf.extend_from_slice(warmup);
            buf.extend_from_slice(&residual.residuals);

            lpc_predict(qlp_coeffs, qlp_shift as u32, &mut buf);

            buf
        }
    };

    // Restore the low-order zero bits truncated before coding.
    if subframe.wasted_bits > 0 {
        for sample in buf.iter_mut() {
            *sample <<= subframe.wasted_bits;
        }
    }

    Ok(buf)
}

/// Runs the fixed polynomial predictor of the given order over `buf`, converting residuals
/// into samples in place. The first `order` entries must hold the warmup samples.
fn fixed_predict(order: usize, buf: &mut [i64]) {
    let coeffs = FIXED_COEFFICIENTS[order];

    for i in order..buf.len() {
        let mut predicted = 0i64;

        for (j, &coeff) in coeffs.iter().enumerate() {
            predicted += coeff * buf[i - 1 - j];
        }

        buf[i] += predicted;
    }
}

/// Runs the quantized linear predictor over `buf`, converting residuals into samples in place.
/// The first `coeffs.len()` entries must hold the warmup samples.
///
/// The prediction sum of up-to 33-bit samples and 15-bit coefficients over 32 taps needs at
/// most 54 bits, so a 64-bit accumulator cannot overflow. The shift must be arithmetic.
fn lpc_predict(coeffs: &[i32], shift: u32, buf: &mut [i64]) {
    let order = coeffs.len();

    for i in order..buf.len() {
        let mut predicted = 0i64;

        for (j, &coeff) in coeffs.iter().enumerate() {
            predicted += i64::from(coeff) * buf[i - 1 - j];
        }

        buf[i] += predicted >> shift;
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_subframe, fixed_predict, lpc_predict};
    use crate::frame::{Residual, ResidualMethod, RicePartition, Subframe, SubframeBody};

    #[test]
    fn verify_fixed_predict() {
        // An order-1 predictor with all-ones residuals reconstructs an arithmetic progression.
        let mut buf = vec![5i64];
        buf.extend(std::iter::repeat(3).take(7));
        fixed_predict(1, &mut buf);
        assert_eq!(buf, &[5, 8, 11, 14, 17, 20, 23, 26]);

        // An order-2 predictor with zero residuals extrapolates the progression.
        let mut buf = vec![5i64, 8, 0, 0, 0, 0];
        fixed_predict(2, &mut buf);
        assert_eq!(buf, &[5, 8, 11, 14, 17, 20]);
    }

    #[test]
    fn verify_lpc_predict() {
        // An order-1 predictor with coefficient 2 and shift 1 reproduces the previous sample.
        let mut buf = vec![100i64, 1, -1, 0];
        lpc_predict(&[2], 1, &mut buf);
        assert_eq!(buf, &[100, 101, 100, 100]);
    }

    #[test]
    fn verify_wasted_bits_restored() {
        let subframe = Subframe {
            wasted_bits: 3,
            body: SubframeBody::Constant { value: 0x15 },
        };

        let buf = decode_subframe(&subframe, 4).unwrap();
        assert_eq!(buf, &[0xa8, 0xa8, 0xa8, 0xa8]);
    }

    #[test]
    fn verify_fixed_subframe_decode() {
        let subframe = Subframe {
            wasted_bits: 0,
            body: SubframeBody::Fixed {
                order: 1,
                warmup: vec![0],
                residual: Residual {
                    method: ResidualMethod::PartitionedRice,
                    partition_order: 0,
                    partitions: vec![RicePartition::Coded { parameter: 0 }],
                    residuals: vec![1; 15],
                },
            },
        };

        let buf = decode_subframe(&subframe, 16).unwrap();
        assert_eq!(buf, (0..16).collect::<Vec<i64>>());
    }
}
