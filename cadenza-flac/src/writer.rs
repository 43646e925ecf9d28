// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `writer` module serializes the typed frame graph back to a FLAC byte stream.
//!
//! The writer is the exact inverse of the reader: parsing the emitted bytes reproduces the
//! frame graph, and emitting a parsed graph reproduces the original bytes, provided the stream
//! used the canonical minimal encodings of the variable-width header fields.

use cadenza_core::checksum::{Crc16Ansi, Crc8Ccitt};
use cadenza_core::errors::{invalid_input_error, Result};
use cadenza_core::io::{BitWriterLtr, ByteBuf, MonitorStream, WriteBytes};

use crate::frame::{
    BlockId, ChannelAssignment, Frame, FrameHeader, Residual, ResidualMethod, RicePartition,
    Subframe, SubframeBody, FLAC_STREAM_MARKER, FRAME_HEADER_SYNC, MAX_FRAME_NUMBER,
    MAX_SAMPLE_NUMBER, MAX_SAMPLE_RATE,
};
use crate::metadata::{MetadataBlock, MetadataBody, StreamInfo};
use crate::reader::FlacStream;

/// The tail field, if any, that accompanies a sample rate code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SampleRateTail {
    None,
    KHz,
    Hz,
    TensOfHz,
}

/// Gets the most compact frame header encoding of a sample rate, or `None` if the rate cannot
/// be represented.
///
/// A rate of 0 encodes as the "take from stream information" code.
pub(crate) fn sample_rate_encoding(rate: u32) -> Option<(u32, SampleRateTail)> {
    let encoding = match rate {
        0 => (0x0, SampleRateTail::None),
        88_200 => (0x1, SampleRateTail::None),
        176_400 => (0x2, SampleRateTail::None),
        192_000 => (0x3, SampleRateTail::None),
        8_000 => (0x4, SampleRateTail::None),
        16_000 => (0x5, SampleRateTail::None),
        22_050 => (0x6, SampleRateTail::None),
        24_000 => (0x7, SampleRateTail::None),
        32_000 => (0x8, SampleRateTail::None),
        44_100 => (0x9, SampleRateTail::None),
        48_000 => (0xa, SampleRateTail::None),
        96_000 => (0xb, SampleRateTail::None),
        _ => {
            if rate > MAX_SAMPLE_RATE {
                return None;
            }
            else if rate % 1000 == 0 && rate / 1000 <= 0xff {
                (0xc, SampleRateTail::KHz)
            }
            else if rate <= 0xffff {
                (0xd, SampleRateTail::Hz)
            }
            else if rate % 10 == 0 && rate / 10 <= 0xffff {
                (0xe, SampleRateTail::TensOfHz)
            }
            else {
                return None;
            }
        }
    };

    Some(encoding)
}

/// Serializes an entire FLAC stream.
///
/// The `is_last` flag of each metadata block is derived from its position in the chain, and
/// all checksums are recomputed.
pub fn write_stream(stream: &FlacStream) -> Result<Vec<u8>> {
    match stream.metadata.first() {
        Some(MetadataBlock { body: MetadataBody::StreamInfo(_), .. }) => (),
        _ => return invalid_input_error("stream must start with a stream information block"),
    }

    let mut buf = ByteBuf::new();

    buf.write_buf(&FLAC_STREAM_MARKER)?;

    let last = stream.metadata.len() - 1;

    for (i, block) in stream.metadata.iter().enumerate() {
        write_metadata_block(&mut buf, block, i == last)?;
    }

    for frame in stream.frames.iter() {
        write_frame(&mut buf, frame, &stream.stream_info)?;
    }

    Ok(buf.into_inner())
}

/// Writes a metadata block including its header.
pub fn write_metadata_block<W: WriteBytes>(
    writer: &mut W,
    block: &MetadataBlock,
    is_last: bool,
) -> Result<()> {
    writer.write_u8(u8::from(is_last) << 7 | block.body.block_type())?;
    writer.write_be_u24(block.body.len())?;

    match block.body {
        MetadataBody::StreamInfo(ref info) => info.write(writer)?,
        MetadataBody::Padding { length } => {
            for _ in 0..length {
                writer.write_byte(0)?;
            }
        }
        MetadataBody::Application { ref data }
        | MetadataBody::SeekTable { ref data }
        | MetadataBody::VorbisComment { ref data }
        | MetadataBody::CueSheet { ref data }
        | MetadataBody::Picture { ref data }
        | MetadataBody::Unknown { ref data, .. } => writer.write_buf(data)?,
    }

    Ok(())
}

/// Writes a complete frame including its footer CRC-16.
///
/// The stream information block supplies the bits per sample when the frame header defers to
/// it. Structures that violate the format's range checks fail with `InvalidInput`.
pub fn write_frame<W: WriteBytes>(
    writer: &mut W,
    frame: &Frame,
    stream_info: &StreamInfo,
) -> Result<()> {
    let header = &frame.header;

    let num_channels = header.channel_assignment.num_channels() as usize;

    if num_channels < 1 || num_channels > 8 {
        return invalid_input_error("channel count is out of bounds");
    }

    if frame.subframes.len() != num_channels {
        return invalid_input_error("subframe count does not match the channel assignment");
    }

    let bps = if header.bits_per_sample != 0 {
        header.bits_per_sample
    }
    else {
        stream_info.bits_per_sample
    };

    // The frame, from the first sync byte up to (but excluding) the footer, is covered by a
    // CRC-16.
    let mut crc16_stream = MonitorStream::new(writer, Crc16Ansi::new(0));

    write_frame_header(&mut crc16_stream, header)?;

    {
        let mut bw = BitWriterLtr::new(&mut crc16_stream);

        for (channel, subframe) in frame.subframes.iter().enumerate() {
            let channel_bps = header.channel_assignment.channel_bps(channel, bps);
            write_subframe(&mut bw, subframe, channel_bps, header.block_size)?;
        }

        // Pad the subframe payload with zero bits up to the next byte boundary.
        bw.byte_align()?;
    }

    let crc16 = crc16_stream.monitor().crc();
    crc16_stream.into_inner().write_be_u16(crc16)?;

    Ok(())
}

fn write_frame_header<W: WriteBytes>(writer: &mut W, header: &FrameHeader) -> Result<()> {
    if header.block_size < 16 {
        return invalid_input_error("block size is less than 16 samples");
    }

    // Choose the most compact encoding of the block size: a table code if one matches, or the
    // 8-bit or 16-bit tail holding the value minus one.
    let (block_size_enc, block_size_tail_bits) = match header.block_size {
        192 => (0x1, 0),
        576 => (0x2, 0),
        1152 => (0x3, 0),
        2304 => (0x4, 0),
        4608 => (0x5, 0),
        256 => (0x8, 0),
        512 => (0x9, 0),
        1024 => (0xa, 0),
        2048 => (0xb, 0),
        4096 => (0xc, 0),
        8192 => (0xd, 0),
        16384 => (0xe, 0),
        32768 => (0xf, 0),
        _ => {
            if header.block_size - 1 <= 0xff {
                (0x6, 8)
            }
            else {
                (0x7, 16)
            }
        }
    };

    let (sample_rate_enc, sample_rate_tail) = match sample_rate_encoding(header.sample_rate) {
        Some(encoding) => encoding,
        None => return invalid_input_error("sample rate not representable in a frame header"),
    };

    let channels_enc = match header.channel_assignment {
        ChannelAssignment::Independent(channels) => channels - 1,
        ChannelAssignment::LeftSide => 0x8,
        ChannelAssignment::RightSide => 0x9,
        ChannelAssignment::MidSide => 0xa,
    };

    let bps_enc = match header.bits_per_sample {
        0 => 0x0, // Take from the stream information block.
        8 => 0x1,
        12 => 0x2,
        16 => 0x4,
        20 => 0x5,
        24 => 0x6,
        _ => return invalid_input_error("bits per sample not representable in a frame header"),
    };

    // The frame header, excluding the trailing CRC byte itself, is covered by a CRC-8.
    let mut crc8_stream = MonitorStream::new(writer, Crc8Ccitt::new(0));

    let mut bw = BitWriterLtr::new(&mut crc8_stream);

    bw.write_bits_leq32(FRAME_HEADER_SYNC, 14)?;
    bw.write_bit(false)?; // Reserved.
    bw.write_bit(matches!(header.block_id, BlockId::Samples(_)))?;
    bw.write_bits_leq32(block_size_enc, 4)?;
    bw.write_bits_leq32(sample_rate_enc, 4)?;
    bw.write_bits_leq32(channels_enc, 4)?;
    bw.write_bits_leq32(bps_enc, 3)?;
    bw.write_bit(false)?; // Reserved.

    match header.block_id {
        BlockId::Frames(frame_number) => {
            if u64::from(frame_number) > MAX_FRAME_NUMBER {
                return invalid_input_error("frame number exceeds 31 bits");
            }
            bw.write_utf8_u64(u64::from(frame_number))?;
        }
        BlockId::Samples(sample_number) => {
            if sample_number > MAX_SAMPLE_NUMBER {
                return invalid_input_error("sample number exceeds 36 bits");
            }
            bw.write_utf8_u64(sample_number)?;
        }
    }

    if block_size_tail_bits > 0 {
        bw.write_bits_leq32(u32::from(header.block_size) - 1, block_size_tail_bits)?;
    }

    match sample_rate_tail {
        SampleRateTail::None => (),
        SampleRateTail::KHz => bw.write_bits_leq32(header.sample_rate / 1000, 8)?,
        SampleRateTail::Hz => bw.write_bits_leq32(header.sample_rate, 16)?,
        SampleRateTail::TensOfHz => bw.write_bits_leq32(header.sample_rate / 10, 16)?,
    }

    debug_assert!(bw.is_byte_aligned());
    drop(bw);

    let crc8 = crc8_stream.monitor().crc();
    crc8_stream.into_inner().write_u8(crc8)?;

    Ok(())
}

fn write_subframe<W: WriteBytes>(
    bw: &mut BitWriterLtr<'_, W>,
    subframe: &Subframe,
    bps: u32,
    block_size: u16,
) -> Result<()> {
    if subframe.wasted_bits >= bps {
        return invalid_input_error("wasted bits exceed the sample width");
    }

    // Samples within the subframe are coded with the truncated width.
    let bps = bps - subframe.wasted_bits;

    let type_bits = match subframe.body {
        SubframeBody::Constant { .. } => 0x00,
        SubframeBody::Verbatim { .. } => 0x01,
        SubframeBody::Fixed { order, .. } => {
            if order > 4 {
                return invalid_input_error("fixed predictor order exceeds 4");
            }
            0x08 | u32::from(order)
        }
        SubframeBody::Lpc { order, .. } => {
            if order < 1 || order > 32 {
                return invalid_input_error("lpc predictor order is out of bounds");
            }
            0x20 | (u32::from(order) - 1)
        }
    };

    bw.write_bit(false)?;
    bw.write_bits_leq32(type_bits, 6)?;

    if subframe.wasted_bits > 0 {
        bw.write_bit(true)?;
        bw.write_unary_zeros(u64::from(subframe.wasted_bits) - 1)?;
    }
    else {
        bw.write_bit(false)?;
    }

    match subframe.body {
        SubframeBody::Constant { value } => {
            bw.write_bits_leq64_signed(value, bps)?;
        }
        SubframeBody::Verbatim { ref samples } => {
            if samples.len() != usize::from(block_size) {
                return invalid_input_error("verbatim sample count does not match block size");
            }

            for &sample in samples {
                bw.write_bits_leq64_signed(sample, bps)?;
            }
        }
        SubframeBody::Fixed { order, ref warmup, ref residual } => {
            if warmup.len() != usize::from(order) {
                return invalid_input_error("warmup sample count does not match the order");
            }

            for &sample in warmup {
                bw.write_bits_leq64_signed(sample, bps)?;
            }

            write_residual(bw, residual, u32::from(order), block_size)?;
        }
        SubframeBody::Lpc {
            order,
            qlp_precision,
            qlp_shift,
            ref qlp_coeffs,
            ref warmup,
            ref residual,
        } => {
            if warmup.len() != usize::from(order) {
                return invalid_input_error("warmup sample count does not match the order");
            }

            if qlp_precision < 1 || qlp_precision > 15 {
                return invalid_input_error("qlp precision is out of bounds");
            }

            if qlp_shift < 0 || qlp_shift > 15 {
                return invalid_input_error("qlp shift is out of bounds");
            }

            if qlp_coeffs.len() != usize::from(order) {
                return invalid_input_error("qlp coefficient count does not match the order");
            }

            for &sample in warmup {
                bw.write_bits_leq64_signed(sample, bps)?;
            }

            bw.write_bits_leq32(qlp_precision - 1, 4)?;
            bw.write_bits_leq32_signed(qlp_shift, 5)?;

            for &coeff in qlp_coeffs {
                bw.write_bits_leq32_signed(coeff, qlp_precision)?;
            }

            write_residual(bw, residual, u32::from(order), block_size)?;
        }
    }

    Ok(())
}

fn write_residual<W: WriteBytes>(
    bw: &mut BitWriterLtr<'_, W>,
    residual: &Residual,
    predictor_order: u32,
    block_size: u16,
) -> Result<()> {
    let method_enc = match residual.method {
        ResidualMethod::PartitionedRice => 0x0,
        ResidualMethod::PartitionedRice2 => 0x1,
    };

    let partition_order = u32::from(residual.partition_order);

    let num_partitions = 1usize << partition_order;
    let partition_samples = usize::from(block_size) >> partition_order;

    if partition_samples < predictor_order as usize {
        return invalid_input_error("residual partition is smaller than the predictor order");
    }

    if num_partitions * partition_samples != usize::from(block_size) {
        return invalid_input_error("residual partitions do not cover the block");
    }

    if residual.partitions.len() != num_partitions {
        return invalid_input_error("residual partition count does not match the order");
    }

    if residual.residuals.len() != usize::from(block_size) - predictor_order as usize {
        return invalid_input_error("residual sample count does not match the block size");
    }

    bw.write_bits_leq32(method_enc, 2)?;
    bw.write_bits_leq32(partition_order, 4)?;

    let param_len = residual.method.parameter_len();
    let escape = residual.method.escape_parameter();

    let mut samples = residual.residuals.as_slice();

    for (part, partition) in residual.partitions.iter().enumerate() {
        let num_samples = if part == 0 {
            partition_samples - predictor_order as usize
        }
        else {
            partition_samples
        };

        let (chunk, rest) = samples.split_at(num_samples);
        samples = rest;

        match *partition {
            RicePartition::Coded { parameter } => {
                if u32::from(parameter) >= escape {
                    return invalid_input_error("rice parameter is out of bounds");
                }

                bw.write_bits_leq32(u32::from(parameter), param_len)?;

                for &value in chunk {
                    bw.write_rice_signed(value, u32::from(parameter))?;
                }
            }
            RicePartition::Escape { bit_width } => {
                if bit_width > 31 {
                    return invalid_input_error("escape partition bit width is out of bounds");
                }

                bw.write_bits_leq32(escape, param_len)?;
                bw.write_bits_leq32(u32::from(bit_width), 5)?;

                for &value in chunk {
                    bw.write_bits_leq64_signed(value, u32::from(bit_width))?;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{sample_rate_encoding, write_frame, SampleRateTail};
    use crate::frame::{
        BlockId, ChannelAssignment, Frame, FrameFooter, FrameHeader, Residual, ResidualMethod,
        RicePartition, Subframe, SubframeBody,
    };
    use crate::metadata::StreamInfo;
    use cadenza_core::io::ByteBuf;

    fn test_stream_info() -> StreamInfo {
        StreamInfo {
            min_block_size: 192,
            max_block_size: 192,
            min_frame_size: 0,
            max_frame_size: 0,
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 16,
            total_samples: 192,
            md5: [0; 16],
        }
    }

    #[test]
    fn verify_sample_rate_encoding() {
        assert_eq!(sample_rate_encoding(0), Some((0x0, SampleRateTail::None)));
        assert_eq!(sample_rate_encoding(44100), Some((0x9, SampleRateTail::None)));
        assert_eq!(sample_rate_encoding(11000), Some((0xc, SampleRateTail::KHz)));
        assert_eq!(sample_rate_encoding(11025), Some((0xd, SampleRateTail::Hz)));
        assert_eq!(sample_rate_encoding(655350), Some((0xe, SampleRateTail::TensOfHz)));
        assert_eq!(sample_rate_encoding(655351), None);
        assert_eq!(sample_rate_encoding(655345), None);
    }

    #[test]
    fn verify_frame_header_encoding() {
        // A 192 sample, 44.1 kHz, mid/side, 16-bit frame must use the table codes 0b0001,
        // 0b1001, 0b1010, and 0b100.
        let frame = Frame {
            header: FrameHeader {
                block_id: BlockId::Frames(0),
                block_size: 192,
                sample_rate: 44100,
                channel_assignment: ChannelAssignment::MidSide,
                bits_per_sample: 16,
                crc8: 0,
            },
            subframes: vec![
                Subframe { wasted_bits: 0, body: SubframeBody::Constant { value: 0 } },
                Subframe {
                    wasted_bits: 0,
                    body: SubframeBody::Fixed {
                        order: 1,
                        warmup: vec![0],
                        residual: Residual {
                            method: ResidualMethod::PartitionedRice,
                            partition_order: 0,
                            partitions: vec![RicePartition::Coded { parameter: 0 }],
                            residuals: vec![0; 191],
                        },
                    },
                },
            ],
            footer: FrameFooter { crc16: 0 },
        };

        let mut buf = ByteBuf::new();
        write_frame(&mut buf, &frame, &test_stream_info()).unwrap();

        let bytes = buf.into_inner();

        // Sync code and blocking strategy.
        assert_eq!(bytes[0], 0xff);
        assert_eq!(bytes[1], 0xf8);
        // Block size and sample rate codes.
        assert_eq!(bytes[2], 0b0001_1001);
        // Channel assignment, sample size, and reserved bit.
        assert_eq!(bytes[3], 0b1010_100_0);
        // Frame number 0.
        assert_eq!(bytes[4], 0x00);

        // The CRC-8 spans every header byte before it.
        let mut crc8 = cadenza_core::checksum::Crc8Ccitt::new(0);
        cadenza_core::io::Monitor::process_buf_bytes(&mut crc8, &bytes[0..5]);
        assert_eq!(bytes[5], crc8.crc());
    }
}
