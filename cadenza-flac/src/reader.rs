// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `reader` module parses a FLAC byte stream into the typed frame graph.

use cadenza_core::checksum::{Crc16Ansi, Crc8Ccitt};
use cadenza_core::errors::{
    bad_magic_error, crc_mismatch_error, end_of_stream_error, invalid_bits_error,
    invariant_error, Result,
};
use cadenza_core::io::{BitStreamLtr, BufReader, MonitorStream, ReadBitsLtr, ReadBytes};

use log::{debug, warn};

use crate::frame::{
    BlockId, ChannelAssignment, Frame, FrameFooter, FrameHeader, FrameIntegrity, Residual,
    ResidualMethod, RicePartition, Subframe, SubframeBody, FLAC_STREAM_MARKER,
    FRAME_HEADER_SYNC, MAX_FRAME_NUMBER, MAX_SAMPLE_RATE,
};
use crate::metadata::{MetadataBlock, MetadataBody, StreamInfo, STREAM_INFO_BLOCK_LEN};

/// A fully parsed FLAC stream: the stream information, the metadata chain, and every frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlacStream {
    /// The mandatory stream information block.
    pub stream_info: StreamInfo,
    /// All metadata blocks in stream order, including the stream information block.
    pub metadata: Vec<MetadataBlock>,
    /// All audio frames in stream order.
    pub frames: Vec<Frame>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReaderState {
    PendingMetadata,
    ReadingFrames,
    EndOfStream,
}

/// `FlacReader` incrementally parses a FLAC byte stream.
///
/// The reader starts in the metadata phase; once the last metadata block has been consumed it
/// transitions to the frame phase, and finally to end-of-stream when the cursor reaches the
/// end of the input. Any parse error is terminal.
pub struct FlacReader<'a> {
    reader: BufReader<'a>,
    state: ReaderState,
    stream_info: Option<StreamInfo>,
}

impl<'a> FlacReader<'a> {
    /// Instantiate a new `FlacReader`, verifying the stream marker.
    pub fn new(buf: &'a [u8]) -> Result<FlacReader<'a>> {
        let mut reader = BufReader::new(buf);

        let mut marker = [0u8; 4];
        reader.read_buf_exact(&mut marker)?;

        if marker != FLAC_STREAM_MARKER {
            return bad_magic_error(0);
        }

        Ok(FlacReader { reader, state: ReaderState::PendingMetadata, stream_info: None })
    }

    /// Gets the stream information block, if it has been parsed yet.
    pub fn stream_info(&self) -> Option<&StreamInfo> {
        self.stream_info.as_ref()
    }

    /// Reads the next metadata block, or returns `None` once the metadata chain is exhausted.
    pub fn next_metadata(&mut self) -> Result<Option<MetadataBlock>> {
        if self.state != ReaderState::PendingMetadata {
            return Ok(None);
        }

        let block = read_metadata_block(&mut self.reader)?;

        if self.stream_info.is_none() {
            match block.body {
                MetadataBody::StreamInfo(ref info) => self.stream_info = Some(info.clone()),
                _ => {
                    return invariant_error(4, "first metadata block must be stream information")
                }
            }
        }

        debug!(
            "metadata block: type={}, is_last={}, length={}",
            block.body.name(),
            block.is_last,
            block.body.len()
        );

        if block.is_last {
            self.state = if self.reader.bytes_available() > 0 {
                ReaderState::ReadingFrames
            }
            else {
                ReaderState::EndOfStream
            };
        }

        Ok(Some(block))
    }

    /// Reads the next frame along with the outcome of its CRC-16 verification, or returns
    /// `None` once the input is exhausted.
    ///
    /// Any metadata blocks still pending are consumed first.
    pub fn next_frame(&mut self) -> Result<Option<(Frame, FrameIntegrity)>> {
        while self.state == ReaderState::PendingMetadata {
            self.next_metadata()?;
        }

        if self.state == ReaderState::EndOfStream {
            return Ok(None);
        }

        if self.reader.bytes_available() == 0 {
            self.state = ReaderState::EndOfStream;
            return Ok(None);
        }

        // The state machine guarantees the stream information block was parsed before any
        // frame is read.
        let stream_info = match self.stream_info {
            Some(ref info) => info.clone(),
            None => return invariant_error(4, "stream contains no stream information block"),
        };

        let result = read_frame(&mut self.reader, &stream_info)?;

        if self.reader.bytes_available() == 0 {
            self.state = ReaderState::EndOfStream;
        }

        Ok(Some(result))
    }
}

/// Parses an entire FLAC stream.
///
/// A frame whose footer CRC-16 does not match is kept with a warning; all other parse errors
/// abort the stream.
pub fn read_stream(buf: &[u8]) -> Result<FlacStream> {
    let mut reader = FlacReader::new(buf)?;

    let mut metadata = Vec::new();

    while let Some(block) = reader.next_metadata()? {
        metadata.push(block);
    }

    let stream_info = match reader.stream_info() {
        Some(info) => info.clone(),
        None => return invariant_error(4, "stream contains no stream information block"),
    };

    let mut frames = Vec::new();

    while let Some((frame, integrity)) = reader.next_frame()? {
        if let FrameIntegrity::CrcMismatch { stored, computed } = integrity {
            warn!(
                "frame {} failed checksum verification: stored {:#06x}, computed {:#06x}",
                frames.len(),
                stored,
                computed
            );
        }

        frames.push(frame);
    }

    Ok(FlacStream { stream_info, metadata, frames })
}

fn read_metadata_block(reader: &mut BufReader<'_>) -> Result<MetadataBlock> {
    let header_pos = reader.pos();

    let desc = reader.read_u8()?;

    let is_last = desc & 0x80 != 0;
    let block_type = desc & 0x7f;

    if block_type == 0x7f {
        return invalid_bits_error(header_pos, "invalid metadata block type");
    }

    let length = reader.read_be_u24()?;

    let body_pos = reader.pos();

    if u64::from(length) > reader.bytes_available() {
        return end_of_stream_error(body_pos);
    }

    let body = match block_type {
        0 => {
            if length < STREAM_INFO_BLOCK_LEN {
                return invariant_error(body_pos, "stream information block is too short");
            }
            MetadataBody::StreamInfo(StreamInfo::read(reader)?)
        }
        1 => MetadataBody::Padding { length },
        2 => MetadataBody::Application { data: reader.read_boxed_slice_exact(length as usize)? },
        3 => MetadataBody::SeekTable { data: reader.read_boxed_slice_exact(length as usize)? },
        4 => {
            MetadataBody::VorbisComment { data: reader.read_boxed_slice_exact(length as usize)? }
        }
        5 => MetadataBody::CueSheet { data: reader.read_boxed_slice_exact(length as usize)? },
        6 => MetadataBody::Picture { data: reader.read_boxed_slice_exact(length as usize)? },
        _ => MetadataBody::Unknown {
            block_type,
            data: reader.read_boxed_slice_exact(length as usize)?,
        },
    };

    // Always continue at the end of the declared block body, regardless of how many bytes the
    // body decoder consumed. Unknown trailing fields within a block are skipped here.
    reader.seek_buffered(body_pos + u64::from(length));

    Ok(MetadataBlock { is_last, body })
}

fn read_frame(
    reader: &mut BufReader<'_>,
    stream_info: &StreamInfo,
) -> Result<(Frame, FrameIntegrity)> {
    // The whole frame, from the first sync byte up to (but excluding) the footer, is covered by
    // a CRC-16.
    let mut crc16_stream = MonitorStream::new(reader, Crc16Ansi::new(0));

    let header = read_frame_header(&mut crc16_stream)?;

    let bps = if header.bits_per_sample != 0 {
        header.bits_per_sample
    }
    else {
        stream_info.bits_per_sample
    };

    let num_channels = header.channel_assignment.num_channels() as usize;

    let mut subframes = Vec::with_capacity(num_channels);

    {
        let mut bs = BitStreamLtr::new(&mut crc16_stream);

        for channel in 0..num_channels {
            let channel_bps = header.channel_assignment.channel_bps(channel, bps);
            subframes.push(read_subframe(&mut bs, channel_bps, header.block_size)?);
        }

        // Subframes are padded with zero bits up to the next byte boundary before the footer.
        bs.realign();
    }

    let computed = crc16_stream.monitor().crc();

    // The stored footer CRC is not part of the checksummed region, so read it from the inner
    // stream directly.
    let stored = crc16_stream.into_inner().read_be_u16()?;

    let integrity = if stored == computed {
        FrameIntegrity::Valid
    }
    else {
        FrameIntegrity::CrcMismatch { stored, computed }
    };

    let frame = Frame { header, subframes, footer: FrameFooter { crc16: stored } };

    Ok((frame, integrity))
}

fn read_frame_header<B: ReadBytes>(reader: &mut B) -> Result<FrameHeader> {
    let start = reader.pos();

    // The frame header, excluding the trailing CRC byte itself, is covered by a CRC-8.
    let mut crc8_stream = MonitorStream::new(reader, Crc8Ccitt::new(0));

    let mut bs = BitStreamLtr::new(&mut crc8_stream);

    if bs.read_bits_leq32(14)? != FRAME_HEADER_SYNC {
        return invalid_bits_error(start, "bad frame synchronization code");
    }

    if bs.read_bit()? {
        return invalid_bits_error(start, "frame header reserved bit is not zero");
    }

    let is_sample_number = bs.read_bit()?;

    let block_size_enc = bs.read_bits_leq32(4)?;
    let sample_rate_enc = bs.read_bits_leq32(4)?;
    let channels_enc = bs.read_bits_leq32(4)?;
    let bps_enc = bs.read_bits_leq32(3)?;

    if bs.read_bit()? {
        return invalid_bits_error(start, "frame header reserved bit is not zero");
    }

    let number = bs.read_utf8_u64()?;

    let block_id = if is_sample_number {
        // The UTF-8 integer codec already bounds the value to 36 bits.
        BlockId::Samples(number)
    }
    else {
        if number > MAX_FRAME_NUMBER {
            return invariant_error(start, "frame number exceeds 31 bits");
        }
        BlockId::Frames(number as u32)
    };

    let block_size = match block_size_enc {
        0x0 => return invariant_error(start, "block size set to reserved value"),
        0x1 => 192,
        0x2..=0x5 => 576 * (1 << (block_size_enc - 2)),
        0x6 => bs.read_bits_leq32(8)? + 1,
        0x7 => {
            let stored = bs.read_bits_leq32(16)?;
            if stored == 0xffff {
                return invariant_error(start, "block size exceeds 65535 samples");
            }
            stored + 1
        }
        0x8..=0xf => 256 * (1 << (block_size_enc - 8)),
        _ => unreachable!(),
    };

    if block_size < 16 {
        return invariant_error(start, "block size is less than 16 samples");
    }

    let sample_rate = match sample_rate_enc {
        0x0 => 0, // Take from the stream information block.
        0x1 => 88_200,
        0x2 => 176_400,
        0x3 => 192_000,
        0x4 => 8_000,
        0x5 => 16_000,
        0x6 => 22_050,
        0x7 => 24_000,
        0x8 => 32_000,
        0x9 => 44_100,
        0xa => 48_000,
        0xb => 96_000,
        0xc => bs.read_bits_leq32(8)? * 1000,
        0xd => bs.read_bits_leq32(16)?,
        0xe => bs.read_bits_leq32(16)? * 10,
        _ => return invalid_bits_error(start, "sample rate set to invalid value"),
    };

    if sample_rate_enc != 0 && (sample_rate < 1 || sample_rate > MAX_SAMPLE_RATE) {
        return invariant_error(start, "sample rate is out of bounds");
    }

    let channel_assignment = match channels_enc {
        0x0..=0x7 => ChannelAssignment::Independent(channels_enc + 1),
        0x8 => ChannelAssignment::LeftSide,
        0x9 => ChannelAssignment::RightSide,
        0xa => ChannelAssignment::MidSide,
        _ => return invalid_bits_error(start, "channel assignment set to reserved value"),
    };

    let bits_per_sample = match bps_enc {
        0x0 => 0, // Take from the stream information block.
        0x1 => 8,
        0x2 => 12,
        0x4 => 16,
        0x5 => 20,
        0x6 => 24,
        _ => return invalid_bits_error(start, "sample size set to reserved value"),
    };

    debug_assert!(bs.is_byte_aligned());
    drop(bs);

    let computed = crc8_stream.monitor().crc();

    let crc_pos = crc8_stream.pos();
    let stored = crc8_stream.into_inner().read_u8()?;

    if stored != computed {
        return crc_mismatch_error(crc_pos, "frame header checksum does not match");
    }

    Ok(FrameHeader {
        block_id,
        block_size: block_size as u16,
        sample_rate,
        channel_assignment,
        bits_per_sample,
        crc8: stored,
    })
}

fn read_subframe<B: ReadBitsLtr>(bs: &mut B, bps: u32, block_size: u16) -> Result<Subframe> {
    let start = bs.pos();

    if bs.read_bit()? {
        return invalid_bits_error(start, "subframe padding bit is not zero");
    }

    let type_bits = bs.read_bits_leq32(6)?;

    let wasted_bits = {
        // A set wasted-bits flag is followed by a unary count, offset by one.
        if bs.read_bit()? {
            bs.read_unary_zeros()? + 1
        }
        else {
            0
        }
    };

    if wasted_bits >= bps {
        return invariant_error(start, "wasted bits exceed the sample width");
    }

    // Samples within the subframe are coded with the truncated width.
    let bps = bps - wasted_bits;

    let body = match type_bits {
        0x00 => SubframeBody::Constant { value: bs.read_bits_leq64_signed(bps)? },
        0x01 => {
            let mut samples = Vec::with_capacity(usize::from(block_size));
            for _ in 0..block_size {
                samples.push(bs.read_bits_leq64_signed(bps)?);
            }
            SubframeBody::Verbatim { samples }
        }
        0x08..=0x0f => {
            let order = type_bits & 0x07;
            if order > 4 {
                return invariant_error(start, "fixed predictor order exceeds 4");
            }

            let mut warmup = Vec::with_capacity(order as usize);
            for _ in 0..order {
                warmup.push(bs.read_bits_leq64_signed(bps)?);
            }

            let residual = read_residual(bs, order, block_size)?;

            SubframeBody::Fixed { order: order as u8, warmup, residual }
        }
        0x20..=0x3f => {
            let order = (type_bits & 0x1f) + 1;

            let mut warmup = Vec::with_capacity(order as usize);
            for _ in 0..order {
                warmup.push(bs.read_bits_leq64_signed(bps)?);
            }

            let precision_enc = bs.read_bits_leq32(4)?;
            if precision_enc == 0xf {
                return invalid_bits_error(start, "qlp precision set to invalid value");
            }
            let qlp_precision = precision_enc + 1;

            let qlp_shift = bs.read_bits_leq32_signed(5)?;
            if qlp_shift < 0 {
                return invalid_bits_error(start, "negative qlp shift is not supported");
            }

            let mut qlp_coeffs = Vec::with_capacity(order as usize);
            for _ in 0..order {
                qlp_coeffs.push(bs.read_bits_leq32_signed(qlp_precision)?);
            }

            let residual = read_residual(bs, order, block_size)?;

            SubframeBody::Lpc {
                order: order as u8,
                qlp_precision,
                qlp_shift,
                qlp_coeffs,
                warmup,
                residual,
            }
        }
        _ => return invalid_bits_error(start, "subframe type set to reserved value"),
    };

    Ok(Subframe { wasted_bits, body })
}

fn read_residual<B: ReadBitsLtr>(
    bs: &mut B,
    predictor_order: u32,
    block_size: u16,
) -> Result<Residual> {
    let start = bs.pos();

    let method = match bs.read_bits_leq32(2)? {
        0x0 => ResidualMethod::PartitionedRice,
        0x1 => ResidualMethod::PartitionedRice2,
        _ => return invalid_bits_error(start, "residual coding method set to reserved value"),
    };

    let partition_order = bs.read_bits_leq32(4)?;

    let num_partitions = 1usize << partition_order;
    let partition_samples = usize::from(block_size) >> partition_order;

    // The first partition cedes `predictor_order` samples to the warmup, so every partition
    // must hold at least that many, and the partitions must tile the block exactly.
    if partition_samples < predictor_order as usize {
        return invariant_error(start, "residual partition is smaller than the predictor order");
    }

    if num_partitions * partition_samples != usize::from(block_size) {
        return invariant_error(start, "residual partitions do not cover the block");
    }

    let param_len = method.parameter_len();
    let escape = method.escape_parameter();

    let mut partitions = Vec::with_capacity(num_partitions);
    let mut residuals =
        Vec::with_capacity(usize::from(block_size) - predictor_order as usize);

    for part in 0..num_partitions {
        let num_samples = if part == 0 {
            partition_samples - predictor_order as usize
        }
        else {
            partition_samples
        };

        let parameter = bs.read_bits_leq32(param_len)?;

        if parameter != escape {
            partitions.push(RicePartition::Coded { parameter: parameter as u8 });

            for _ in 0..num_samples {
                residuals.push(bs.read_rice_signed(parameter)?);
            }
        }
        else {
            let bit_width = bs.read_bits_leq32(5)?;
            partitions.push(RicePartition::Escape { bit_width: bit_width as u8 });

            for _ in 0..num_samples {
                residuals.push(bs.read_bits_leq64_signed(bit_width)?);
            }
        }
    }

    Ok(Residual { method, partition_order: partition_order as u8, partitions, residuals })
}
