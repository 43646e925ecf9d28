// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `frame` module defines the typed graph of a FLAC audio frame.

/// The 4-byte stream marker at the start of every FLAC stream.
pub const FLAC_STREAM_MARKER: [u8; 4] = *b"fLaC";

/// The 14-bit synchronization code at the start of every frame header.
pub const FRAME_HEADER_SYNC: u32 = 0x3ffe;

/// The maximum frame sequence number of a fixed-blocksize stream (31 bits).
pub const MAX_FRAME_NUMBER: u64 = 0x7fff_ffff;

/// The maximum sample sequence number of a variable-blocksize stream (36 bits).
pub const MAX_SAMPLE_NUMBER: u64 = 0xf_ffff_ffff;

/// The maximum sample rate representable in a frame header or stream information block.
pub const MAX_SAMPLE_RATE: u32 = 655_350;

/// `ChannelAssignment` describes the mapping between the subframes of a frame and the audio
/// channels their samples belong to. It is also through the `ChannelAssignment` that the
/// decoder is instructed on how to decorrelate stereo channels.
///
/// For LeftSide or RightSide channel assignments, one channel is stored independently while the
/// other stores a difference. The difference is always stored as Left - Right. For the MidSide
/// channel assignment, no channels are stored independently, rather, a Mid (average) channel
/// and a Difference channel are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelAssignment {
    /// All channels are independently coded and no decorrelation step is required.
    Independent(u32),
    /// Channel 0 is the Left channel, and channel 1 is a Difference channel. The Right channel
    /// is restored by subtracting the Difference channel from the Left channel (R = L - D).
    LeftSide,
    /// Channel 0 is the Difference channel, and channel 1 is the Right channel. The Left channel
    /// is restored by adding the Difference channel to the Right channel (L = R + D).
    RightSide,
    /// Channel 0 is the Mid channel (L/2 + R/2), and channel 1 is the Difference channel
    /// (L - R).
    MidSide,
}

impl ChannelAssignment {
    /// Gets the number of channels (and therefore subframes) of a frame with this assignment.
    pub fn num_channels(&self) -> u32 {
        match *self {
            ChannelAssignment::Independent(channels) => channels,
            _ => 2,
        }
    }

    /// Gets the decoded bits per sample of the given channel.
    ///
    /// The difference channel of a decorrelated stereo pair carries one extra bit per sample:
    /// channel 1 for LeftSide and MidSide, channel 0 for RightSide.
    pub fn channel_bps(&self, channel: usize, bps: u32) -> u32 {
        let widened = match *self {
            ChannelAssignment::Independent(_) => false,
            ChannelAssignment::LeftSide | ChannelAssignment::MidSide => channel == 1,
            ChannelAssignment::RightSide => channel == 0,
        };

        if widened {
            bps + 1
        }
        else {
            bps
        }
    }
}

/// `BlockId` sequences a frame within its stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockId {
    /// A fixed-blocksize stream sequences blocks by a frame number of up to 31 bits.
    Frames(u32),
    /// A variable-blocksize stream sequences blocks by the sample number of the first sample in
    /// the frame, up to 36 bits.
    Samples(u64),
}

/// A parsed FLAC frame header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// The frame or starting sample number.
    pub block_id: BlockId,
    /// The number of samples per channel coded by this frame.
    pub block_size: u16,
    /// The sample rate in Hz, or 0 if the stream information block's rate applies.
    pub sample_rate: u32,
    /// The channel assignment of the frame's subframes.
    pub channel_assignment: ChannelAssignment,
    /// The number of bits per sample, or 0 if the stream information block's value applies.
    pub bits_per_sample: u32,
    /// The stored CRC-8 of the frame header. Computed by the writer; recorded by the reader.
    pub crc8: u8,
}

/// `ResidualMethod` selects the bit width of the per-partition Rice parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResidualMethod {
    /// Partitioned Rice coding with 4-bit parameters.
    PartitionedRice,
    /// Partitioned Rice coding with 5-bit parameters.
    PartitionedRice2,
}

impl ResidualMethod {
    /// Gets the bit width of a stored Rice parameter.
    pub fn parameter_len(&self) -> u32 {
        match *self {
            ResidualMethod::PartitionedRice => 4,
            ResidualMethod::PartitionedRice2 => 5,
        }
    }

    /// Gets the parameter value reserved to escape a partition into raw binary coding.
    pub fn escape_parameter(&self) -> u32 {
        (1 << self.parameter_len()) - 1
    }
}

/// One partition of a partitioned Rice coded residual.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RicePartition {
    /// The partition's residuals are Rice coded with the given parameter.
    Coded { parameter: u8 },
    /// The partition escaped Rice coding; residuals are stored as raw two's complement fields
    /// of the given width.
    Escape { bit_width: u8 },
}

/// The entropy coded prediction error of a Fixed or LPC subframe.
///
/// The residual is split into `2^partition_order` partitions. The first partition codes
/// `(block_size >> partition_order) - predictor_order` residuals, every other partition codes
/// `block_size >> partition_order`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Residual {
    pub method: ResidualMethod,
    pub partition_order: u8,
    pub partitions: Vec<RicePartition>,
    /// The `block_size - predictor_order` prediction error samples, in stream order.
    pub residuals: Vec<i64>,
}

/// The prediction model of a subframe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubframeBody {
    /// Every sample of the subframe has the same value.
    Constant { value: i64 },
    /// Samples are stored literally.
    Verbatim { samples: Vec<i64> },
    /// Samples are predicted by a fixed polynomial predictor of order 0 to 4.
    Fixed { order: u8, warmup: Vec<i64>, residual: Residual },
    /// Samples are predicted by a quantized linear predictor of order 1 to 32.
    Lpc {
        order: u8,
        /// The bit precision of the quantized coefficients, 1 to 15.
        qlp_precision: u32,
        /// The right shift applied to the prediction sum. Stored as a signed 5-bit field;
        /// negative shifts are rejected.
        qlp_shift: i32,
        /// The quantized predictor coefficients, most recent sample's first.
        qlp_coeffs: Vec<i32>,
        warmup: Vec<i64>,
        residual: Residual,
    },
}

impl SubframeBody {
    /// Gets the predictor order of the subframe, or 0 for the unpredicted models.
    pub fn order(&self) -> u32 {
        match *self {
            SubframeBody::Constant { .. } | SubframeBody::Verbatim { .. } => 0,
            SubframeBody::Fixed { order, .. } => u32::from(order),
            SubframeBody::Lpc { order, .. } => u32::from(order),
        }
    }
}

/// One channel of one frame, independently predicted and entropy coded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subframe {
    /// The number of low-order zero bits truncated from every sample before coding.
    pub wasted_bits: u32,
    pub body: SubframeBody,
}

/// The frame footer carrying the CRC-16 of all preceding frame bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameFooter {
    /// The stored CRC-16. Computed by the writer; recorded by the reader.
    pub crc16: u16,
}

/// A complete FLAC audio frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    /// One subframe per channel, up to 8.
    pub subframes: Vec<Subframe>,
    pub footer: FrameFooter,
}

/// The outcome of verifying a frame's footer CRC-16 against the frame bytes.
///
/// A mismatch is reported alongside the materialized frame so that the caller may choose to
/// skip the frame or fail the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameIntegrity {
    Valid,
    CrcMismatch { stored: u16, computed: u16 },
}
