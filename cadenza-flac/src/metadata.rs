// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `metadata` module defines the FLAC metadata blocks.
//!
//! Only the stream information block is interpreted. All other block bodies round-trip as
//! opaque bytes: their headers are parsed, but their payloads are carried through unchanged.

use cadenza_core::errors::{invariant_error, Result};
use cadenza_core::io::{BitStreamLtr, BitWriterLtr, ReadBitsLtr, ReadBytes, WriteBytes};

/// The encoded length of a stream information block body in bytes.
pub const STREAM_INFO_BLOCK_LEN: u32 = 34;

/// The stream information block. Always the first metadata block of a stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamInfo {
    /// The minimum and maximum number of samples per block coded in the stream.
    pub min_block_size: u16,
    pub max_block_size: u16,
    /// The minimum and maximum encoded frame size in bytes. Either value may be 0 if unknown.
    pub min_frame_size: u32,
    pub max_frame_size: u32,
    /// The sample rate in Hz.
    pub sample_rate: u32,
    /// The number of channels, 1 to 8.
    pub channels: u32,
    /// The number of bits per sample, 4 to 32.
    pub bits_per_sample: u32,
    /// The total number of samples per channel, or 0 if unknown.
    pub total_samples: u64,
    /// The MD5 signature of the unencoded audio data.
    pub md5: [u8; 16],
}

impl StreamInfo {
    /// Read a stream information block body.
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<StreamInfo> {
        let start = reader.pos();

        let mut bs = BitStreamLtr::new(reader);

        let mut info = StreamInfo {
            min_block_size: bs.read_bits_leq32(16)? as u16,
            max_block_size: bs.read_bits_leq32(16)? as u16,
            min_frame_size: bs.read_bits_leq32(24)?,
            max_frame_size: bs.read_bits_leq32(24)?,
            sample_rate: bs.read_bits_leq32(20)?,
            channels: bs.read_bits_leq32(3)? + 1,
            bits_per_sample: bs.read_bits_leq32(5)? + 1,
            total_samples: bs.read_bits_leq64(36)?,
            md5: [0; 16],
        };

        for byte in info.md5.iter_mut() {
            *byte = bs.read_bits_leq32(8)? as u8;
        }

        if info.min_block_size < 16 || info.max_block_size < 16 {
            return invariant_error(start, "stream info block size is less than 16 samples");
        }

        if info.min_block_size > info.max_block_size {
            return invariant_error(start, "stream info minimum block size exceeds the maximum");
        }

        if info.sample_rate < 1 || info.sample_rate > super::frame::MAX_SAMPLE_RATE {
            return invariant_error(start, "stream info sample rate is out of bounds");
        }

        if info.bits_per_sample < 4 {
            return invariant_error(start, "stream info bits per sample is out of bounds");
        }

        Ok(info)
    }

    /// Write a stream information block body.
    pub fn write<W: WriteBytes>(&self, writer: &mut W) -> Result<()> {
        let mut bw = BitWriterLtr::new(writer);

        bw.write_bits_leq32(u32::from(self.min_block_size), 16)?;
        bw.write_bits_leq32(u32::from(self.max_block_size), 16)?;
        bw.write_bits_leq32(self.min_frame_size, 24)?;
        bw.write_bits_leq32(self.max_frame_size, 24)?;
        bw.write_bits_leq32(self.sample_rate, 20)?;
        bw.write_bits_leq32(self.channels - 1, 3)?;
        bw.write_bits_leq32(self.bits_per_sample - 1, 5)?;
        bw.write_bits_leq64(self.total_samples, 36)?;

        for &byte in self.md5.iter() {
            bw.write_bits_leq32(u32::from(byte), 8)?;
        }

        debug_assert!(bw.is_byte_aligned());

        Ok(())
    }
}

/// The body of a metadata block.
///
/// Bodies other than `StreamInfo` and `Padding` are opaque: the stored payload bytes are kept
/// verbatim so that the block round-trips bit-exactly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataBody {
    StreamInfo(StreamInfo),
    Padding { length: u32 },
    Application { data: Box<[u8]> },
    SeekTable { data: Box<[u8]> },
    VorbisComment { data: Box<[u8]> },
    CueSheet { data: Box<[u8]> },
    Picture { data: Box<[u8]> },
    Unknown { block_type: u8, data: Box<[u8]> },
}

impl MetadataBody {
    /// Gets the stored block type code.
    pub fn block_type(&self) -> u8 {
        match *self {
            MetadataBody::StreamInfo(_) => 0,
            MetadataBody::Padding { .. } => 1,
            MetadataBody::Application { .. } => 2,
            MetadataBody::SeekTable { .. } => 3,
            MetadataBody::VorbisComment { .. } => 4,
            MetadataBody::CueSheet { .. } => 5,
            MetadataBody::Picture { .. } => 6,
            MetadataBody::Unknown { block_type, .. } => block_type,
        }
    }

    /// Gets the encoded length of the block body in bytes.
    pub fn len(&self) -> u32 {
        match *self {
            MetadataBody::StreamInfo(_) => STREAM_INFO_BLOCK_LEN,
            MetadataBody::Padding { length } => length,
            MetadataBody::Application { ref data }
            | MetadataBody::SeekTable { ref data }
            | MetadataBody::VorbisComment { ref data }
            | MetadataBody::CueSheet { ref data }
            | MetadataBody::Picture { ref data }
            | MetadataBody::Unknown { ref data, .. } => data.len() as u32,
        }
    }

    /// Returns true if the block body is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gets a human-readable name of the block type.
    pub fn name(&self) -> &'static str {
        match *self {
            MetadataBody::StreamInfo(_) => "STREAMINFO",
            MetadataBody::Padding { .. } => "PADDING",
            MetadataBody::Application { .. } => "APPLICATION",
            MetadataBody::SeekTable { .. } => "SEEKTABLE",
            MetadataBody::VorbisComment { .. } => "VORBIS_COMMENT",
            MetadataBody::CueSheet { .. } => "CUESHEET",
            MetadataBody::Picture { .. } => "PICTURE",
            MetadataBody::Unknown { .. } => "UNKNOWN",
        }
    }
}

/// A metadata block: a small header followed by a typed body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataBlock {
    /// True if this block is the last before the audio frames.
    pub is_last: bool,
    pub body: MetadataBody,
}

#[cfg(test)]
mod tests {
    use super::StreamInfo;
    use cadenza_core::io::{BufReader, ByteBuf};

    fn test_info() -> StreamInfo {
        StreamInfo {
            min_block_size: 4096,
            max_block_size: 4096,
            min_frame_size: 14,
            max_frame_size: 7698,
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 16,
            total_samples: 1_234_567,
            md5: [0xab; 16],
        }
    }

    #[test]
    fn verify_stream_info_roundtrip() {
        let info = test_info();

        let mut buf = ByteBuf::new();
        info.write(&mut buf).unwrap();

        let bytes = buf.into_inner();
        assert_eq!(bytes.len(), super::STREAM_INFO_BLOCK_LEN as usize);

        let parsed = StreamInfo::read(&mut BufReader::new(&bytes)).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn verify_stream_info_rejects_small_block() {
        let mut info = test_info();
        info.min_block_size = 8;

        let mut buf = ByteBuf::new();
        info.write(&mut buf).unwrap();

        assert!(StreamInfo::read(&mut BufReader::new(&buf.into_inner())).is_err());
    }
}
