// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end round-trip tests over whole FLAC streams.

use cadenza_core::audio::SoundData;
use cadenza_core::errors::CadenzaError;

use cadenza_flac::decoder::decode_stream;
use cadenza_flac::encoder::{encode, encode_parallel, EncoderOptions};
use cadenza_flac::frame::{
    BlockId, ChannelAssignment, Frame, FrameFooter, FrameHeader, FrameIntegrity, Residual,
    ResidualMethod, RicePartition, Subframe, SubframeBody,
};
use cadenza_flac::metadata::{MetadataBlock, MetadataBody, StreamInfo};
use cadenza_flac::reader::{read_stream, FlacReader, FlacStream};
use cadenza_flac::writer::write_stream;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn noise(len: usize, bps: u32, seed: u64) -> Vec<i64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let amplitude = 1i64 << (bps - 1);
    (0..len).map(|_| rng.random_range(-amplitude..amplitude)).collect()
}

fn tone(len: usize, bps: u32, period: f64) -> Vec<i64> {
    let amplitude = ((1i64 << (bps - 1)) - 1) as f64;
    (0..len)
        .map(|i| (amplitude * (i as f64 * std::f64::consts::TAU / period).sin()) as i64)
        .collect()
}

fn mono_stream_info(block_size: u16, bits_per_sample: u32, total_samples: u64) -> StreamInfo {
    StreamInfo {
        min_block_size: block_size,
        max_block_size: block_size,
        min_frame_size: 0,
        max_frame_size: 0,
        sample_rate: 44100,
        channels: 1,
        bits_per_sample,
        total_samples,
        md5: [0; 16],
    }
}

fn mono_stream(stream_info: StreamInfo, frames: Vec<Frame>) -> FlacStream {
    let metadata = vec![MetadataBlock {
        is_last: true,
        body: MetadataBody::StreamInfo(stream_info.clone()),
    }];

    FlacStream { stream_info, metadata, frames }
}

#[test]
fn decode_constant_frame() {
    // A single constant subframe decodes to a block full of one value.
    let stream_info = mono_stream_info(16, 8, 16);

    let frame = Frame {
        header: FrameHeader {
            block_id: BlockId::Frames(0),
            block_size: 16,
            sample_rate: 0,
            channel_assignment: ChannelAssignment::Independent(1),
            bits_per_sample: 0,
            crc8: 0,
        },
        subframes: vec![Subframe {
            wasted_bits: 0,
            body: SubframeBody::Constant { value: 0x2a },
        }],
        footer: FrameFooter { crc16: 0 },
    };

    let bytes = write_stream(&mono_stream(stream_info, vec![frame])).unwrap();

    let sound = decode_stream(&read_stream(&bytes).unwrap()).unwrap();

    assert_eq!(sound.channels, vec![vec![0x2a; 16]]);
}

#[test]
fn encode_ramp_selects_fixed_predictor() {
    // An ascending ramp is annihilated by a low-order difference: a single frame with a fixed
    // subframe, an all-equal residual, and a single Rice partition at parameter 0.
    let sound = SoundData {
        sample_rate: 44100,
        bits_per_sample: 16,
        channels: vec![(0..8192).collect()],
    };

    let options =
        EncoderOptions { block_size: 8192, max_lpc_order: 0, stereo_decorrelation: true };

    let bytes = encode(&sound, &options).unwrap();
    let stream = read_stream(&bytes).unwrap();

    assert_eq!(stream.frames.len(), 1);

    match stream.frames[0].subframes[0].body {
        SubframeBody::Fixed { order, ref residual, .. } => {
            assert!(order >= 1);
            assert_eq!(residual.method, ResidualMethod::PartitionedRice);
            assert_eq!(residual.partition_order, 0);
            assert_eq!(residual.partitions, vec![RicePartition::Coded { parameter: 0 }]);

            let expected = residual.residuals[0];
            assert!(residual.residuals.iter().all(|&r| r == expected));
        }
        ref other => panic!("expected a fixed subframe, got {:?}", other),
    }

    // And the stream must still be lossless.
    let decoded = decode_stream(&stream).unwrap();
    assert_eq!(decoded.channels, sound.channels);
}

#[test]
fn encode_identical_stereo_selects_mid_side() {
    // When both channels carry the same signal, the side channel is identically zero and the
    // mid/side pairing must win with the side coded as a constant.
    let left = tone(4096, 16, 128.0);

    let sound = SoundData {
        sample_rate: 44100,
        bits_per_sample: 16,
        channels: vec![left.clone(), left],
    };

    let bytes = encode(&sound, &EncoderOptions::default()).unwrap();
    let stream = read_stream(&bytes).unwrap();

    for frame in stream.frames.iter() {
        assert_eq!(frame.header.channel_assignment, ChannelAssignment::MidSide);
        assert_eq!(frame.subframes[1].body, SubframeBody::Constant { value: 0 });
    }

    let decoded = decode_stream(&stream).unwrap();
    assert_eq!(decoded.channels, sound.channels);
}

#[test]
fn encoded_stream_is_bit_exact_through_the_graph() {
    // Parsing an encoded stream and re-emitting the graph must reproduce the bytes, and
    // re-parsing must reproduce the graph.
    let sound = SoundData {
        sample_rate: 44100,
        bits_per_sample: 16,
        channels: vec![noise(10000, 16, 1), noise(10000, 16, 2)],
    };

    let bytes = encode(&sound, &EncoderOptions::default()).unwrap();

    let stream = read_stream(&bytes).unwrap();
    let rewritten = write_stream(&stream).unwrap();

    assert_eq!(rewritten, bytes);
    assert_eq!(read_stream(&rewritten).unwrap(), stream);
}

#[test]
fn encode_decode_is_lossless() {
    for (bps, seed) in [(8u32, 3u64), (16, 4), (24, 5)] {
        // Blend noise with a tone so every predictor family gets exercised.
        let mut left = noise(9000, bps, seed);
        let right = noise(9000, bps, seed + 100);

        for (sample, carrier) in left.iter_mut().zip(tone(9000, bps, 64.0)) {
            *sample = (*sample / 4) + (carrier / 2);
        }

        let sound = SoundData {
            sample_rate: 48000,
            bits_per_sample: bps,
            channels: vec![left, right],
        };

        let bytes = encode(&sound, &EncoderOptions::default()).unwrap();
        let decoded = decode_stream(&read_stream(&bytes).unwrap()).unwrap();

        assert_eq!(decoded.sample_rate, 48000);
        assert_eq!(decoded.bits_per_sample, bps);
        assert_eq!(decoded.channels, sound.channels);
    }
}

#[test]
fn reencode_at_stream_block_size_is_idempotent() {
    let sound = SoundData {
        sample_rate: 32000,
        bits_per_sample: 16,
        channels: vec![tone(12000, 16, 300.0)],
    };

    let options = EncoderOptions { block_size: 4096, ..Default::default() };

    let bytes = encode(&sound, &options).unwrap();
    let stream = read_stream(&bytes).unwrap();
    let decoded = decode_stream(&stream).unwrap();

    // Re-encode at the stream's own block size: the decoded matrix must be unchanged, and
    // decoding the re-encoded stream must reproduce the original samples.
    let reencode_options =
        EncoderOptions { block_size: stream.stream_info.max_block_size, ..Default::default() };

    let rebytes = encode(&decoded, &reencode_options).unwrap();
    let redecoded = decode_stream(&read_stream(&rebytes).unwrap()).unwrap();

    assert_eq!(redecoded.channels, sound.channels);
}

#[test]
fn parallel_encode_matches_serial_encode() {
    let sound = SoundData {
        sample_rate: 44100,
        bits_per_sample: 16,
        channels: vec![noise(50000, 16, 7), tone(50000, 16, 441.0)],
    };

    let options = EncoderOptions::default();

    let serial = encode(&sound, &options).unwrap();
    let parallel = encode_parallel(&sound, &options, 4).unwrap();

    assert_eq!(parallel, serial);

    let decoded = decode_stream(&read_stream(&parallel).unwrap()).unwrap();
    assert_eq!(decoded.channels, sound.channels);
}

#[test]
fn multichannel_streams_roundtrip() {
    let channels: Vec<Vec<i64>> =
        (0..6).map(|ch| noise(5000, 16, 40 + ch as u64)).collect();

    let sound = SoundData { sample_rate: 44100, bits_per_sample: 16, channels };

    let bytes = encode(&sound, &EncoderOptions::default()).unwrap();
    let stream = read_stream(&bytes).unwrap();

    for frame in stream.frames.iter() {
        assert_eq!(frame.header.channel_assignment, ChannelAssignment::Independent(6));
    }

    let decoded = decode_stream(&stream).unwrap();
    assert_eq!(decoded.channels, sound.channels);
}

#[test]
fn escape_partitions_roundtrip() {
    // The encoder never produces escape partitions, but the reader and writer must carry them
    // bit-exactly.
    let residuals: Vec<i64> = (0..16).map(|i| (i * 5) % 61 - 30).collect();

    let frame = Frame {
        header: FrameHeader {
            block_id: BlockId::Frames(0),
            block_size: 16,
            sample_rate: 0,
            channel_assignment: ChannelAssignment::Independent(1),
            bits_per_sample: 0,
            crc8: 0,
        },
        subframes: vec![Subframe {
            wasted_bits: 0,
            body: SubframeBody::Fixed {
                order: 0,
                warmup: vec![],
                residual: Residual {
                    method: ResidualMethod::PartitionedRice,
                    partition_order: 0,
                    partitions: vec![RicePartition::Escape { bit_width: 7 }],
                    residuals: residuals.clone(),
                },
            },
        }],
        footer: FrameFooter { crc16: 0 },
    };

    let stream_info = mono_stream_info(16, 8, 16);
    let bytes = write_stream(&mono_stream(stream_info, vec![frame])).unwrap();

    let stream = read_stream(&bytes).unwrap();

    match stream.frames[0].subframes[0].body {
        SubframeBody::Fixed { ref residual, .. } => {
            assert_eq!(residual.partitions, vec![RicePartition::Escape { bit_width: 7 }]);
            assert_eq!(residual.residuals, residuals);
        }
        ref other => panic!("expected a fixed subframe, got {:?}", other),
    }

    assert_eq!(write_stream(&stream).unwrap(), bytes);
}

#[test]
fn wasted_bits_roundtrip() {
    // A verbatim subframe with wasted bits: coded samples are narrowed, decoded samples are
    // restored by the shift.
    let coded: Vec<i64> = (0..16).map(|i| i - 8).collect();

    let frame = Frame {
        header: FrameHeader {
            block_id: BlockId::Frames(0),
            block_size: 16,
            sample_rate: 0,
            channel_assignment: ChannelAssignment::Independent(1),
            bits_per_sample: 0,
            crc8: 0,
        },
        subframes: vec![Subframe {
            wasted_bits: 2,
            body: SubframeBody::Verbatim { samples: coded.clone() },
        }],
        footer: FrameFooter { crc16: 0 },
    };

    let stream_info = mono_stream_info(16, 8, 16);
    let bytes = write_stream(&mono_stream(stream_info, vec![frame])).unwrap();

    let stream = read_stream(&bytes).unwrap();

    assert_eq!(stream.frames[0].subframes[0].wasted_bits, 2);
    assert_eq!(write_stream(&stream).unwrap(), bytes);

    let sound = decode_stream(&stream).unwrap();
    let expected: Vec<i64> = coded.iter().map(|&s| s << 2).collect();
    assert_eq!(sound.channels, vec![expected]);
}

#[test]
fn metadata_chain_roundtrips_opaque_bodies() {
    let stream_info = mono_stream_info(16, 8, 16);

    let frame = Frame {
        header: FrameHeader {
            block_id: BlockId::Frames(0),
            block_size: 16,
            sample_rate: 0,
            channel_assignment: ChannelAssignment::Independent(1),
            bits_per_sample: 0,
            crc8: 0,
        },
        subframes: vec![Subframe {
            wasted_bits: 0,
            body: SubframeBody::Constant { value: 1 },
        }],
        footer: FrameFooter { crc16: 0 },
    };

    let metadata = vec![
        MetadataBlock {
            is_last: false,
            body: MetadataBody::StreamInfo(stream_info.clone()),
        },
        MetadataBlock {
            is_last: false,
            body: MetadataBody::VorbisComment { data: vec![0x10, 0x20, 0x30].into() },
        },
        MetadataBlock {
            is_last: false,
            body: MetadataBody::Unknown { block_type: 107, data: vec![0xaa; 9].into() },
        },
        MetadataBlock { is_last: true, body: MetadataBody::Padding { length: 64 } },
    ];

    let stream = FlacStream { stream_info, metadata, frames: vec![frame] };

    let bytes = write_stream(&stream).unwrap();
    let parsed = read_stream(&bytes).unwrap();

    assert_eq!(parsed.metadata.len(), 4);
    assert_eq!(parsed.metadata, stream.metadata);
    assert_eq!(write_stream(&parsed).unwrap(), bytes);
}

#[test]
fn corrupt_frame_crc_is_reported_with_the_frame() {
    let sound = SoundData {
        sample_rate: 44100,
        bits_per_sample: 16,
        channels: vec![tone(4096, 16, 100.0)],
    };

    let mut bytes = encode(&sound, &EncoderOptions::default()).unwrap();

    // Flip a bit in the stored footer CRC, which is the last field of the only frame.
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;

    let mut reader = FlacReader::new(&bytes).unwrap();

    let (frame, integrity) = reader.next_frame().unwrap().unwrap();

    assert!(matches!(integrity, FrameIntegrity::CrcMismatch { .. }));
    assert_eq!(frame.header.block_size, 4096);
}

#[test]
fn bad_magic_is_rejected() {
    assert!(matches!(
        FlacReader::new(b"fLaX\x00\x00\x00\x00"),
        Err(CadenzaError::BadMagic { offset: 0 })
    ));
}

#[test]
fn truncated_streams_are_rejected() {
    let sound = SoundData {
        sample_rate: 44100,
        bits_per_sample: 16,
        channels: vec![noise(4096, 16, 9)],
    };

    let bytes = encode(&sound, &EncoderOptions::default()).unwrap();

    // Cutting the stream mid-frame must surface an error, not a silent truncation.
    assert!(read_stream(&bytes[..bytes.len() - 40]).is_err());
}
