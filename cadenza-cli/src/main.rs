// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;
use std::thread;

use cadenza_core::errors::{invalid_input_error, Result};

use cadenza_flac::decoder::decode_stream;
use cadenza_flac::encoder::{encode_parallel, EncoderOptions};
use cadenza_flac::frame::{BlockId, FrameIntegrity, Subframe, SubframeBody};
use cadenza_flac::metadata::MetadataBody;
use cadenza_flac::reader::{read_stream, FlacReader};

use clap::{App, AppSettings, Arg, ArgMatches};
use log::info;

mod wav;

fn main() {
    pretty_env_logger::init();

    let matches = App::new("Cadenza")
        .version("0.1.0")
        .about("FLAC codec command-line tools")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            App::new("decode")
                .about("Decode a FLAC file to a WAV file")
                .arg(Arg::new("INPUT").help("The input FLAC file path").required(true).index(1))
                .arg(
                    Arg::new("OUTPUT").help("The output WAV file path").required(true).index(2),
                ),
        )
        .subcommand(
            App::new("encode")
                .about("Encode a WAV file to a FLAC file")
                .arg(
                    Arg::new("block-size")
                        .long("block-size")
                        .short('b')
                        .value_name("SAMPLES")
                        .help("Samples per frame, 16 to 32768")
                        .takes_value(true),
                )
                .arg(
                    Arg::new("max-lpc-order")
                        .long("max-lpc-order")
                        .short('l')
                        .value_name("ORDER")
                        .help("Maximum LPC order to search, 0 to 32 (0 disables LPC)")
                        .takes_value(true),
                )
                .arg(
                    Arg::new("no-mid-side")
                        .long("no-mid-side")
                        .help("Do not evaluate decorrelated stereo channel pairings"),
                )
                .arg(
                    Arg::new("threads")
                        .long("threads")
                        .short('j')
                        .value_name("COUNT")
                        .help("Number of encoder worker threads")
                        .takes_value(true),
                )
                .arg(Arg::new("INPUT").help("The input WAV file path").required(true).index(1))
                .arg(
                    Arg::new("OUTPUT")
                        .help("The output FLAC file path")
                        .required(true)
                        .index(2),
                ),
        )
        .subcommand(
            App::new("dump")
                .about("Print the structure of a FLAC file")
                .arg(Arg::new("INPUT").help("The input FLAC file path").required(true).index(1)),
        )
        .get_matches();

    let result = match matches.subcommand() {
        Some(("decode", matches)) => decode(matches),
        Some(("encode", matches)) => encode(matches),
        Some(("dump", matches)) => dump(matches),
        _ => unreachable!(),
    };

    if let Err(err) = result {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn decode(matches: &ArgMatches) -> Result<()> {
    let input = Path::new(matches.value_of("INPUT").unwrap());
    let output = Path::new(matches.value_of("OUTPUT").unwrap());

    let bytes = fs::read(input)?;

    let stream = read_stream(&bytes)?;
    let sound = decode_stream(&stream)?;

    info!(
        "decoded {} frames, {} samples per channel",
        stream.frames.len(),
        sound.samples_per_channel()
    );

    wav::write_wav(output, &sound)
}

fn encode(matches: &ArgMatches) -> Result<()> {
    let input = Path::new(matches.value_of("INPUT").unwrap());
    let output = Path::new(matches.value_of("OUTPUT").unwrap());

    let mut options = EncoderOptions::default();

    if let Some(value) = matches.value_of("block-size") {
        options.block_size = match value.parse() {
            Ok(block_size) => block_size,
            Err(_) => return invalid_input_error("block size must be an integer"),
        };
    }

    if let Some(value) = matches.value_of("max-lpc-order") {
        options.max_lpc_order = match value.parse() {
            Ok(order) => order,
            Err(_) => return invalid_input_error("lpc order must be an integer"),
        };
    }

    options.stereo_decorrelation = !matches.is_present("no-mid-side");

    let num_workers = match matches.value_of("threads") {
        Some(value) => match value.parse() {
            Ok(count) => count,
            Err(_) => return invalid_input_error("thread count must be an integer"),
        },
        None => thread::available_parallelism().map_or(1, |count| count.get()),
    };

    let sound = wav::read_wav(input)?;

    info!(
        "encoding {} samples per channel, {} channels, {} bits",
        sound.samples_per_channel(),
        sound.num_channels(),
        sound.bits_per_sample
    );

    let bytes = encode_parallel(&sound, &options, num_workers)?;

    fs::write(output, bytes)?;

    Ok(())
}

fn dump(matches: &ArgMatches) -> Result<()> {
    let input = Path::new(matches.value_of("INPUT").unwrap());

    let bytes = fs::read(input)?;

    let mut reader = FlacReader::new(&bytes)?;

    while let Some(block) = reader.next_metadata()? {
        println!("metadata block: {} (is_last={})", block.body.name(), block.is_last);

        match block.body {
            MetadataBody::StreamInfo(ref info) => {
                println!("  block size      : {} .. {}", info.min_block_size, info.max_block_size);
                println!("  frame size      : {} .. {}", info.min_frame_size, info.max_frame_size);
                println!("  sample rate     : {} Hz", info.sample_rate);
                println!("  channels        : {}", info.channels);
                println!("  bits per sample : {}", info.bits_per_sample);
                println!("  total samples   : {}", info.total_samples);
                println!("  md5             : {}", format_md5(&info.md5));
            }
            ref body => {
                println!("  length          : {} bytes", body.len());
            }
        }
    }

    let mut index = 0u64;

    while let Some((frame, integrity)) = reader.next_frame()? {
        let header = &frame.header;

        let number = match header.block_id {
            BlockId::Frames(frame_number) => format!("frame #{}", frame_number),
            BlockId::Samples(sample_number) => format!("sample #{}", sample_number),
        };

        let crc = match integrity {
            FrameIntegrity::Valid => "ok".to_string(),
            FrameIntegrity::CrcMismatch { stored, computed } => {
                format!("MISMATCH (stored {:#06x}, computed {:#06x})", stored, computed)
            }
        };

        println!(
            "frame {}: {}, blocksize={}, rate={}, bps={}, assignment={:?}, crc16={}",
            index,
            number,
            header.block_size,
            header.sample_rate,
            header.bits_per_sample,
            header.channel_assignment,
            crc
        );

        for (channel, subframe) in frame.subframes.iter().enumerate() {
            println!("  subframe {}: {}", channel, describe_subframe(subframe));
        }

        index += 1;
    }

    Ok(())
}

fn format_md5(md5: &[u8; 16]) -> String {
    let mut out = String::with_capacity(32);
    for byte in md5 {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

fn describe_subframe(subframe: &Subframe) -> String {
    let body = match subframe.body {
        SubframeBody::Constant { value } => format!("CONSTANT value={}", value),
        SubframeBody::Verbatim { .. } => "VERBATIM".to_string(),
        SubframeBody::Fixed { order, ref residual, .. } => {
            format!(
                "FIXED order={}, partitions={} ({:?})",
                order,
                residual.partitions.len(),
                residual.method
            )
        }
        SubframeBody::Lpc { order, qlp_precision, qlp_shift, ref residual, .. } => {
            format!(
                "LPC order={}, precision={}, shift={}, partitions={} ({:?})",
                order,
                qlp_precision,
                qlp_shift,
                residual.partitions.len(),
                residual.method
            )
        }
    };

    if subframe.wasted_bits > 0 {
        format!("{}, wasted_bits={}", body, subframe.wasted_bits)
    }
    else {
        body
    }
}
