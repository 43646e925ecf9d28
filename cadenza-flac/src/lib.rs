// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A FLAC (Free Lossless Audio Codec) bitstream codec for Project Cadenza.
//!
//! The codec is organized around a typed frame graph defined by the [`frame`] and [`metadata`]
//! modules. The [`reader`] parses a FLAC byte stream into the graph and the [`writer`]
//! serializes the graph back to a byte-identical stream. The [`decoder`] reconstructs PCM audio
//! from the graph, and the [`encoder`] builds the graph from PCM by searching the predictive
//! models the format offers.

pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod metadata;
pub mod reader;
pub mod writer;
