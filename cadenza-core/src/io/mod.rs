// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements composable bit- and byte-level I/O.
//!
//! All sources of byte-oriented data implement [`ReadBytes`], and all sinks implement
//! [`WriteBytes`]. Bit-oriented access is layered on top: [`BitStreamLtr`] reads bits
//! most-significant first from any `ReadBytes`, and [`BitWriterLtr`] writes bits
//! most-significant first to any `WriteBytes`.
//!
//! A [`MonitorStream`] may be interposed at any level to observe every byte that passes through
//! a stream without altering positions, e.g. to feed a running checksum. Monitors stack: an
//! outer checksum may span an entire structure while an inner checksum spans only its header.

use crate::errors::Result;

mod bit;
mod buf_reader;
mod byte_buf;
mod monitor_stream;

pub use bit::{BitStreamLtr, BitWriterLtr, ReadBitsLtr};
pub use buf_reader::BufReader;
pub use byte_buf::ByteBuf;
pub use monitor_stream::{Monitor, MonitorStream};

/// `ReadBytes` provides methods to read bytes and interpret them as big-endian unsigned
/// integers of standard widths.
pub trait ReadBytes {
    /// Reads a single byte from the stream and returns it or an error.
    fn read_byte(&mut self) -> Result<u8>;

    /// Reads two bytes from the stream and returns them in read-order or an error.
    fn read_double_bytes(&mut self) -> Result<[u8; 2]>;

    /// Reads three bytes from the stream and returns them in read-order or an error.
    fn read_triple_bytes(&mut self) -> Result<[u8; 3]>;

    /// Reads four bytes from the stream and returns them in read-order or an error.
    fn read_quad_bytes(&mut self) -> Result<[u8; 4]>;

    /// Reads exactly the number of bytes required to fill the provided buffer or returns an
    /// error.
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Reads a single unsigned byte from the stream and returns it or an error.
    #[inline(always)]
    fn read_u8(&mut self) -> Result<u8> {
        self.read_byte()
    }

    /// Reads two bytes from the stream and interprets them as an unsigned 16-bit big-endian
    /// integer or returns an error.
    #[inline(always)]
    fn read_be_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_double_bytes()?))
    }

    /// Reads three bytes from the stream and interprets them as an unsigned 24-bit big-endian
    /// integer or returns an error.
    #[inline(always)]
    fn read_be_u24(&mut self) -> Result<u32> {
        let bytes = self.read_triple_bytes()?;
        Ok(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
    }

    /// Reads four bytes from the stream and interprets them as an unsigned 32-bit big-endian
    /// integer or returns an error.
    #[inline(always)]
    fn read_be_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_quad_bytes()?))
    }

    /// Reads exactly the number of bytes requested, and returns a boxed slice of the data or an
    /// error.
    fn read_boxed_slice_exact(&mut self, len: usize) -> Result<Box<[u8]>> {
        let mut buf = vec![0u8; len];
        self.read_buf_exact(&mut buf)?;
        Ok(buf.into_boxed_slice())
    }

    /// Ignores the specified number of bytes from the stream or returns an error.
    fn ignore_bytes(&mut self, count: u64) -> Result<()>;

    /// Gets the position of the stream.
    fn pos(&self) -> u64;
}

impl<'b, R: ReadBytes> ReadBytes for &'b mut R {
    #[inline(always)]
    fn read_byte(&mut self) -> Result<u8> {
        (*self).read_byte()
    }

    #[inline(always)]
    fn read_double_bytes(&mut self) -> Result<[u8; 2]> {
        (*self).read_double_bytes()
    }

    #[inline(always)]
    fn read_triple_bytes(&mut self) -> Result<[u8; 3]> {
        (*self).read_triple_bytes()
    }

    #[inline(always)]
    fn read_quad_bytes(&mut self) -> Result<[u8; 4]> {
        (*self).read_quad_bytes()
    }

    #[inline(always)]
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        (*self).read_buf_exact(buf)
    }

    #[inline(always)]
    fn ignore_bytes(&mut self, count: u64) -> Result<()> {
        (*self).ignore_bytes(count)
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        (**self).pos()
    }
}

/// `WriteBytes` provides methods to write bytes and big-endian unsigned integers of standard
/// widths.
pub trait WriteBytes {
    /// Writes a single byte to the stream or returns an error.
    fn write_byte(&mut self, byte: u8) -> Result<()>;

    /// Writes the entire buffer to the stream or returns an error.
    fn write_buf(&mut self, buf: &[u8]) -> Result<()>;

    /// Writes a single unsigned byte to the stream or returns an error.
    #[inline(always)]
    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_byte(value)
    }

    /// Writes an unsigned 16-bit big-endian integer to the stream or returns an error.
    #[inline(always)]
    fn write_be_u16(&mut self, value: u16) -> Result<()> {
        self.write_buf(&value.to_be_bytes())
    }

    /// Writes the low 24 bits of an unsigned integer to the stream big-endian or returns an
    /// error.
    #[inline(always)]
    fn write_be_u24(&mut self, value: u32) -> Result<()> {
        self.write_buf(&value.to_be_bytes()[1..4])
    }

    /// Writes an unsigned 32-bit big-endian integer to the stream or returns an error.
    #[inline(always)]
    fn write_be_u32(&mut self, value: u32) -> Result<()> {
        self.write_buf(&value.to_be_bytes())
    }

    /// Gets the position of the stream.
    fn pos(&self) -> u64;
}

impl<'b, W: WriteBytes> WriteBytes for &'b mut W {
    #[inline(always)]
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        (*self).write_byte(byte)
    }

    #[inline(always)]
    fn write_buf(&mut self, buf: &[u8]) -> Result<()> {
        (*self).write_buf(buf)
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        (**self).pos()
    }
}
