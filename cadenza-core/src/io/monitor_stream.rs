// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::errors::Result;

use super::{ReadBytes, WriteBytes};

/// A `Monitor` provides a common interface to examine the operations observed by a
/// [`MonitorStream`].
pub trait Monitor {
    fn process_byte(&mut self, byte: u8);

    #[inline(always)]
    fn process_double_bytes(&mut self, buf: [u8; 2]) {
        self.process_byte(buf[0]);
        self.process_byte(buf[1]);
    }

    #[inline(always)]
    fn process_triple_bytes(&mut self, buf: [u8; 3]) {
        self.process_byte(buf[0]);
        self.process_byte(buf[1]);
        self.process_byte(buf[2]);
    }

    #[inline(always)]
    fn process_quad_bytes(&mut self, buf: [u8; 4]) {
        self.process_byte(buf[0]);
        self.process_byte(buf[1]);
        self.process_byte(buf[2]);
        self.process_byte(buf[3]);
    }

    fn process_buf_bytes(&mut self, buf: &[u8]);
}

/// A `MonitorStream` is a passive stream that observes all operations performed on the inner
/// stream and forwards an immutable reference of the result to a [`Monitor`].
///
/// `MonitorStream`s stack: wrapping one `MonitorStream` in another feeds both monitors, with
/// the inner monitor observing only the bytes transferred while the outer wrapper is in place.
pub struct MonitorStream<B, M: Monitor> {
    inner: B,
    monitor: M,
}

impl<B, M: Monitor> MonitorStream<B, M> {
    pub fn new(inner: B, monitor: M) -> MonitorStream<B, M> {
        MonitorStream { inner, monitor }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut B {
        &mut self.inner
    }

    pub fn into_inner(self) -> B {
        self.inner
    }

    pub fn monitor(&self) -> &M {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut M {
        &mut self.monitor
    }
}

impl<B: ReadBytes, M: Monitor> ReadBytes for MonitorStream<B, M> {
    #[inline(always)]
    fn read_byte(&mut self) -> Result<u8> {
        let byte = self.inner.read_byte()?;
        self.monitor.process_byte(byte);
        Ok(byte)
    }

    #[inline(always)]
    fn read_double_bytes(&mut self) -> Result<[u8; 2]> {
        let bytes = self.inner.read_double_bytes()?;
        self.monitor.process_double_bytes(bytes);
        Ok(bytes)
    }

    #[inline(always)]
    fn read_triple_bytes(&mut self) -> Result<[u8; 3]> {
        let bytes = self.inner.read_triple_bytes()?;
        self.monitor.process_triple_bytes(bytes);
        Ok(bytes)
    }

    #[inline(always)]
    fn read_quad_bytes(&mut self) -> Result<[u8; 4]> {
        let bytes = self.inner.read_quad_bytes()?;
        self.monitor.process_quad_bytes(bytes);
        Ok(bytes)
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_buf_exact(buf)?;
        self.monitor.process_buf_bytes(buf);
        Ok(())
    }

    fn ignore_bytes(&mut self, count: u64) -> Result<()> {
        self.inner.ignore_bytes(count)
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.inner.pos()
    }
}

impl<B: WriteBytes, M: Monitor> WriteBytes for MonitorStream<B, M> {
    #[inline(always)]
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.inner.write_byte(byte)?;
        self.monitor.process_byte(byte);
        Ok(())
    }

    fn write_buf(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write_buf(buf)?;
        self.monitor.process_buf_bytes(buf);
        Ok(())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.inner.pos()
    }
}

#[cfg(test)]
mod tests {
    use super::MonitorStream;
    use crate::checksum::Crc16Ansi;
    use crate::io::{BufReader, ByteBuf, ReadBytes, WriteBytes};

    #[test]
    fn verify_monitor_stream_read() {
        let mut reader = BufReader::new(b"123456789");
        let mut stream = MonitorStream::new(&mut reader, Crc16Ansi::new(0));

        let mut buf = [0u8; 9];
        stream.read_buf_exact(&mut buf).unwrap();

        assert_eq!(stream.monitor().crc(), 0xfee8);
    }

    #[test]
    fn verify_monitor_stream_write() {
        let mut buf = ByteBuf::new();
        let mut stream = MonitorStream::new(&mut buf, Crc16Ansi::new(0));

        stream.write_buf(b"12345").unwrap();
        stream.write_buf(b"6789").unwrap();

        assert_eq!(stream.monitor().crc(), 0xfee8);
        assert_eq!(buf.as_slice(), b"123456789");
    }

    #[test]
    fn verify_monitor_stream_stacked() {
        // An inner monitor observes only the bytes read while it is interposed.
        let mut reader = BufReader::new(b"abc123456789");
        let mut outer = MonitorStream::new(&mut reader, Crc16Ansi::new(0));

        let mut head = [0u8; 3];
        outer.read_buf_exact(&mut head).unwrap();

        let mut inner = MonitorStream::new(&mut outer, Crc16Ansi::new(0));
        let mut tail = [0u8; 9];
        inner.read_buf_exact(&mut tail).unwrap();

        assert_eq!(inner.monitor().crc(), 0xfee8);
    }
}
