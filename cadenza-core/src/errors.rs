// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::result;

/// `CadenzaError` provides an enumeration of all possible errors reported by Cadenza.
///
/// Every stream-level error carries the byte offset of the token that failed so that a
/// diagnostic can point at the offending position in the input.
#[derive(Debug)]
pub enum CadenzaError {
    /// A read was attempted past the end of the stream.
    EndOfStream { offset: u64 },
    /// The stream does not start with the expected magic signature.
    BadMagic { offset: u64 },
    /// A reserved or otherwise invalid bit pattern was encountered.
    InvalidBits { offset: u64, desc: &'static str },
    /// A decoded value violates a structural invariant of the format.
    InvariantViolated { offset: u64, desc: &'static str },
    /// A computed checksum does not match the checksum stored in the stream.
    CrcMismatch { offset: u64, desc: &'static str },
    /// A caller asked the encoder or writer to emit a structure that is out of range.
    InvalidInput(&'static str),
    /// An IO error occurred while reading or writing a file.
    IoError(std::io::Error),
}

impl fmt::Display for CadenzaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CadenzaError::EndOfStream { offset } => {
                write!(f, "unexpected end of stream at byte {}", offset)
            }
            CadenzaError::BadMagic { offset } => {
                write!(f, "bad magic signature at byte {}", offset)
            }
            CadenzaError::InvalidBits { offset, desc } => {
                write!(f, "invalid bits at byte {}: {}", offset, desc)
            }
            CadenzaError::InvariantViolated { offset, desc } => {
                write!(f, "malformed stream at byte {}: {}", offset, desc)
            }
            CadenzaError::CrcMismatch { offset, desc } => {
                write!(f, "checksum mismatch at byte {}: {}", offset, desc)
            }
            CadenzaError::InvalidInput(desc) => {
                write!(f, "invalid input: {}", desc)
            }
            CadenzaError::IoError(ref err) => {
                write!(f, "io error: {}", err)
            }
        }
    }
}

impl error::Error for CadenzaError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            CadenzaError::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CadenzaError {
    fn from(err: std::io::Error) -> CadenzaError {
        CadenzaError::IoError(err)
    }
}

pub type Result<T> = result::Result<T, CadenzaError>;

/// Convenience function to create an end-of-stream error.
pub fn end_of_stream_error<T>(offset: u64) -> Result<T> {
    Err(CadenzaError::EndOfStream { offset })
}

/// Convenience function to create a bad-magic error.
pub fn bad_magic_error<T>(offset: u64) -> Result<T> {
    Err(CadenzaError::BadMagic { offset })
}

/// Convenience function to create an invalid-bits error.
pub fn invalid_bits_error<T>(offset: u64, desc: &'static str) -> Result<T> {
    Err(CadenzaError::InvalidBits { offset, desc })
}

/// Convenience function to create an invariant-violation error.
pub fn invariant_error<T>(offset: u64, desc: &'static str) -> Result<T> {
    Err(CadenzaError::InvariantViolated { offset, desc })
}

/// Convenience function to create a checksum-mismatch error.
pub fn crc_mismatch_error<T>(offset: u64, desc: &'static str) -> Result<T> {
    Err(CadenzaError::CrcMismatch { offset, desc })
}

/// Convenience function to create an invalid-input error.
pub fn invalid_input_error<T>(desc: &'static str) -> Result<T> {
    Err(CadenzaError::InvalidInput(desc))
}
