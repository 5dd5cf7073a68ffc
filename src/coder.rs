
//! The seam to the outer entropy coder.
//!
//! The precompression core never models or codes anything itself: on the
//! forward pass it hands every output symbol to a [`Coder`], and on the
//! reverse pass it pulls bytes back out of a [`Decoder`]. Any statistical
//! coder that delivers the symbols back in order satisfies the contract.
//! [`RawCoder`] and [`RawDecoder`] are the trivial pass-through pair, which
//! is also exactly what the round-trip tests use.

use crate::error::{Error, Result, PassiveResult};
use crate::io::{Read, Write, ReadBytes, WriteBytes};


/// Forward-pass symbol sink.
pub trait Coder {

    /// Append one byte to the entropy stream.
    fn compress(&mut self, byte: u8) -> PassiveResult;

    /// Append an integer of `bit_count` bits (at most 32).
    fn compress_n(&mut self, bit_count: u32, value: u32) -> PassiveResult;
}

/// Reverse-pass symbol source, mirroring [`Coder`] byte for byte.
pub trait Decoder {
    fn decompress(&mut self) -> Result<u8>;
}


/// A [`Coder`] that stores symbols verbatim.
///
/// Multi-bit values are written big-endian, whole bytes only; the core
/// itself only ever asks for 32-bit fields.
#[derive(Debug)]
pub struct RawCoder<W> {
    inner: W,
}

impl<W: Write> RawCoder<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Coder for RawCoder<W> {
    fn compress(&mut self, byte: u8) -> PassiveResult {
        self.inner.write_u8(byte)
    }

    fn compress_n(&mut self, bit_count: u32, value: u32) -> PassiveResult {
        if bit_count > 32 || bit_count % 8 != 0 {
            return Err(Error::unsupported("raw coder bit count"));
        }

        for index in (0 .. bit_count / 8).rev() {
            self.inner.write_u8((value >> (index * 8)) as u8)?;
        }

        Ok(())
    }
}


/// The matching verbatim [`Decoder`].
#[derive(Debug)]
pub struct RawDecoder<R> {
    inner: R,
}

impl<R: Read> RawDecoder<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> Decoder for RawDecoder<R> {
    fn decompress(&mut self) -> Result<u8> {
        self.inner.expect_u8()
    }
}
