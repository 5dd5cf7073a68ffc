
//! Positioned byte stream operations.
//!
//! Every transform in this crate talks to its input and output through the
//! plain `std::io` traits plus the extensions below: single-byte fast paths,
//! big-endian 32-bit integers for the framing wire, and the variable-length
//! integer coding shared with the container headers. Walkers that need a
//! private staging area use [`Scratch`], which is an in-memory buffer by
//! default and an anonymous temp file for large substreams.

pub use ::std::io::{Read, Write, Seek};
use std::io::SeekFrom;
use lebe::prelude::*;
use crate::error::{Error, Result, PassiveResult};


/// Everything a walker needs from a substream: random access reads and
/// writes. Implemented by files, in-memory cursors and [`Scratch`].
pub trait Stream: Read + Write + Seek {}
impl<T: Read + Write + Seek> Stream for T {}


/// Scratch streams larger than this spill to an anonymous temp file.
const SPILL_THRESHOLD: u64 = 1 << 22;

/// A variable-length integer never spans more than 21 bytes.
const VLI_MAX_SHIFT: u32 = 126;


pub fn skip_bytes(read: &mut impl Read, count: u64) -> PassiveResult {
    let skipped = std::io::copy(
        &mut read.by_ref().take(count),
        &mut std::io::sink()
    )?;

    if skipped != count {
        return Err(Error::invalid("skipped content size"));
    }

    Ok(())
}

/// The length of a seekable stream, preserving the current position.
pub fn stream_length(stream: &mut impl Seek) -> Result<u64> {
    let position = stream.stream_position()?;
    let length = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(position))?;
    Ok(length)
}


/// Single-byte and wire-integer read operations.
pub trait ReadBytes: Read {

    /// Read one byte. The end of the stream is data, not an error.
    #[inline]
    fn read_u8(&mut self) -> Result<Option<u8>> {
        let mut byte = [0_u8];
        loop {
            match self.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(Error::Io(error)),
            }
        }
    }

    /// Read one byte, treating the end of the stream as an error.
    #[inline]
    fn expect_u8(&mut self) -> Result<u8> {
        self.read_u8()?.ok_or_else(|| Error::invalid("unexpected end of stream"))
    }

    #[inline]
    fn read_u32_be(&mut self) -> Result<u32> where Self: Sized {
        Ok(u32::read_from_big_endian(self)?)
    }

    /// Variable-length integer: six data bits per byte, low-order first,
    /// the high bit flags a continuation.
    fn read_vli(&mut self) -> Result<u64> {
        let mut value = 0_u64;
        let mut shift = 0_u32;
        loop {
            let byte = self.expect_u8()?;
            if shift < 64 {
                value |= u64::from(byte & 0x3F) << shift;
            }
            shift += 6;
            if shift > VLI_MAX_SHIFT || (byte & 0xC0) != 0x80 {
                return Ok(value);
            }
        }
    }
}

impl<R: Read> ReadBytes for R {}


/// Single-byte and wire-integer write operations.
pub trait WriteBytes: Write {

    #[inline]
    fn write_u8(&mut self, value: u8) -> PassiveResult {
        self.write_all(&[value])?;
        Ok(())
    }

    #[inline]
    fn write_u32_be(&mut self, value: u32) -> PassiveResult where Self: Sized {
        self.write_as_big_endian(&value)?;
        Ok(())
    }

    fn write_vli(&mut self, mut value: u64) -> PassiveResult {
        while value > 0x3F {
            self.write_u8(0x80 | (value as u8 & 0x3F))?;
            value >>= 6;
        }
        self.write_u8(value as u8)
    }
}

impl<W: Write> WriteBytes for W {}


/// A private staging stream for one substream transform.
///
/// Small substreams stay in memory; anything expected to outgrow
/// [`SPILL_THRESHOLD`] goes to an anonymous temp file instead. Either way
/// the storage is released when the value drops, on every exit path.
#[derive(Debug)]
pub enum Scratch {
    Memory(std::io::Cursor<Vec<u8>>),
    Disk(std::fs::File),
}

impl Scratch {
    pub fn new() -> Self {
        Scratch::Memory(std::io::Cursor::new(Vec::new()))
    }

    pub fn with_expected_size(bytes: u64) -> Result<Self> {
        if bytes > SPILL_THRESHOLD {
            Ok(Scratch::Disk(tempfile::tempfile()?))
        }
        else {
            Ok(Scratch::Memory(std::io::Cursor::new(
                Vec::with_capacity(bytes as usize)
            )))
        }
    }

    pub fn rewind_to_start(&mut self) -> PassiveResult {
        self.seek(SeekFrom::Start(0))?;
        Ok(())
    }
}

impl Default for Scratch {
    fn default() -> Self { Scratch::new() }
}

impl Read for Scratch {
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Scratch::Memory(cursor) => cursor.read(buffer),
            Scratch::Disk(file) => file.read(buffer),
        }
    }
}

impl Write for Scratch {
    fn write(&mut self, buffer: &[u8]) -> std::io::Result<usize> {
        match self {
            Scratch::Memory(cursor) => cursor.write(buffer),
            Scratch::Disk(file) => file.write(buffer),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Scratch::Memory(cursor) => cursor.flush(),
            Scratch::Disk(file) => file.flush(),
        }
    }
}

impl Seek for Scratch {
    fn seek(&mut self, target: SeekFrom) -> std::io::Result<u64> {
        match self {
            Scratch::Memory(cursor) => cursor.seek(target),
            Scratch::Disk(file) => file.seek(target),
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn byte_fast_paths(){
        let mut stream = Cursor::new(vec![1_u8, 2, 3]);
        assert_eq!(stream.read_u8().unwrap(), Some(1));
        assert_eq!(stream.expect_u8().unwrap(), 2);
        assert_eq!(stream.read_u8().unwrap(), Some(3));
        assert_eq!(stream.read_u8().unwrap(), None);
        assert!(stream.expect_u8().is_err());
    }

    #[test]
    fn wire_u32(){
        let mut bytes = Vec::new();
        bytes.write_u32_be(0x0000_0190).unwrap();
        assert_eq!(bytes, [0x00, 0x00, 0x01, 0x90]);

        let mut read = Cursor::new(bytes);
        assert_eq!(read.read_u32_be().unwrap(), 0x190);
    }

    #[test]
    fn vli_round_trip(){
        let values = [
            0_u64, 1, 0x3F, 0x40, 4095, 0xFFFF, 0xDEAD_BEEF,
            u64::from(u32::MAX), u64::MAX >> 1, u64::MAX,
        ];

        for &value in &values {
            let mut bytes = Vec::new();
            bytes.write_vli(value).unwrap();
            assert!(bytes.len() <= 21);

            let mut read = Cursor::new(bytes);
            assert_eq!(read.read_vli().unwrap(), value, "vli {}", value);
        }
    }

    #[test]
    fn scratch_random_access(){
        let mut scratch = Scratch::new();
        scratch.write_all(b"abcdef").unwrap();

        scratch.seek(SeekFrom::Start(2)).unwrap();
        scratch.write_u8(b'X').unwrap();

        assert_eq!(stream_length(&mut scratch).unwrap(), 6);

        scratch.rewind_to_start().unwrap();
        let mut contents = Vec::new();
        scratch.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"abXdef");
    }
}
