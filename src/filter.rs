
//! The top-level filter dispatcher.
//!
//! [`precompress`] drives the forward pass: every input byte runs through
//! the signature scanner and out to the entropy coder until a container
//! signature hands control to a walker. GIF and PDF walkers do their work
//! in one synchronous sweep over the stream; the PNG walker stays resident
//! until its `IEND`. [`reconstruct`] mirrors the pass exactly: the same
//! scanner runs over the bytes written to the output, so both sides
//! activate the same walkers at the same offsets, and the framing those
//! walkers consume never touches the scanner on either side.
//!
//! There is at most one active walker, and all pass state lives in the
//! call frame; nothing survives a pass.

use crate::coder::{Coder, Decoder};
use crate::error::Result;
use crate::gif::{self, GifDecoder};
use crate::io::{ReadBytes, WriteBytes, Stream, stream_length};
use crate::pdf::{self, PdfDecoder};
use crate::png::{self, PngDecoder};
use crate::zlib::Oracle;


/// What a reverse-pass walker did with the byte offered to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// The walker consumed the byte.
    Consumed,

    /// The walker consumed the byte and finished its substream.
    Done,

    /// The byte is not the walker's; hand it to the normal path.
    Rejected,
}


/// Rolling view of the most recent container bytes: a 64-byte ring for
/// positional signature checks plus a 128-bit tag for keyword matching.
#[derive(Debug)]
pub(crate) struct Scanner {
    ring: [u8; 64],
    pushed: u64,
    pub(crate) tag: u128,
}

impl Scanner {
    pub fn new() -> Self {
        Self { ring: [0; 64], pushed: 0, tag: 0 }
    }

    pub fn push(&mut self, byte: u8) {
        self.ring[(self.pushed % 64) as usize] = byte;
        self.pushed += 1;
        self.tag = (self.tag << 8) | u128::from(byte);
    }

    /// The byte `distance` positions back; 1 is the newest byte.
    fn back(&self, distance: u64) -> u8 {
        debug_assert!(distance >= 1 && distance <= 64 && distance <= self.pushed);
        self.ring[((self.pushed + 64 - distance) % 64) as usize]
    }

    /// The newest four bytes as a big-endian word.
    pub fn last_u32(&self) -> u32 {
        if self.pushed < 4 { return 0; }
        u32::from(self.back(4)) << 24
            | u32::from(self.back(3)) << 16
            | u32::from(self.back(2)) << 8
            | u32::from(self.back(1))
    }

    /// The big-endian word ending `skip` bytes before the newest byte.
    pub fn u32_before(&self, skip: u64) -> u32 {
        if self.pushed < skip + 4 { return 0; }
        u32::from(self.back(skip + 4)) << 24
            | u32::from(self.back(skip + 3)) << 16
            | u32::from(self.back(skip + 2)) << 8
            | u32::from(self.back(skip + 1))
    }

    /// `GIF87a`/`GIF89a` plus plausible dimensions, eleven bytes in, so
    /// the walker takes over right after the screen descriptor's packed
    /// byte. Returns that packed byte.
    fn gif_signature(&self) -> Option<u8> {
        if self.pushed < 11 {
            return None;
        }

        let signature_ok = self.back(11) == b'G'
            && self.back(10) == b'I'
            && self.back(9) == b'F'
            && self.back(8) == b'8'
            && (self.back(7) == b'7' || self.back(7) == b'9')
            && self.back(6) == b'a';
        if !signature_ok {
            return None;
        }

        let width = u16::from(self.back(5)) | u16::from(self.back(4)) << 8;
        let height = u16::from(self.back(3)) | u16::from(self.back(2)) << 8;
        if width == 0 || width >= 0x4000 || height == 0 || height >= 0x4000 {
            return None;
        }

        Some(self.back(1))
    }

    /// The eight-byte PNG signature, immediately followed by the IHDR tag.
    fn png_signature(&self) -> bool {
        const SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

        self.pushed >= 16
            && (0 .. 8).all(|offset| self.back(16 - offset) == SIGNATURE[offset as usize])
            && self.last_u32() == 0x4948_4452 // "IHDR"
    }
}


/// Forward pass: scan `input` from its current position to its end,
/// feeding the entropy coder a stream in which every detected GIF frame,
/// PNG IDAT payload and PDF stream object has been replaced by its
/// reversible decoded form (or an explicitly marked passthrough).
pub fn precompress<S, C>(input: &mut S, coder: &mut C) -> Result<()>
    where S: Stream, C: Coder
{
    let total_length = stream_length(input)?;
    let mut scan = Scanner::new();
    let mut oracle = Oracle::new();
    let mut png_active = false;

    while input.stream_position()? < total_length {
        let byte = match input.read_u8()? {
            Some(byte) => byte,
            None => break,
        };

        if png_active {
            png_active = png::encode_byte(&mut scan, &mut oracle, input, coder, byte)?;
            continue;
        }

        scan.push(byte);
        coder.compress(byte)?;

        if pdf::matches_stream_tag(&mut scan) {
            pdf::precompress_object(&mut scan, &mut oracle, input, coder)?;
        }
        else if let Some(packed) = scan.gif_signature() {
            gif::precompress_container(input, coder, total_length, packed)?;
        }
        else if scan.png_signature() {
            png_active = true;
        }
    }

    Ok(())
}


enum Active {
    Gif(GifDecoder),
    Png(PngDecoder),
    Pdf(PdfDecoder),
}

/// Reverse pass: pull bytes back out of the entropy decoder and rebuild
/// the original `original_length` bytes exactly.
pub fn reconstruct<D, S>(decoder: &mut D, output: &mut S, original_length: u64) -> Result<()>
    where D: Decoder, S: Stream
{
    let mut scan = Scanner::new();
    let mut active: Option<Active> = None;

    while output.stream_position()? < original_length {
        let byte = decoder.decompress()?;

        if let Some(walker) = active.as_mut() {
            let flow = match walker {
                Active::Gif(state) => state.push(byte, output, original_length)?,
                Active::Png(state) => state.push(&mut scan, byte, output)?,
                Active::Pdf(state) => state.push(byte, output)?,
            };

            match flow {
                Flow::Consumed => continue,
                Flow::Done => {
                    active = None;
                    continue;
                }
                Flow::Rejected => {
                    active = None;
                    // fall through to the normal path with this byte
                }
            }
        }

        output.write_u8(byte)?;
        scan.push(byte);

        if pdf::matches_stream_tag(&mut scan) {
            active = Some(Active::Pdf(PdfDecoder::new()));
        }
        else if scan.gif_signature().is_some() {
            active = Some(Active::Gif(GifDecoder::new()));
        }
        else if scan.png_signature() {
            active = Some(Active::Png(PngDecoder::new()));
        }
    }

    Ok(())
}


#[cfg(test)]
mod test {
    use super::*;

    fn push_all(scan: &mut Scanner, bytes: &[u8]) {
        for &byte in bytes {
            scan.push(byte);
        }
    }

    #[test]
    fn ring_lookback(){
        let mut scan = Scanner::new();
        push_all(&mut scan, b"abcdefgh");
        assert_eq!(scan.back(1), b'h');
        assert_eq!(scan.back(8), b'a');
        assert_eq!(scan.last_u32(), u32::from_be_bytes(*b"efgh"));
        assert_eq!(scan.u32_before(4), u32::from_be_bytes(*b"abcd"));

        // wrap around the ring
        for _ in 0 .. 30 {
            push_all(&mut scan, b"abcdefgh");
        }
        assert_eq!(scan.back(1), b'h');
        assert_eq!(scan.back(64), b'a');
    }

    #[test]
    fn gif_signature_trigger(){
        let mut scan = Scanner::new();
        push_all(&mut scan, b"GIF89a");
        push_all(&mut scan, &[0x0A, 0x00]); // width 10
        push_all(&mut scan, &[0x14, 0x00]); // height 20
        assert_eq!(scan.gif_signature(), None);

        scan.push(0x91); // packed byte completes the trigger
        assert_eq!(scan.gif_signature(), Some(0x91));

        // implausible dimensions do not trigger
        let mut scan = Scanner::new();
        push_all(&mut scan, b"GIF89a");
        push_all(&mut scan, &[0x00, 0x40, 0x14, 0x00, 0x91]); // width 0x4000
        assert_eq!(scan.gif_signature(), None);
    }

    #[test]
    fn png_signature_trigger(){
        let mut scan = Scanner::new();
        push_all(&mut scan, &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
        push_all(&mut scan, &[0, 0, 0, 13]);
        assert!(!scan.png_signature());
        push_all(&mut scan, b"IHDR");
        assert!(scan.png_signature());
    }
}
