
//! The PDF stream-object walker.
//!
//! PDF brackets stream payloads between a `stream` keyword (followed by an
//! end-of-line marker) and an `endstream` keyword. The dispatcher's
//! rolling tag spots the opening bracket; this walker then scans ahead for
//! the closing one, hands the span to the zlib oracle, and leaves anything
//! the oracle declined to flow through as plain bytes. An `endobj` before
//! `endstream` means the object is damaged and the span is abandoned.

use crate::coder::Coder;
use crate::error::{Error, Result};
use crate::filter::{Flow, Scanner};
use crate::io::{ReadBytes, WriteBytes, Scratch, Stream, stream_length};
use crate::zlib::{self, IRRECOVERABLE};


// Tag suffixes, newest byte in the least significant position.
const STREAM_LF: u128        = 0x0073_7472_6561_6D0A;           // "stream\n"
const STREAM_LF_MASK: u128   = 0x00FF_FFFF_FFFF_FFFF;
const STREAM_CRLF: u128      = 0x7374_7265_616D_0D0A;           // "stream\r\n"
const STREAM_CRLF_MASK: u128 = 0xFFFF_FFFF_FFFF_FFFF;
const ENDSTREAM_LF: u128     = 0x656E_6473_7472_6561_6D0A;      // "endstream\n"
const ENDSTREAM_CR: u128     = 0x656E_6473_7472_6561_6D0D;      // "endstream\r"
const ENDSTREAM_MASK: u128   = 0xFFFF_FFFF_FFFF_FFFF_FFFF;
const ENDOBJ_LF: u128        = 0x0065_6E64_6F62_6A0A;           // "endobj\n"
const ENDOBJ_CR: u128        = 0x0065_6E64_6F62_6A0D;           // "endobj\r"
const ENDOBJ_MASK: u128      = 0x00FF_FFFF_FFFF_FFFF;


/// Whether the rolling tag has just completed a `stream` keyword with its
/// end-of-line marker (and is not the tail of `endstream`). Matching
/// clears the tag, on both passes, so the two scanners stay in lockstep.
pub(crate) fn matches_stream_tag(scan: &mut Scanner) -> bool {
    let tag = scan.tag;
    let opened = (tag & STREAM_LF_MASK) == STREAM_LF
        || (tag & STREAM_CRLF_MASK) == STREAM_CRLF;
    let closed = (tag & ENDSTREAM_MASK) == ENDSTREAM_LF
        || (tag & ENDSTREAM_MASK) == ENDSTREAM_CR;

    if opened && !closed {
        scan.tag = 0;
        true
    }
    else {
        false
    }
}

/// Transform one stream object. The stream is positioned at the first
/// payload byte (just after the keyword's newline); on return it points
/// at the first byte the dispatcher should resume with.
pub(crate) fn precompress_object<S, C>(
    scan: &mut Scanner,
    oracle: &mut zlib::Oracle,
    stream: &mut S,
    coder: &mut C,
) -> Result<()>
    where S: Stream, C: Coder
{
    let start = stream.stream_position()?;
    let mut payload_length: u64 = 0;

    loop {
        let byte = match stream.read_u8()? {
            Some(byte) => byte,
            None => break,
        };
        scan.tag = (scan.tag << 8) | u128::from(byte);
        let tag = scan.tag;

        let damaged = (tag & ENDOBJ_MASK) == ENDOBJ_LF
            || (tag & ENDOBJ_MASK) == ENDOBJ_CR
            || ((tag & STREAM_LF_MASK) == STREAM_LF && (tag & ENDSTREAM_MASK) != ENDSTREAM_LF)
            || ((tag & STREAM_CRLF_MASK) == STREAM_CRLF && (tag & ENDSTREAM_MASK) != ENDSTREAM_CR);
        if damaged {
            break;
        }

        if (tag & ENDSTREAM_MASK) == ENDSTREAM_LF {
            let position = stream.stream_position()?;
            payload_length = (position - start).saturating_sub(10);
            break;
        }
        if (tag & ENDSTREAM_MASK) == ENDSTREAM_CR {
            // the closing end-of-line marker is not part of the payload
            let position = stream.stream_position()?;
            payload_length = (position - start).saturating_sub(11);
            break;
        }
    }

    scan.tag = 0;
    oracle.transform(stream, coder, start, payload_length)?;
    Ok(())
}


/// Reverse-pass walker: reads the framing length, then either replays the
/// recorded payload or steps aside for an untransformed one.
#[derive(Debug)]
pub(crate) struct PdfDecoder {
    accumulator: u32,
    accumulated: u8,
    remaining: u64,
    staged: Option<Scratch>,
}

impl PdfDecoder {
    pub fn new() -> Self {
        Self {
            accumulator: 0,
            accumulated: 0,
            remaining: 0,
            staged: None,
        }
    }

    pub fn push<S: Stream>(&mut self, byte: u8, out: &mut S) -> Result<Flow> {
        if let Some(staged) = self.staged.as_mut() {
            staged.write_u8(byte)?;
            self.remaining -= 1;
            if self.remaining == 0 {
                let mut staged = self.staged.take()
                    .ok_or_else(|| Error::invalid("pdf decoder state"))?;
                let size = stream_length(&mut staged)?;
                staged.rewind_to_start()?;

                if !zlib::reconstruct(&mut staged, size, out, zlib::Mode::Emit)? {
                    return Err(Error::invalid("pdf stream reconstruction"));
                }
                return Ok(Flow::Done);
            }
            return Ok(Flow::Consumed);
        }

        self.accumulator = (self.accumulator << 8) | u32::from(byte);
        self.accumulated += 1;
        if self.accumulated == 4 {
            let value = self.accumulator;
            if value == IRRECOVERABLE || value as i32 <= 0 {
                // nothing was transformed; the object flows through
                return Ok(Flow::Done);
            }
            self.staged = Some(Scratch::with_expected_size(u64::from(value))?);
            self.remaining = u64::from(value);
        }
        Ok(Flow::Consumed)
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::filter::Scanner;

    fn feed(scan: &mut Scanner, bytes: &[u8]) -> bool {
        let mut matched = false;
        for &byte in bytes {
            scan.push(byte);
            matched = matches_stream_tag(scan);
        }
        matched
    }

    #[test]
    fn stream_keyword_opens_an_object(){
        let mut scan = Scanner::new();
        assert!(feed(&mut scan, b"1 0 obj << /Length 5 >> stream\n"));
        assert_eq!(scan.tag, 0); // matching resets the rolling tag

        let mut scan = Scanner::new();
        assert!(feed(&mut scan, b"stream\r\n"));
    }

    #[test]
    fn endstream_does_not_reopen(){
        let mut scan = Scanner::new();
        assert!(!feed(&mut scan, b"data endstream\n"));
        assert!(!feed(&mut scan, b"more endstream\r"));
    }
}
