
//! The PNG chunk walker.
//!
//! Once the scanner has seen the PNG signature and the IHDR tag, every
//! byte of the container flows through this walker until `IEND`. When an
//! `IDAT` tag with a chunk length above 64 goes past, the zlib oracle is
//! pointed at the payload that follows; everything else is copied through
//! untouched. Undersized IDAT chunks are not worth the framing overhead.

use crate::coder::Coder;
use crate::error::{Error, Result};
use crate::filter::{Flow, Scanner};
use crate::io::{WriteBytes, Scratch, Stream, stream_length};
use crate::zlib::{self, IRRECOVERABLE};


const IDAT: u32 = 0x4944_4154;
const IEND: u32 = 0x4945_4E44;

/// IDAT payloads at or below this length pass through unexamined.
const MIN_IDAT_LENGTH: u32 = 64;


/// Forward one container byte. Returns `false` once the `IEND` tag ends
/// the container.
pub(crate) fn encode_byte<S, C>(
    scan: &mut Scanner,
    oracle: &mut zlib::Oracle,
    stream: &mut S,
    coder: &mut C,
    byte: u8,
) -> Result<bool>
    where S: Stream, C: Coder
{
    scan.push(byte);
    coder.compress(byte)?;

    if scan.last_u32() == IDAT {
        let length = scan.u32_before(4);
        if length > MIN_IDAT_LENGTH {
            let start = stream.stream_position()?;
            oracle.transform(stream, coder, start, u64::from(length))?;
            // on success the stream has advanced past the compressed
            // payload; on failure it is back at `start` and the payload
            // re-flows through this walker as plain bytes
        }
    }

    Ok(scan.last_u32() != IEND)
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Copy,
    ReadLength,
    ReadPayload,
}

/// Reverse-pass walker: copies container bytes and replays each
/// transformed IDAT payload back into its original compressed form.
#[derive(Debug)]
pub(crate) struct PngDecoder {
    state: State,
    accumulator: u32,
    accumulated: u8,
    remaining: u64,
    staged: Option<Scratch>,
}

impl PngDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Copy,
            accumulator: 0,
            accumulated: 0,
            remaining: 0,
            staged: None,
        }
    }

    pub fn push<S: Stream>(&mut self, scan: &mut Scanner, byte: u8, out: &mut S) -> Result<Flow> {
        match self.state {
            State::Copy => {
                out.write_u8(byte)?;
                scan.push(byte);

                if scan.last_u32() == IDAT && scan.u32_before(4) > MIN_IDAT_LENGTH {
                    self.state = State::ReadLength;
                    self.accumulator = 0;
                    self.accumulated = 0;
                }

                if scan.last_u32() == IEND {
                    return Ok(Flow::Done);
                }
                Ok(Flow::Consumed)
            }

            State::ReadLength => {
                self.accumulator = (self.accumulator << 8) | u32::from(byte);
                self.accumulated += 1;
                if self.accumulated == 4 {
                    let value = self.accumulator;
                    if value == IRRECOVERABLE || value as i32 <= 0 {
                        // untransformed payload follows as plain bytes
                        self.state = State::Copy;
                    }
                    else {
                        self.staged = Some(Scratch::with_expected_size(u64::from(value))?);
                        self.remaining = u64::from(value);
                        self.state = State::ReadPayload;
                    }
                }
                Ok(Flow::Consumed)
            }

            State::ReadPayload => {
                {
                    let staged = self.staged.as_mut()
                        .ok_or_else(|| Error::invalid("png decoder state"))?;
                    staged.write_u8(byte)?;
                }
                self.remaining -= 1;
                if self.remaining == 0 {
                    let mut staged = self.staged.take()
                        .ok_or_else(|| Error::invalid("png decoder state"))?;
                    let size = stream_length(&mut staged)?;
                    staged.rewind_to_start()?;

                    if !zlib::reconstruct(&mut staged, size, out, zlib::Mode::Emit)? {
                        // verified on the forward pass, so this is damage
                        return Err(Error::invalid("idat reconstruction"));
                    }
                    self.state = State::Copy;
                }
                Ok(Flow::Consumed)
            }
        }
    }
}
