
//! The GIF frame walker.
//!
//! The forward pass walks the container (screen descriptor, color tables,
//! extensions), decodes each image frame through [`lzw`], and re-encodes
//! the result in compare mode against the original bytes. Only a frame
//! that reproduces bit for bit is shipped as header-plus-pixels framing;
//! anything else goes out verbatim under a complemented length, and a
//! container whose first frame already fails is abandoned with the
//! irrecoverable sentinel. The reverse pass is the state machine at the
//! bottom, driven one byte at a time by the dispatcher.

pub mod lzw;

use std::io::SeekFrom;
use bit_field::BitField;

use crate::coder::Coder;
use crate::error::{Error, Result};
use crate::filter::Flow;
use crate::io::{ReadBytes, WriteBytes, Read, Seek, Scratch, Stream, stream_length};
use crate::zlib::IRRECOVERABLE;


pub const IMAGE_DESCRIPTOR: u8 = 0x2C;
const EXTENSION_INTRODUCER: u8 = 0x21;
const TRAILER: u8 = 0x3B;

const PLAINTEXT_EXTENSION: u8 = 0x01;
const GRAPHIC_CONTROL: u8 = 0xF9;
const COMMENT_EXTENSION: u8 = 0xFE;
const APPLICATION_EXTENSION: u8 = 0xFF;

/// A descriptor byte this close to the end of the file is taken for
/// trailing junk rather than another frame.
const MIN_FRAME_LOOKAHEAD: u64 = 16;


enum FrameStep {
    /// An image descriptor was consumed; the frame follows.
    Image,

    /// The trailer (or the end of input) was reached cleanly.
    End,

    /// The container is damaged or truncated mid-walk.
    Failed,
}


fn skip_sub_blocks<S: Read + Seek>(stream: &mut S) -> Result<bool> {
    loop {
        match stream.read_u8()? {
            None => return Ok(false),
            Some(0) => return Ok(true),
            Some(length) => { stream.seek(SeekFrom::Current(i64::from(length)))?; }
        }
    }
}

/// Walk extensions until the next image descriptor.
fn next_frame<S: Read + Seek>(stream: &mut S) -> Result<FrameStep> {
    let mut label = match stream.read_u8()? {
        Some(byte) => byte,
        None => return Ok(FrameStep::End),
    };

    loop {
        if label == IMAGE_DESCRIPTOR {
            return Ok(FrameStep::Image);
        }
        if label == TRAILER {
            stream.seek(SeekFrom::Current(-1))?;
            return Ok(FrameStep::End);
        }
        if label != EXTENSION_INTRODUCER {
            return Ok(FrameStep::Failed);
        }

        let kind = match stream.read_u8()? {
            Some(byte) => byte,
            None => return Ok(FrameStep::Failed),
        };
        let fixed_part = match kind {
            PLAINTEXT_EXTENSION => 13,
            GRAPHIC_CONTROL => 5,
            COMMENT_EXTENSION => 0,
            APPLICATION_EXTENSION => 12,
            _ => return Ok(FrameStep::Failed),
        };

        stream.seek(SeekFrom::Current(fixed_part))?;
        if !skip_sub_blocks(stream)? {
            return Ok(FrameStep::Failed);
        }

        label = match stream.read_u8()? {
            Some(byte) => byte,
            None => return Ok(FrameStep::Failed),
        };
    }
}

fn color_table_span(flags: u8) -> i64 {
    3 * (2_i64 << u32::from(flags.get_bits(0 .. 3)))
}

/// Ship `[from, to)` verbatim under a complemented length.
fn emit_passthrough<S, C>(stream: &mut S, coder: &mut C, from: u64, to: u64) -> Result<()>
    where S: Stream, C: Coder
{
    if to <= from || to - from > i32::MAX as u64 {
        return Err(Error::invalid("gif passthrough span"));
    }

    let length = (to - from) as i32;
    coder.compress_n(32, (!length) as u32)?;

    stream.seek(SeekFrom::Start(from))?;
    for _ in 0 .. length {
        coder.compress(stream.expect_u8()?)?;
    }
    Ok(())
}

/// The walk cannot continue. Before the first frame the whole container
/// is handed back with the sentinel; after it, the rest of the file goes
/// out as one passthrough so the reverse pass stays in a defined state.
fn recover<S, C>(
    stream: &mut S,
    coder: &mut C,
    frame: u32,
    root_origin: u64,
    frame_origin: u64,
    total_length: u64,
) -> Result<()>
    where S: Stream, C: Coder
{
    if frame == 0 {
        coder.compress_n(32, IRRECOVERABLE)?;
        stream.seek(SeekFrom::Start(root_origin))?;
    }
    else {
        coder.compress(IMAGE_DESCRIPTOR)?;
        emit_passthrough(stream, coder, frame_origin, total_length)?;
        stream.seek(SeekFrom::Start(total_length))?;
    }
    Ok(())
}

/// Transform one GIF container. The stream is positioned right after the
/// screen descriptor's packed byte (which the scanner already matched);
/// on return it points at the first byte the dispatcher should resume
/// with.
pub(crate) fn precompress_container<S, C>(
    stream: &mut S,
    coder: &mut C,
    total_length: u64,
    packed: u8,
) -> Result<()>
    where S: Stream, C: Coder
{
    let root_origin = stream.stream_position()?;

    // background color index and pixel aspect ratio
    stream.seek(SeekFrom::Current(2))?;
    if packed.get_bit(7) {
        stream.seek(SeekFrom::Current(color_table_span(packed)))?;
    }

    let mut frame_origin = root_origin;
    let mut frame = 0_u32;

    loop {
        // the reverse pass takes a descriptor byte this close to the end
        // for junk, so stop framing here and let the tail flow verbatim
        if frame > 0 && total_length.saturating_sub(frame_origin) <= MIN_FRAME_LOOKAHEAD {
            stream.seek(SeekFrom::Start(frame_origin))?;
            return Ok(());
        }

        match next_frame(stream)? {
            FrameStep::Image => {}
            FrameStep::End => {
                if frame == 0 {
                    // a container without a single transformed frame still
                    // owes the reverse pass its four framing bytes
                    coder.compress_n(32, IRRECOVERABLE)?;
                }
                stream.seek(SeekFrom::Start(frame_origin))?;
                return Ok(());
            }
            FrameStep::Failed => {
                return recover(stream, coder, frame, root_origin, frame_origin, total_length);
            }
        }

        // geometry, then an optional local color table
        stream.seek(SeekFrom::Current(8))?;
        let flags = match stream.read_u8()? {
            Some(byte) => byte,
            None => return recover(stream, coder, frame, root_origin, frame_origin, total_length),
        };
        if flags.get_bit(7) {
            stream.seek(SeekFrom::Current(color_table_span(flags)))?;
        }

        let data_origin = stream.stream_position()?;
        let mut raw = Scratch::with_expected_size(total_length.saturating_sub(data_origin))?;
        let mut decoder = lzw::Codec::new();
        let frame_end = match decoder.decode(stream, &mut raw)? {
            Some(position) => position,
            None => return recover(stream, coder, frame, root_origin, frame_origin, total_length),
        };

        let decoded_length = stream_length(&mut raw)?;
        raw.rewind_to_start()?;
        stream.seek(SeekFrom::Start(data_origin))?;
        let mut verifier = lzw::Codec::new();
        let reproduced = verifier.encode(&mut raw, decoded_length as i64, stream, true)?;

        if frame > 0 {
            coder.compress(IMAGE_DESCRIPTOR)?;
        }

        let exact = reproduced == Some((frame_end - data_origin) as i64)
            && decoded_length <= u64::from(u32::MAX);

        if exact {
            stream.seek(SeekFrom::Start(frame_origin))?;
            let header_length = (data_origin - frame_origin) as u32;
            coder.compress_n(32, header_length)?;
            for _ in 0 .. header_length {
                coder.compress(stream.expect_u8()?)?;
            }

            raw.rewind_to_start()?;
            coder.compress_n(32, decoded_length as u32)?;
            for _ in 0 .. decoded_length {
                coder.compress(raw.expect_u8()?)?;
            }
        }
        else {
            emit_passthrough(stream, coder, frame_origin, frame_end)?;
        }

        frame_origin = frame_end;
        stream.seek(SeekFrom::Start(frame_origin))?;
        frame += 1;
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadHeaderLength,
    ReadHeader,
    ReadPayloadLength,
    ReadPayload,
    Recovery,
    AfterFrame,
}

/// Reverse-pass walker: consumes framing fields and payload bytes one at
/// a time and writes the reconstructed container to the output.
#[derive(Debug)]
pub(crate) struct GifDecoder {
    state: State,
    accumulator: i64,
    accumulated: u8,
    remaining: i64,
    raw: Option<Scratch>,
}

impl GifDecoder {
    pub fn new() -> Self {
        Self {
            state: State::ReadHeaderLength,
            accumulator: 0,
            accumulated: 0,
            remaining: 0,
            raw: None,
        }
    }

    /// Accumulate one big-endian length byte; `Some` once all four are in.
    fn accumulate(&mut self, byte: u8) -> Option<i32> {
        self.accumulator = (self.accumulator << 8) | i64::from(byte);
        self.accumulated += 1;
        if self.accumulated < 4 {
            return None;
        }
        let value = self.accumulator as u32 as i32;
        self.accumulator = 0;
        self.accumulated = 0;
        Some(value)
    }

    pub fn push<S: Stream>(&mut self, byte: u8, out: &mut S, original_length: u64) -> Result<Flow> {
        match self.state {
            State::ReadHeaderLength => {
                if let Some(value) = self.accumulate(byte) {
                    if value as u32 == IRRECOVERABLE {
                        // the whole container went through untransformed
                        return Ok(Flow::Done);
                    }
                    if value < 0 {
                        let recovered = !value;
                        if recovered <= 0 {
                            return Err(Error::invalid("gif passthrough length"));
                        }
                        self.remaining = i64::from(recovered);
                        self.state = State::Recovery;
                    }
                    else if value == 0 {
                        return Err(Error::invalid("gif frame header length"));
                    }
                    else {
                        self.remaining = i64::from(value);
                        self.state = State::ReadHeader;
                    }
                }
                Ok(Flow::Consumed)
            }

            State::ReadHeader => {
                out.write_u8(byte)?;
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.state = State::ReadPayloadLength;
                }
                Ok(Flow::Consumed)
            }

            State::ReadPayloadLength => {
                if let Some(value) = self.accumulate(byte) {
                    if value <= 0 {
                        return Err(Error::invalid("gif payload length"));
                    }
                    self.raw = Some(Scratch::with_expected_size(value as u64)?);
                    self.remaining = i64::from(value);
                    self.state = State::ReadPayload;
                }
                Ok(Flow::Consumed)
            }

            State::ReadPayload => {
                {
                    let raw = self.raw.as_mut()
                        .ok_or_else(|| Error::invalid("gif decoder state"))?;
                    raw.write_u8(byte)?;
                }
                self.remaining -= 1;
                if self.remaining == 0 {
                    let mut raw = self.raw.take()
                        .ok_or_else(|| Error::invalid("gif decoder state"))?;
                    let size = stream_length(&mut raw)?;
                    raw.rewind_to_start()?;

                    let mut codec = lzw::Codec::new();
                    if codec.encode(&mut raw, size as i64, out, false)?.is_none() {
                        // the forward pass verified this frame; failure here
                        // means the symbol stream itself is damaged
                        return Err(Error::invalid("gif frame reconstruction"));
                    }
                    self.state = State::AfterFrame;
                }
                Ok(Flow::Consumed)
            }

            State::Recovery => {
                out.write_u8(byte)?;
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.state = State::AfterFrame;
                }
                Ok(Flow::Consumed)
            }

            State::AfterFrame => {
                let written = out.stream_position()?;
                if byte == IMAGE_DESCRIPTOR
                    && original_length.saturating_sub(written) > MIN_FRAME_LOOKAHEAD
                {
                    self.state = State::ReadHeaderLength;
                    Ok(Flow::Consumed)
                }
                else {
                    Ok(Flow::Rejected)
                }
            }
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn extension_walking(){
        // graphic control, comment, application extensions, then a frame
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&[EXTENSION_INTRODUCER, GRAPHIC_CONTROL, 4, 0, 0, 0, 0, 0]);
        bytes.extend_from_slice(&[EXTENSION_INTRODUCER, COMMENT_EXTENSION, 2, b'h', b'i', 0]);
        bytes.extend_from_slice(&[EXTENSION_INTRODUCER, APPLICATION_EXTENSION, 11]);
        bytes.extend_from_slice(b"NETSCAPE2.0");
        bytes.extend_from_slice(&[3, 1, 0, 0, 0]);
        bytes.push(IMAGE_DESCRIPTOR);

        let mut stream = Cursor::new(bytes.clone());
        assert!(matches!(next_frame(&mut stream).unwrap(), FrameStep::Image));
        assert_eq!(stream.stream_position().unwrap(), bytes.len() as u64);

        let mut trailer = Cursor::new(vec![TRAILER]);
        assert!(matches!(next_frame(&mut trailer).unwrap(), FrameStep::End));
        assert_eq!(trailer.stream_position().unwrap(), 0);

        let mut broken = Cursor::new(vec![0x55]);
        assert!(matches!(next_frame(&mut broken).unwrap(), FrameStep::Failed));
    }

    #[test]
    fn color_table_spans(){
        assert_eq!(color_table_span(0x80), 3 * 2);       // depth bits 0
        assert_eq!(color_table_span(0x87), 3 * 256);     // depth bits 7
    }
}
