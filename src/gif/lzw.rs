
//! GIF's variable-width LZW coding, in both directions.
//!
//! The decoder runs over a frame's sub-blocks twice with identical
//! dictionary evolution: a dry run that records where the original encoder
//! deviated from greedy matching (so the re-encoder can force the same
//! deviations), then a second pass that writes the decoded bytes. Together
//! with the sub-block length list and the deferred-clear position, that
//! metadata lets [`Codec::encode`] rebuild the exact original bitstream,
//! sub-block framing and all.

use std::io::SeekFrom;
use smallvec::SmallVec;

use crate::error::Result;
use crate::io::{Read, Write, Seek, ReadBytes, WriteBytes};


/// Hash table slots; prime, and comfortably past the 4096 dictionary codes.
const TABLE_SIZE: usize = 9221;

/// Fixed point for the deferred-clear header field:
/// the field stores `MARKER - max_code`.
const MARKER: i32 = 0x10FFF;

/// Knuth's golden-ratio multiplier for the dictionary hash.
const PHI32: u32 = 0x9E37_79B1;


/// State for coding one frame in one direction. Everything lives in the
/// value; nothing survives the frame.
#[derive(Debug)]
pub struct Codec {
    bits: i32,
    code: i32,
    code_size: i32,
    clear_pos: i32,

    // encoder-side bit packing and sub-block assembly
    buffer: u32,
    shift: i32,
    block_fill: i32,
    block_limit: i32,
    block_sizes: SmallVec<[u8; 64]>,
    block_index: usize,

    out_size: i64,
    diff_pos: i64,
    diff_found: i64,
    saw_first_code: bool,

    /// `(previous code << 8) | suffix byte` per dictionary code.
    dict: Vec<i32>,
    /// Open-addressed index into `dict`; -1 is an empty slot.
    table: Vec<i32>,
    /// String reconstruction and sub-block staging area.
    staging: Vec<u8>,
}

impl Codec {
    pub fn new() -> Self {
        Self {
            bits: 0,
            code: 0,
            code_size: 0,
            clear_pos: 0,
            buffer: 0,
            shift: 0,
            block_fill: 0,
            block_limit: 0,
            block_sizes: SmallVec::new(),
            block_index: 0,
            out_size: 1,
            diff_pos: 0,
            diff_found: 0,
            saw_first_code: false,
            dict: vec![0; 4096],
            table: vec![-1; TABLE_SIZE],
            staging: vec![0; 4096],
        }
    }

    /// Probe the hash table for the packed `(previous, suffix)` key.
    /// A non-negative return is the existing dictionary code; a negative
    /// one encodes the free slot as `-slot - 1`.
    fn find_match(&self, key: i32) -> i32 {
        let mut offset = (PHI32.wrapping_mul(key as u32) >> (32 - 13)) as usize;
        let stride = if offset == 0 { 1 } else { TABLE_SIZE - offset };
        loop {
            let index = self.table[offset];
            if index < 0 {
                return -(offset as i32) - 1;
            }
            if self.dict[index as usize] == key {
                return index;
            }
            offset = if offset >= stride { offset - stride } else { offset + TABLE_SIZE - stride };
        }
    }

    /// Decode one frame's LZW data from `input` (positioned at the root
    /// code size byte) into the scratch layout described in the module
    /// docs. Returns the input position one past the block terminator, or
    /// `None` when the stream cannot be represented.
    pub fn decode<R, W>(&mut self, input: &mut R, out: &mut W) -> Result<Option<u64>>
        where R: Read + Seek, W: Read + Write + Seek
    {
        self.code_size = match input.read_u8()? {
            Some(byte) => i32::from(byte),
            None => return Ok(None),
        };
        if self.code_size < 2 || self.code_size > 8 {
            return Ok(None);
        }

        let begin = input.stream_position()?;
        let mut header_size: i32 = 5;
        out.write_u8((header_size >> 8) as u8)?;
        out.write_u8(header_size as u8)?;
        out.write_u8((self.clear_pos >> 8) as u8)?;
        out.write_u8(self.clear_pos as u8)?;
        out.write_u8(self.code_size as u8)?;

        // record every sub-block length without decoding yet
        loop {
            match input.read_u8()? {
                None | Some(0) => break,
                Some(length) => {
                    self.block_sizes.push(length);
                    input.seek(SeekFrom::Current(i64::from(length)))?;
                }
            }
        }

        out.write_u32_be(self.block_sizes.len() as u32)?;
        out.write_all(&self.block_sizes)?;

        let clear_code = 1 << self.code_size;
        let end_code = clear_code + 1;

        for phase in 0 .. 2 {
            input.seek(SeekFrom::Start(begin))?;
            self.bits = self.code_size + 1;
            let mut shift = 0_i32;
            let mut buffer = 0_u32;
            let mut max_code: i32 = end_code;
            let mut last: i32 = -1;
            for slot in self.table.iter_mut() { *slot = -1; }
            let mut end_of_stream = false;

            loop {
                let block_length = match input.read_u8()? {
                    Some(byte) => i32::from(byte),
                    None => break,
                };
                if end_of_stream {
                    break;
                }

                for _ in 0 .. block_length {
                    let byte = match input.read_u8()? {
                        Some(byte) => byte,
                        None => return Ok(None),
                    };
                    buffer |= u32::from(byte) << shift;
                    shift += 8;

                    while shift >= self.bits && !end_of_stream {
                        self.code = (buffer & ((1 << self.bits) - 1)) as i32;
                        buffer >>= self.bits;
                        shift -= self.bits;

                        if !self.saw_first_code && self.code != clear_code {
                            // the original stream does not open with a
                            // clear code; record it as divergence zero
                            header_size += 4;
                            out.write_u32_be(0)?;
                        }
                        self.saw_first_code = true;

                        if self.code == clear_code {
                            if max_code > end_code {
                                let position = MARKER - max_code;
                                if self.clear_pos != 0 && self.clear_pos != position {
                                    return Ok(None);
                                }
                                self.clear_pos = position;
                            }
                            self.bits = self.code_size + 1;
                            max_code = end_code;
                            last = -1;
                            for slot in self.table.iter_mut() { *slot = -1; }
                        }
                        else if self.code == end_code {
                            end_of_stream = true;
                        }
                        else if self.code > max_code + 1 {
                            return Ok(None);
                        }
                        else {
                            let mut walk = if self.code <= max_code { self.code } else { last };
                            let mut size = 1_usize;
                            while walk >= clear_code {
                                if size >= 4096 || walk < 0 {
                                    return Ok(None);
                                }
                                self.staging[4096 - size] = self.dict[walk as usize] as u8;
                                size += 1;
                                walk = self.dict[walk as usize] >> 8;
                            }
                            self.staging[4096 - size] = walk as u8;

                            if phase == 1 {
                                out.write_all(&self.staging[4096 - size .. 4096])?;
                            }
                            else {
                                self.diff_pos += size as i64;
                            }

                            if self.code == max_code + 1 {
                                // KwKwK: the previous string extended by
                                // its own first byte
                                if phase == 1 {
                                    out.write_u8(walk as u8)?;
                                }
                                else {
                                    self.diff_pos += 1;
                                }
                            }

                            if last != -1 {
                                max_code += 1;
                                if max_code >= 8191 {
                                    return Ok(None);
                                }
                                if max_code <= 4095 {
                                    let key = (last << 8) + walk;
                                    let index = self.find_match(key);
                                    self.dict[max_code as usize] = key;
                                    let slot = if index < 0 { (-index - 1) as usize } else { 0 };
                                    self.table[slot] = max_code;

                                    if phase == 0 && index > 0 {
                                        // the original encoder ignored this
                                        // existing entry; remember where
                                        header_size += 4;
                                        let kwkwk = i64::from(self.code == max_code);
                                        let position = self.diff_pos - size as i64 - kwkwk;
                                        out.write_u32_be(position as u32)?;
                                        self.diff_pos = size as i64 + kwkwk;
                                    }
                                }
                                if max_code >= (1 << self.bits) - 1 && self.bits < 12 {
                                    self.bits += 1;
                                }
                            }
                            last = self.code;
                        }
                    }
                }
            }
        }

        let end_position = input.stream_position()?;

        out.seek(SeekFrom::Start(0))?;
        out.write_u8((header_size >> 8) as u8)?;
        out.write_u8(header_size as u8)?;
        out.write_u8((self.clear_pos >> 8) as u8)?;
        out.write_u8(self.clear_pos as u8)?;

        Ok(Some(end_position))
    }

    /// Rebuild (or, in compare mode, check) the original compressed frame
    /// from the scratch layout. `size` is the total scratch length.
    /// Returns the number of compressed bytes produced, or `None` when the
    /// metadata cannot reproduce a stream.
    pub fn encode<R, S>(&mut self, input: &mut R, size: i64, out: &mut S, compare: bool) -> Result<Option<i64>>
        where R: Read, S: Read + Write
    {
        let mut header_size = (i32::from(input.expect_u8()?) << 8) + i32::from(input.expect_u8()?);
        header_size = (header_size - 5) / 4;

        let mut stored = i32::from(input.expect_u8()?);
        stored = (stored << 8) + i32::from(input.expect_u8()?);
        self.clear_pos = 0xFFFF & (MARKER - stored);

        let code_size = i32::from(input.expect_u8()?);
        if code_size < 2 || code_size > 8 {
            return Ok(None);
        }
        self.bits = code_size + 1;
        let clear_code = 1 << code_size;
        let end_code = clear_code + 1;

        if header_size < 0 || header_size > 4096 || self.clear_pos <= end_code + 1 {
            return Ok(None);
        }
        let header_size = header_size as usize;

        let block_count = input.read_u32_be()? as i64;
        if block_count < 0 || block_count > size {
            return Ok(None);
        }
        self.block_sizes.clear();
        for _ in 0 .. block_count {
            self.block_sizes.push(input.expect_u8()?);
        }
        self.block_index = 0;
        self.block_limit = match self.next_block_limit() {
            Some(limit) => limit,
            None => return Ok(None),
        };

        let mut diff_positions = vec![0_i64; header_size.max(1)];
        for entry in 0 .. header_size {
            let value = i64::from(input.read_u32_be()?);
            diff_positions[entry] = value;
            if entry > 0 {
                diff_positions[entry] += diff_positions[entry - 1];
            }
        }

        let mut current_diff = 0_usize;
        let mut max_code: i32 = end_code;
        for slot in self.table.iter_mut() { *slot = -1; }

        let mut remaining = size - (5 + header_size as i64 * 4);
        let mut last = match input.read_u8()? {
            Some(byte) => i32::from(byte),
            None => return Ok(None),
        };
        let total = remaining + 1;

        if compare {
            let byte = out.read_u8()?;
            if byte != Some(code_size as u8) && self.diff_found == 0 {
                self.diff_found = 1;
            }
        }
        else {
            out.write_u8(code_size as u8)?;
        }

        if header_size == 0 || diff_positions[0] != 0 {
            if self.write_code(out, clear_code, compare)? {
                return Ok(None);
            }
        }
        else {
            current_diff += 1;
        }

        while remaining != 0 {
            let byte = match input.read_u8()? {
                Some(byte) => i32::from(byte),
                None => break,
            };
            remaining -= 1;

            let key = (last << 8) + byte;
            let index = if last < 0 { byte } else { self.find_match(key) };
            self.code = index;

            if current_diff < header_size && (total - remaining) > diff_positions[current_diff] {
                // the original encoder emitted a shorter match here
                current_diff += 1;
                self.code = -1;
            }

            if self.code < 0 {
                if self.write_code(out, last, compare)? {
                    return Ok(None);
                }

                if max_code == self.clear_pos {
                    if self.write_code(out, clear_code, compare)? {
                        return Ok(None);
                    }
                    self.bits = code_size + 1;
                    max_code = end_code;
                    for slot in self.table.iter_mut() { *slot = -1; }
                }
                else {
                    max_code += 1;
                    if max_code <= 4095 {
                        self.dict[max_code as usize] = key;
                        let slot = if index < 0 { (-index - 1) as usize } else { 0 };
                        self.table[slot] = max_code;
                    }
                    if max_code >= (1 << self.bits) && self.bits < 12 {
                        self.bits += 1;
                    }
                }
                self.code = byte;
            }
            last = self.code;
        }

        if self.write_code(out, last, compare)? {
            return Ok(None);
        }
        if self.write_code(out, end_code, compare)? {
            return Ok(None);
        }

        if self.shift > 0 {
            self.block_fill += 1;
            self.staging[self.block_fill as usize] = self.buffer as u8;
            if self.block_fill == self.block_limit {
                let limit = self.block_limit;
                if self.write_block(out, limit, compare)? {
                    return Ok(None);
                }
            }
        }

        if self.block_fill > 0 {
            let fill = self.block_fill;
            if self.write_block(out, fill, compare)? {
                return Ok(None);
            }
        }

        if compare {
            let byte = out.read_u8()?;
            if byte != Some(0) && self.diff_found == 0 {
                self.diff_found = self.out_size + 1;
                return Ok(None);
            }
        }
        else {
            out.write_u8(0)?;
        }

        if self.diff_found != 0 {
            return Ok(None);
        }
        Ok(Some(self.out_size + 1))
    }

    fn next_block_limit(&mut self) -> Option<i32> {
        match self.block_sizes.get(self.block_index) {
            Some(&size) => {
                self.block_index += 1;
                Some(i32::from(size))
            }
            None => None,
        }
    }

    /// Pack one code into the bit buffer, flushing completed sub-blocks.
    /// A `true` return means the compare stream disagreed.
    fn write_code<S>(&mut self, out: &mut S, code: i32, compare: bool) -> Result<bool>
        where S: Read + Write
    {
        self.buffer += (code as u32) << self.shift;
        self.shift += self.bits;
        while self.shift >= 8 {
            self.block_fill += 1;
            if self.block_fill as usize >= self.staging.len() {
                return Ok(true);
            }
            self.staging[self.block_fill as usize] = self.buffer as u8;
            self.buffer >>= 8;
            self.shift -= 8;
            if self.block_fill == self.block_limit {
                let limit = self.block_limit;
                if self.write_block(out, limit, compare)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Emit one completed sub-block with its length prefix.
    fn write_block<S>(&mut self, out: &mut S, count: i32, compare: bool) -> Result<bool>
        where S: Read + Write
    {
        self.staging[0] = count as u8;
        if compare {
            for position in 0 ..= count as usize {
                let byte = out.read_u8()?;
                if byte != Some(self.staging[position]) && self.diff_found == 0 {
                    self.diff_found = self.out_size + position as i64 + 1;
                    return Ok(true);
                }
            }
        }
        else {
            out.write_all(&self.staging[.. count as usize + 1])?;
        }

        self.out_size += i64::from(count) + 1;
        self.block_fill = 0;
        // past the recorded list the limit collapses to zero, which only a
        // stream that should have failed verification can reach
        self.block_limit = self.next_block_limit().unwrap_or(0);
        Ok(false)
    }
}

impl Default for Codec {
    fn default() -> Self { Self::new() }
}
