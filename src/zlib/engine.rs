
//! Streaming access to the reference DEFLATE engine.
//!
//! The recompression oracle needs the one thing the pure-Rust inflate and
//! deflate crates cannot give it: the byte-exact output of the reference
//! encoder for every `(level, memory level, window bits)` combination. So
//! this module wraps zlib itself behind two safe types with explicit input
//! and output cursors, and nothing outside it touches the FFI. Contexts
//! release their engine state on drop.

use std::os::raw::{c_char, c_int, c_uint};
use libz_sys as sys;
use crate::error::{Error, Result};


/// The base-two logarithm of the largest supported history window.
pub const MAX_WBITS: i32 = 15;


/// How a [`run`](Inflate::run) call should treat the end of its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// More input will follow; the engine may buffer freely.
    None,

    /// This is the final input; drain everything and close the stream.
    Finish,
}

impl Flush {
    fn raw(self) -> c_int {
        match self {
            Flush::None => sys::Z_NO_FLUSH,
            Flush::Finish => sys::Z_FINISH,
        }
    }
}


/// Engine verdict for one streaming step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Progress was made, the stream continues.
    Ok,

    /// The stream is complete.
    StreamEnd,

    /// No progress was possible with the buffers given; retry with more
    /// input or output space.
    BufError,

    /// The stream (or its use) is broken beyond this point.
    Failed,
}


/// The outcome of pushing bytes through a context once.
#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub status: Status,
    pub consumed: usize,
    pub produced: usize,
}


fn classify(code: c_int) -> Status {
    match code {
        sys::Z_OK => Status::Ok,
        sys::Z_STREAM_END => Status::StreamEnd,
        sys::Z_BUF_ERROR => Status::BufError,
        _ => Status::Failed,
    }
}

// The struct contains raw function pointer fields which are never called
// while null; zlib installs its own allocator when they are unset.
#[allow(invalid_value, clippy::uninit_assumed_init)]
fn zeroed_stream() -> Box<sys::z_stream> {
    Box::new(unsafe { std::mem::MaybeUninit::zeroed().assume_init() })
}

fn version() -> *const c_char {
    unsafe { sys::zlibVersion() }
}

fn stream_size() -> c_int {
    std::mem::size_of::<sys::z_stream>() as c_int
}


/// A streaming decompression context.
pub struct Inflate {
    stream: Box<sys::z_stream>,
}

impl std::fmt::Debug for Inflate {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("Inflate")
            .field("total_in", &self.total_in())
            .field("total_out", &self.total_out())
            .finish()
    }
}

impl Inflate {

    /// Positive `window_bits` expect a zlib wrapper, negative mean a raw
    /// DEFLATE stream.
    pub fn new(window_bits: i32) -> Result<Self> {
        let mut stream = zeroed_stream();

        let code = unsafe {
            sys::inflateInit2_(&mut *stream, window_bits as c_int, version(), stream_size())
        };

        if code != sys::Z_OK {
            return Err(Error::invalid("inflate context setup"));
        }

        Ok(Self { stream })
    }

    /// Decompress from `input` into `output` until one of them runs out.
    pub fn run(&mut self, input: &[u8], output: &mut [u8], flush: Flush) -> Step {
        self.stream.next_in = input.as_ptr() as *mut u8;
        self.stream.avail_in = input.len() as c_uint;
        self.stream.next_out = output.as_mut_ptr();
        self.stream.avail_out = output.len() as c_uint;

        let code = unsafe { sys::inflate(&mut *self.stream, flush.raw()) };

        Step {
            status: classify(code),
            consumed: input.len() - self.stream.avail_in as usize,
            produced: output.len() - self.stream.avail_out as usize,
        }
    }

    pub fn total_in(&self) -> u64 {
        self.stream.total_in as u64
    }

    pub fn total_out(&self) -> u64 {
        self.stream.total_out as u64
    }
}

impl Drop for Inflate {
    fn drop(&mut self) {
        unsafe { sys::inflateEnd(&mut *self.stream); }
    }
}


/// A streaming compression context for one parameter combination.
pub struct Deflate {
    stream: Box<sys::z_stream>,
}

impl std::fmt::Debug for Deflate {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("Deflate")
            .field("total_out", &self.total_out())
            .finish()
    }
}

impl Deflate {

    /// `level` and `mem_level` range over `1..=9`; `window_bits` follows
    /// the same sign convention as [`Inflate::new`]. The strategy is the
    /// engine default, which is the only one the oracle reproduces.
    pub fn new(level: i32, window_bits: i32, mem_level: i32) -> Result<Self> {
        let mut stream = zeroed_stream();

        let code = unsafe {
            sys::deflateInit2_(
                &mut *stream,
                level as c_int,
                sys::Z_DEFLATED,
                window_bits as c_int,
                mem_level as c_int,
                sys::Z_DEFAULT_STRATEGY,
                version(),
                stream_size(),
            )
        };

        if code != sys::Z_OK {
            return Err(Error::invalid("deflate context setup"));
        }

        Ok(Self { stream })
    }

    /// Compress from `input` into `output` until one of them runs out.
    pub fn run(&mut self, input: &[u8], output: &mut [u8], flush: Flush) -> Step {
        self.stream.next_in = input.as_ptr() as *mut u8;
        self.stream.avail_in = input.len() as c_uint;
        self.stream.next_out = output.as_mut_ptr();
        self.stream.avail_out = output.len() as c_uint;

        let code = unsafe { sys::deflate(&mut *self.stream, flush.raw()) };

        Step {
            status: classify(code),
            consumed: input.len() - self.stream.avail_in as usize,
            produced: output.len() - self.stream.avail_out as usize,
        }
    }

    pub fn total_out(&self) -> u64 {
        self.stream.total_out as u64
    }
}

impl Drop for Deflate {
    fn drop(&mut self) {
        unsafe { sys::deflateEnd(&mut *self.stream); }
    }
}


#[cfg(test)]
mod test {
    use super::*;

    fn deflate_all(data: &[u8], level: i32, window_bits: i32, mem_level: i32) -> Vec<u8> {
        let mut deflate = Deflate::new(level, window_bits, mem_level).unwrap();
        let mut compressed = vec![0_u8; data.len() * 2 + 256];
        let step = deflate.run(data, &mut compressed, Flush::Finish);
        assert_eq!(step.status, Status::StreamEnd);
        compressed.truncate(step.produced);
        compressed
    }

    #[test]
    fn round_trip_through_the_engine(){
        let data: Vec<u8> = (0_u32 .. 4096).map(|n| (n * 31 % 251) as u8).collect();
        let compressed = deflate_all(&data, 6, MAX_WBITS, 8);

        let mut inflate = Inflate::new(MAX_WBITS).unwrap();
        let mut decompressed = vec![0_u8; data.len() + 16];
        let step = inflate.run(&compressed, &mut decompressed, Flush::Finish);

        assert_eq!(step.status, Status::StreamEnd);
        assert_eq!(step.consumed, compressed.len());
        assert_eq!(&decompressed[.. step.produced], data.as_slice());
        assert_eq!(inflate.total_in(), compressed.len() as u64);
    }

    #[test]
    fn parameters_change_the_byte_stream(){
        // text-like data with plenty of competing matches, so the hash
        // table size shows through in the token choices
        let mut state = 0x2545_F491_u32;
        let data: Vec<u8> = (0 .. 8192).map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            b'a' + ((state >> 16) % 13) as u8
        }).collect();

        // identical parameters reproduce identical bytes
        assert_eq!(
            deflate_all(&data, 9, MAX_WBITS, 9),
            deflate_all(&data, 9, MAX_WBITS, 9),
        );

        // the memory level alone already alters the output
        assert_ne!(
            deflate_all(&data, 9, MAX_WBITS, 9),
            deflate_all(&data, 9, MAX_WBITS, 1),
        );
    }

    #[test]
    fn corrupt_input_fails(){
        let mut inflate = Inflate::new(MAX_WBITS).unwrap();
        let mut output = vec![0_u8; 64];
        let step = inflate.run(&[0x12, 0x34, 0x56, 0x78], &mut output, Flush::Finish);
        assert_eq!(step.status, Status::Failed);
    }
}
