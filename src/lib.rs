
//! Reversible format-aware precompression.
//!
//! Compressed data hiding inside other files — GIF image frames, PNG IDAT
//! chunks, PDF stream objects — is nearly opaque to whatever entropy coder
//! sits behind it. This crate finds such substreams, decompresses them in
//! place while recording exactly enough metadata to rebuild the original
//! bytes, and hands the far more compressible result to the caller's
//! coder. The reverse pass restores the input bit for bit, whether or not
//! any substream was transformed; a substream that cannot be reproduced
//! exactly is passed through verbatim behind an explicit marker instead.

#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    unused,

    missing_copy_implementations,
    missing_debug_implementations,
)]

#![deny(
    unsafe_code,
    unused_must_use,
)]


pub mod error;
pub mod io;
pub mod coder;
pub mod zlib;
pub mod gif;
pub mod png;
pub mod pdf;
pub mod filter;


/// Re-exports of the types required for plain forward and reverse passes.
pub mod prelude {
    // main entry points
    pub use crate::filter::{precompress, reconstruct};

    // the entropy-coder seam
    pub use crate::coder::{Coder, Decoder, RawCoder, RawDecoder};

    // secondary types
    pub use crate::error::{Error, Result};
    pub use crate::io::Scratch;
}
