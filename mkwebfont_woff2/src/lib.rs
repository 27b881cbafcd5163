//! A pure Rust WOFF2 encoder and decoder.
//!
//! Fonts are encoded with [`compress`] or, for a caller provided buffer sized with
//! [`max_woff2_compressed_size`], [`convert_ttf_to_woff2`]. Both TrueType/OpenType fonts and
//! font collections are supported. [`decompress`] reverses the process.

mod buffer;
mod compress;
pub mod config;
mod decode;
mod encode;
mod error;
pub mod glyph;
pub mod sfnt;
mod tag;
mod transform;

pub use compress::MAX_BROTLI_QUALITY;
pub use decode::{
    compute_woff2_final_size, convert_woff2_to_ttf, decompress, read_extended_metadata,
    Woff2Header,
};
pub use encode::{
    compress, convert_ttf_to_woff2, max_woff2_compressed_size, Woff2Params, WOFF2_HEADER_SIZE,
    WOFF2_SIGNATURE,
};
pub use error::{Result, Woff2Error};
pub use tag::Tag;
