//! Serialization of WOFF2 files.

use crate::{
    buffer::{round4, WriteExt},
    compress::{brotli_bound, brotli_compress, CompressionMode, MAX_BROTLI_QUALITY},
    error::{Result, Woff2Error},
    sfnt::FontCollection,
    tag::ARBITRARY_TAG_INDEX,
    transform::{encode_tables, EncodedCollection, EncodedTable},
};
use tracing::debug;

pub const WOFF2_SIGNATURE: u32 = 0x774F4632; // 'wOF2'
pub const WOFF2_HEADER_SIZE: usize = 48;

/// Slack reserved in the size bound for the table and collection directories.
const DIRECTORY_SLACK: usize = 1024;

/// Parameters for encoding a WOFF2 file.
#[derive(Clone, Debug)]
pub struct Woff2Params {
    /// Extended metadata, usually XML. Stored compressed, and omitted entirely when empty.
    pub extended_metadata: Vec<u8>,
    /// Brotli quality level, from 0 to 11.
    pub brotli_quality: u32,
    /// Whether to apply the `glyf`, `loca` and `hmtx` transforms.
    pub allow_transforms: bool,
    /// Whether to reject fonts whose table checksums do not match their contents.
    pub verify_checksums: bool,
}
impl Default for Woff2Params {
    fn default() -> Self {
        Woff2Params {
            extended_metadata: Vec::new(),
            brotli_quality: MAX_BROTLI_QUALITY,
            allow_transforms: true,
            verify_checksums: true,
        }
    }
}

/// Returns an upper bound on the size of the WOFF2 file produced for a font.
///
/// An output buffer of this size is always large enough for [`convert_ttf_to_woff2`].
pub fn max_woff2_compressed_size(font: &[u8], extended_metadata: &[u8]) -> usize {
    WOFF2_HEADER_SIZE
        + DIRECTORY_SLACK
        + brotli_bound(font.len())
        + 3
        + brotli_bound(extended_metadata.len())
}

/// Encodes a font or font collection into a newly allocated WOFF2 file.
pub fn compress(font: &[u8], params: &Woff2Params) -> Result<Vec<u8>> {
    if params.brotli_quality > MAX_BROTLI_QUALITY {
        return Err(Woff2Error::InvalidQuality(params.brotli_quality));
    }

    let collection = FontCollection::parse(font, params.verify_checksums)?;
    let encoded = encode_tables(&collection, params.allow_transforms)?;
    let woff2 = write_woff2(&encoded, params)?;

    debug!(
        "Encoded {} byte font into {} byte WOFF2 file ({} tables, transforms {}).",
        font.len(),
        woff2.len(),
        encoded.tables.len(),
        if params.allow_transforms { "enabled" } else { "disabled" },
    );
    Ok(woff2)
}

/// Encodes a font or font collection into a caller provided buffer, returning the number of
/// bytes written.
///
/// The buffer is only written to if encoding succeeds.
pub fn convert_ttf_to_woff2(font: &[u8], out: &mut [u8], params: &Woff2Params) -> Result<usize> {
    let woff2 = compress(font, params)?;
    if woff2.len() > out.len() {
        return Err(Woff2Error::InsufficientCapacity {
            required: woff2.len(),
            available: out.len(),
        });
    }
    out[..woff2.len()].copy_from_slice(&woff2);
    Ok(woff2.len())
}

fn to_u32(value: usize, what: &'static str) -> Result<u32> {
    value.try_into().map_err(|_| Woff2Error::Unsupported(what))
}

fn write_woff2(encoded: &EncodedCollection, params: &Woff2Params) -> Result<Vec<u8>> {
    let num_tables: u16 = encoded
        .tables
        .len()
        .try_into()
        .map_err(|_| Woff2Error::Unsupported("too many tables"))?;

    let mut stream = Vec::with_capacity(encoded.tables.iter().map(|x| x.data.len()).sum());
    for table in &encoded.tables {
        stream.extend_from_slice(&table.data);
    }
    let compressed = brotli_compress(&stream, params.brotli_quality, CompressionMode::Font)?;
    debug!("Compressed table data: {} -> {} bytes.", stream.len(), compressed.len());

    let metadata = if params.extended_metadata.is_empty() {
        None
    } else {
        let quality = params.brotli_quality;
        Some(brotli_compress(&params.extended_metadata, quality, CompressionMode::Text)?)
    };

    let mut directory = Vec::new();
    for table in &encoded.tables {
        write_table_entry(&mut directory, table);
    }
    if encoded.is_collection() {
        write_collection_directory(&mut directory, encoded)?;
    }

    let data_offset = WOFF2_HEADER_SIZE + directory.len();
    let data_end = round4(data_offset + compressed.len());
    let (meta_offset, total_length) = match &metadata {
        Some(metadata) => (data_end, data_end + metadata.len()),
        None => (0, data_end),
    };

    let mut out = Vec::with_capacity(total_length);
    out.put_u32(WOFF2_SIGNATURE);
    out.put_u32(encoded.flavor);
    out.put_u32(to_u32(total_length, "output is too large")?);
    out.put_u16(num_tables);
    out.put_u16(0); // reserved
    out.put_u32(to_u32(encoded.decoded_size(), "decoded font is too large")?);
    out.put_u32(to_u32(compressed.len(), "output is too large")?);
    out.put_u16(1); // majorVersion
    out.put_u16(0); // minorVersion
    out.put_u32(meta_offset as u32);
    out.put_u32(metadata.as_ref().map_or(0, |x| x.len()) as u32);
    out.put_u32(to_u32(params.extended_metadata.len(), "metadata is too large")?);
    out.put_u32(0); // privOffset
    out.put_u32(0); // privLength
    debug_assert_eq!(out.len(), WOFF2_HEADER_SIZE);

    out.extend_from_slice(&directory);
    out.extend_from_slice(&compressed);
    out.pad_to_4();
    if let Some(metadata) = &metadata {
        out.extend_from_slice(metadata);
    }
    debug_assert_eq!(out.len(), total_length);

    Ok(out)
}

fn write_table_entry(out: &mut Vec<u8>, table: &EncodedTable) {
    let known_index = table.tag.known_index();
    out.put_u8(known_index.unwrap_or(ARBITRARY_TAG_INDEX) | (table.version << 6));
    if known_index.is_none() {
        out.put_tag(table.tag);
    }
    out.put_base128(table.orig_length);
    if table.is_transformed() {
        out.put_base128(table.data.len() as u32);
    }
}

fn write_collection_directory(out: &mut Vec<u8>, encoded: &EncodedCollection) -> Result<()> {
    let too_many = |_| Woff2Error::Unsupported("too many fonts or tables in collection");

    out.put_u32(encoded.header_version);
    out.put_255_u16(encoded.fonts.len().try_into().map_err(too_many)?);
    for font in &encoded.fonts {
        out.put_255_u16(font.tables.len().try_into().map_err(too_many)?);
        out.put_u32(font.flavor);
        for &idx in &font.tables {
            out.put_255_u16(idx.try_into().map_err(too_many)?);
        }
    }
    Ok(())
}
