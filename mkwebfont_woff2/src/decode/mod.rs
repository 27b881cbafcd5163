//! Decoding of WOFF2 files back into SFNT fonts.

use crate::{
    buffer::{round4, Buffer},
    compress::brotli_decompress,
    encode::{WOFF2_HEADER_SIZE, WOFF2_SIGNATURE},
    error::{Result, Woff2Error},
    sfnt::{write_fonts, FontEntry, HEAD_INDEX_TO_LOC_FORMAT_OFFSET, TTC_FLAVOR},
    tag::{Tag, ARBITRARY_TAG_INDEX},
    transform::{hmtx::read_num_h_metrics, is_transformed, GLYF_NULL_TRANSFORM, HMTX_TRANSFORM},
};
use std::collections::HashMap;
use tracing::debug;

mod glyf;
mod hmtx;

/// The fixed size header of a WOFF2 file.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Woff2Header {
    pub flavor: u32,
    pub length: u32,
    pub num_tables: u16,
    pub total_sfnt_size: u32,
    pub total_compressed_size: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub meta_offset: u32,
    pub meta_length: u32,
    pub meta_orig_length: u32,
    pub priv_offset: u32,
    pub priv_length: u32,
}
impl Woff2Header {
    pub fn read(data: &[u8]) -> Result<Woff2Header> {
        let mut buf = Buffer::new(data);
        if buf.read_u32()? != WOFF2_SIGNATURE {
            return Err(Woff2Error::Malformed("not a WOFF2 file"));
        }
        let flavor = buf.read_u32()?;
        let length = buf.read_u32()?;
        let num_tables = buf.read_u16()?;
        let reserved = buf.read_u16()?;
        let header = Woff2Header {
            flavor,
            length,
            num_tables,
            total_sfnt_size: buf.read_u32()?,
            total_compressed_size: buf.read_u32()?,
            major_version: buf.read_u16()?,
            minor_version: buf.read_u16()?,
            meta_offset: buf.read_u32()?,
            meta_length: buf.read_u32()?,
            meta_orig_length: buf.read_u32()?,
            priv_offset: buf.read_u32()?,
            priv_length: buf.read_u32()?,
        };

        if length as usize != data.len() {
            return Err(Woff2Error::Malformed("header length does not match file length"));
        }
        if reserved != 0 {
            return Err(Woff2Error::Malformed("reserved header field is not zero"));
        }
        if num_tables == 0 {
            return Err(Woff2Error::Malformed("file has no tables"));
        }
        Ok(header)
    }
}

struct TableEntry {
    tag: Tag,
    version: u8,
    orig_length: u32,
    /// Offset and length within the decompressed table stream.
    src_offset: usize,
    src_length: usize,
}
impl TableEntry {
    fn is_transformed(&self) -> bool {
        is_transformed(self.tag, self.version)
    }
}

struct Woff2File<'a> {
    header: Woff2Header,
    tables: Vec<TableEntry>,
    collection_version: Option<u32>,
    fonts: Vec<FontEntry>,
    compressed: &'a [u8],
    stream_length: usize,
}

fn read_table_directory(buf: &mut Buffer, num_tables: u16) -> Result<(Vec<TableEntry>, usize)> {
    let mut tables = Vec::with_capacity(num_tables as usize);
    let mut src_offset = 0usize;
    for _ in 0..num_tables {
        let flags = buf.read_u8()?;
        let tag = match flags & 0x3F {
            ARBITRARY_TAG_INDEX => buf.read_tag()?,
            idx => Tag::from_known_index(idx).ok_or(Woff2Error::Malformed("unknown table index"))?,
        };
        let version = flags >> 6;
        let orig_length = buf.read_base128()?;

        let valid_version = if tag == Tag::GLYF || tag == Tag::LOCA {
            version == 0 || version == GLYF_NULL_TRANSFORM
        } else if tag == Tag::HMTX {
            version == 0 || version == HMTX_TRANSFORM
        } else {
            version == 0
        };
        if !valid_version {
            return Err(Woff2Error::table(tag, "unknown transform version"));
        }

        let mut src_length = orig_length as usize;
        if is_transformed(tag, version) {
            src_length = buf.read_base128()? as usize;
            if tag == Tag::LOCA && src_length != 0 {
                return Err(Woff2Error::table(tag, "transformed loca has data"));
            }
        }

        tables.push(TableEntry { tag, version, orig_length, src_offset, src_length });
        src_offset = src_offset
            .checked_add(src_length)
            .filter(|x| *x <= u32::MAX as usize)
            .ok_or(Woff2Error::Malformed("table data is too large"))?;
    }
    Ok((tables, src_offset))
}

fn font_entry(flavor: u32, tables: &[TableEntry], indices: Vec<usize>) -> Result<FontEntry> {
    let mut font = FontEntry {
        flavor,
        tables: indices.into_iter().map(|x| (tables[x].tag, x)).collect(),
    };
    font.tables.sort_by_key(|x| x.0);
    if font.tables.windows(2).any(|x| x[0].0 == x[1].0) {
        return Err(Woff2Error::Malformed("duplicate table tag in font"));
    }

    let glyf = font.find(Tag::GLYF).map(|x| &tables[x]);
    let loca = font.find(Tag::LOCA).map(|x| &tables[x]);
    match (glyf, loca) {
        (None, None) => {}
        (Some(glyf), Some(loca)) if glyf.is_transformed() == loca.is_transformed() => {}
        _ => return Err(Woff2Error::Malformed("glyf and loca tables do not match")),
    }
    if let Some(hmtx) = font.find(Tag::HMTX).map(|x| &tables[x]) {
        if hmtx.is_transformed() && !glyf.is_some_and(|x| x.is_transformed()) {
            return Err(Woff2Error::table(Tag::HMTX, "transformed without a transformed glyf"));
        }
    }
    Ok(font)
}

fn read_woff2(data: &[u8]) -> Result<Woff2File> {
    let header = Woff2Header::read(data)?;
    let mut buf = Buffer::new(data);
    buf.set_offset(WOFF2_HEADER_SIZE)?;

    let (tables, stream_length) = read_table_directory(&mut buf, header.num_tables)?;

    let (collection_version, fonts) = if header.flavor == TTC_FLAVOR {
        let version = buf.read_u32()?;
        if version != 0x00010000 && version != 0x00020000 {
            return Err(Woff2Error::Malformed("unknown font collection header version"));
        }
        let num_fonts = buf.read_255_u16()?;
        if num_fonts == 0 {
            return Err(Woff2Error::Malformed("font collection has no fonts"));
        }
        let mut fonts = Vec::with_capacity(num_fonts as usize);
        for _ in 0..num_fonts {
            let num_tables = buf.read_255_u16()?;
            let flavor = buf.read_u32()?;
            if num_tables == 0 {
                return Err(Woff2Error::Malformed("font has no tables"));
            }
            let mut indices = Vec::with_capacity(num_tables as usize);
            for _ in 0..num_tables {
                let idx = buf.read_255_u16()? as usize;
                if idx >= tables.len() {
                    return Err(Woff2Error::Malformed("table index out of range"));
                }
                indices.push(idx);
            }
            fonts.push(font_entry(flavor, &tables, indices)?);
        }
        (Some(version), fonts)
    } else {
        (None, vec![font_entry(header.flavor, &tables, (0..tables.len()).collect())?])
    };

    let compressed_offset = buf.offset();
    let compressed = buf
        .read_bytes(header.total_compressed_size as usize)
        .map_err(|_| Woff2Error::Malformed("compressed data extends past the end of the file"))?;

    let mut offset = round4(compressed_offset + compressed.len());
    for (block_offset, block_length) in [
        (header.meta_offset, header.meta_length),
        (header.priv_offset, header.priv_length),
    ] {
        if block_offset == 0 {
            continue;
        }
        let end = block_offset as usize + block_length as usize;
        if block_offset as usize != offset || end > data.len() {
            return Err(Woff2Error::Malformed("misplaced metadata or private data block"));
        }
        offset = round4(end);
    }
    if offset != round4(data.len()) {
        return Err(Woff2Error::Malformed("unexpected data at the end of the file"));
    }

    Ok(Woff2File { header, tables, collection_version, fonts, compressed, stream_length })
}

/// Returns the size of the font stored in a WOFF2 file, as recorded in its header.
pub fn compute_woff2_final_size(data: &[u8]) -> Result<usize> {
    Ok(read_woff2(data)?.header.total_sfnt_size as usize)
}

/// Returns the decompressed extended metadata of a WOFF2 file, if it has any.
pub fn read_extended_metadata(data: &[u8]) -> Result<Option<Vec<u8>>> {
    let file = read_woff2(data)?;
    if file.header.meta_offset == 0 {
        return Ok(None);
    }
    let start = file.header.meta_offset as usize;
    let compressed = &data[start..start + file.header.meta_length as usize];
    Ok(Some(brotli_decompress(compressed, file.header.meta_orig_length as usize)?))
}

/// Decodes a WOFF2 file into a newly allocated font or font collection.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let file = read_woff2(data)?;
    let stream = brotli_decompress(file.compressed, file.stream_length)?;

    let mut decoded: Vec<Option<Vec<u8>>> = file
        .tables
        .iter()
        .map(|x| {
            if x.is_transformed() {
                None
            } else {
                Some(stream[x.src_offset..x.src_offset + x.src_length].to_vec())
            }
        })
        .collect();
    let mut loca_by_glyf: HashMap<usize, usize> = HashMap::new();
    let mut x_mins_by_glyf: HashMap<usize, Vec<Option<i16>>> = HashMap::new();

    for font in &file.fonts {
        let glyf = font.find(Tag::GLYF).filter(|x| file.tables[*x].is_transformed());
        let Some(glyf) = glyf else { continue };
        // glyf and loca are transformed together
        let Some(loca) = font.find(Tag::LOCA) else { continue };

        match loca_by_glyf.get(&glyf) {
            Some(&x) if x == loca => {}
            Some(_) => return Err(Woff2Error::Unsupported("glyf and loca shared separately")),
            None if decoded[loca].is_some() => {
                return Err(Woff2Error::Unsupported("glyf and loca shared separately"))
            }
            None => {
                let entry = &file.tables[glyf];
                let data = &stream[entry.src_offset..entry.src_offset + entry.src_length];
                let reconstructed = glyf::reconstruct_glyf(data)?;
                if reconstructed.loca.len() != file.tables[loca].orig_length as usize {
                    return Err(Woff2Error::table(Tag::LOCA, "length does not match glyph count"));
                }
                if let Some(head) = font.find(Tag::HEAD).and_then(|x| decoded[x].as_ref()) {
                    let at = HEAD_INDEX_TO_LOC_FORMAT_OFFSET;
                    let index_format = reconstructed.index_format.to_be_bytes();
                    if head.len() < at + 2 || head[at..at + 2] != index_format {
                        let reason = "indexToLocFormat does not match glyf";
                        return Err(Woff2Error::table(Tag::HEAD, reason));
                    }
                }
                debug!("Reconstructed glyf with {} glyphs.", reconstructed.x_mins.len());

                decoded[glyf] = Some(reconstructed.glyf);
                decoded[loca] = Some(reconstructed.loca);
                loca_by_glyf.insert(glyf, loca);
                x_mins_by_glyf.insert(glyf, reconstructed.x_mins);
            }
        }

        let hmtx = font.find(Tag::HMTX).filter(|x| file.tables[*x].is_transformed());
        if let Some(hmtx) = hmtx.filter(|x| decoded[*x].is_none()) {
            let hhea = font
                .find(Tag::HHEA)
                .and_then(|x| decoded[x].as_ref())
                .ok_or(Woff2Error::table(Tag::HMTX, "transformed without an hhea table"))?;
            let num_h_metrics = read_num_h_metrics(hhea)?;

            let entry = &file.tables[hmtx];
            let reconstructed = hmtx::reconstruct_hmtx(
                &stream[entry.src_offset..entry.src_offset + entry.src_length],
                num_h_metrics,
                &x_mins_by_glyf[&glyf],
            )?;
            if reconstructed.len() != entry.orig_length as usize {
                return Err(Woff2Error::table(Tag::HMTX, "length does not match glyph count"));
            }
            decoded[hmtx] = Some(reconstructed);
        }
    }

    let tables: Vec<Vec<u8>> = decoded.into_iter().map(Option::unwrap_or_default).collect();
    let table_refs: Vec<&[u8]> = tables.iter().map(|x| x.as_slice()).collect();
    let font = write_fonts(file.collection_version, &file.fonts, &table_refs);

    debug!("Decoded {} byte WOFF2 file into {} byte font.", data.len(), font.len());
    Ok(font)
}

/// Decodes a WOFF2 file into a caller provided buffer, returning the number of bytes written.
///
/// The buffer is only written to if decoding succeeds.
pub fn convert_woff2_to_ttf(data: &[u8], out: &mut [u8]) -> Result<usize> {
    let font = decompress(data)?;
    if font.len() > out.len() {
        return Err(Woff2Error::InsufficientCapacity { required: font.len(), available: out.len() });
    }
    out[..font.len()].copy_from_slice(&font);
    Ok(font.len())
}
