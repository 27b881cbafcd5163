//! Reading and writing of the SFNT table directory.

use crate::{
    buffer::{checksum, round4, Buffer, WriteExt},
    error::{Result, Woff2Error},
    tag::Tag,
};
use std::{borrow::Cow, collections::HashMap};
use tracing::debug;

pub const TTC_FLAVOR: u32 = 0x74746366; // 'ttcf'
pub const SFNT_HEADER_SIZE: usize = 12;
pub const SFNT_ENTRY_SIZE: usize = 16;

/// The magic number the whole-font checksum must sum to.
pub const CHECKSUM_ADJUSTMENT_BASE: u32 = 0xB1B0AFBA;

/// Size of the `head` table we require, up to and including `glyphDataFormat`.
pub const HEAD_TABLE_MIN_SIZE: usize = 54;
pub const HEAD_CHECKSUM_ADJUSTMENT_OFFSET: usize = 8;
pub const HEAD_FLAGS_OFFSET: usize = 16;
pub const HEAD_INDEX_TO_LOC_FORMAT_OFFSET: usize = 50;

/// Size of the collection header, not including the font directories it points to.
pub fn collection_header_size(header_version: u32, num_fonts: usize) -> usize {
    let mut size = 12 + 4 * num_fonts;
    if header_version == 0x00020000 {
        size += 12; // ulDsigTag, ulDsigLength, ulDsigOffset
    }
    size
}

/// Computes the checksum of a `head` table, treating `checkSumAdjustment` as zero.
pub fn head_checksum(data: &[u8]) -> u32 {
    let at = HEAD_CHECKSUM_ADJUSTMENT_OFFSET;
    let adjustment = u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
    checksum(data).wrapping_sub(adjustment)
}

/// A table of the source font, deduplicated by its offset in the file.
#[derive(Clone, Debug)]
pub struct SourceTable<'a> {
    pub tag: Tag,
    pub offset: u32,
    pub checksum: u32,
    pub data: Cow<'a, [u8]>,
}

/// A single font of a (possibly single font) collection.
#[derive(Clone, Debug)]
pub struct FontEntry {
    pub flavor: u32,
    /// The tables of this font, sorted by tag. The second value indexes
    /// [`FontCollection::tables`].
    pub tables: Vec<(Tag, usize)>,
}
impl FontEntry {
    pub fn find(&self, tag: Tag) -> Option<usize> {
        self.tables
            .binary_search_by_key(&tag, |x| x.0)
            .ok()
            .map(|x| self.tables[x].1)
    }
}

/// A parsed input font, or font collection.
#[derive(Clone, Debug)]
pub struct FontCollection<'a> {
    pub flavor: u32,
    pub header_version: u32,
    pub fonts: Vec<FontEntry>,
    pub tables: Vec<SourceTable<'a>>,
}
impl<'a> FontCollection<'a> {
    pub fn is_collection(&self) -> bool {
        self.flavor == TTC_FLAVOR
    }

    pub fn table(&self, font: &FontEntry, tag: Tag) -> Option<&SourceTable<'a>> {
        font.find(tag).map(|x| &self.tables[x])
    }

    /// Parses a single font or a font collection.
    pub fn parse(data: &'a [u8], verify_checksums: bool) -> Result<FontCollection<'a>> {
        let mut buf = Buffer::new(data);
        let flavor = buf.read_u32()?;

        let mut reader = DirectoryReader {
            data,
            tables: Vec::new(),
            by_offset: HashMap::new(),
            reserved: Vec::new(),
        };

        let (header_version, fonts) = if flavor == TTC_FLAVOR {
            let header_version = buf.read_u32()?;
            if header_version != 0x00010000 && header_version != 0x00020000 {
                return Err(Woff2Error::Malformed("unknown font collection header version"));
            }
            let num_fonts = buf.read_u32()?;
            if num_fonts == 0 || num_fonts > u16::MAX as u32 {
                return Err(Woff2Error::Malformed("bad number of fonts in collection"));
            }
            let mut offsets = Vec::new();
            for _ in 0..num_fonts {
                offsets.push(buf.read_u32()?);
            }
            let header_size = collection_header_size(header_version, num_fonts as usize);
            if header_size > data.len() {
                return Err(Woff2Error::Truncated);
            }
            reader.reserved.push((0, header_size));

            let mut fonts = Vec::new();
            for offset in offsets {
                fonts.push(reader.read_font(offset as usize)?);
            }
            (header_version, fonts)
        } else {
            (0, vec![reader.read_font(0)?])
        };

        reader.check_overlaps()?;

        let tables = reader.tables;
        for table in &tables {
            if table.tag == Tag::HEAD && table.data.len() < HEAD_TABLE_MIN_SIZE {
                return Err(Woff2Error::table(Tag::HEAD, "table is too short"));
            }
            if verify_checksums {
                let computed = if table.tag == Tag::HEAD {
                    head_checksum(&table.data)
                } else {
                    checksum(&table.data)
                };
                if computed != table.checksum {
                    return Err(Woff2Error::ChecksumMismatch {
                        tag: table.tag,
                        stored: table.checksum,
                        computed,
                    });
                }
            }
        }

        debug!("Parsed {} font(s) with {} unique table(s).", fonts.len(), tables.len());
        Ok(FontCollection { flavor, header_version, fonts, tables })
    }
}

struct DirectoryReader<'a> {
    data: &'a [u8],
    tables: Vec<SourceTable<'a>>,
    by_offset: HashMap<u32, usize>,
    reserved: Vec<(usize, usize)>,
}
impl<'a> DirectoryReader<'a> {
    fn read_font(&mut self, font_offset: usize) -> Result<FontEntry> {
        let mut buf = Buffer::new(self.data);
        buf.set_offset(font_offset)?;

        // searchRange, entrySelector and rangeShift are recomputed when writing the font
        let flavor = buf.read_u32()?;
        if flavor == TTC_FLAVOR {
            return Err(Woff2Error::Malformed("nested font collection"));
        }
        let num_tables = buf.read_u16()?;
        buf.skip(6)?;
        if num_tables == 0 {
            return Err(Woff2Error::Malformed("font has no tables"));
        }
        self.reserved
            .push((font_offset, SFNT_HEADER_SIZE + SFNT_ENTRY_SIZE * num_tables as usize));

        let mut tables = Vec::new();
        for _ in 0..num_tables {
            let tag = buf.read_tag()?;
            let checksum = buf.read_u32()?;
            let offset = buf.read_u32()?;
            let length = buf.read_u32()?;

            if offset & 3 != 0 {
                return Err(Woff2Error::table(tag, "table offset is not 4-byte aligned"));
            }
            let end = offset as usize + length as usize;
            if end > self.data.len() {
                return Err(Woff2Error::table(tag, "table extends past the end of the file"));
            }

            let idx = if let Some(&idx) = self.by_offset.get(&offset) {
                let existing = &self.tables[idx];
                if existing.tag != tag || existing.data.len() != length as usize {
                    return Err(Woff2Error::table(tag, "table shares data with a different table"));
                }
                idx
            } else {
                let idx = self.tables.len();
                self.tables.push(SourceTable {
                    tag,
                    offset,
                    checksum,
                    data: Cow::Borrowed(&self.data[offset as usize..end]),
                });
                self.by_offset.insert(offset, idx);
                idx
            };
            tables.push((tag, idx));
        }

        tables.sort_by_key(|x| x.0);
        if tables.windows(2).any(|x| x[0].0 == x[1].0) {
            return Err(Woff2Error::Malformed("duplicate table tag in font"));
        }

        Ok(FontEntry { flavor, tables })
    }

    fn check_overlaps(&self) -> Result<()> {
        let mut ranges: Vec<(usize, usize)> = self
            .tables
            .iter()
            .map(|x| (x.offset as usize, x.data.len()))
            .chain(self.reserved.iter().copied())
            .filter(|x| x.1 != 0)
            .collect();
        ranges.sort();
        ranges.dedup();
        for pair in ranges.windows(2) {
            if pair[0].0 + pair[0].1 > pair[1].0 {
                return Err(Woff2Error::Malformed("overlapping tables in font"));
            }
        }
        Ok(())
    }
}

/// Builds SFNT font files from a list of tables, computing the directory, table checksums and
/// the `head` checksum adjustment.
#[derive(Clone, Debug, Default)]
pub struct SfntBuilder {
    flavor: u32,
    tables: Vec<(Tag, Vec<u8>)>,
}
impl SfntBuilder {
    pub fn new(flavor: u32) -> Self {
        SfntBuilder { flavor, tables: Vec::new() }
    }

    /// Adds a table, replacing any existing table with the same tag.
    pub fn add_table(&mut self, tag: Tag, data: impl Into<Vec<u8>>) -> &mut Self {
        self.tables.retain(|x| x.0 != tag);
        self.tables.push((tag, data.into()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut font = FontEntry {
            flavor: self.flavor,
            tables: self.tables.iter().enumerate().map(|(i, x)| (x.0, i)).collect(),
        };
        font.tables.sort_by_key(|x| x.0);
        let tables: Vec<_> = self.tables.iter().map(|x| x.1.as_slice()).collect();
        write_fonts(None, &[font], &tables)
    }
}

/// Writes a font, or a font collection when a collection header version is given.
///
/// Each font's tables must be sorted by tag and index into `tables`. Tables shared between
/// fonts are written once. Table checksums and `head.checkSumAdjustment` are computed here.
pub fn write_fonts(
    collection_version: Option<u32>,
    fonts: &[FontEntry],
    tables: &[&[u8]],
) -> Vec<u8> {
    let table_checksum = |idx: usize| {
        let data = tables[idx];
        let is_head = fonts.iter().any(|x| x.find(Tag::HEAD) == Some(idx));
        if is_head && data.len() >= HEAD_TABLE_MIN_SIZE {
            head_checksum(data)
        } else {
            checksum(data)
        }
    };

    let mut offset = match collection_version {
        Some(version) => collection_header_size(version, fonts.len()),
        None => 0,
    };
    let mut font_offsets = Vec::with_capacity(fonts.len());
    for font in fonts {
        font_offsets.push(offset);
        offset += SFNT_HEADER_SIZE + SFNT_ENTRY_SIZE * font.tables.len();
    }
    let mut table_offsets: HashMap<usize, usize> = HashMap::new();
    let mut table_order = Vec::new();
    for font in fonts {
        for &(_, idx) in &font.tables {
            if !table_offsets.contains_key(&idx) {
                table_offsets.insert(idx, offset);
                table_order.push(idx);
                offset += round4(tables[idx].len());
            }
        }
    }

    let mut out = Vec::with_capacity(offset);
    if let Some(version) = collection_version {
        out.put_u32(TTC_FLAVOR);
        out.put_u32(version);
        out.put_u32(fonts.len() as u32);
        for &font_offset in &font_offsets {
            out.put_u32(font_offset as u32);
        }
        if version == 0x00020000 {
            // no DSIG table
            out.put_u32(0);
            out.put_u32(0);
            out.put_u32(0);
        }
    }

    let mut adjustments = Vec::with_capacity(fonts.len());
    for font in fonts {
        let start = out.len();
        write_sfnt_header(&mut out, font.flavor, font.tables.len() as u16);
        let mut font_checksum = 0u32;
        for &(tag, idx) in &font.tables {
            let sum = table_checksum(idx);
            out.put_tag(tag);
            out.put_u32(sum);
            out.put_u32(table_offsets[&idx] as u32);
            out.put_u32(tables[idx].len() as u32);
            font_checksum = font_checksum.wrapping_add(sum);
        }
        font_checksum = font_checksum.wrapping_add(checksum(&out[start..]));
        adjustments.push(CHECKSUM_ADJUSTMENT_BASE.wrapping_sub(font_checksum));
    }

    for &idx in &table_order {
        out.extend_from_slice(tables[idx]);
        out.pad_to_4();
    }

    // a head table shared between fonts keeps the adjustment of the first font using it
    for (font, adjustment) in fonts.iter().zip(adjustments).rev() {
        if let Some(idx) = font.find(Tag::HEAD) {
            if tables[idx].len() >= HEAD_TABLE_MIN_SIZE {
                let at = table_offsets[&idx] + HEAD_CHECKSUM_ADJUSTMENT_OFFSET;
                out[at..at + 4].copy_from_slice(&adjustment.to_be_bytes());
            }
        }
    }

    out
}

/// Writes the offset table of an SFNT font.
pub fn write_sfnt_header(out: &mut Vec<u8>, flavor: u32, num_tables: u16) {
    let mut entry_selector = 0u16;
    while (2u32 << entry_selector) <= num_tables as u32 {
        entry_selector += 1;
    }
    let search_range = (1u16 << entry_selector).wrapping_mul(16);
    let range_shift = num_tables.wrapping_mul(16).wrapping_sub(search_range);

    out.put_u32(flavor);
    out.put_u16(num_tables);
    out.put_u16(search_range);
    out.put_u16(entry_selector);
    out.put_u16(range_shift);
}
