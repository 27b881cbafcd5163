//! Prepares the tables of a font for WOFF2 serialization, applying the `glyf`, `loca` and
//! `hmtx` transforms where they are allowed and profitable.

use crate::{
    buffer::{round4, Buffer},
    error::{Result, Woff2Error},
    sfnt::{
        collection_header_size, FontCollection, FontEntry, HEAD_FLAGS_OFFSET,
        HEAD_INDEX_TO_LOC_FORMAT_OFFSET, SFNT_ENTRY_SIZE, SFNT_HEADER_SIZE, TTC_FLAVOR,
    },
    tag::Tag,
};
use std::{borrow::Cow, collections::HashMap};
use tracing::debug;

pub mod glyf;
pub mod hmtx;

/// The transform version of the null transform for `glyf` and `loca`.
pub const GLYF_NULL_TRANSFORM: u8 = 3;
pub const HMTX_TRANSFORM: u8 = 1;

/// `head.flags` bit 11: the font has been through a lossless modifying transform.
const HEAD_FLAG_LOSSLESS_TRANSFORM: u8 = 0x08;

const MAXP_NUM_GLYPHS_OFFSET: usize = 4;

/// A table as it will be stored in the WOFF2 data stream.
#[derive(Clone, Debug)]
pub struct EncodedTable<'a> {
    pub tag: Tag,
    pub version: u8,
    /// The length of the table once decoded.
    pub orig_length: u32,
    /// The data written into the compressed stream.
    pub data: Cow<'a, [u8]>,
}
impl<'a> EncodedTable<'a> {
    fn null(tag: Tag, data: Cow<'a, [u8]>) -> Self {
        let version = if tag == Tag::GLYF || tag == Tag::LOCA { GLYF_NULL_TRANSFORM } else { 0 };
        EncodedTable { tag, version, orig_length: data.len() as u32, data }
    }

    pub fn is_transformed(&self) -> bool {
        is_transformed(self.tag, self.version)
    }
}

/// Whether a table directory entry with this tag and version stores transformed data.
pub fn is_transformed(tag: Tag, version: u8) -> bool {
    if tag == Tag::GLYF || tag == Tag::LOCA {
        version != GLYF_NULL_TRANSFORM
    } else {
        version != 0
    }
}

#[derive(Clone, Debug)]
pub struct EncodedFont {
    pub flavor: u32,
    /// Indexes into [`EncodedCollection::tables`], in directory order.
    pub tables: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct EncodedCollection<'a> {
    pub flavor: u32,
    pub header_version: u32,
    pub fonts: Vec<EncodedFont>,
    pub tables: Vec<EncodedTable<'a>>,
}
impl<'a> EncodedCollection<'a> {
    pub fn is_collection(&self) -> bool {
        self.flavor == TTC_FLAVOR
    }

    /// The exact size of the font a decoder will reconstruct from this data.
    pub fn decoded_size(&self) -> usize {
        let mut size = if self.is_collection() {
            collection_header_size(self.header_version, self.fonts.len())
        } else {
            0
        };
        for font in &self.fonts {
            size += SFNT_HEADER_SIZE + SFNT_ENTRY_SIZE * font.tables.len();
        }
        for table in &self.tables {
            size += round4(table.orig_length as usize);
        }
        size
    }
}

/// Orders the tables of a font for the WOFF2 directory: by tag, except that `loca` follows
/// `glyf` directly. `DSIG` is dropped.
fn directory_order(font: &FontEntry) -> Vec<(Tag, usize)> {
    let mut tables: Vec<_> = font
        .tables
        .iter()
        .copied()
        .filter(|x| x.0 != Tag::DSIG && x.0 != Tag::LOCA)
        .collect();
    if let Some(loca) = font.tables.iter().find(|x| x.0 == Tag::LOCA) {
        let at = tables
            .iter()
            .position(|x| x.0 == Tag::GLYF)
            .map_or(tables.len(), |x| x + 1);
        tables.insert(at, *loca);
    }
    tables
}

fn read_u16_at(data: &[u8], offset: usize, tag: Tag) -> Result<u16> {
    let mut buf = Buffer::new(data);
    buf.set_offset(offset)
        .and_then(|_| buf.read_u16())
        .map_err(|_| Woff2Error::table(tag, "table is too short"))
}

struct GlyfState {
    loca: usize,
    index_format: u16,
    /// Present when the `glyf` table was transformed.
    x_mins: Option<Vec<Option<i16>>>,
}

/// Computes the tables of the WOFF2 data stream for a parsed font.
pub fn encode_tables<'a>(
    collection: &FontCollection<'a>,
    allow_transforms: bool,
) -> Result<EncodedCollection<'a>> {
    let mut encoded = Vec::new();
    let mut encoded_idx: HashMap<usize, usize> = HashMap::new();
    let mut glyf_states: HashMap<usize, GlyfState> = HashMap::new();
    let mut fonts = Vec::new();

    for font in &collection.fonts {
        let glyf = font.find(Tag::GLYF);
        let loca = font.find(Tag::LOCA);
        let state = match (glyf, loca) {
            (None, None) => None,
            (Some(glyf), Some(loca)) => {
                match (encoded_idx.contains_key(&glyf), encoded_idx.contains_key(&loca)) {
                    (false, false) => {
                        let state = transform_glyf_loca(
                            collection,
                            font,
                            glyf,
                            loca,
                            allow_transforms,
                            &mut encoded,
                            &mut encoded_idx,
                        )?;
                        glyf_states.insert(glyf, state);
                    }
                    (true, true) if glyf_states.get(&glyf).map(|x| x.loca) == Some(loca) => {}
                    _ => return Err(Woff2Error::Unsupported("glyf and loca shared separately")),
                }
                glyf_states.get(&glyf)
            }
            _ => return Err(Woff2Error::Malformed("glyf and loca must be present together")),
        };

        for (tag, idx) in directory_order(font) {
            if tag == Tag::HEAD {
                check_head_format(idx, &encoded_idx, &encoded, state)?;
            }
            if encoded_idx.contains_key(&idx) {
                continue;
            }

            let source = &collection.tables[idx];
            let table = if tag == Tag::HEAD {
                prepare_head(&source.data, state)
            } else if tag == Tag::HMTX {
                encode_hmtx(collection, font, &source.data, state)?
            } else {
                EncodedTable::null(tag, source.data.clone())
            };
            encoded_idx.insert(idx, encoded.len());
            encoded.push(table);
        }

        let tables = directory_order(font)
            .into_iter()
            .map(|(_, idx)| encoded_idx[&idx])
            .collect();
        fonts.push(EncodedFont { flavor: font.flavor, tables });
    }

    debug!("Prepared {} table(s) for {} font(s).", encoded.len(), fonts.len());
    Ok(EncodedCollection {
        flavor: collection.flavor,
        header_version: collection.header_version,
        fonts,
        tables: encoded,
    })
}

fn transform_glyf_loca<'a>(
    collection: &FontCollection<'a>,
    font: &FontEntry,
    glyf: usize,
    loca: usize,
    allow_transforms: bool,
    encoded: &mut Vec<EncodedTable<'a>>,
    encoded_idx: &mut HashMap<usize, usize>,
) -> Result<GlyfState> {
    let glyf_data = &collection.tables[glyf].data;
    let loca_data = &collection.tables[loca].data;

    let head = collection
        .table(font, Tag::HEAD)
        .ok_or(Woff2Error::Malformed("font has glyf but no head table"))?;
    let index_format =
        read_u16_at(&head.data, HEAD_INDEX_TO_LOC_FORMAT_OFFSET, Tag::HEAD)?;

    let mut state = GlyfState { loca, index_format, x_mins: None };
    let mut glyf_table = EncodedTable::null(Tag::GLYF, glyf_data.clone());
    let mut loca_table = EncodedTable::null(Tag::LOCA, loca_data.clone());

    if allow_transforms {
        let maxp = collection
            .table(font, Tag::MAXP)
            .ok_or(Woff2Error::Malformed("font has glyf but no maxp table"))?;
        let num_glyphs = read_u16_at(&maxp.data, MAXP_NUM_GLYPHS_OFFSET, Tag::MAXP)?;

        let transformed = glyf::transform_glyf(glyf_data, loca_data, num_glyphs, index_format)?;
        if transformed.data.len() < glyf_data.len() + loca_data.len() {
            debug!(
                "Transformed glyf: {} glyphs, {} -> {} bytes.",
                num_glyphs,
                glyf_data.len() + loca_data.len(),
                transformed.data.len(),
            );
            glyf_table = EncodedTable {
                tag: Tag::GLYF,
                version: 0,
                orig_length: transformed.glyf_length,
                data: Cow::Owned(transformed.data),
            };
            loca_table = EncodedTable {
                tag: Tag::LOCA,
                version: 0,
                orig_length: transformed.loca_length,
                data: Cow::Borrowed(&[]),
            };
            state.index_format = transformed.index_format;
            state.x_mins = Some(transformed.x_mins);
        } else {
            debug!("Transformed glyf is not smaller than the original, storing it untransformed.");
        }
    }

    encoded_idx.insert(glyf, encoded.len());
    encoded.push(glyf_table);
    encoded_idx.insert(loca, encoded.len());
    encoded.push(loca_table);
    Ok(state)
}

/// Sets the lossless transform flag in `head`, and switches `indexToLocFormat` if the `glyf`
/// transform required it.
fn prepare_head<'a>(data: &[u8], state: Option<&GlyfState>) -> EncodedTable<'a> {
    let mut head = data.to_vec();
    // parsing guarantees the minimum head size
    head[HEAD_FLAGS_OFFSET] |= HEAD_FLAG_LOSSLESS_TRANSFORM;
    if let Some(state) = state {
        let at = HEAD_INDEX_TO_LOC_FORMAT_OFFSET;
        head[at..at + 2].copy_from_slice(&state.index_format.to_be_bytes());
    }
    EncodedTable::null(Tag::HEAD, Cow::Owned(head))
}

/// Fails if a `head` table shared with an earlier font disagrees with the `loca` format this
/// font's transformed `glyf` needs.
fn check_head_format(
    head: usize,
    encoded_idx: &HashMap<usize, usize>,
    encoded: &[EncodedTable],
    state: Option<&GlyfState>,
) -> Result<()> {
    let Some(state) = state else { return Ok(()) };
    let Some(&idx) = encoded_idx.get(&head) else { return Ok(()) };
    let format = read_u16_at(&encoded[idx].data, HEAD_INDEX_TO_LOC_FORMAT_OFFSET, Tag::HEAD)?;
    if format != state.index_format {
        return Err(Woff2Error::Unsupported("shared head table with conflicting loca formats"));
    }
    Ok(())
}

fn encode_hmtx<'a>(
    collection: &FontCollection<'a>,
    font: &FontEntry,
    data: &Cow<'a, [u8]>,
    state: Option<&GlyfState>,
) -> Result<EncodedTable<'a>> {
    let (Some(x_mins), Some(hhea)) =
        (state.and_then(|x| x.x_mins.as_ref()), collection.table(font, Tag::HHEA))
    else {
        return Ok(EncodedTable::null(Tag::HMTX, data.clone()));
    };

    let num_h_metrics = hmtx::read_num_h_metrics(&hhea.data)?;
    match hmtx::transform_hmtx(data, num_h_metrics, x_mins) {
        Some(transformed) => {
            debug!("Transformed hmtx: {} -> {} bytes.", data.len(), transformed.len());
            Ok(EncodedTable {
                tag: Tag::HMTX,
                version: HMTX_TRANSFORM,
                orig_length: data.len() as u32,
                data: Cow::Owned(transformed),
            })
        }
        None => Ok(EncodedTable::null(Tag::HMTX, data.clone())),
    }
}
