//! Synthetic fonts for the integration tests.

#![allow(dead_code)]

use mkwebfont_woff2::{
    glyph::{BoundingBox, CompositeGlyph, Glyph, Point, SimpleGlyph},
    sfnt::{write_fonts, FontEntry, SfntBuilder, CHECKSUM_ADJUSTMENT_BASE},
    Tag,
};

pub const TRUETYPE_FLAVOR: u32 = 0x00010000;
pub const NUM_H_METRICS: u16 = 3;

fn point(x: i32, y: i32, on_curve: bool) -> Point {
    Point { x, y, on_curve }
}

fn simple(contours: Vec<Vec<Point>>, instructions: Vec<u8>, overlap_simple: bool) -> Glyph {
    Glyph::Simple(SimpleGlyph {
        bbox: BoundingBox::of_contours(&contours).unwrap(),
        contours,
        instructions,
        overlap_simple,
    })
}

pub fn glyphs() -> Vec<Glyph> {
    let notdef = simple(
        vec![
            vec![
                point(50, 0, true),
                point(50, 700, true),
                point(450, 700, true),
                point(450, 0, true),
            ],
            vec![
                point(100, 50, true),
                point(400, 50, true),
                point(400, 650, true),
                point(100, 650, true),
            ],
        ],
        vec![],
        false,
    );
    let curve = simple(
        vec![vec![
            point(-30, 0, true),
            point(-30, 400, false),
            point(250, 720, true),
            point(530, 400, false),
            point(530, 0, true),
            point(250, -200, false),
        ]],
        vec![0xB0, 0x00, 0x2F, 0xB1, 0x01],
        false,
    );
    let overlapping = simple(
        vec![
            vec![point(0, 0, true), point(300, 600, true), point(600, 0, true)],
            vec![point(0, 400, true), point(600, 400, true), point(300, -200, true)],
        ],
        vec![],
        true,
    );

    // ARG_1_AND_2_ARE_WORDS | ARGS_ARE_XY_VALUES, glyph 2 moved by (100, -50)
    let mut components = vec![0x00, 0x03, 0x00, 0x02];
    components.extend_from_slice(&100i16.to_be_bytes());
    components.extend_from_slice(&(-50i16).to_be_bytes());
    let composite = Glyph::Composite(CompositeGlyph {
        bbox: BoundingBox { x_min: 70, y_min: -250, x_max: 630, y_max: 670 },
        components,
        instructions: None,
    });

    let mut glyphs = vec![notdef, Glyph::Empty, curve, overlapping, composite];
    for i in 0..24 {
        let outline = [(100, 0), (20, 300), (100, 650), (300, 700), (480, 600), (520, 300)];
        let contour = outline
            .iter()
            .enumerate()
            .map(|(j, &(x, y))| point(x + i * 7, y + i * (j as i32 % 3), j % 2 == 0))
            .collect();
        glyphs.push(simple(vec![contour], vec![], false));
    }
    glyphs
}

pub fn head_table(index_to_loc_format: i16) -> Vec<u8> {
    let mut head = Vec::new();
    head.extend_from_slice(&0x00010000u32.to_be_bytes()); // version
    head.extend_from_slice(&0x00024000u32.to_be_bytes()); // fontRevision
    head.extend_from_slice(&0u32.to_be_bytes()); // checkSumAdjustment
    head.extend_from_slice(&0x5F0F3CF5u32.to_be_bytes()); // magicNumber
    head.extend_from_slice(&0x0003u16.to_be_bytes()); // flags
    head.extend_from_slice(&1000u16.to_be_bytes()); // unitsPerEm
    head.extend_from_slice(&[0; 16]); // created, modified
    for value in [-30i16, -250, 630, 720] {
        head.extend_from_slice(&value.to_be_bytes());
    }
    head.extend_from_slice(&[0, 0, 0, 8, 0, 2]); // macStyle, lowestRecPPEM, fontDirectionHint
    head.extend_from_slice(&index_to_loc_format.to_be_bytes());
    head.extend_from_slice(&[0, 0]); // glyphDataFormat
    head
}

pub fn hhea_table(num_h_metrics: u16) -> Vec<u8> {
    let mut hhea = vec![0, 1, 0, 0];
    hhea.extend_from_slice(&800i16.to_be_bytes()); // ascender
    hhea.extend_from_slice(&(-200i16).to_be_bytes()); // descender
    hhea.extend_from_slice(&[0; 26]);
    hhea.extend_from_slice(&num_h_metrics.to_be_bytes());
    hhea
}

pub fn maxp_table(num_glyphs: u16) -> Vec<u8> {
    let mut maxp = 0x00005000u32.to_be_bytes().to_vec();
    maxp.extend_from_slice(&num_glyphs.to_be_bytes());
    maxp
}

/// Builds `glyf` and `loca` tables for a list of glyphs.
pub fn glyf_and_loca(glyphs: &[Glyph], index_to_loc_format: i16) -> (Vec<u8>, Vec<u8>) {
    let mut glyf = Vec::new();
    let mut loca = Vec::new();
    let push_offset = |loca: &mut Vec<u8>, offset: usize| {
        if index_to_loc_format == 0 {
            loca.extend_from_slice(&((offset / 2) as u16).to_be_bytes());
        } else {
            loca.extend_from_slice(&(offset as u32).to_be_bytes());
        }
    };
    for glyph in glyphs {
        push_offset(&mut loca, glyf.len());
        glyph.write(&mut glyf).unwrap();
        glyf.resize(glyf.len().next_multiple_of(4), 0);
    }
    push_offset(&mut loca, glyf.len());
    (glyf, loca)
}

/// Builds an `hmtx` table whose left side bearings match each glyph's `xMin`.
pub fn hmtx_table(glyphs: &[Glyph], num_h_metrics: u16) -> Vec<u8> {
    let mut hmtx = Vec::new();
    for (glyph_id, glyph) in glyphs.iter().enumerate() {
        if glyph_id < num_h_metrics as usize {
            hmtx.extend_from_slice(&(500 + 20 * glyph_id as u16).to_be_bytes());
        }
        let lsb = glyph.bbox().map_or(0, |x| x.x_min);
        hmtx.extend_from_slice(&lsb.to_be_bytes());
    }
    hmtx
}

fn truetype_tables(index_to_loc_format: i16) -> Vec<(Tag, Vec<u8>)> {
    let glyphs = glyphs();
    let (glyf, loca) = glyf_and_loca(&glyphs, index_to_loc_format);
    vec![
        (Tag::HEAD, head_table(index_to_loc_format)),
        (Tag::HHEA, hhea_table(NUM_H_METRICS)),
        (Tag::MAXP, maxp_table(glyphs.len() as u16)),
        (Tag::GLYF, glyf),
        (Tag::LOCA, loca),
        (Tag::HMTX, hmtx_table(&glyphs, NUM_H_METRICS)),
        (Tag::new(b"name"), b"\0\0\0\x01\0\x06synthetic test font".to_vec()),
        (Tag::new(b"post"), vec![0, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
    ]
}

pub fn truetype_builder(index_to_loc_format: i16) -> SfntBuilder {
    let mut builder = SfntBuilder::new(TRUETYPE_FLAVOR);
    for (tag, data) in truetype_tables(index_to_loc_format) {
        builder.add_table(tag, data);
    }
    builder
}

/// A small TrueType font with simple, composite, overlapping and empty glyphs.
pub fn truetype_font(index_to_loc_format: i16) -> Vec<u8> {
    truetype_builder(index_to_loc_format).build()
}

/// A collection of two fonts sharing every table except `name`.
pub fn truetype_collection() -> Vec<u8> {
    let name = Tag::new(b"name");
    let mut tables = truetype_tables(1);
    tables.push((name, b"\0\0\0\x01\0\x06second font".to_vec()));

    let names: Vec<_> = (0..tables.len()).filter(|&x| tables[x].0 == name).collect();
    let shared: Vec<_> = (0..tables.len())
        .filter(|&x| tables[x].0 != name)
        .map(|x| (tables[x].0, x))
        .collect();
    let font = |name_idx: usize| {
        let mut tables = shared.clone();
        tables.push((name, name_idx));
        tables.sort_by_key(|x| x.0);
        FontEntry { flavor: TRUETYPE_FLAVOR, tables }
    };
    let fonts = [font(names[0]), font(names[1])];
    let data: Vec<_> = tables.iter().map(|x| x.1.as_slice()).collect();
    write_fonts(Some(0x00010000), &fonts, &data)
}

/// Sums a whole font file, which must give the checksum adjustment base for a valid font.
pub fn file_checksum(data: &[u8]) -> u32 {
    data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}

pub fn has_valid_file_checksum(font: &[u8]) -> bool {
    file_checksum(font) == CHECKSUM_ADJUSTMENT_BASE
}
