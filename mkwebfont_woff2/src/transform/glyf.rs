//! The WOFF2 `glyf`/`loca` transform.

use crate::{
    buffer::{round4, Buffer, WriteExt},
    error::{Result, Woff2Error},
    glyph::{BoundingBox, CompositeGlyph, Glyph, Point, SimpleGlyph},
    tag::Tag,
};

pub const GLYF_HEADER_SIZE: usize = 36;
pub const OPTION_OVERLAP_SIMPLE_BITMAP: u16 = 1 << 0;

/// The largest `glyf` table addressable with short `loca` offsets.
const MAX_SHORT_LOCA_GLYF_SIZE: usize = 0x1FFFE;

pub fn bbox_bitmap_size(num_glyphs: u16) -> usize {
    ((num_glyphs as usize + 31) >> 5) << 2
}

/// The result of transforming a `glyf` table.
pub struct TransformedGlyf {
    pub data: Vec<u8>,
    /// The length of the `glyf` table a decoder will reconstruct.
    pub glyf_length: u32,
    /// The length of the `loca` table a decoder will reconstruct.
    pub loca_length: u32,
    pub index_format: u16,
    /// The `xMin` of every glyph, or `None` for empty glyphs.
    pub x_mins: Vec<Option<i16>>,
}

/// Splits `glyf` into the glyphs addressed by `loca`.
pub fn read_loca<'a>(
    glyf: &'a [u8],
    loca: &[u8],
    num_glyphs: u16,
    index_format: u16,
) -> Result<Vec<&'a [u8]>> {
    let malformed = |reason| Woff2Error::table(Tag::LOCA, reason);

    let entry_size = match index_format {
        0 => 2,
        1 => 4,
        _ => return Err(Woff2Error::table(Tag::HEAD, "unknown indexToLocFormat")),
    };
    if loca.len() < (num_glyphs as usize + 1) * entry_size {
        return Err(malformed("table is too short for the number of glyphs"));
    }

    let mut buf = Buffer::new(loca);
    let mut read_offset = || -> Result<usize> {
        Ok(if index_format == 0 {
            buf.read_u16()? as usize * 2
        } else {
            buf.read_u32()? as usize
        })
    };

    let mut glyphs = Vec::with_capacity(num_glyphs as usize);
    let mut start = read_offset()?;
    for _ in 0..num_glyphs {
        let end = read_offset()?;
        if end < start || end > glyf.len() {
            return Err(malformed("glyph offsets are out of order or out of bounds"));
        }
        glyphs.push(&glyf[start..end]);
        start = end;
    }
    Ok(glyphs)
}

/// Applies the WOFF2 `glyf` transform.
pub fn transform_glyf(
    glyf: &[u8],
    loca: &[u8],
    num_glyphs: u16,
    index_format: u16,
) -> Result<TransformedGlyf> {
    let glyphs = read_loca(glyf, loca, num_glyphs, index_format)?;

    let mut encoder = GlyfEncoder::new(num_glyphs);
    let mut glyf_length = 0;
    let mut x_mins = Vec::with_capacity(num_glyphs as usize);
    let mut scratch = Vec::new();
    for (glyph_id, data) in glyphs.into_iter().enumerate() {
        let glyph = Glyph::parse(data)?;

        scratch.clear();
        glyph.write(&mut scratch)?;
        glyf_length += round4(scratch.len());

        x_mins.push(glyph.bbox().map(|x| x.x_min));
        encoder.encode(glyph_id, &glyph)?;
    }

    let index_format =
        if index_format == 0 && glyf_length > MAX_SHORT_LOCA_GLYF_SIZE { 1 } else { index_format };
    let loca_length = (num_glyphs as usize + 1) * if index_format == 0 { 2 } else { 4 };

    Ok(TransformedGlyf {
        data: encoder.finish(index_format),
        glyf_length: glyf_length
            .try_into()
            .map_err(|_| Woff2Error::table(Tag::GLYF, "reconstructed table is too large"))?,
        loca_length: loca_length as u32,
        index_format,
        x_mins,
    })
}

struct GlyfEncoder {
    num_glyphs: u16,
    n_contour_stream: Vec<u8>,
    n_points_stream: Vec<u8>,
    flag_stream: Vec<u8>,
    glyph_stream: Vec<u8>,
    composite_stream: Vec<u8>,
    bbox_bitmap: Vec<u8>,
    bbox_stream: Vec<u8>,
    instruction_stream: Vec<u8>,
    overlap_bitmap: Vec<u8>,
    has_overlap: bool,
}
impl GlyfEncoder {
    fn new(num_glyphs: u16) -> Self {
        GlyfEncoder {
            num_glyphs,
            n_contour_stream: Vec::new(),
            n_points_stream: Vec::new(),
            flag_stream: Vec::new(),
            glyph_stream: Vec::new(),
            composite_stream: Vec::new(),
            bbox_bitmap: vec![0; bbox_bitmap_size(num_glyphs)],
            bbox_stream: Vec::new(),
            instruction_stream: Vec::new(),
            overlap_bitmap: vec![0; bbox_bitmap_size(num_glyphs)],
            has_overlap: false,
        }
    }

    fn encode(&mut self, glyph_id: usize, glyph: &Glyph) -> Result<()> {
        match glyph {
            Glyph::Empty => self.n_contour_stream.put_i16(0),
            Glyph::Simple(glyph) => self.encode_simple(glyph_id, glyph)?,
            Glyph::Composite(glyph) => self.encode_composite(glyph_id, glyph)?,
        }
        Ok(())
    }

    fn encode_simple(&mut self, glyph_id: usize, glyph: &SimpleGlyph) -> Result<()> {
        let num_contours: i16 = glyph
            .contours
            .len()
            .try_into()
            .map_err(|_| Woff2Error::table(Tag::GLYF, "too many contours"))?;
        self.n_contour_stream.put_i16(num_contours);

        if BoundingBox::of_contours(&glyph.contours) != Some(glyph.bbox) {
            self.write_bbox(glyph_id, &glyph.bbox);
        }
        if glyph.overlap_simple {
            self.overlap_bitmap[glyph_id >> 3] |= 0x80 >> (glyph_id & 7);
            self.has_overlap = true;
        }

        for contour in &glyph.contours {
            let len: u16 = contour
                .len()
                .try_into()
                .map_err(|_| Woff2Error::table(Tag::GLYF, "too many points in contour"))?;
            self.n_points_stream.put_255_u16(len);
        }

        let (mut last_x, mut last_y) = (0, 0);
        for point in glyph.contours.iter().flatten() {
            self.write_triplet(point.on_curve, point.x - last_x, point.y - last_y)?;
            last_x = point.x;
            last_y = point.y;
        }

        self.write_instructions(&glyph.instructions)
    }

    fn encode_composite(&mut self, glyph_id: usize, glyph: &CompositeGlyph) -> Result<()> {
        self.n_contour_stream.put_i16(-1);
        self.write_bbox(glyph_id, &glyph.bbox);
        self.composite_stream.extend_from_slice(&glyph.components);
        if let Some(instructions) = &glyph.instructions {
            self.write_instructions(instructions)?;
        }
        Ok(())
    }

    fn write_instructions(&mut self, instructions: &[u8]) -> Result<()> {
        let len: u16 = instructions
            .len()
            .try_into()
            .map_err(|_| Woff2Error::table(Tag::GLYF, "glyph program is too long"))?;
        self.glyph_stream.put_255_u16(len);
        self.instruction_stream.extend_from_slice(instructions);
        Ok(())
    }

    fn write_bbox(&mut self, glyph_id: usize, bbox: &BoundingBox) {
        self.bbox_bitmap[glyph_id >> 3] |= 0x80 >> (glyph_id & 7);
        bbox.write(&mut self.bbox_stream);
    }

    fn write_triplet(&mut self, on_curve: bool, dx: i32, dy: i32) -> Result<()> {
        let abs_x = dx.unsigned_abs();
        let abs_y = dy.unsigned_abs();
        if abs_x > 0xFFFF || abs_y > 0xFFFF {
            return Err(Woff2Error::table(Tag::GLYF, "coordinate delta out of range"));
        }

        let on_curve_bit = if on_curve { 0 } else { 128 };
        let x_sign_bit = if dx < 0 { 0 } else { 1 };
        let y_sign_bit = if dy < 0 { 0 } else { 1 };
        let xy_sign_bits = x_sign_bit + 2 * y_sign_bit;

        let (flag, bytes): (u32, &[u32]) = if dx == 0 && abs_y < 1280 {
            (((abs_y & 0xF00) >> 7) + y_sign_bit, &[abs_y & 0xFF])
        } else if dy == 0 && abs_x < 1280 {
            (10 + ((abs_x & 0xF00) >> 7) + x_sign_bit, &[abs_x & 0xFF])
        } else if abs_x < 65 && abs_y < 65 {
            (
                20 + ((abs_x - 1) & 0x30) + (((abs_y - 1) & 0x30) >> 2) + xy_sign_bits,
                &[(((abs_x - 1) & 0xF) << 4) | ((abs_y - 1) & 0xF)],
            )
        } else if abs_x < 769 && abs_y < 769 {
            let high_bits = 12 * (((abs_x - 1) & 0x300) >> 8) + (((abs_y - 1) & 0x300) >> 6);
            (84 + high_bits + xy_sign_bits, &[(abs_x - 1) & 0xFF, (abs_y - 1) & 0xFF])
        } else if abs_x < 4096 && abs_y < 4096 {
            (120 + xy_sign_bits, &[abs_x >> 4, ((abs_x & 0xF) << 4) | (abs_y >> 8), abs_y & 0xFF])
        } else {
            (124 + xy_sign_bits, &[abs_x >> 8, abs_x & 0xFF, abs_y >> 8, abs_y & 0xFF])
        };

        self.flag_stream.push((on_curve_bit + flag) as u8);
        self.glyph_stream.extend(bytes.iter().map(|x| *x as u8));
        Ok(())
    }

    fn finish(self, index_format: u16) -> Vec<u8> {
        let bbox_stream_size = self.bbox_bitmap.len() + self.bbox_stream.len();
        let streams = [
            &self.n_contour_stream,
            &self.n_points_stream,
            &self.flag_stream,
            &self.glyph_stream,
            &self.composite_stream,
        ];

        let mut out = Vec::new();
        out.put_u16(0); // reserved
        out.put_u16(if self.has_overlap { OPTION_OVERLAP_SIMPLE_BITMAP } else { 0 });
        out.put_u16(self.num_glyphs);
        out.put_u16(index_format);
        for stream in streams {
            out.put_u32(stream.len() as u32);
        }
        out.put_u32(bbox_stream_size as u32);
        out.put_u32(self.instruction_stream.len() as u32);
        debug_assert_eq!(out.len(), GLYF_HEADER_SIZE);

        for stream in streams {
            out.extend_from_slice(stream);
        }
        out.extend_from_slice(&self.bbox_bitmap);
        out.extend_from_slice(&self.bbox_stream);
        out.extend_from_slice(&self.instruction_stream);
        if self.has_overlap {
            out.extend_from_slice(&self.overlap_bitmap);
        }
        out
    }
}

/// Reads a glyph's points from the triplet-encoded flag and glyph streams.
pub fn decode_triplets(flags: &[u8], buf: &mut Buffer) -> Result<Vec<Point>> {
    fn with_sign(flag: u8, value: i32) -> i32 {
        if flag & 1 != 0 {
            value
        } else {
            -value
        }
    }

    let mut points = Vec::with_capacity(flags.len());
    let (mut x, mut y) = (0i32, 0i32);
    for &flag in flags {
        let on_curve = flag & 0x80 == 0;
        let flag = flag & 0x7F;

        let data_len = match flag {
            0..=83 => 1,
            84..=119 => 2,
            120..=123 => 3,
            _ => 4,
        };
        let data = buf.read_bytes(data_len)?;
        let b = |i: usize| data[i] as i32;

        let (dx, dy) = match flag {
            0..=9 => (0, with_sign(flag, (((flag & 14) as i32) << 7) + b(0))),
            10..=19 => (with_sign(flag, ((((flag - 10) & 14) as i32) << 7) + b(0)), 0),
            20..=83 => {
                let b0 = (flag - 20) as i32;
                (
                    with_sign(flag, 1 + (b0 & 0x30) + (b(0) >> 4)),
                    with_sign(flag >> 1, 1 + ((b0 & 0x0C) << 2) + (b(0) & 0x0F)),
                )
            }
            84..=119 => {
                let b0 = (flag - 84) as i32;
                (
                    with_sign(flag, 1 + ((b0 / 12) << 8) + b(0)),
                    with_sign(flag >> 1, 1 + (((b0 % 12) >> 2) << 8) + b(1)),
                )
            }
            120..=123 => (
                with_sign(flag, (b(0) << 4) + (b(1) >> 4)),
                with_sign(flag >> 1, ((b(1) & 0x0F) << 8) + b(2)),
            ),
            _ => (with_sign(flag, (b(0) << 8) + b(1)), with_sign(flag >> 1, (b(2) << 8) + b(3))),
        };

        x = x.checked_add(dx).ok_or(Woff2Error::table(Tag::GLYF, "coordinate overflow"))?;
        y = y.checked_add(dy).ok_or(Woff2Error::table(Tag::GLYF, "coordinate overflow"))?;
        points.push(Point { x, y, on_curve });
    }
    Ok(points)
}
