//! Reconstruction of `glyf` and `loca` from their transformed form.

use crate::{
    buffer::{Buffer, WriteExt},
    error::{Result, Woff2Error},
    glyph::{composite_records_len, BoundingBox, CompositeGlyph, Glyph, Point, SimpleGlyph},
    tag::Tag,
    transform::glyf::{
        bbox_bitmap_size, decode_triplets, GLYF_HEADER_SIZE, OPTION_OVERLAP_SIMPLE_BITMAP,
    },
};

fn malformed(reason: &'static str) -> Woff2Error {
    Woff2Error::table(Tag::GLYF, reason)
}

pub struct ReconstructedGlyf {
    pub glyf: Vec<u8>,
    pub loca: Vec<u8>,
    pub index_format: u16,
    pub x_mins: Vec<Option<i16>>,
}

struct Streams<'a> {
    n_contour: Buffer<'a>,
    n_points: Buffer<'a>,
    flags: Buffer<'a>,
    glyphs: Buffer<'a>,
    composite: Buffer<'a>,
    bbox_bitmap: &'a [u8],
    bbox: Buffer<'a>,
    instructions: Buffer<'a>,
    overlap_bitmap: Option<&'a [u8]>,
}

fn take_stream<'a>(body: &mut Buffer<'a>, size: usize) -> Result<&'a [u8]> {
    body.read_bytes(size)
        .map_err(|_| malformed("stream size exceeds table"))
}

fn bit_set(bitmap: &[u8], glyph_id: usize) -> bool {
    bitmap[glyph_id >> 3] & (0x80 >> (glyph_id & 7)) != 0
}

pub fn reconstruct_glyf(data: &[u8]) -> Result<ReconstructedGlyf> {
    let mut header = Buffer::new(data);
    header.skip(2)?; // reserved
    let option_flags = header.read_u16()?;
    let num_glyphs = header.read_u16()?;
    let index_format = header.read_u16()?;
    if index_format > 1 {
        return Err(malformed("unknown index format"));
    }

    let mut stream_sizes = [0usize; 7];
    for size in &mut stream_sizes {
        *size = header.read_u32()? as usize;
    }
    debug_assert_eq!(header.offset(), GLYF_HEADER_SIZE);

    let mut body = header;
    let n_contour = take_stream(&mut body, stream_sizes[0])?;
    let n_points = take_stream(&mut body, stream_sizes[1])?;
    let flags = take_stream(&mut body, stream_sizes[2])?;
    let glyphs = take_stream(&mut body, stream_sizes[3])?;
    let composite = take_stream(&mut body, stream_sizes[4])?;
    let bbox = take_stream(&mut body, stream_sizes[5])?;
    let instructions = take_stream(&mut body, stream_sizes[6])?;
    let bitmap_size = bbox_bitmap_size(num_glyphs);
    let overlap_bitmap = if option_flags & OPTION_OVERLAP_SIMPLE_BITMAP != 0 {
        Some(take_stream(&mut body, bitmap_size)?)
    } else {
        None
    };

    if bbox.len() < bitmap_size {
        return Err(malformed("bbox stream is too short"));
    }
    let mut streams = Streams {
        n_contour: Buffer::new(n_contour),
        n_points: Buffer::new(n_points),
        flags: Buffer::new(flags),
        glyphs: Buffer::new(glyphs),
        composite: Buffer::new(composite),
        bbox_bitmap: &bbox[..bitmap_size],
        bbox: Buffer::new(&bbox[bitmap_size..]),
        instructions: Buffer::new(instructions),
        overlap_bitmap,
    };

    let mut glyf = Vec::new();
    let mut offsets = Vec::with_capacity(num_glyphs as usize + 1);
    let mut x_mins = Vec::with_capacity(num_glyphs as usize);
    for glyph_id in 0..num_glyphs as usize {
        let glyph = streams.read_glyph(glyph_id)?;
        x_mins.push(glyph.bbox().map(|x| x.x_min));
        offsets.push(glyf.len());
        glyph.write(&mut glyf)?;
        glyf.pad_to_4();
    }
    offsets.push(glyf.len());

    let mut loca = Vec::with_capacity(offsets.len() * if index_format == 0 { 2 } else { 4 });
    for offset in offsets {
        if index_format == 0 {
            let offset: u16 = (offset / 2)
                .try_into()
                .map_err(|_| malformed("glyph data too large for short loca offsets"))?;
            loca.put_u16(offset);
        } else {
            let offset: u32 = offset
                .try_into()
                .map_err(|_| malformed("glyph data too large for loca offsets"))?;
            loca.put_u32(offset);
        }
    }

    Ok(ReconstructedGlyf { glyf, loca, index_format, x_mins })
}

impl<'a> Streams<'a> {
    fn read_glyph(&mut self, glyph_id: usize) -> Result<Glyph> {
        let num_contours = self.n_contour.read_i16()?;
        let has_bbox = bit_set(self.bbox_bitmap, glyph_id);

        match num_contours {
            0 => {
                if has_bbox {
                    return Err(malformed("empty glyph has a bounding box"));
                }
                Ok(Glyph::Empty)
            }
            -1 => {
                if !has_bbox {
                    return Err(malformed("composite glyph has no bounding box"));
                }
                let bbox = self.read_bbox()?;

                let (len, have_instructions) = composite_records_len(self.composite.rest())?;
                let components = self.composite.read_bytes(len)?.to_vec();
                let instructions =
                    if have_instructions { Some(self.read_instructions()?) } else { None };
                Ok(Glyph::Composite(CompositeGlyph { bbox, components, instructions }))
            }
            n if n < 0 => Err(malformed("invalid number of contours")),
            n => {
                let mut sizes = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    sizes.push(self.n_points.read_255_u16()? as usize);
                }
                let num_points: usize = sizes.iter().sum();

                let flags = self.flags.read_bytes(num_points)?;
                let mut points = decode_triplets(flags, &mut self.glyphs)?.into_iter();
                let contours: Vec<Vec<Point>> =
                    sizes.iter().map(|&size| points.by_ref().take(size).collect()).collect();
                let instructions = self.read_instructions()?;

                let bbox = if has_bbox {
                    self.read_bbox()?
                } else {
                    BoundingBox::of_contours(&contours)
                        .ok_or(malformed("glyph has no points or coordinates out of range"))?
                };
                let overlap_simple = self.overlap_bitmap.is_some_and(|x| bit_set(x, glyph_id));

                Ok(Glyph::Simple(SimpleGlyph { bbox, contours, instructions, overlap_simple }))
            }
        }
    }

    fn read_bbox(&mut self) -> Result<BoundingBox> {
        BoundingBox::read(&mut self.bbox)
    }

    fn read_instructions(&mut self) -> Result<Vec<u8>> {
        let len = self.glyphs.read_255_u16()?;
        Ok(self.instructions.read_bytes(len as usize)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        glyph::tests::{point, sample_composite_glyph, sample_simple_glyph},
        transform::glyf::transform_glyf,
    };

    fn glyf_and_loca(glyphs: &[Glyph], index_format: u16) -> (Vec<u8>, Vec<u8>) {
        let mut glyf = Vec::new();
        let mut offsets = Vec::new();
        for glyph in glyphs {
            offsets.push(glyf.len());
            glyph.write(&mut glyf).unwrap();
            glyf.pad_to_4();
        }
        offsets.push(glyf.len());

        let mut loca = Vec::new();
        for offset in offsets {
            if index_format == 0 {
                loca.put_u16((offset / 2) as u16);
            } else {
                loca.put_u32(offset as u32);
            }
        }
        (glyf, loca)
    }

    #[test]
    fn reconstructs_transformed_glyphs() {
        let overlapping = Glyph::Simple(SimpleGlyph {
            bbox: BoundingBox { x_min: -100, y_min: -100, x_max: 100, y_max: 100 },
            contours: vec![vec![point(-50, 0, true), point(0, 50, false), point(50, 0, true)]],
            instructions: vec![],
            overlap_simple: true,
        });
        let glyphs = [
            sample_simple_glyph(),
            Glyph::Empty,
            sample_composite_glyph(),
            overlapping,
            Glyph::Empty,
        ];

        for index_format in [0, 1] {
            let (glyf, loca) = glyf_and_loca(&glyphs, index_format);
            let num_glyphs = glyphs.len() as u16;
            let transformed = transform_glyf(&glyf, &loca, num_glyphs, index_format).unwrap();
            assert_eq!(transformed.data[3], OPTION_OVERLAP_SIMPLE_BITMAP as u8);

            let reconstructed = reconstruct_glyf(&transformed.data).unwrap();
            assert_eq!(reconstructed.glyf, glyf);
            assert_eq!(reconstructed.loca, loca);
            assert_eq!(reconstructed.index_format, index_format);
            assert_eq!(reconstructed.x_mins, transformed.x_mins);
            assert_eq!(reconstructed.x_mins, vec![Some(0), None, Some(-5), Some(-100), None]);
        }
    }

    #[test]
    fn rejects_truncated_streams() {
        let (glyf, loca) = glyf_and_loca(&[sample_simple_glyph()], 1);
        let transformed = transform_glyf(&glyf, &loca, 1, 1).unwrap();
        for len in [10, GLYF_HEADER_SIZE, transformed.data.len() - 1] {
            assert!(reconstruct_glyf(&transformed.data[..len]).is_err());
        }
    }

    #[test]
    fn rejects_composite_without_bbox() {
        let (glyf, loca) = glyf_and_loca(&[sample_composite_glyph()], 1);
        let mut data = transform_glyf(&glyf, &loca, 1, 1).unwrap().data;
        // after the nContour, glyph and composite streams
        let bbox_offset = GLYF_HEADER_SIZE + 2 + 1 + 16;
        assert_eq!(data[bbox_offset], 0x80);
        data[bbox_offset] = 0;
        assert!(reconstruct_glyf(&data).is_err());
    }
}
