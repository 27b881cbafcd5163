//! TrueType glyph outlines, as stored in the `glyf` table.

use crate::{
    buffer::{Buffer, WriteExt},
    error::{Result, Woff2Error},
    tag::Tag,
};

pub const FLAG_ON_CURVE: u8 = 1 << 0;
pub const FLAG_X_SHORT: u8 = 1 << 1;
pub const FLAG_Y_SHORT: u8 = 1 << 2;
pub const FLAG_REPEAT: u8 = 1 << 3;
pub const FLAG_X_SAME: u8 = 1 << 4;
pub const FLAG_Y_SAME: u8 = 1 << 5;
pub const FLAG_OVERLAP_SIMPLE: u8 = 1 << 6;

const ARG_1_AND_2_ARE_WORDS: u16 = 1 << 0;
const WE_HAVE_A_SCALE: u16 = 1 << 3;
const MORE_COMPONENTS: u16 = 1 << 5;
const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 1 << 6;
const WE_HAVE_A_TWO_BY_TWO: u16 = 1 << 7;
const WE_HAVE_INSTRUCTIONS: u16 = 1 << 8;

fn malformed(reason: &'static str) -> Woff2Error {
    Woff2Error::table(Tag::GLYF, reason)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
    pub on_curve: bool,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BoundingBox {
    pub x_min: i16,
    pub y_min: i16,
    pub x_max: i16,
    pub y_max: i16,
}
impl BoundingBox {
    pub(crate) fn read(buf: &mut Buffer) -> Result<BoundingBox> {
        Ok(BoundingBox {
            x_min: buf.read_i16()?,
            y_min: buf.read_i16()?,
            x_max: buf.read_i16()?,
            y_max: buf.read_i16()?,
        })
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.put_i16(self.x_min);
        out.put_i16(self.y_min);
        out.put_i16(self.x_max);
        out.put_i16(self.y_max);
    }

    /// Computes the bounding box of a set of contours, or `None` if it has no points or does not
    /// fit in 16-bit coordinates.
    pub fn of_contours(contours: &[Vec<Point>]) -> Option<BoundingBox> {
        let mut points = contours.iter().flatten();
        let first = points.next()?;
        let (mut x_min, mut y_min, mut x_max, mut y_max) = (first.x, first.y, first.x, first.y);
        for point in points {
            x_min = x_min.min(point.x);
            y_min = y_min.min(point.y);
            x_max = x_max.max(point.x);
            y_max = y_max.max(point.y);
        }
        Some(BoundingBox {
            x_min: x_min.try_into().ok()?,
            y_min: y_min.try_into().ok()?,
            x_max: x_max.try_into().ok()?,
            y_max: y_max.try_into().ok()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SimpleGlyph {
    pub bbox: BoundingBox,
    pub contours: Vec<Vec<Point>>,
    pub instructions: Vec<u8>,
    pub overlap_simple: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompositeGlyph {
    pub bbox: BoundingBox,
    /// The raw component records.
    pub components: Vec<u8>,
    /// The glyph program, present exactly when a component has `WE_HAVE_INSTRUCTIONS` set.
    pub instructions: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Glyph {
    Empty,
    Simple(SimpleGlyph),
    Composite(CompositeGlyph),
}
impl Glyph {
    /// Parses a glyph from its data in the `glyf` table.
    pub fn parse(data: &[u8]) -> Result<Glyph> {
        if data.is_empty() {
            return Ok(Glyph::Empty);
        }

        let mut buf = Buffer::new(data);
        let num_contours = buf.read_i16()?;
        let bbox = BoundingBox::read(&mut buf)?;

        if num_contours == 0 {
            Ok(Glyph::Empty)
        } else if num_contours > 0 {
            Self::parse_simple(&mut buf, num_contours as usize, bbox)
        } else {
            let (len, have_instructions) = composite_records_len(&data[10..])?;
            let components = buf.read_bytes(len)?.to_vec();
            let instructions = if have_instructions {
                let len = buf.read_u16()?;
                Some(buf.read_bytes(len as usize)?.to_vec())
            } else {
                None
            };
            Ok(Glyph::Composite(CompositeGlyph { bbox, components, instructions }))
        }
    }

    fn parse_simple(buf: &mut Buffer, num_contours: usize, bbox: BoundingBox) -> Result<Glyph> {
        let mut sizes = Vec::with_capacity(num_contours);
        let mut last_end = 0u32;
        for i in 0..num_contours {
            let end = buf.read_u16()? as u32;
            if i == 0 {
                sizes.push(end + 1);
            } else if end < last_end {
                return Err(malformed("contour end points are not increasing"));
            } else {
                sizes.push(end - last_end);
            }
            last_end = end;
        }
        let num_points = last_end as usize + 1;

        let instructions_len = buf.read_u16()?;
        let instructions = buf.read_bytes(instructions_len as usize)?.to_vec();

        let mut flags = Vec::with_capacity(num_points);
        while flags.len() < num_points {
            let flag = buf.read_u8()?;
            let repeat = if flag & FLAG_REPEAT != 0 { buf.read_u8()? as usize } else { 0 };
            if flags.len() + repeat + 1 > num_points {
                return Err(malformed("flag repeat count exceeds number of points"));
            }
            flags.extend(std::iter::repeat(flag).take(repeat + 1));
        }

        let mut xs = Vec::with_capacity(num_points);
        let mut x = 0i32;
        for flag in &flags {
            x += read_coordinate(buf, *flag, FLAG_X_SHORT, FLAG_X_SAME)?;
            xs.push(x);
        }

        let mut contours = Vec::with_capacity(num_contours);
        let mut points = xs.into_iter().zip(flags.iter());
        let mut y = 0i32;
        for size in sizes {
            let mut contour = Vec::with_capacity(size as usize);
            for _ in 0..size {
                // the zip is exactly num_points long
                let Some((x, flag)) = points.next() else {
                    return Err(malformed("point count mismatch"));
                };
                y += read_coordinate(buf, *flag, FLAG_Y_SHORT, FLAG_Y_SAME)?;
                contour.push(Point { x, y, on_curve: flag & FLAG_ON_CURVE != 0 });
            }
            contours.push(contour);
        }

        Ok(Glyph::Simple(SimpleGlyph {
            bbox,
            contours,
            instructions,
            overlap_simple: flags[0] & FLAG_OVERLAP_SIMPLE != 0,
        }))
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        match self {
            Glyph::Empty => None,
            Glyph::Simple(glyph) => Some(glyph.bbox),
            Glyph::Composite(glyph) => Some(glyph.bbox),
        }
    }

    /// Writes the glyph in its canonical form. This does not include any padding.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Glyph::Empty => {}
            Glyph::Simple(glyph) => glyph.write(out)?,
            Glyph::Composite(glyph) => {
                out.put_i16(-1);
                glyph.bbox.write(out);
                out.extend_from_slice(&glyph.components);
                if let Some(instructions) = &glyph.instructions {
                    write_instructions(out, instructions)?;
                }
            }
        }
        Ok(())
    }
}

impl SimpleGlyph {
    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let num_contours: i16 = self
            .contours
            .len()
            .try_into()
            .map_err(|_| malformed("too many contours"))?;
        out.put_i16(num_contours);
        self.bbox.write(out);

        let mut end = -1i64;
        for contour in &self.contours {
            end += contour.len() as i64;
            let end: u16 = end
                .try_into()
                .map_err(|_| malformed("too many points in glyph"))?;
            out.put_u16(end);
        }
        write_instructions(out, &self.instructions)?;

        let mut last_flag = None;
        let mut repeat_count = 0u8;
        let mut x_data = Vec::new();
        let mut y_data = Vec::new();
        let (mut last_x, mut last_y) = (0, 0);
        for (i, point) in self.contours.iter().flatten().enumerate() {
            let mut flag = if point.on_curve { FLAG_ON_CURVE } else { 0 };
            if i == 0 && self.overlap_simple {
                flag |= FLAG_OVERLAP_SIMPLE;
            }
            flag |= write_coordinate(&mut x_data, point.x - last_x, FLAG_X_SHORT, FLAG_X_SAME)?;
            flag |= write_coordinate(&mut y_data, point.y - last_y, FLAG_Y_SHORT, FLAG_Y_SAME)?;

            if last_flag == Some(flag) && repeat_count != 255 {
                // the last byte written is always the flag being repeated
                if let Some(last) = out.last_mut() {
                    *last |= FLAG_REPEAT;
                }
                repeat_count += 1;
            } else {
                if repeat_count != 0 {
                    out.push(repeat_count);
                }
                out.push(flag);
                repeat_count = 0;
            }

            last_flag = Some(flag);
            last_x = point.x;
            last_y = point.y;
        }
        if repeat_count != 0 {
            out.push(repeat_count);
        }

        out.extend_from_slice(&x_data);
        out.extend_from_slice(&y_data);
        Ok(())
    }
}

fn read_coordinate(buf: &mut Buffer, flag: u8, short: u8, same: u8) -> Result<i32> {
    Ok(if flag & short != 0 {
        let value = buf.read_u8()? as i32;
        if flag & same != 0 {
            value
        } else {
            -value
        }
    } else if flag & same != 0 {
        0
    } else {
        buf.read_i16()? as i32
    })
}

fn write_coordinate(out: &mut Vec<u8>, delta: i32, short: u8, same: u8) -> Result<u8> {
    Ok(if delta == 0 {
        same
    } else if (-255..=255).contains(&delta) {
        out.push(delta.unsigned_abs() as u8);
        short | if delta > 0 { same } else { 0 }
    } else {
        let delta: i16 = delta
            .try_into()
            .map_err(|_| malformed("coordinate delta out of range"))?;
        out.put_i16(delta);
        0
    })
}

fn write_instructions(out: &mut Vec<u8>, instructions: &[u8]) -> Result<()> {
    let len: u16 = instructions
        .len()
        .try_into()
        .map_err(|_| malformed("glyph program is too long"))?;
    out.put_u16(len);
    out.extend_from_slice(instructions);
    Ok(())
}

/// Walks the component records of a composite glyph, returning their total length and whether
/// any component declares a glyph program.
pub(crate) fn composite_records_len(data: &[u8]) -> Result<(usize, bool)> {
    let mut buf = Buffer::new(data);
    let mut have_instructions = false;
    loop {
        let flags = buf.read_u16()?;
        buf.skip(2)?; // glyphIndex

        let mut arg_size = if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
        if flags & WE_HAVE_A_SCALE != 0 {
            arg_size += 2;
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            arg_size += 4;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            arg_size += 8;
        }
        buf.skip(arg_size)?;

        have_instructions |= flags & WE_HAVE_INSTRUCTIONS != 0;
        if flags & MORE_COMPONENTS == 0 {
            break;
        }
    }
    Ok((buf.offset(), have_instructions))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn point(x: i32, y: i32, on_curve: bool) -> Point {
        Point { x, y, on_curve }
    }

    /// A square with a quadratic bump, plus a triangle.
    pub fn sample_simple_glyph() -> Glyph {
        let contours = vec![
            vec![
                point(0, 0, true),
                point(0, 700, true),
                point(250, 760, false),
                point(500, 700, true),
                point(500, 0, true),
            ],
            vec![point(100, 100, true), point(400, 100, true), point(250, 1400, true)],
        ];
        Glyph::Simple(SimpleGlyph {
            bbox: BoundingBox::of_contours(&contours).unwrap(),
            contours,
            instructions: vec![0xB0, 0x01, 0x2F],
            overlap_simple: false,
        })
    }

    /// Two components: glyph 1 offset by (10, -20) and glyph 2 scaled, with instructions.
    pub fn sample_composite_glyph() -> Glyph {
        let mut components = Vec::new();
        components.put_u16(MORE_COMPONENTS | 0x0002); // ARGS_ARE_XY_VALUES
        components.put_u16(1);
        components.push(10);
        components.push((-20i8) as u8);
        components.put_u16(ARG_1_AND_2_ARE_WORDS | WE_HAVE_A_SCALE | WE_HAVE_INSTRUCTIONS);
        components.put_u16(2);
        components.put_i16(300);
        components.put_i16(-300);
        components.put_u16(0x2000); // 0.5 in F2Dot14
        Glyph::Composite(CompositeGlyph {
            bbox: BoundingBox { x_min: -5, y_min: -300, x_max: 900, y_max: 1400 },
            components,
            instructions: Some(vec![0x40, 0x01, 0x05]),
        })
    }

    #[test]
    fn simple_glyph_roundtrip() {
        let glyph = sample_simple_glyph();
        let mut data = Vec::new();
        glyph.write(&mut data).unwrap();
        assert_eq!(Glyph::parse(&data).unwrap(), glyph);
    }

    #[test]
    fn composite_glyph_roundtrip() {
        let glyph = sample_composite_glyph();
        let mut data = Vec::new();
        glyph.write(&mut data).unwrap();
        let (len, have_instructions) = composite_records_len(&data[10..]).unwrap();
        assert_eq!(len, 6 + 10);
        assert!(have_instructions);
        assert_eq!(Glyph::parse(&data).unwrap(), glyph);
    }

    #[test]
    fn flags_are_run_length_encoded() {
        let contours = vec![(0..10).map(|i| point(i * 10, 0, true)).collect::<Vec<_>>()];
        let glyph = Glyph::Simple(SimpleGlyph {
            bbox: BoundingBox::of_contours(&contours).unwrap(),
            contours,
            instructions: vec![],
            overlap_simple: true,
        });
        let mut data = Vec::new();
        glyph.write(&mut data).unwrap();

        // header, one end point, instruction length
        let flags = &data[10 + 2 + 2..];
        // first point: x and y are both the same (zero delta)
        assert_eq!(flags[0], FLAG_ON_CURVE | FLAG_X_SAME | FLAG_Y_SAME | FLAG_OVERLAP_SIMPLE);
        // remaining nine points share a flag
        let expected = FLAG_ON_CURVE | FLAG_X_SHORT | FLAG_X_SAME | FLAG_Y_SAME | FLAG_REPEAT;
        assert_eq!(flags[1], expected);
        assert_eq!(flags[2], 8);
        assert_eq!(flags.len(), 3 + 9);
        assert_eq!(Glyph::parse(&data).unwrap(), glyph);
    }

    #[test]
    fn parses_non_canonical_flags() {
        let mut data = Vec::new();
        data.put_i16(1);
        BoundingBox { x_min: 0, y_min: 0, x_max: 300, y_max: 0 }.write(&mut data);
        data.put_u16(1); // two points
        data.put_u16(0);
        // both points written with long coordinates and no repeat
        data.push(FLAG_ON_CURVE);
        data.push(0);
        data.put_i16(0);
        data.put_i16(300);
        data.put_i16(0);
        data.put_i16(0);
        data.extend_from_slice(&[0, 0]); // padding

        let Glyph::Simple(glyph) = Glyph::parse(&data).unwrap() else { panic!("not simple") };
        assert_eq!(glyph.contours, vec![vec![point(0, 0, true), point(300, 0, false)]]);
    }

    #[test]
    fn rejects_decreasing_end_points() {
        let mut data = Vec::new();
        data.put_i16(2);
        BoundingBox::default().write(&mut data);
        data.put_u16(5);
        data.put_u16(3);
        data.put_u16(0);
        data.extend_from_slice(&[FLAG_X_SAME | FLAG_Y_SAME; 6]);
        assert!(Glyph::parse(&data).is_err());
    }

    #[test]
    fn empty_glyphs() {
        assert_eq!(Glyph::parse(&[]).unwrap(), Glyph::Empty);
        assert_eq!(Glyph::parse(&[0; 10]).unwrap(), Glyph::Empty);
        let mut data = Vec::new();
        Glyph::Empty.write(&mut data).unwrap();
        assert!(data.is_empty());
    }
}
