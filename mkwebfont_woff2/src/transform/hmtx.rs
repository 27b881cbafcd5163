//! The WOFF2 `hmtx` transform.

use crate::{
    buffer::{Buffer, WriteExt},
    error::{Result, Woff2Error},
    tag::Tag,
};

pub const HMTX_FLAG_NO_PROPORTIONAL_LSBS: u8 = 1 << 0;
pub const HMTX_FLAG_NO_MONOSPACE_LSBS: u8 = 1 << 1;

/// Offset of `numberOfHMetrics` in the `hhea` table.
pub const HHEA_NUM_H_METRICS_OFFSET: usize = 34;

pub fn read_num_h_metrics(hhea: &[u8]) -> Result<u16> {
    let mut buf = Buffer::new(hhea);
    buf.set_offset(HHEA_NUM_H_METRICS_OFFSET)
        .and_then(|_| buf.read_u16())
        .map_err(|_| Woff2Error::table(Tag::HHEA, "table is too short"))
}

pub fn hmtx_length(num_glyphs: u16, num_h_metrics: u16) -> usize {
    4 * num_h_metrics as usize + 2 * (num_glyphs as usize - num_h_metrics as usize)
}

/// Applies the WOFF2 `hmtx` transform, omitting left side bearings that equal the glyph's
/// `xMin`.
///
/// Returns `None` when no bearings can be omitted, or when the table does not have the exact
/// layout implied by `hhea` and `maxp`.
pub fn transform_hmtx(
    hmtx: &[u8],
    num_h_metrics: u16,
    x_mins: &[Option<i16>],
) -> Option<Vec<u8>> {
    let num_glyphs = x_mins.len();
    if num_h_metrics == 0
        || num_h_metrics as usize > num_glyphs
        || hmtx.len() != hmtx_length(num_glyphs as u16, num_h_metrics)
    {
        return None;
    }

    let mut buf = Buffer::new(hmtx);
    let mut advances = Vec::with_capacity(num_h_metrics as usize);
    let mut lsbs = Vec::with_capacity(num_glyphs);
    for _ in 0..num_h_metrics {
        advances.push(buf.read_u16().ok()?);
        lsbs.push(buf.read_i16().ok()?);
    }
    for _ in num_h_metrics as usize..num_glyphs {
        lsbs.push(buf.read_i16().ok()?);
    }

    // empty glyphs decode with a zero xMin
    let matches_x_min = |(lsb, x_min): (&i16, &Option<i16>)| *lsb == x_min.unwrap_or(0);
    let (proportional, monospace) = lsbs.split_at(num_h_metrics as usize);
    let (proportional_x_mins, monospace_x_mins) = x_mins.split_at(num_h_metrics as usize);
    let omit_proportional = proportional.iter().zip(proportional_x_mins).all(matches_x_min);
    let omit_monospace =
        !monospace.is_empty() && monospace.iter().zip(monospace_x_mins).all(matches_x_min);
    if !omit_proportional && !omit_monospace {
        return None;
    }

    let mut flags = 0;
    if omit_proportional {
        flags |= HMTX_FLAG_NO_PROPORTIONAL_LSBS;
    }
    if omit_monospace {
        flags |= HMTX_FLAG_NO_MONOSPACE_LSBS;
    }

    let mut out = Vec::new();
    out.put_u8(flags);
    for advance in advances {
        out.put_u16(advance);
    }
    if !omit_proportional {
        for lsb in proportional {
            out.put_i16(*lsb);
        }
    }
    if !omit_monospace {
        for lsb in monospace {
            out.put_i16(*lsb);
        }
    }
    Some(out)
}
