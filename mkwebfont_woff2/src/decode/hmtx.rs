use crate::{
    buffer::{Buffer, WriteExt},
    error::{Result, Woff2Error},
    tag::Tag,
    transform::hmtx::{HMTX_FLAG_NO_MONOSPACE_LSBS, HMTX_FLAG_NO_PROPORTIONAL_LSBS},
};

fn malformed(reason: &'static str) -> Woff2Error {
    Woff2Error::table(Tag::HMTX, reason)
}

/// Rebuilds an `hmtx` table, filling omitted left side bearings from the glyphs' `xMin`.
pub fn reconstruct_hmtx(
    data: &[u8],
    num_h_metrics: u16,
    x_mins: &[Option<i16>],
) -> Result<Vec<u8>> {
    let num_glyphs = x_mins.len();
    let num_h_metrics = num_h_metrics as usize;
    if num_h_metrics == 0 || num_h_metrics > num_glyphs {
        return Err(malformed("numberOfHMetrics is out of range"));
    }

    let mut buf = Buffer::new(data);
    let flags = buf.read_u8()?;
    if flags & !(HMTX_FLAG_NO_PROPORTIONAL_LSBS | HMTX_FLAG_NO_MONOSPACE_LSBS) != 0 {
        return Err(malformed("reserved transform flags are set"));
    }
    if flags == 0 {
        return Err(malformed("transformed table omits no bearings"));
    }

    let mut advances = Vec::with_capacity(num_h_metrics);
    for _ in 0..num_h_metrics {
        advances.push(buf.read_u16()?);
    }

    let mut lsbs = Vec::with_capacity(num_glyphs);
    for (glyph_id, x_min) in x_mins.iter().enumerate() {
        let omitted = if glyph_id < num_h_metrics {
            flags & HMTX_FLAG_NO_PROPORTIONAL_LSBS != 0
        } else {
            flags & HMTX_FLAG_NO_MONOSPACE_LSBS != 0
        };
        lsbs.push(if omitted { x_min.unwrap_or(0) } else { buf.read_i16()? });
    }

    let mut out = Vec::with_capacity(2 * num_glyphs + 2 * num_h_metrics);
    for (glyph_id, lsb) in lsbs.into_iter().enumerate() {
        if let Some(advance) = advances.get(glyph_id) {
            out.put_u16(*advance);
        }
        out.put_i16(lsb);
    }
    Ok(out)
}
