//! Big-endian readers and writers, and the variable length integer formats used by WOFF2.

use crate::{
    error::{Result, Woff2Error},
    tag::Tag,
};

/// A bounds-checked cursor over a byte slice.
#[derive(Clone)]
pub struct Buffer<'a> {
    data: &'a [u8],
    offset: usize,
}
impl<'a> Buffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Buffer { data, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// The unread part of the data, without advancing.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    pub fn set_offset(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(Woff2Error::Truncated);
        }
        self.offset = offset;
        Ok(())
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len)?;
        Ok(())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Woff2Error::Truncated);
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }
    pub fn read_tag(&mut self) -> Result<Tag> {
        Ok(Tag(self.read_array()?))
    }

    /// Reads a `255UInt16` value.
    pub fn read_255_u16(&mut self) -> Result<u16> {
        const ONE_MORE_BYTE_CODE_1: u8 = 255;
        const ONE_MORE_BYTE_CODE_2: u8 = 254;
        const WORD_CODE: u8 = 253;
        const LOWEST_U_CODE: u16 = 253;

        let code = self.read_u8()?;
        Ok(match code {
            WORD_CODE => self.read_u16()?,
            ONE_MORE_BYTE_CODE_1 => self.read_u8()? as u16 + LOWEST_U_CODE,
            ONE_MORE_BYTE_CODE_2 => self.read_u8()? as u16 + LOWEST_U_CODE * 2,
            _ => code as u16,
        })
    }

    /// Reads a `UIntBase128` value.
    pub fn read_base128(&mut self) -> Result<u32> {
        let mut accum = 0u32;
        for i in 0..5 {
            let byte = self.read_u8()?;
            // leading zeros are not allowed
            if i == 0 && byte == 0x80 {
                return Err(Woff2Error::Malformed("UIntBase128 value has leading zeros"));
            }
            // the value must fit in 32 bits
            if accum & 0xFE000000 != 0 {
                return Err(Woff2Error::Malformed("UIntBase128 value overflows"));
            }
            accum = (accum << 7) | (byte & 0x7F) as u32;
            if byte & 0x80 == 0 {
                return Ok(accum);
            }
        }
        Err(Woff2Error::Malformed("UIntBase128 value is longer than 5 bytes"))
    }
}

/// Big-endian writers for output buffers.
pub trait WriteExt {
    fn put_u8(&mut self, value: u8);
    fn put_u16(&mut self, value: u16);
    fn put_u32(&mut self, value: u32);
    fn put_tag(&mut self, tag: Tag);
    fn put_255_u16(&mut self, value: u16);
    fn put_base128(&mut self, value: u32);
    fn pad_to_4(&mut self);

    fn put_i16(&mut self, value: i16) {
        self.put_u16(value as u16);
    }
}
impl WriteExt for Vec<u8> {
    fn put_u8(&mut self, value: u8) {
        self.push(value);
    }
    fn put_u16(&mut self, value: u16) {
        self.extend_from_slice(&value.to_be_bytes());
    }
    fn put_u32(&mut self, value: u32) {
        self.extend_from_slice(&value.to_be_bytes());
    }
    fn put_tag(&mut self, tag: Tag) {
        self.extend_from_slice(&tag.0);
    }
    fn put_255_u16(&mut self, value: u16) {
        if value < 253 {
            self.push(value as u8);
        } else if value < 506 {
            self.push(255);
            self.push((value - 253) as u8);
        } else if value < 762 {
            self.push(254);
            self.push((value - 506) as u8);
        } else {
            self.push(253);
            self.put_u16(value);
        }
    }
    fn put_base128(&mut self, value: u32) {
        let size = base128_size(value);
        for i in 0..size {
            let mut byte = ((value >> (7 * (size - i - 1))) & 0x7F) as u8;
            if i < size - 1 {
                byte |= 0x80;
            }
            self.push(byte);
        }
    }
    fn pad_to_4(&mut self) {
        self.resize(round4(self.len()), 0);
    }
}

pub fn base128_size(mut value: u32) -> usize {
    let mut size = 1;
    while value >= 128 {
        value >>= 7;
        size += 1;
    }
    size
}

pub fn round4(value: usize) -> usize {
    (value + 3) & !3
}

/// Computes an OpenType table checksum, treating the data as if it were zero-padded to a
/// multiple of four bytes.
pub fn checksum(data: &[u8]) -> u32 {
    let mut sum = 0u32;
    let mut iter = data.chunks_exact(4);
    for chunk in &mut iter {
        sum = sum.wrapping_add(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    let mut tail = [0u8; 4];
    let remainder = iter.remainder();
    tail[..remainder.len()].copy_from_slice(remainder);
    sum.wrapping_add(u32::from_be_bytes(tail))
}
