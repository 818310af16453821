//! LEB128 varints, unsigned and zigzag-signed.
//!
//! Deltas inside posting blocks are unsigned; block lengths, chain heads and
//! directory totals are signed so that `-1` encodes "no block".

use std::io::{self, Read};

use crate::constants::MAX_VARINT_LEN;

pub fn put_uvarint(dst: &mut Vec<u8>, mut value: u64) -> usize {
    let start = dst.len();
    while value >= 0x80 {
        dst.push((value as u8) | 0x80);
        value >>= 7;
    }
    dst.push(value as u8);
    dst.len() - start
}

pub fn put_varint(dst: &mut Vec<u8>, value: i64) -> usize {
    put_uvarint(dst, zigzag(value))
}

/// Decodes an unsigned varint from the front of `src`.
///
/// Returns `None` when `src` ends mid-varint or the value overflows 64 bits.
#[must_use]
pub fn uvarint(src: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (i, &byte) in src.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return None;
        }
        if byte < 0x80 {
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                return None;
            }
            return Some((value | (u64::from(byte) << shift), i + 1));
        }
        value |= u64::from(byte & 0x7f) << shift;
        shift += 7;
    }
    None
}

#[must_use]
pub fn varint(src: &[u8]) -> Option<(i64, usize)> {
    uvarint(src).map(|(value, n)| (unzigzag(value), n))
}

pub fn read_uvarint<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    let mut byte = [0u8; 1];
    for i in 0..MAX_VARINT_LEN {
        reader.read_exact(&mut byte)?;
        let b = byte[0];
        if b < 0x80 {
            if i == MAX_VARINT_LEN - 1 && b > 1 {
                break;
            }
            return Ok(value | (u64::from(b) << shift));
        }
        value |= u64::from(b & 0x7f) << shift;
        shift += 7;
    }
    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        "varint overflows 64 bits",
    ))
}

pub fn read_varint<R: Read>(reader: &mut R) -> io::Result<i64> {
    read_uvarint(reader).map(unzigzag)
}

fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn signed_values_use_zigzag() {
        let mut buf = Vec::new();
        assert_eq!(put_varint(&mut buf, -1), 1);
        assert_eq!(buf, [0x01]);
        buf.clear();
        put_varint(&mut buf, 1);
        assert_eq!(buf, [0x02]);
        assert_eq!(varint(&[0x01]), Some((-1, 1)));
    }

    #[test]
    fn multi_byte_values_decode_from_slice_and_reader() {
        let mut buf = Vec::new();
        put_uvarint(&mut buf, 300);
        assert_eq!(buf, [0xac, 0x02]);
        assert_eq!(uvarint(&buf), Some((300, 2)));

        buf.clear();
        put_varint(&mut buf, i64::from(u32::MAX) * 7);
        put_varint(&mut buf, i64::MIN);
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_varint(&mut cursor).unwrap(), i64::from(u32::MAX) * 7);
        assert_eq!(read_varint(&mut cursor).unwrap(), i64::MIN);
    }

    #[test]
    fn truncated_and_overlong_inputs_are_rejected() {
        assert_eq!(uvarint(&[0x80, 0x80]), None);
        assert_eq!(uvarint(&[0xff; 11]), None);
        let mut cursor = Cursor::new(vec![0x80]);
        assert!(read_uvarint(&mut cursor).is_err());
    }
}
