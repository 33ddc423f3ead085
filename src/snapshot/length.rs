//! The snapshot format's variable-length integer encoding: 1-5 bytes with a
//! 2-bit prefix discriminating 6-bit inline / 14-bit inline / 32-bit
//! big-endian / special-encoding, per the design's §4.4 "Length encoding".

use byteorder::{BigEndian, ByteOrder};

use super::cursor::Cursor;
use crate::errors::ProxyError;

/// The four special-encoding sub-types carried by a `11` prefix byte, used
/// only inside type-specific value blobs (never for a key or an AUX
/// string, both of which are always `Length::Plain`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Plain(u64),
    Special(u8),
}

/// Reads one length header, returning whichever of `Plain`/`Special` it
/// decodes to. Does not distinguish its caller's expectations — callers
/// that require a plain length (keys, AUX strings) reject `Special` via
/// [`read_plain_length`].
pub fn read_length(cur: &mut Cursor) -> Result<Length, ProxyError> {
    let b0 = cur.read_u8()?;
    match b0 >> 6 {
        0b00 => Ok(Length::Plain((b0 & 0x3F) as u64)),
        0b01 => {
            let b1 = cur.read_u8()?;
            Ok(Length::Plain((((b0 & 0x3F) as u64) << 8) | b1 as u64))
        }
        0b10 => {
            let bytes = cur.read_exact(4)?;
            Ok(Length::Plain(BigEndian::read_u32(bytes) as u64))
        }
        0b11 => Ok(Length::Special(b0 & 0x3F)),
        _ => unreachable!("two-bit prefix has only four values"),
    }
}

/// Reads a length header that must be a plain length (used for keys and
/// AUX strings, per the design's "length-prefixed key"/"length-prefixed
/// string" wording, as distinct from the specially-encoded value blobs).
pub fn read_plain_length(cur: &mut Cursor) -> Result<u64, ProxyError> {
    match read_length(cur)? {
        Length::Plain(n) => Ok(n),
        Length::Special(_) => Err(ProxyError::snapshot(
            "expected a plain length, found a special-encoded length",
        )),
    }
}

/// Reads a plain-length-prefixed byte string (used for AUX key/value pairs
/// and for a data record's key).
pub fn read_plain_string<'a>(cur: &mut Cursor<'a>) -> Result<&'a [u8], ProxyError> {
    let n = read_plain_length(cur)? as usize;
    cur.read_exact(n)
}

/// Encodes `len` using the same 2-bit-prefix scheme, choosing the smallest
/// form that fits. Used only for rewritten records (RESIZEDB); every other
/// record is copied through verbatim from the original buffer.
pub fn write_plain_length(out: &mut Vec<u8>, len: u64) {
    if len < 64 {
        out.push(len as u8);
    } else if len < 16384 {
        out.push(0x40 | ((len >> 8) as u8));
        out.push((len & 0xFF) as u8);
    } else {
        out.push(0x80);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(len: u64) -> u64 {
        let mut buf = Vec::new();
        write_plain_length(&mut buf, len);
        let mut cur = Cursor::new(&buf);
        read_plain_length(&mut cur).unwrap()
    }

    #[test]
    fn six_bit_inline_roundtrips() {
        assert_eq!(roundtrip(0), 0);
        assert_eq!(roundtrip(63), 63);
    }

    #[test]
    fn fourteen_bit_inline_roundtrips() {
        assert_eq!(roundtrip(64), 64);
        assert_eq!(roundtrip(16383), 16383);
    }

    #[test]
    fn thirty_two_bit_roundtrips() {
        assert_eq!(roundtrip(16384), 16384);
        assert_eq!(roundtrip(u32::MAX as u64), u32::MAX as u64);
    }

    #[test]
    fn special_encoding_is_rejected_as_plain_length() {
        let buf = vec![0xC0u8]; // 11 000000: special encoding, sub-type 0
        let mut cur = Cursor::new(&buf);
        assert!(read_plain_length(&mut cur).is_err());
        let mut cur2 = Cursor::new(&buf);
        assert_eq!(read_length(&mut cur2).unwrap(), Length::Special(0));
    }

    #[test]
    fn plain_string_roundtrips() {
        let mut buf = Vec::new();
        write_plain_length(&mut buf, 5);
        buf.extend_from_slice(b"hello");
        let mut cur = Cursor::new(&buf);
        assert_eq!(read_plain_string(&mut cur).unwrap(), b"hello");
    }
}
