//! Value-type skippers: for each recognized value-type byte, advance the
//! cursor past exactly the bytes that make up the value, without
//! materializing it. Skipping, not decoding, is sufficient because the
//! filter predicate depends only on the record's key.

use super::cursor::Cursor;
use super::length::{read_length, read_plain_length, Length};
use crate::errors::ProxyError;

pub const TYPE_STRING: u8 = 0;
pub const TYPE_LIST: u8 = 1;
pub const TYPE_SET: u8 = 2;
pub const TYPE_ZSET: u8 = 3;
pub const TYPE_HASH: u8 = 4;
pub const TYPE_ZSET_2: u8 = 5;
pub const TYPE_HASH_ZIPMAP: u8 = 9;
pub const TYPE_LIST_ZIPLIST: u8 = 10;
pub const TYPE_SET_INTSET: u8 = 11;
pub const TYPE_ZSET_ZIPLIST: u8 = 12;
pub const TYPE_HASH_ZIPLIST: u8 = 13;
pub const TYPE_LIST_QUICKLIST: u8 = 14;
pub const TYPE_STREAM_LISTPACKS: u8 = 15;
pub const TYPE_HASH_LISTPACK: u8 = 16;
pub const TYPE_ZSET_LISTPACK: u8 = 17;
pub const TYPE_LIST_QUICKLIST_2: u8 = 18;
pub const TYPE_STREAM_LISTPACKS_2: u8 = 19;
pub const TYPE_SET_LISTPACK: u8 = 20;
pub const TYPE_STREAM_LISTPACKS_3: u8 = 21;

pub fn is_known_value_type(b: u8) -> bool {
    matches!(
        b,
        TYPE_STRING
            | TYPE_LIST
            | TYPE_SET
            | TYPE_ZSET
            | TYPE_HASH
            | TYPE_ZSET_2
            | TYPE_HASH_ZIPMAP
            | TYPE_LIST_ZIPLIST
            | TYPE_SET_INTSET
            | TYPE_ZSET_ZIPLIST
            | TYPE_HASH_ZIPLIST
            | TYPE_LIST_QUICKLIST
            | TYPE_STREAM_LISTPACKS
            | TYPE_HASH_LISTPACK
            | TYPE_ZSET_LISTPACK
            | TYPE_LIST_QUICKLIST_2
            | TYPE_STREAM_LISTPACKS_2
            | TYPE_SET_LISTPACK
            | TYPE_STREAM_LISTPACKS_3
    )
}

/// Skips one value-type-encoded string: a length header that may be a
/// plain length (skip that many bytes), an int8/16/32 special encoding
/// (skip 1/2/4 bytes), or an LZF-compressed string (skip the compressed
/// length's worth of bytes, after reading and discarding the uncompressed
/// length).
fn skip_string_value(cur: &mut Cursor) -> Result<(), ProxyError> {
    match read_length(cur)? {
        Length::Plain(n) => {
            cur.read_exact(n as usize)?;
        }
        Length::Special(0) => {
            cur.read_exact(1)?;
        }
        Length::Special(1) => {
            cur.read_exact(2)?;
        }
        Length::Special(2) => {
            cur.read_exact(4)?;
        }
        Length::Special(3) => {
            let compressed_len = read_plain_length(cur)?;
            let _uncompressed_len = read_plain_length(cur)?;
            cur.read_exact(compressed_len as usize)?;
        }
        Length::Special(other) => {
            return Err(ProxyError::snapshot(format!(
                "unknown special string encoding {other}"
            )));
        }
    }
    Ok(())
}

/// Skips the legacy zset score encoding: a single byte selects +inf/-inf/NaN,
/// or otherwise is the ASCII length of the decimal score text that follows.
fn skip_legacy_double(cur: &mut Cursor) -> Result<(), ProxyError> {
    let marker = cur.read_u8()?;
    match marker {
        255 | 254 | 253 => Ok(()),
        len => {
            cur.read_exact(len as usize)?;
            Ok(())
        }
    }
}

fn skip_binary_double(cur: &mut Cursor) -> Result<(), ProxyError> {
    cur.read_exact(8)?;
    Ok(())
}

fn skip_count_prefixed<F>(cur: &mut Cursor, mut per_item: F) -> Result<(), ProxyError>
where
    F: FnMut(&mut Cursor) -> Result<(), ProxyError>,
{
    let n = read_plain_length(cur)?;
    for _ in 0..n {
        per_item(cur)?;
    }
    Ok(())
}

fn skip_stream(cur: &mut Cursor, kind: u8) -> Result<(), ProxyError> {
    // Listpack-keyed entries: (stream ID blob, listpack blob) pairs.
    skip_count_prefixed(cur, |c| {
        skip_string_value(c)?; // stream ID, packed as an opaque string
        skip_string_value(c) // listpack blob
    })?;

    // Stream-level metadata.
    let _length = read_plain_length(cur)?;
    let _last_id_ms = read_plain_length(cur)?;
    let _last_id_seq = read_plain_length(cur)?;

    if kind != TYPE_STREAM_LISTPACKS {
        let _first_id_ms = read_plain_length(cur)?;
        let _first_id_seq = read_plain_length(cur)?;
        let _max_deleted_ms = read_plain_length(cur)?;
        let _max_deleted_seq = read_plain_length(cur)?;
        let _entries_added = read_plain_length(cur)?;
    }

    // Consumer groups: present for every stream version, v1 (TYPE_STREAM_LISTPACKS)
    // included, since XGROUP predates the v2/v3 encoding.
    skip_count_prefixed(cur, |c| {
        skip_string_value(c)?; // group name
        let _last_delivered_ms = read_plain_length(c)?;
        let _last_delivered_seq = read_plain_length(c)?;
        let _entries_read = read_plain_length(c)?;

        // Pending entries list: fixed-width 128-bit stream ID + 64-bit
        // delivery time, then a length-encoded delivery count.
        skip_count_prefixed(c, |c| {
            c.read_exact(16)?; // stream ID (ms:seq, raw 8+8 bytes)
            c.read_exact(8)?; // delivery time, raw u64
            let _delivery_count = read_plain_length(c)?;
            Ok(())
        })?;

        // Consumers.
        skip_count_prefixed(c, |c| {
            skip_string_value(c)?; // consumer name
            c.read_exact(8)?; // seen_time, raw u64
            if kind == TYPE_STREAM_LISTPACKS_3 {
                c.read_exact(8)?; // active_time, raw u64
            }
            skip_count_prefixed(c, |c| {
                c.read_exact(16)?; // PEL entry: stream ID only
                Ok(())
            })
        })
    })
}

/// Skips a value of the given type, leaving the cursor positioned just
/// past it. Returns an error for any byte not in the recognized set.
pub fn skip_value(cur: &mut Cursor, value_type: u8) -> Result<(), ProxyError> {
    match value_type {
        TYPE_STRING => skip_string_value(cur),
        TYPE_LIST | TYPE_SET => skip_count_prefixed(cur, skip_string_value),
        TYPE_HASH => skip_count_prefixed(cur, |c| {
            skip_string_value(c)?;
            skip_string_value(c)
        }),
        TYPE_ZSET => skip_count_prefixed(cur, |c| {
            skip_string_value(c)?;
            skip_legacy_double(c)
        }),
        TYPE_ZSET_2 => skip_count_prefixed(cur, |c| {
            skip_string_value(c)?;
            skip_binary_double(c)
        }),
        TYPE_HASH_ZIPMAP
        | TYPE_LIST_ZIPLIST
        | TYPE_SET_INTSET
        | TYPE_ZSET_ZIPLIST
        | TYPE_HASH_ZIPLIST
        | TYPE_HASH_LISTPACK
        | TYPE_ZSET_LISTPACK
        | TYPE_SET_LISTPACK => skip_string_value(cur),
        TYPE_LIST_QUICKLIST => skip_count_prefixed(cur, skip_string_value),
        TYPE_LIST_QUICKLIST_2 => skip_count_prefixed(cur, |c| {
            let _container = read_plain_length(c)?;
            skip_string_value(c)
        }),
        TYPE_STREAM_LISTPACKS | TYPE_STREAM_LISTPACKS_2 | TYPE_STREAM_LISTPACKS_3 => {
            skip_stream(cur, value_type)
        }
        other => Err(ProxyError::snapshot(format!(
            "unknown value type byte {other}"
        ))),
    }
}
