//! Reflected CRC-64 (Jones polynomial), table-driven, built once and
//! memoized via `lazy_static` rather than pulled in as a dependency, since
//! no crate in the workspace exposes this exact variant.

use lazy_static::lazy_static;

const POLY: u64 = 0xad93d235_94c935a9;

fn reflect(mut v: u64, bits: u32) -> u64 {
    let mut r = 0u64;
    for _ in 0..bits {
        r = (r << 1) | (v & 1);
        v >>= 1;
    }
    r
}

fn build_table() -> [u64; 256] {
    let reversed_poly = reflect(POLY, 64);
    let mut table = [0u64; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        let mut crc = i as u64;
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ reversed_poly;
            } else {
                crc >>= 1;
            }
        }
        *slot = crc;
    }
    table
}

lazy_static! {
    static ref TABLE: [u64; 256] = build_table();
}

/// Computes the CRC-64 of `data` starting from `crc` (pass `0` for a fresh
/// checksum), matching a reflected-in/reflected-out, zero-init, zero-xorout
/// CRC-64 definition.
pub fn crc64_update(crc: u64, data: &[u8]) -> u64 {
    let mut crc = crc;
    for &byte in data {
        let idx = ((crc ^ byte as u64) & 0xFF) as usize;
        crc = TABLE[idx] ^ (crc >> 8);
    }
    crc
}

pub fn crc64(data: &[u8]) -> u64 {
    crc64_update(0, data)
}
