//! MurmurHash64A (the 64-bit variant of MurmurHash2), transcribed bit-exactly
//! from the public reference implementation by Austin Appleby. This is a
//! compatibility surface, not a design choice: every participant sharing a
//! topology must compute identical ring positions and key placements, which
//! means the mixing constants and the block-of-8 tail handling below must
//! match the reference exactly, including its little-endian block reads.

const M: u64 = 0xc6a4a7935bd1e995;
const R: u32 = 47;

/// The seed used everywhere in this system for ring construction and key
/// lookups.
pub const RING_SEED: u64 = 0x1234ABCD;

pub fn murmur_hash_64a(data: &[u8], seed: u64) -> u64 {
    let len = data.len() as u64;
    let mut h: u64 = seed ^ len.wrapping_mul(M);

    let nblocks = data.len() / 8;
    for i in 0..nblocks {
        let block = &data[i * 8..i * 8 + 8];
        let mut k = u64::from_le_bytes(block.try_into().expect("8-byte slice"));

        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h ^= k;
        h = h.wrapping_mul(M);
    }

    let tail = &data[nblocks * 8..];
    // Fallthrough switch on the number of trailing bytes, mirroring the
    // reference implementation's duff's-device-style tail handling.
    match tail.len() {
        7 => {
            h ^= (tail[6] as u64) << 48;
            h ^= (tail[5] as u64) << 40;
            h ^= (tail[4] as u64) << 32;
            h ^= (tail[3] as u64) << 24;
            h ^= (tail[2] as u64) << 16;
            h ^= (tail[1] as u64) << 8;
            h ^= tail[0] as u64;
            h = h.wrapping_mul(M);
        }
        6 => {
            h ^= (tail[5] as u64) << 40;
            h ^= (tail[4] as u64) << 32;
            h ^= (tail[3] as u64) << 24;
            h ^= (tail[2] as u64) << 16;
            h ^= (tail[1] as u64) << 8;
            h ^= tail[0] as u64;
            h = h.wrapping_mul(M);
        }
        5 => {
            h ^= (tail[4] as u64) << 32;
            h ^= (tail[3] as u64) << 24;
            h ^= (tail[2] as u64) << 16;
            h ^= (tail[1] as u64) << 8;
            h ^= tail[0] as u64;
            h = h.wrapping_mul(M);
        }
        4 => {
            h ^= (tail[3] as u64) << 24;
            h ^= (tail[2] as u64) << 16;
            h ^= (tail[1] as u64) << 8;
            h ^= tail[0] as u64;
            h = h.wrapping_mul(M);
        }
        3 => {
            h ^= (tail[2] as u64) << 16;
            h ^= (tail[1] as u64) << 8;
            h ^= tail[0] as u64;
            h = h.wrapping_mul(M);
        }
        2 => {
            h ^= (tail[1] as u64) << 8;
            h ^= tail[0] as u64;
            h = h.wrapping_mul(M);
        }
        1 => {
            h ^= tail[0] as u64;
            h = h.wrapping_mul(M);
        }
        _ => {}
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;

    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_with_zero_seed_is_zero() {
        // h = seed ^ (0 * m) = 0; no blocks, empty tail, then h ^= h>>47 (0),
        // h *= m (0), h ^= h>>47 (0). The only input/seed combination whose
        // result is derivable by hand without a 64-bit multiply.
        assert_eq!(murmur_hash_64a(b"", 0), 0);
    }

    /// Fixed vectors computed independently from the reference mixing
    /// algorithm, so the non-trivial block/tail path is checked against a
    /// known output rather than only against itself.
    #[test]
    fn matches_fixed_reference_vectors() {
        assert_eq!(murmur_hash_64a(b"", RING_SEED), 0x742d0865aa627b0b);
        assert_eq!(
            murmur_hash_64a(b"key_7190", RING_SEED),
            0xffd10c6fdc9222f4
        );
        assert_eq!(
            murmur_hash_64a(b"some-key", RING_SEED),
            0xd5ec6a01211a6bc4
        );
        assert_eq!(murmur_hash_64a(b"hello", 0), 0x1e68d17c457bf117);
    }

    #[test]
    fn deterministic_for_same_input_and_seed() {
        let data = b"key_7190";
        assert_eq!(
            murmur_hash_64a(data, RING_SEED),
            murmur_hash_64a(data, RING_SEED)
        );
    }

    #[test]
    fn sensitive_to_seed() {
        let data = b"some-key";
        assert_ne!(murmur_hash_64a(data, 0), murmur_hash_64a(data, RING_SEED));
    }

    #[test]
    fn sensitive_to_single_bit_flip() {
        let a = murmur_hash_64a(b"key_0", RING_SEED);
        let b = murmur_hash_64a(b"key_1", RING_SEED);
        assert_ne!(a, b);
    }

    #[test]
    fn handles_every_tail_length() {
        // Exercise all seven tail-length branches plus the zero-length and
        // exact-multiple-of-8 paths, checking only that they run and differ.
        let mut seen = std::collections::HashSet::new();
        for len in 0..=16 {
            let data: Vec<u8> = (0..len as u8).collect();
            seen.insert(murmur_hash_64a(&data, RING_SEED));
        }
        assert_eq!(seen.len(), 17, "expected all 17 lengths to hash distinctly");
    }
}
