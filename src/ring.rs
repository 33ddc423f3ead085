//! Consistent-hash ring: maps a key to the shard endpoint that owns it.
//!
//! Built once at startup from the ordered endpoint list and never mutated
//! afterward, so it is `Send + Sync` and shared across sessions behind an
//! `Arc` without any locking.

use std::collections::BTreeMap;

use crate::hash::{murmur_hash_64a, RING_SEED};

/// Number of virtual nodes placed on the ring per endpoint. 160 is the
/// long-standing convention for consistent-hash spreads over a small-M
/// topology: it keeps load imbalance within a few percent without
/// ballooning ring size.
const VIRTUAL_NODES_PER_ENDPOINT: usize = 160;

#[derive(Debug)]
pub struct HashRing {
    // BTreeMap gives us the "smallest key >= q" query via `range`, and is
    // the natural std container for an ordered map built once and queried
    // many times.
    ring: BTreeMap<u64, usize>,
    endpoints: Vec<String>,
}

impl HashRing {
    /// Builds the ring by iterating `endpoints` in order and inserting
    /// `VIRTUAL_NODES_PER_ENDPOINT` virtual nodes per endpoint. Ties
    /// (extremely rare, given a 64-bit hash space) are resolved by first
    /// writer wins: `BTreeMap::entry(...).or_insert(...)` never overwrites
    /// an existing slot.
    pub fn new(endpoints: Vec<String>) -> Result<Self, crate::errors::ProxyError> {
        if endpoints.is_empty() {
            return Err(crate::errors::ProxyError::config(
                "topology must name at least one endpoint",
            ));
        }

        let mut ring = BTreeMap::new();
        for (n, _endpoint) in endpoints.iter().enumerate() {
            for v in 0..VIRTUAL_NODES_PER_ENDPOINT {
                let vnode = format!("SHARD-{n}-NODE-{v}");
                let key = murmur_hash_64a(vnode.as_bytes(), RING_SEED);
                ring.entry(key).or_insert(n);
            }
        }

        Ok(HashRing { ring, endpoints })
    }

    /// Returns the endpoint that owns `key`: the smallest ring entry whose
    /// key is `>= h`, wrapping around to the smallest entry overall if none
    /// exists.
    pub fn owner(&self, key: &[u8]) -> &str {
        let h = murmur_hash_64a(key, RING_SEED);
        let idx = match self.ring.range(h..).next() {
            Some((_, idx)) => *idx,
            None => *self.ring.values().next().expect("ring is non-empty"),
        };
        &self.endpoints[idx]
    }

    /// Convenience predicate: does `key` belong to `self_endpoint`?
    pub fn belongs(&self, key: &[u8], self_endpoint: &str) -> bool {
        self.owner(key) == self_endpoint
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> (HashRing, Vec<String>) {
        let endpoints = vec!["a:1".to_string(), "b:2".to_string(), "c:3".to_string()];
        (HashRing::new(endpoints.clone()).unwrap(), endpoints)
    }

    #[test]
    fn rejects_empty_topology() {
        assert!(HashRing::new(vec![]).is_err());
    }

    #[test]
    fn ring_has_all_virtual_nodes_unless_colliding() {
        let (ring, endpoints) = ring();
        assert!(ring.ring.len() <= endpoints.len() * VIRTUAL_NODES_PER_ENDPOINT);
        assert!(ring.ring.len() > 0);
    }

    #[test]
    fn every_key_maps_to_exactly_one_known_endpoint() {
        let (ring, endpoints) = ring();
        for i in 0..1000 {
            let key = format!("key_{i}");
            let owner = ring.owner(key.as_bytes());
            assert!(endpoints.iter().any(|e| e == owner));
        }
    }

    #[test]
    fn owner_is_deterministic() {
        let (ring, _) = ring();
        for i in 0..1000 {
            let key = format!("key_{i}");
            assert_eq!(ring.owner(key.as_bytes()), ring.owner(key.as_bytes()));
        }
    }

    #[test]
    fn shards_partition_the_keyspace_roughly_evenly() {
        let (ring, endpoints) = ring();
        let mut counts = vec![0usize; endpoints.len()];
        for i in 0..1000 {
            let key = format!("key_{i}");
            let owner = ring.owner(key.as_bytes());
            let idx = endpoints.iter().position(|e| e == owner).unwrap();
            counts[idx] += 1;
        }
        let expected = 1000 / endpoints.len();
        for c in counts {
            let delta = (c as isize - expected as isize).unsigned_abs();
            assert!(
                delta <= expected * 15 / 100 + 5,
                "shard got {c} keys, expected ~{expected} (+/-15%)"
            );
        }
    }

    #[test]
    fn belongs_matches_owner_comparison() {
        let (ring, endpoints) = ring();
        for i in 0..200 {
            let key = format!("key_{i}");
            let owner = ring.owner(key.as_bytes()).to_string();
            for e in &endpoints {
                assert_eq!(ring.belongs(key.as_bytes(), e), owner == *e);
            }
        }
    }
}
