//! Topology loading: turns the positional `host:port,host:port,...` CLI
//! argument into the ordered endpoint list the `HashRing` is built from, and
//! resolves which element of that list (if any) is "us" — the downstream
//! identity this proxy is filtering for.
//!
//! Out of scope per the design (§4.6): this is pure, idempotent parsing
//! with no side effects, safe to call once before any `Session` begins.

use crate::errors::ProxyError;
use crate::ring::HashRing;

/// The fully resolved shard configuration: the ring plus the downstream
/// identity (`host:port`) sessions filter for. Immutable after
/// construction and cheap to clone (just an `Arc` bump via callers wrapping
/// it), matching the "immutable value threaded into each Session rather
/// than a mutable global" design note.
#[derive(Debug)]
pub struct Topology {
    pub ring: HashRing,
    pub self_endpoint: String,
}

impl Topology {
    /// Parses `topology_arg` (order-significant, since order defines
    /// virtual-node naming) and builds the ring. `self_endpoint` is the
    /// `slave-host:slave-port` pair; it does not need to literally appear
    /// in `topology_arg` — the original program never enforced that, it
    /// only ever compares the owning endpoint string against it.
    pub fn load(topology_arg: &str, self_endpoint: String) -> Result<Self, ProxyError> {
        let endpoints: Vec<String> = topology_arg
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        for e in &endpoints {
            if !e.contains(':') {
                return Err(ProxyError::config(format!(
                    "endpoint '{e}' is not in host:port form"
                )));
            }
        }

        let ring = HashRing::new(endpoints)?;

        if !ring.endpoints().iter().any(|e| e == &self_endpoint) {
            tracing::warn!(
                self_endpoint = %self_endpoint,
                "downstream identity does not appear in the topology; belongs() will reject every key"
            );
        }

        Ok(Topology {
            ring,
            self_endpoint,
        })
    }

    pub fn belongs(&self, key: &[u8]) -> bool {
        self.ring.belongs(key, &self.self_endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_order_significant_endpoint_list() {
        let topo = Topology::load("a:1,b:2,c:3", "b:2".to_string()).unwrap();
        assert_eq!(topo.ring.endpoints(), &["a:1", "b:2", "c:3"]);
    }

    #[test]
    fn rejects_malformed_endpoint() {
        assert!(Topology::load("a:1,garbage,c:3", "a:1".to_string()).is_err());
    }

    #[test]
    fn rejects_empty_topology() {
        assert!(Topology::load("", "a:1".to_string()).is_err());
    }

    #[test]
    fn tolerates_self_not_present_in_topology() {
        // Matches the original program: no validation ties slave-host:port
        // to membership in the topology list.
        let topo = Topology::load("a:1,b:2", "not-listed:9".to_string()).unwrap();
        assert!(!topo.belongs(b"any-key"));
    }
}
