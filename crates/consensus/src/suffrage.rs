// Path: crates/consensus/src/suffrage.rs
//! Proposer and acting set selection.
//!
//! Both rules cache the last [`CACHE_SIZE`] acting suffrages; the selection
//! is a pure function of `(height, round)` so cached values never go stale.

use isaac_api::consensus::{ActingSuffrage, Suffrage};
use isaac_types::app::{Address, Height, Round};
use isaac_types::config::{SuffrageConfig, SuffrageKind};
use isaac_types::error::StateError;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Number of cached `(height, round)` selections.
pub const CACHE_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(99);

type Cache = Mutex<LruCache<(Height, Round), ActingSuffrage>>;

fn sorted(mut nodes: Vec<Address>) -> Result<Vec<Address>, StateError> {
    nodes.sort();
    nodes.dedup();
    if nodes.is_empty() {
        return Err(StateError::Validation("empty suffrage".into()));
    }
    Ok(nodes)
}

fn cached(
    cache: &Cache,
    height: Height,
    round: Round,
    select: impl FnOnce() -> ActingSuffrage,
) -> ActingSuffrage {
    if let Some(hit) = cache.lock().get(&(height, round)) {
        return hit.clone();
    }
    let acting = select();
    cache.lock().put((height, round), acting.clone());
    acting
}

/// One configured proposer; every member acts.
pub struct FixedProposer {
    proposer: Address,
    nodes: Vec<Address>,
    cache: Cache,
}

impl FixedProposer {
    pub fn new(proposer: Address, nodes: Vec<Address>) -> Result<Self, StateError> {
        let nodes = sorted(nodes)?;
        if nodes.binary_search(&proposer).is_err() {
            return Err(StateError::Validation(format!(
                "proposer {proposer} is not a suffrage node"
            )));
        }
        Ok(Self {
            proposer,
            nodes,
            cache: Mutex::new(LruCache::new(CACHE_SIZE)),
        })
    }
}

impl Suffrage for FixedProposer {
    fn name(&self) -> &'static str {
        "fixed-proposer"
    }

    fn nodes(&self) -> &[Address] {
        &self.nodes
    }

    fn acting(&self, height: Height, round: Round) -> ActingSuffrage {
        cached(&self.cache, height, round, || ActingSuffrage {
            height,
            round,
            proposer: self.proposer.clone(),
            nodes: self.nodes.clone(),
        })
    }
}

/// Rotates the proposer over the sorted members by `(height + round) mod N`.
/// The acting set is the proposer and the members after it, wrapping around,
/// up to `acting_count` nodes.
pub struct Roundrobin {
    nodes: Vec<Address>,
    first: Address,
    acting_count: usize,
    cache: Cache,
}

impl Roundrobin {
    pub fn new(nodes: Vec<Address>, acting_count: usize) -> Result<Self, StateError> {
        let nodes = sorted(nodes)?;
        let acting_count = acting_count.clamp(1, nodes.len());
        let first = nodes
            .first()
            .cloned()
            .ok_or_else(|| StateError::Validation("empty suffrage".into()))?;
        Ok(Self {
            nodes,
            first,
            acting_count,
            cache: Mutex::new(LruCache::new(CACHE_SIZE)),
        })
    }

    fn select(&self, height: Height, round: Round) -> ActingSuffrage {
        let n = self.nodes.len();
        let h = height.0.rem_euclid(n as i64) as usize;
        let r = (round.0 % n as u64) as usize;
        let start = (h + r) % n;
        let mut acting: Vec<Address> = self
            .nodes
            .iter()
            .cycle()
            .skip(start)
            .take(self.acting_count)
            .cloned()
            .collect();
        let proposer = self.nodes.get(start).unwrap_or(&self.first).clone();
        acting.sort();
        ActingSuffrage {
            height,
            round,
            proposer,
            nodes: acting,
        }
    }
}

impl Suffrage for Roundrobin {
    fn name(&self) -> &'static str {
        "roundrobin"
    }

    fn nodes(&self) -> &[Address] {
        &self.nodes
    }

    fn acting(&self, height: Height, round: Round) -> ActingSuffrage {
        cached(&self.cache, height, round, || self.select(height, round))
    }
}

/// Builds the suffrage described by `config` over `nodes`.
pub fn from_config(
    config: &SuffrageConfig,
    nodes: Vec<Address>,
    acting_count: usize,
) -> Result<Arc<dyn Suffrage>, StateError> {
    match config.kind {
        SuffrageKind::FixedProposer => {
            let proposer = config.proposer.clone().ok_or_else(|| {
                StateError::Validation("fixed-proposer suffrage without proposer".into())
            })?;
            Ok(Arc::new(FixedProposer::new(proposer, nodes)?))
        }
        SuffrageKind::Roundrobin => Ok(Arc::new(Roundrobin::new(nodes, acting_count)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(names: &[&str]) -> Vec<Address> {
        names.iter().map(|n| Address::new(*n).unwrap()).collect()
    }

    #[test]
    fn test_roundrobin_rotates_proposer() {
        let rr = Roundrobin::new(addrs(&["c", "a", "b"]), 3).unwrap();
        assert_eq!(rr.nodes(), addrs(&["a", "b", "c"]).as_slice());
        assert_eq!(rr.acting(Height(0), Round(0)).proposer.as_str(), "a");
        assert_eq!(rr.acting(Height(1), Round(0)).proposer.as_str(), "b");
        assert_eq!(rr.acting(Height(1), Round(1)).proposer.as_str(), "c");
        assert_eq!(rr.acting(Height(1), Round(2)).proposer.as_str(), "a");
        assert_eq!(rr.acting(Height(5), Round(0)).nodes, addrs(&["a", "b", "c"]));
    }

    #[test]
    fn test_roundrobin_acting_window_wraps() {
        let rr = Roundrobin::new(addrs(&["a", "b", "c", "d"]), 2).unwrap();
        let acting = rr.acting(Height(3), Round(0));
        assert_eq!(acting.proposer.as_str(), "d");
        assert_eq!(acting.nodes, addrs(&["a", "d"]));
        assert!(rr.is_acting(Height(3), Round(0), &Address::new("a").unwrap()));
        assert!(!rr.is_acting(Height(3), Round(0), &Address::new("b").unwrap()));
        assert!(rr.is_inside(&Address::new("b").unwrap()));
        assert!(rr.is_proposer(Height(3), Round(0), &Address::new("d").unwrap()));
    }

    #[test]
    fn test_cached_selection_is_stable() {
        let rr = Roundrobin::new(addrs(&["a", "b", "c"]), 2).unwrap();
        let first = rr.acting(Height(7), Round(3));
        for h in 0..200 {
            rr.acting(Height(h), Round(0));
        }
        assert_eq!(rr.acting(Height(7), Round(3)), first);
    }

    #[test]
    fn test_fixed_proposer() {
        let fp = FixedProposer::new(Address::new("b").unwrap(), addrs(&["a", "b"])).unwrap();
        let acting = fp.acting(Height(9), Round(4));
        assert_eq!(acting.proposer.as_str(), "b");
        assert_eq!(acting.nodes, addrs(&["a", "b"]));
        assert!(FixedProposer::new(Address::new("z").unwrap(), addrs(&["a"])).is_err());
        assert!(Roundrobin::new(Vec::new(), 1).is_err());
    }

    proptest::proptest! {
        #[test]
        fn test_roundrobin_acting_set_is_well_formed(
            count in 1usize..8,
            acting in 1usize..10,
            height in 0i64..10_000,
            round in 0u64..50,
        ) {
            let names: Vec<String> = (0..count).map(|i| format!("n{i}")).collect();
            let rr = Roundrobin::new(
                names.iter().map(|n| Address::new(n.as_str()).unwrap()).collect(),
                acting,
            )
            .unwrap();
            let set = rr.acting(Height(height), Round(round));
            proptest::prop_assert_eq!(set.nodes.len(), acting.min(count));
            proptest::prop_assert!(set.nodes.contains(&set.proposer));
            proptest::prop_assert!(set.nodes.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
