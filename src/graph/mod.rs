use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::address::{Address, Timestamp};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FollowStatus {
    pub is_following: bool,
    pub following_date: Timestamp,
}

impl FollowStatus {
    pub const NONE: FollowStatus = FollowStatus {
        is_following: false,
        following_date: 0,
    };
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FollowEdge {
    pub follower: Address,
    pub followee: Address,
    pub following_date: Timestamp,
}

/// Directed follow relation. Edges are indexed both by follower and by
/// followee so lookups in either direction never scan the whole graph.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FollowGraph {
    forward: BTreeMap<Address, BTreeMap<Address, Timestamp>>,
    reverse: BTreeMap<Address, BTreeSet<Address>>,
    edges: usize,
}

impl FollowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, follower: &Address, followee: &Address) -> bool {
        self.forward
            .get(follower)
            .map_or(false, |out| out.contains_key(followee))
    }

    pub fn status(&self, follower: &Address, followee: &Address) -> FollowStatus {
        match self.forward.get(follower).and_then(|out| out.get(followee)) {
            Some(date) => FollowStatus {
                is_following: true,
                following_date: *date,
            },
            None => FollowStatus::NONE,
        }
    }

    /// Inserts the edge; returns `false` (and leaves the date untouched) when
    /// it already exists.
    pub fn link(&mut self, follower: Address, followee: Address, at: Timestamp) -> bool {
        let out = self.forward.entry(follower).or_default();
        if out.contains_key(&followee) {
            return false;
        }
        out.insert(followee, at);
        self.reverse.entry(followee).or_default().insert(follower);
        self.edges += 1;
        true
    }

    /// Removes the edge; returns `false` when it was not present.
    pub fn unlink(&mut self, follower: &Address, followee: &Address) -> bool {
        let Some(out) = self.forward.get_mut(follower) else {
            return false;
        };
        if out.remove(followee).is_none() {
            return false;
        }
        if out.is_empty() {
            self.forward.remove(follower);
        }
        if let Some(inbound) = self.reverse.get_mut(followee) {
            inbound.remove(follower);
            if inbound.is_empty() {
                self.reverse.remove(followee);
            }
        }
        self.edges -= 1;
        true
    }

    pub fn followings_of(&self, follower: &Address) -> Vec<Address> {
        self.forward
            .get(follower)
            .map(|out| out.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn followers_of(&self, followee: &Address) -> Vec<Address> {
        self.reverse
            .get(followee)
            .map(|inbound| inbound.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn out_degree(&self, follower: &Address) -> usize {
        self.forward.get(follower).map_or(0, BTreeMap::len)
    }

    pub fn in_degree(&self, followee: &Address) -> usize {
        self.reverse.get(followee).map_or(0, BTreeSet::len)
    }

    pub fn edge_count(&self) -> usize {
        self.edges
    }

    /// All edges ordered by (follower, followee).
    pub fn edges(&self) -> impl Iterator<Item = FollowEdge> + '_ {
        self.forward.iter().flat_map(|(follower, out)| {
            out.iter().map(move |(followee, date)| FollowEdge {
                follower: *follower,
                followee: *followee,
                following_date: *date,
            })
        })
    }
}
