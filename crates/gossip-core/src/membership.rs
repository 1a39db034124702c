//! Membership directory.
//!
//! The directory is the set of peers this node currently believes are
//! reachable. It is fed by Welcome and MemberList messages and shrinks only
//! when the outbound queue gives up on a peer.

use crate::address::Address;
use crate::member::Member;

/// Deduplicated collection of known members.
///
/// Entries are unique by structural equality; insertion order is kept but
/// carries no meaning.
#[derive(Debug, Clone, Default)]
pub struct MemberList {
    members: Vec<Member>,
}

impl MemberList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every candidate not already present.
    ///
    /// Returns the number of members actually added. Putting a member that
    /// is already known is a no-op.
    pub fn put<I>(&mut self, candidates: I) -> usize
    where
        I: IntoIterator<Item = Member>,
    {
        let mut added = 0;
        for candidate in candidates {
            if !self.members.contains(&candidate) {
                self.members.push(candidate);
                added += 1;
            }
        }
        added
    }

    /// Remove the first member listening on `address`.
    pub fn remove_by_address(&mut self, address: &Address) -> Option<Member> {
        let idx = self.members.iter().position(|m| m.address() == address)?;
        Some(self.members.remove(idx))
    }

    pub fn find_by_address(&self, address: &Address) -> Option<&Member> {
        self.members.iter().find(|m| m.address() == address)
    }

    pub fn contains(&self, member: &Member) -> bool {
        self.members.contains(member)
    }

    /// Pick up to `count` distinct members uniformly at random.
    ///
    /// Returns `None` when the directory is empty, so that "nobody to pick
    /// from" is distinguishable from a request for zero members.
    pub fn random_members(&self, count: usize) -> Option<Vec<Member>> {
        if self.members.is_empty() {
            return None;
        }

        let amount = count.min(self.members.len());
        let picked = rand::seq::index::sample(&mut rand::rng(), self.members.len(), amount);
        Some(picked.into_iter().map(|i| self.members[i].clone()).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    pub fn as_slice(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}
