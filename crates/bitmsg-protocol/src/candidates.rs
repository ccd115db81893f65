//! Candidate address sets for decode routing.
//!
//! Decoders that must locate the right identity — `pubkey v4` by tag,
//! `msg` by trial decryption, `broadcast` by subscription — accept
//! their candidates in one of three shapes. The shape dictates the
//! lookup strategy: tag probes are O(n) for [`Candidates::One`] and
//! [`Candidates::Many`] and O(1) for [`Candidates::ByTag`]; trial
//! iteration always preserves the caller's order for sequences.

use std::collections::HashMap;

use bitmsg_crypto::Address;
use bitmsg_types::Tag;

/// Candidate addresses for a decode operation.
#[derive(Clone, Debug)]
pub enum Candidates<'a> {
    /// A single candidate.
    One(&'a Address),
    /// An ordered sequence, tried front to back.
    Many(&'a [Address]),
    /// A tag-keyed map for constant-time tag routing.
    ByTag(&'a HashMap<Tag, Address>),
}

impl<'a> Candidates<'a> {
    /// Returns the first candidate with `version ≥ 4` whose tag
    /// matches, if any.
    pub fn find_by_tag(&self, tag: &Tag) -> Option<&'a Address> {
        match self {
            Self::One(addr) => Some(*addr).filter(|a| a.version >= 4 && a.tag() == *tag),
            Self::Many(addrs) => addrs.iter().find(|a| a.version >= 4 && a.tag() == *tag),
            Self::ByTag(map) => map.get(tag).filter(|a| a.version >= 4),
        }
    }

    /// Iterates the candidates; sequences keep their input order, maps
    /// iterate in arbitrary order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &'a Address> + '_> {
        match self {
            Self::One(addr) => Box::new(std::iter::once(*addr)),
            Self::Many(addrs) => Box::new(addrs.iter()),
            Self::ByTag(map) => Box::new(map.values()),
        }
    }

    /// Number of candidates in the set.
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(addrs) => addrs.len(),
            Self::ByTag(map) => map.len(),
        }
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bitmsg_crypto::keys::PrivateKey;

    fn address(version: u64, seed: u8) -> Address {
        let signing = PrivateKey::from_bytes(&[seed; 32]).unwrap();
        let encryption = PrivateKey::from_bytes(&[seed.wrapping_add(1); 32]).unwrap();
        Address::from_secrets(version, 1, signing, encryption)
    }

    #[test]
    fn one_matches_only_its_own_tag() {
        let addr = address(4, 0x10);
        let other = address(4, 0x20);
        let candidates = Candidates::One(&addr);

        assert!(candidates.find_by_tag(&addr.tag()).is_some());
        assert!(candidates.find_by_tag(&other.tag()).is_none());
    }

    #[test]
    fn low_version_addresses_never_match_tags() {
        let addr = address(3, 0x10);
        let candidates = Candidates::One(&addr);
        assert!(candidates.find_by_tag(&addr.tag()).is_none());
    }

    #[test]
    fn many_scans_in_order() {
        let addrs = vec![address(4, 0x10), address(4, 0x20), address(4, 0x30)];
        let candidates = Candidates::Many(&addrs);

        let target = addrs[1].tag();
        let found = candidates.find_by_tag(&target).map(Address::tag);
        assert_eq!(found, Some(target));
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn by_tag_probes_directly() {
        let a = address(4, 0x10);
        let b = address(4, 0x20);
        let map: HashMap<_, _> = [(a.tag(), a.clone()), (b.tag(), b.clone())].into();
        let candidates = Candidates::ByTag(&map);

        assert_eq!(
            candidates.find_by_tag(&b.tag()).map(Address::ripe),
            Some(b.ripe()),
        );
        assert!(candidates
            .find_by_tag(&address(4, 0x30).tag())
            .is_none());
    }

    #[test]
    fn iter_preserves_sequence_order() {
        let addrs = vec![address(2, 0x10), address(3, 0x20), address(4, 0x30)];
        let candidates = Candidates::Many(&addrs);

        let versions: Vec<u64> = candidates.iter().map(|a| a.version).collect();
        assert_eq!(versions, vec![2, 3, 4]);
    }

    #[test]
    fn empty_sequence_is_empty() {
        let addrs: Vec<Address> = Vec::new();
        assert!(Candidates::Many(&addrs).is_empty());
    }
}
