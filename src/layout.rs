//! Card layout: the fixed set of cards and the per-view shuffled order.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// A card on the moodboard grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    Bio,
    Insta,
    Twitter,
    Socials,
    Status,
    Link,
    Photo,
}

impl CardKind {
    /// Every card, in canonical order.
    pub const ALL: [CardKind; 7] = [
        CardKind::Bio,
        CardKind::Insta,
        CardKind::Twitter,
        CardKind::Socials,
        CardKind::Status,
        CardKind::Link,
        CardKind::Photo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardKind::Bio => "bio",
            CardKind::Insta => "insta",
            CardKind::Twitter => "twitter",
            CardKind::Socials => "socials",
            CardKind::Status => "status",
            CardKind::Link => "link",
            CardKind::Photo => "photo",
        }
    }
}

impl std::fmt::Display for CardKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order in which a view lays out its cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayOrder(Vec<CardKind>);

impl DisplayOrder {
    /// Canonical, unshuffled order.
    pub fn canonical() -> Self {
        Self(CardKind::ALL.to_vec())
    }

    /// Uniform random permutation of all cards.
    pub fn shuffled() -> Self {
        Self::shuffled_with(&mut rand::thread_rng())
    }

    /// Fisher–Yates over the fixed card set: walk from the back, swapping
    /// each slot with a uniformly chosen slot at or before it.
    pub fn shuffled_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut cards = CardKind::ALL.to_vec();
        for i in (1..cards.len()).rev() {
            let j = rng.gen_range(0..=i);
            cards.swap(i, j);
        }
        Self(cards)
    }

    pub fn cards(&self) -> &[CardKind] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{HashMap, HashSet};

    fn is_full_permutation(order: &DisplayOrder) -> bool {
        let unique: HashSet<CardKind> = order.cards().iter().copied().collect();
        order.len() == CardKind::ALL.len() && unique.len() == CardKind::ALL.len()
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let order = DisplayOrder::shuffled_with(&mut rng);
            assert!(is_full_permutation(&order), "bad order: {:?}", order);
        }
    }

    #[test]
    fn test_thread_rng_shuffle_is_permutation() {
        assert!(is_full_permutation(&DisplayOrder::shuffled()));
    }

    #[test]
    fn test_seeded_shuffle_is_deterministic() {
        let a = DisplayOrder::shuffled_with(&mut StdRng::seed_from_u64(42));
        let b = DisplayOrder::shuffled_with(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_every_card_reaches_every_slot() {
        // 7 cards x 7 slots; with 7000 draws each cell expects ~1000 hits.
        let mut rng = StdRng::seed_from_u64(1234);
        let mut hits: HashMap<(CardKind, usize), usize> = HashMap::new();
        for _ in 0..7000 {
            let order = DisplayOrder::shuffled_with(&mut rng);
            for (slot, card) in order.cards().iter().enumerate() {
                *hits.entry((*card, slot)).or_default() += 1;
            }
        }
        assert_eq!(hits.len(), 49);
        for count in hits.values() {
            assert!((700..1300).contains(count), "skewed cell count {}", count);
        }
    }

    #[test]
    fn test_tokens_serialize_lowercase() {
        let json = serde_json::to_string(&DisplayOrder::canonical()).unwrap();
        assert_eq!(
            json,
            r#"["bio","insta","twitter","socials","status","link","photo"]"#
        );
    }
}
