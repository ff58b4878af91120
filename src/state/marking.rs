use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::net::ids::{PlaceId, TokenId};
use crate::net::index_vec::Idx;
use crate::net::structure::Weight;

/// Token count of one (place, token type) coordinate.
///
/// `Omega` stands for "arbitrarily many" and only appears in coverability
/// exploration. It is larger than every finite count.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TokenCount {
    Finite(Weight),
    Omega,
}

impl TokenCount {
    pub const ZERO: TokenCount = TokenCount::Finite(0);

    /// Raw encoding used by the binary store, `u64::MAX` is omega.
    pub const OMEGA_SENTINEL: u64 = u64::MAX;

    pub fn is_omega(self) -> bool {
        matches!(self, TokenCount::Omega)
    }

    pub fn finite(self) -> Option<Weight> {
        match self {
            TokenCount::Finite(n) => Some(n),
            TokenCount::Omega => None,
        }
    }

    pub fn at_least(self, weight: Weight) -> bool {
        match self {
            TokenCount::Finite(n) => n >= weight,
            TokenCount::Omega => true,
        }
    }

    pub fn add(self, weight: Weight) -> TokenCount {
        match self {
            TokenCount::Finite(n) => TokenCount::Finite(n.saturating_add(weight)),
            TokenCount::Omega => TokenCount::Omega,
        }
    }

    pub fn sub(self, weight: Weight) -> Option<TokenCount> {
        match self {
            TokenCount::Finite(n) => n.checked_sub(weight).map(TokenCount::Finite),
            TokenCount::Omega => Some(TokenCount::Omega),
        }
    }

    pub fn to_raw(self) -> u64 {
        match self {
            TokenCount::Finite(n) => n,
            TokenCount::Omega => Self::OMEGA_SENTINEL,
        }
    }

    pub fn from_raw(raw: u64) -> TokenCount {
        if raw == Self::OMEGA_SENTINEL {
            TokenCount::Omega
        } else {
            TokenCount::Finite(raw)
        }
    }
}

impl From<Weight> for TokenCount {
    fn from(value: Weight) -> Self {
        TokenCount::Finite(value)
    }
}

impl fmt::Debug for TokenCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for TokenCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenCount::Finite(n) => write!(f, "{n}"),
            TokenCount::Omega => write!(f, "ω"),
        }
    }
}

/// A marking: token counts per place and token type, stored place-major.
///
/// Markings are values. Equality and hashing are structural, so two markings
/// denote the same state exactly when all their coordinates agree.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Marking {
    token_types: usize,
    counts: Box<[TokenCount]>,
}

impl Marking {
    pub fn zero(places: usize, token_types: usize) -> Self {
        Self {
            token_types,
            counts: vec![TokenCount::ZERO; places * token_types].into_boxed_slice(),
        }
    }

    /// Builds a marking from place-major counts.
    ///
    /// Panics if `counts` is not a whole number of rows of `token_types`.
    pub fn from_counts(token_types: usize, counts: Vec<TokenCount>) -> Self {
        assert!(
            token_types > 0 && counts.len() % token_types == 0,
            "{} counts do not split into rows of {} token types",
            counts.len(),
            token_types
        );
        Self {
            token_types,
            counts: counts.into_boxed_slice(),
        }
    }

    pub fn places(&self) -> usize {
        self.counts.len().checked_div(self.token_types).unwrap_or(0)
    }

    pub fn token_types(&self) -> usize {
        self.token_types
    }

    pub fn tokens(&self, place: PlaceId, token: TokenId) -> TokenCount {
        self.counts[self.offset(place, token)]
    }

    /// Tokens of every type in `place`.
    pub fn total(&self, place: PlaceId) -> TokenCount {
        self.row(place)
            .iter()
            .fold(TokenCount::ZERO, |acc, count| match (acc, count) {
                (TokenCount::Finite(a), TokenCount::Finite(b)) => {
                    TokenCount::Finite(a.saturating_add(*b))
                }
                _ => TokenCount::Omega,
            })
    }

    pub fn row(&self, place: PlaceId) -> &[TokenCount] {
        let start = place.index() * self.token_types;
        &self.counts[start..start + self.token_types]
    }

    pub fn counts(&self) -> &[TokenCount] {
        &self.counts
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, TokenId, TokenCount)> + '_ {
        let token_types = self.token_types;
        self.counts.iter().enumerate().map(move |(idx, count)| {
            (
                PlaceId::from_usize(idx / token_types),
                TokenId::from_usize(idx % token_types),
                *count,
            )
        })
    }

    pub fn has_omega(&self) -> bool {
        self.counts.iter().any(|count| count.is_omega())
    }

    /// Places holding an omega count for at least one token type.
    pub fn omega_places(&self) -> Vec<PlaceId> {
        let mut places: Vec<PlaceId> = self
            .iter()
            .filter(|(_, _, count)| count.is_omega())
            .map(|(place, _, _)| place)
            .collect();
        places.dedup();
        places
    }

    /// Every coordinate of `self` is at least the one of `other`.
    pub fn covers(&self, other: &Marking) -> bool {
        matches!(
            self.partial_cmp(other),
            Some(Ordering::Greater | Ordering::Equal)
        )
    }

    /// `self` covers `other` and is strictly larger somewhere.
    pub fn dominates(&self, other: &Marking) -> bool {
        matches!(self.partial_cmp(other), Some(Ordering::Greater))
    }

    pub(crate) fn set(&mut self, place: PlaceId, token: TokenId, count: TokenCount) {
        let offset = self.offset(place, token);
        self.counts[offset] = count;
    }

    pub(crate) fn coordinates_mut(&mut self) -> &mut [TokenCount] {
        &mut self.counts
    }

    fn offset(&self, place: PlaceId, token: TokenId) -> usize {
        debug_assert!(token.index() < self.token_types);
        place.index() * self.token_types + token.index()
    }
}

impl PartialOrd for Marking {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.token_types != other.token_types || self.counts.len() != other.counts.len() {
            return None;
        }
        let mut less = false;
        let mut greater = false;
        for (left, right) in self.counts.iter().zip(other.counts.iter()) {
            match left.cmp(right) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
        }
        match (less, greater) {
            (true, true) => None,
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => Some(Ordering::Equal),
        }
    }
}

impl fmt::Debug for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for place in 0..self.places() {
            list.entry(&self.row(PlaceId::from_usize(place)));
        }
        list.finish()
    }
}

impl fmt::Display for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for place in 0..self.places() {
            if place > 0 {
                write!(f, ",")?;
            }
            let row = self.row(PlaceId::from_usize(place));
            if row.len() == 1 {
                write!(f, "{}", row[0])?;
            } else {
                write!(f, "(")?;
                for (idx, count) in row.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{count}")?;
                }
                write!(f, ")")?;
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marking(counts: &[u64]) -> Marking {
        Marking::from_counts(1, counts.iter().map(|c| TokenCount::from_raw(*c)).collect())
    }

    #[test]
    fn omega_absorbs_arithmetic() {
        assert_eq!(TokenCount::Omega.add(3), TokenCount::Omega);
        assert_eq!(TokenCount::Omega.sub(3), Some(TokenCount::Omega));
        assert_eq!(TokenCount::Finite(1).sub(3), None);
        assert!(TokenCount::Omega > TokenCount::Finite(u64::MAX - 1));
        assert!(TokenCount::Omega.at_least(1_000));
    }

    #[test]
    fn dominance_is_componentwise() {
        let small = marking(&[1, 0]);
        let big = marking(&[1, 2]);
        let other = marking(&[0, 3]);
        assert!(big.dominates(&small));
        assert!(big.covers(&big));
        assert!(!big.dominates(&big));
        assert!(!other.covers(&small));
        assert!(!small.covers(&other));
    }

    #[test]
    fn totals_and_display() {
        let m = Marking::from_counts(
            2,
            vec![
                TokenCount::Finite(1),
                TokenCount::Finite(2),
                TokenCount::Finite(0),
                TokenCount::Omega,
            ],
        );
        assert_eq!(m.places(), 2);
        assert_eq!(m.total(PlaceId::new(0)), TokenCount::Finite(3));
        assert_eq!(m.total(PlaceId::new(1)), TokenCount::Omega);
        assert_eq!(m.omega_places(), vec![PlaceId::new(1)]);
        assert_eq!(m.to_string(), "((1,2),(0,ω))");
    }
}
