//! 输入、输出与抑制弧关系的按库所行存储的邻接矩阵.
//!
//! 每个元素是一条弧在各令牌类型上的权重向量，缺省(全零)即无弧.
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::net::ids::{PlaceId, TokenId, TransitionId};
use crate::net::index_vec::{Idx, IndexVec};
use crate::net::structure::Weight;

type SmallRow<T> = SmallVec<[T; 4]>;

/// Per-token-type weights carried by a single arc.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArcWeight(SmallVec<[Weight; 2]>);

impl ArcWeight {
    pub fn zero(tokens: usize) -> Self {
        Self(SmallVec::from_elem(0, tokens))
    }

    pub fn from_weights(weights: impl IntoIterator<Item = Weight>) -> Self {
        Self(weights.into_iter().collect())
    }

    pub fn get(&self, token: TokenId) -> Weight {
        self.0.get(token.index()).copied().unwrap_or(0)
    }

    pub fn set(&mut self, token: TokenId, weight: Weight) {
        if self.0.len() <= token.index() {
            self.0.resize(token.index() + 1, 0);
        }
        self.0[token.index()] = weight;
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    pub fn total(&self) -> Weight {
        self.0.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TokenId, Weight)> + '_ {
        self.0
            .iter()
            .enumerate()
            .map(|(idx, weight)| (TokenId::from_usize(idx), *weight))
    }
}

impl fmt::Debug for ArcWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incidence<T> {
    rows: IndexVec<PlaceId, SmallRow<T>>,
    cols: usize,
}

impl<T> Incidence<T>
where
    T: Clone,
{
    pub fn new(places: usize, transitions: usize, default: T) -> Self {
        let mut rows = IndexVec::new();
        for _ in 0..places {
            rows.push(SmallRow::from_elem(default.clone(), transitions));
        }
        Self {
            rows,
            cols: transitions,
        }
    }

    pub fn places(&self) -> usize {
        self.rows.len()
    }

    pub fn transitions(&self) -> usize {
        self.cols
    }

    pub fn push_place_with_default(&mut self, default: T) -> PlaceId {
        let mut row = SmallRow::new();
        row.resize(self.cols, default);
        self.rows.push(row)
    }

    pub fn push_transition_with_default(&mut self, default: T) -> TransitionId {
        let next = self.cols;
        for row in self.rows.iter_mut() {
            row.push(default.clone());
        }
        self.cols += 1;
        TransitionId::from_usize(next)
    }

    pub fn get(&self, place: PlaceId, transition: TransitionId) -> &T {
        &self.rows[place][transition.index()]
    }

    pub fn get_mut(&mut self, place: PlaceId, transition: TransitionId) -> &mut T {
        &mut self.rows[place][transition.index()]
    }

    pub fn set(&mut self, place: PlaceId, transition: TransitionId, value: T) {
        self.rows[place][transition.index()] = value;
    }

    /// Entries of one transition column, in place order.
    pub fn column(&self, transition: TransitionId) -> impl Iterator<Item = (PlaceId, &T)> + '_ {
        self.rows
            .iter_enumerated()
            .map(move |(place, row)| (place, &row[transition.index()]))
    }
}

impl Incidence<ArcWeight> {
    pub fn empty() -> Self {
        Self::new(0, 0, ArcWeight::default())
    }

    /// Places connected to `transition` by a non-zero arc.
    pub fn arcs_of(
        &self,
        transition: TransitionId,
    ) -> impl Iterator<Item = (PlaceId, &ArcWeight)> + '_ {
        self.column(transition).filter(|(_, weight)| !weight.is_zero())
    }
}

impl<T> fmt::Debug for Incidence<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Incidence")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushing_transitions_extends_every_row() {
        let mut matrix = Incidence::empty();
        let p0 = matrix.push_place_with_default(ArcWeight::zero(1));
        let p1 = matrix.push_place_with_default(ArcWeight::zero(1));
        let t0 = matrix.push_transition_with_default(ArcWeight::zero(1));
        matrix.set(p1, t0, ArcWeight::from_weights([2]));

        assert_eq!(matrix.places(), 2);
        assert_eq!(matrix.transitions(), 1);
        assert!(matrix.get(p0, t0).is_zero());
        let arcs: Vec<_> = matrix.arcs_of(t0).map(|(p, w)| (p, w.total())).collect();
        assert_eq!(arcs, vec![(p1, 2)]);
    }

    #[test]
    fn arc_weight_grows_to_fit_token() {
        let mut weight = ArcWeight::zero(1);
        weight.set(TokenId::new(2), 3);
        assert_eq!(weight.get(TokenId::new(2)), 3);
        assert_eq!(weight.get(TokenId::new(1)), 0);
        assert_eq!(weight.total(), 3);
    }
}
