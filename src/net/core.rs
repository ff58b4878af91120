//! 运行时: 可发生集、发生语义与使能度定义.
use std::fmt;

use thiserror::Error;

use crate::net::ids::{PlaceId, TokenId, TransitionId};
use crate::net::incidence::{ArcWeight, Incidence};
use crate::net::index_vec::{Idx, IndexVec};
use crate::net::structure::{
    Place, RateParameter, TokenType, Transition, Weight, DEFAULT_TOKEN,
};
use crate::state::{Marking, TokenCount};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FireError {
    #[error("transition {0:?} is out of bounds")]
    OutOfBounds(TransitionId),
    #[error("transition {0:?} is not enabled under the supplied marking")]
    NotEnabled(TransitionId),
}

#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct Net {
    pub tokens: IndexVec<TokenId, TokenType>,
    pub places: IndexVec<PlaceId, Place>,
    pub transitions: IndexVec<TransitionId, Transition>,
    pub rate_parameters: Vec<RateParameter>,
    pub pre: Incidence<ArcWeight>,
    pub post: Incidence<ArcWeight>,
    pub inhibitor: Incidence<ArcWeight>,
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("tokens", &self.tokens)
            .field("places", &self.places)
            .field("transitions", &self.transitions)
            .field("pre", &self.pre)
            .field("post", &self.post)
            .field("inhibitor", &self.inhibitor)
            .finish()
    }
}

impl Net {
    /// A net without places or transitions, with the default token type.
    pub fn empty() -> Self {
        let mut net = Self {
            tokens: IndexVec::new(),
            places: IndexVec::new(),
            transitions: IndexVec::new(),
            rate_parameters: Vec::new(),
            pre: Incidence::empty(),
            post: Incidence::empty(),
            inhibitor: Incidence::empty(),
        };
        net.add_token(TokenType::new(DEFAULT_TOKEN));
        net
    }

    pub fn add_token(&mut self, token: TokenType) -> TokenId {
        if let Some(existing) = self.token_id(&token.name) {
            return existing;
        }
        self.tokens.push(token)
    }

    pub fn add_place(&mut self, place: Place) -> PlaceId {
        let zero = ArcWeight::zero(self.tokens.len());
        let place_id = self.places.push(place);
        self.pre.push_place_with_default(zero.clone());
        self.post.push_place_with_default(zero.clone());
        self.inhibitor.push_place_with_default(zero);
        place_id
    }

    pub fn add_transition(&mut self, transition: Transition) -> TransitionId {
        let zero = ArcWeight::zero(self.tokens.len());
        let transition_id = self.transitions.push(transition);
        self.pre.push_transition_with_default(zero.clone());
        self.post.push_transition_with_default(zero.clone());
        self.inhibitor.push_transition_with_default(zero);
        transition_id
    }

    pub fn add_rate_parameter(&mut self, parameter: RateParameter) {
        self.rate_parameters.push(parameter);
    }

    pub fn set_input_weight(
        &mut self,
        place: PlaceId,
        transition: TransitionId,
        token: TokenId,
        weight: Weight,
    ) {
        self.pre.get_mut(place, transition).set(token, weight);
    }

    pub fn set_output_weight(
        &mut self,
        place: PlaceId,
        transition: TransitionId,
        token: TokenId,
        weight: Weight,
    ) {
        self.post.get_mut(place, transition).set(token, weight);
    }

    pub fn set_inhibitor_weight(
        &mut self,
        place: PlaceId,
        transition: TransitionId,
        token: TokenId,
        weight: Weight,
    ) {
        self.inhibitor.get_mut(place, transition).set(token, weight);
    }

    /// 输入弧: place -> transition, 默认令牌类型
    pub fn add_input_arc(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        self.set_input_weight(place, transition, TokenId::new(0), weight);
    }

    /// 输出弧: transition -> place, 默认令牌类型
    pub fn add_output_arc(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        self.set_output_weight(place, transition, TokenId::new(0), weight);
    }

    /// 抑制弧: place -o transition, 默认令牌类型
    pub fn add_inhibitor_arc(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        self.set_inhibitor_weight(place, transition, TokenId::new(0), weight);
    }

    pub fn token_id(&self, name: &str) -> Option<TokenId> {
        self.tokens
            .iter_enumerated()
            .find(|(_, token)| token.name == name)
            .map(|(id, _)| id)
    }

    pub fn place_id(&self, name: &str) -> Option<PlaceId> {
        self.places
            .iter_enumerated()
            .find(|(_, place)| place.name == name)
            .map(|(id, _)| id)
    }

    pub fn transition_id(&self, name: &str) -> Option<TransitionId> {
        self.transitions
            .iter_enumerated()
            .find(|(_, transition)| transition.name == name)
            .map(|(id, _)| id)
    }

    pub fn places_len(&self) -> usize {
        self.places.len()
    }

    pub fn transitions_len(&self) -> usize {
        self.transitions.len()
    }

    pub fn token_types_len(&self) -> usize {
        self.tokens.len()
    }

    pub fn has_immediate_transitions(&self) -> bool {
        self.transitions.iter().any(Transition::is_immediate)
    }

    /// First place with a capacity restriction, if any.
    pub fn capacity_restricted_place(&self) -> Option<PlaceId> {
        self.places
            .iter_enumerated()
            .find(|(_, place)| place.has_capacity_restriction())
            .map(|(id, _)| id)
    }

    pub fn initial_marking(&self) -> Marking {
        let mut marking = Marking::zero(self.places_len(), self.token_types_len());
        for (place_id, place) in self.places.iter_enumerated() {
            for (token_id, token) in self.tokens.iter_enumerated() {
                if let Some(count) = place.tokens.get(&token.name) {
                    marking.set(place_id, token_id, TokenCount::Finite(*count));
                }
            }
        }
        marking
    }

    /// Transitions whose arcs and capacities allow firing, ignoring
    /// immediate-over-timed precedence and priorities.
    pub fn structurally_enabled<'a>(
        &'a self,
        marking: &'a Marking,
    ) -> impl Iterator<Item = TransitionId> + 'a {
        self.transitions
            .indices()
            .filter(move |transition| self.is_structurally_enabled(*transition, marking))
    }

    /// Enabled transitions in ascending id order.
    ///
    /// Immediate transitions take precedence over timed ones, and only the
    /// highest priority among the remaining candidates may fire.
    pub fn enabled_transitions(&self, marking: &Marking) -> Vec<TransitionId> {
        let candidates: Vec<TransitionId> = self.structurally_enabled(marking).collect();
        let any_immediate = candidates
            .iter()
            .any(|transition| self.transitions[*transition].is_immediate());
        let candidates: Vec<TransitionId> = candidates
            .into_iter()
            .filter(|transition| !any_immediate || self.transitions[*transition].is_immediate())
            .collect();
        let Some(top) = candidates
            .iter()
            .map(|transition| self.transitions[*transition].priority)
            .max()
        else {
            return Vec::new();
        };
        candidates
            .into_iter()
            .filter(|transition| self.transitions[*transition].priority == top)
            .collect()
    }

    pub fn is_enabled(&self, marking: &Marking, transition: TransitionId) -> bool {
        self.enabled_transitions(marking).contains(&transition)
    }

    pub fn fire_transition(
        &self,
        marking: &Marking,
        transition: TransitionId,
    ) -> Result<Marking, FireError> {
        if transition.index() >= self.transitions_len() {
            return Err(FireError::OutOfBounds(transition));
        }
        if !self.is_enabled(marking, transition) {
            return Err(FireError::NotEnabled(transition));
        }

        let mut next = marking.clone();
        for (place, weight) in self.pre.arcs_of(transition) {
            for (token, w) in weight.iter() {
                let before = next.tokens(place, token);
                let after = before.sub(w).ok_or(FireError::NotEnabled(transition))?;
                next.set(place, token, after);
            }
        }
        for (place, weight) in self.post.arcs_of(transition) {
            for (token, w) in weight.iter() {
                let after = next.tokens(place, token).add(w);
                next.set(place, token, after);
            }
        }
        Ok(next)
    }

    /// How many times `transition` could fire concurrently with itself.
    /// `None` when no finite input arc bounds it.
    pub fn enabling_degree(&self, marking: &Marking, transition: TransitionId) -> Option<u64> {
        let mut degree: Option<u64> = None;
        for (place, weight) in self.pre.arcs_of(transition) {
            for (token, w) in weight.iter() {
                if w == 0 {
                    continue;
                }
                if let TokenCount::Finite(n) = marking.tokens(place, token) {
                    let here = n / w;
                    degree = Some(degree.map_or(here, |d| d.min(here)));
                }
            }
        }
        degree
    }

    fn is_structurally_enabled(&self, transition: TransitionId, marking: &Marking) -> bool {
        for (place, weight) in self.pre.arcs_of(transition) {
            if weight
                .iter()
                .any(|(token, w)| !marking.tokens(place, token).at_least(w))
            {
                return false;
            }
        }
        for (place, weight) in self.inhibitor.arcs_of(transition) {
            if weight
                .iter()
                .any(|(token, w)| w > 0 && marking.tokens(place, token).at_least(w))
            {
                return false;
            }
        }
        self.respects_capacities(transition, marking)
    }

    fn respects_capacities(&self, transition: TransitionId, marking: &Marking) -> bool {
        for (place, output) in self.post.arcs_of(transition) {
            let Some(capacity) = self.places[place].capacity else {
                continue;
            };
            let TokenCount::Finite(current) = marking.total(place) else {
                continue;
            };
            let consumed = self.pre.get(place, transition).total();
            let after = current.saturating_sub(consumed).saturating_add(output.total());
            if after > capacity {
                return false;
            }
        }
        true
    }
}

impl Default for Net {
    fn default() -> Self {
        Self::empty()
    }
}
