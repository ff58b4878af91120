//! Explored states: markings and their tangible/vanishing classification.

pub mod classifier;
pub mod marking;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use classifier::StateClassifier;
pub use marking::{Marking, TokenCount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    /// No immediate transition is enabled; time passes in this state.
    Tangible,
    /// At least one immediate transition is enabled; zero sojourn time.
    Vanishing,
}

/// A marking together with its cached classification.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassifiedState {
    pub marking: Marking,
    pub classification: Classification,
}

impl ClassifiedState {
    pub fn new(marking: Marking, classification: Classification) -> Self {
        Self {
            marking,
            classification,
        }
    }

    pub fn tangible(marking: Marking) -> Self {
        Self::new(marking, Classification::Tangible)
    }

    pub fn vanishing(marking: Marking) -> Self {
        Self::new(marking, Classification::Vanishing)
    }

    pub fn is_tangible(&self) -> bool {
        self.classification == Classification::Tangible
    }

    pub fn is_vanishing(&self) -> bool {
        self.classification == Classification::Vanishing
    }
}

impl fmt::Debug for ClassifiedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.classification {
            Classification::Tangible => "T",
            Classification::Vanishing => "V",
        };
        write!(f, "{tag}{}", self.marking)
    }
}
