//! P/T 网静态结构元素：令牌类型、库所、迁移、速率参数与弧.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type Weight = u64;

/// Default token type name used when a net declares none.
pub const DEFAULT_TOKEN: &str = "Default";

/// Colour of a token. Every place holds a count per token type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TokenType {
    pub name: String,
}

impl TokenType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Debug)]
pub struct Place {
    pub name: String,
    /// Initial token count per token type, keyed by token name.
    #[serde(default)]
    pub tokens: BTreeMap<String, Weight>,
    /// Upper bound on the total number of tokens; `None` is unlimited.
    #[serde(default)]
    pub capacity: Option<Weight>,
}

impl Place {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tokens: BTreeMap::new(),
            capacity: None,
        }
    }

    pub fn with_tokens(mut self, token: impl Into<String>, count: Weight) -> Self {
        self.tokens.insert(token.into(), count);
        self
    }

    pub fn with_capacity(mut self, capacity: Weight) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn has_capacity_restriction(&self) -> bool {
        self.capacity.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Fires after an exponentially distributed delay.
    #[default]
    Timed,
    /// Fires in zero time; its rate expression is read as a weight.
    Immediate,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Transition {
    pub name: String,
    #[serde(default)]
    pub kind: TransitionKind,
    /// Rate (timed) or weight (immediate) expression.
    #[serde(default = "default_rate")]
    pub rate: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub infinite_server: bool,
}

fn default_rate() -> String {
    "1.0".to_string()
}

fn default_priority() -> u32 {
    1
}

impl Transition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TransitionKind::Timed,
            rate: default_rate(),
            priority: default_priority(),
            infinite_server: false,
        }
    }

    pub fn immediate(name: impl Into<String>) -> Self {
        Self {
            kind: TransitionKind::Immediate,
            ..Self::new(name)
        }
    }

    pub fn with_rate(mut self, rate: impl Into<String>) -> Self {
        self.rate = rate.into();
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_infinite_server(mut self, infinite_server: bool) -> Self {
        self.infinite_server = infinite_server;
        self
    }

    pub fn is_immediate(&self) -> bool {
        self.kind == TransitionKind::Immediate
    }

    pub fn is_timed(&self) -> bool {
        self.kind == TransitionKind::Timed
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transition")
            .field(&self.name)
            .field(&self.kind)
            .finish()
    }
}

/// Named expression transitions can refer to from their own rate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RateParameter {
    pub name: String,
    pub expression: String,
}

impl RateParameter {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArcDirection {
    PlaceToTransition,
    TransitionToPlace,
    /// Place inhibits the transition while it holds at least the weight.
    Inhibitor,
}

/// Name-based arc description, as found in net documents.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Arc {
    pub place: String,
    pub transition: String,
    /// Weight per token type; a missing map means one default token.
    #[serde(default)]
    pub weights: BTreeMap<String, Weight>,
    pub direction: ArcDirection,
}

impl Arc {
    pub fn new(
        place: impl Into<String>,
        transition: impl Into<String>,
        weight: Weight,
        direction: ArcDirection,
    ) -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(DEFAULT_TOKEN.to_string(), weight);
        Self {
            place: place.into(),
            transition: transition.into(),
            weights,
            direction,
        }
    }
}

impl fmt::Debug for Arc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arc")
            .field("place", &self.place)
            .field("transition", &self.transition)
            .field("weights", &self.weights)
            .field("direction", &self.direction)
            .finish()
    }
}
