//! I/O 支持：JSON、RON 序列化以及按名称描述的网文档.
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use ron::ser::PrettyConfig;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::net::core::Net;
use crate::net::structure::{
    Arc, ArcDirection, Place, RateParameter, TokenType, Transition, DEFAULT_TOKEN,
};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ron error: {0}")]
    Ron(#[from] ron::Error),
    #[error("ron error: {0}")]
    RonSpanned(#[from] ron::error::SpannedError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported net file extension `{0}` (expected json or ron)")]
    UnsupportedFormat(String),
    #[error("arc refers to unknown place `{0}`")]
    UnknownPlace(String),
    #[error("arc refers to unknown transition `{0}`")]
    UnknownTransition(String),
    #[error("unknown token type `{0}`")]
    UnknownToken(String),
    #[error("duplicate name `{0}`")]
    Duplicate(String),
}

pub fn to_json_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn from_json_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(serde_json::from_str(s)?)
}

pub fn to_ron_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    let mut pretty = PrettyConfig::default();
    pretty.new_line = "\n".into();
    Ok(ron::ser::to_string_pretty(value, pretty)?)
}

pub fn from_ron_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(ron::from_str(s)?)
}

/// Human-writable description of a net, referring to elements by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetDocument {
    /// Token types besides the default one.
    #[serde(default)]
    pub tokens: Vec<String>,
    pub places: Vec<Place>,
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub rate_parameters: Vec<RateParameter>,
    #[serde(default)]
    pub arcs: Vec<Arc>,
}

impl NetDocument {
    pub fn into_net(self) -> Result<Net, IoError> {
        let mut net = Net::empty();
        for token in self.tokens {
            net.add_token(TokenType::new(token));
        }

        let mut seen = HashSet::new();
        for place in self.places {
            if !seen.insert(place.name.clone()) {
                return Err(IoError::Duplicate(place.name));
            }
            if let Some(unknown) = place.tokens.keys().find(|name| net.token_id(name).is_none()) {
                return Err(IoError::UnknownToken(unknown.clone()));
            }
            net.add_place(place);
        }
        for transition in self.transitions {
            if !seen.insert(transition.name.clone()) {
                return Err(IoError::Duplicate(transition.name));
            }
            net.add_transition(transition);
        }
        for parameter in self.rate_parameters {
            net.add_rate_parameter(parameter);
        }

        for arc in self.arcs {
            let place = net
                .place_id(&arc.place)
                .ok_or_else(|| IoError::UnknownPlace(arc.place.clone()))?;
            let transition = net
                .transition_id(&arc.transition)
                .ok_or_else(|| IoError::UnknownTransition(arc.transition.clone()))?;
            let mut weights: Vec<(String, u64)> = arc.weights.into_iter().collect();
            if weights.is_empty() {
                weights.push((DEFAULT_TOKEN.to_string(), 1));
            }
            for (token_name, weight) in weights {
                let token = net
                    .token_id(&token_name)
                    .ok_or(IoError::UnknownToken(token_name))?;
                match arc.direction {
                    ArcDirection::PlaceToTransition => {
                        net.set_input_weight(place, transition, token, weight)
                    }
                    ArcDirection::TransitionToPlace => {
                        net.set_output_weight(place, transition, token, weight)
                    }
                    ArcDirection::Inhibitor => {
                        net.set_inhibitor_weight(place, transition, token, weight)
                    }
                }
            }
        }
        Ok(net)
    }

    pub fn from_net(net: &Net) -> Self {
        let tokens = net
            .tokens
            .iter()
            .filter(|token| token.name != DEFAULT_TOKEN)
            .map(|token| token.name.clone())
            .collect();

        let mut arcs = Vec::new();
        for (transition_id, transition) in net.transitions.iter_enumerated() {
            let matrices = [
                (&net.pre, ArcDirection::PlaceToTransition),
                (&net.post, ArcDirection::TransitionToPlace),
                (&net.inhibitor, ArcDirection::Inhibitor),
            ];
            for (matrix, direction) in matrices {
                for (place_id, weight) in matrix.arcs_of(transition_id) {
                    let weights = weight
                        .iter()
                        .filter(|(_, w)| *w > 0)
                        .map(|(token, w)| (net.tokens[token].name.clone(), w))
                        .collect();
                    arcs.push(Arc {
                        place: net.places[place_id].name.clone(),
                        transition: transition.name.clone(),
                        weights,
                        direction,
                    });
                }
            }
        }

        Self {
            tokens,
            places: net.places.iter().cloned().collect(),
            transitions: net.transitions.iter().cloned().collect(),
            rate_parameters: net.rate_parameters.clone(),
            arcs,
        }
    }
}

/// Reads a net document, choosing the format from the file extension.
pub fn read_net<P: AsRef<Path>>(path: P) -> Result<Net, IoError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let document: NetDocument = match extension.as_str() {
        "json" => from_json_str(&content)?,
        "ron" => from_ron_str(&content)?,
        other => return Err(IoError::UnsupportedFormat(other.to_string())),
    };
    log::debug!(
        "loaded net document {:?}: {} places, {} transitions, {} arcs",
        path,
        document.places.len(),
        document.transitions.len(),
        document.arcs.len()
    );
    document.into_net()
}

pub fn write_net<P: AsRef<Path>>(path: P, net: &Net) -> Result<(), IoError> {
    let path = path.as_ref();
    let document = NetDocument::from_net(net);
    let content = match path.extension().and_then(|ext| ext.to_str()) {
        Some("ron") => to_ron_string(&document)?,
        _ => to_json_string(&document)?,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::structure::TransitionKind;

    const DOCUMENT: &str = r#"{
        "tokens": ["Red"],
        "places": [
            {"name": "P0", "tokens": {"Default": 1, "Red": 2}},
            {"name": "P1", "capacity": 3}
        ],
        "transitions": [
            {"name": "T0", "rate": "lambda"},
            {"name": "I0", "kind": "immediate", "priority": 2}
        ],
        "rate_parameters": [{"name": "lambda", "expression": "0.5"}],
        "arcs": [
            {"place": "P0", "transition": "T0", "weights": {"Red": 2}, "direction": "place_to_transition"},
            {"place": "P1", "transition": "T0", "direction": "transition_to_place"},
            {"place": "P1", "transition": "I0", "direction": "inhibitor"}
        ]
    }"#;

    #[test]
    fn json_document_builds_net() {
        let document: NetDocument = from_json_str(DOCUMENT).unwrap();
        let net = document.into_net().unwrap();

        assert_eq!(net.token_types_len(), 2);
        let red = net.token_id("Red").unwrap();
        let p0 = net.place_id("P0").unwrap();
        let t0 = net.transition_id("T0").unwrap();
        let i0 = net.transition_id("I0").unwrap();
        assert_eq!(net.pre.get(p0, t0).get(red), 2);
        assert_eq!(net.transitions[i0].kind, TransitionKind::Immediate);
        assert_eq!(net.transitions[i0].priority, 2);
        assert_eq!(net.places[net.place_id("P1").unwrap()].capacity, Some(3));
        assert_eq!(net.initial_marking().total(p0).finite(), Some(3));
    }

    #[test]
    fn document_round_trips_through_ron() {
        let net = from_json_str::<NetDocument>(DOCUMENT)
            .unwrap()
            .into_net()
            .unwrap();
        let ron = to_ron_string(&NetDocument::from_net(&net)).unwrap();
        let again = from_ron_str::<NetDocument>(&ron).unwrap().into_net().unwrap();
        assert_eq!(again.pre, net.pre);
        assert_eq!(again.post, net.post);
        assert_eq!(again.inhibitor, net.inhibitor);
        assert_eq!(again.initial_marking(), net.initial_marking());
    }

    #[test]
    fn unknown_references_are_rejected() {
        let mut document: NetDocument = from_json_str(DOCUMENT).unwrap();
        document.arcs.push(Arc::new("P9", "T0", 1, ArcDirection::PlaceToTransition));
        assert!(matches!(document.into_net(), Err(IoError::UnknownPlace(name)) if name == "P9"));
    }
}
