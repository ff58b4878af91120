use crate::net::Net;
use crate::state::{Classification, ClassifiedState, Marking};

/// Decides whether a marking is tangible or vanishing.
///
/// A marking is vanishing as soon as one immediate transition is enabled in
/// it; timed transitions never make a marking vanishing.
#[derive(Debug, Clone, Copy)]
pub struct StateClassifier<'n> {
    net: &'n Net,
}

impl<'n> StateClassifier<'n> {
    pub fn new(net: &'n Net) -> Self {
        Self { net }
    }

    pub fn classification(&self, marking: &Marking) -> Classification {
        let vanishing = self
            .net
            .structurally_enabled(marking)
            .any(|transition| self.net.transitions[transition].is_immediate());
        if vanishing {
            Classification::Vanishing
        } else {
            Classification::Tangible
        }
    }

    pub fn classify(&self, marking: Marking) -> ClassifiedState {
        let classification = self.classification(&marking);
        ClassifiedState::new(marking, classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::structure::{Place, Transition, DEFAULT_TOKEN};

    #[test]
    fn immediate_transition_makes_marking_vanishing() {
        let mut net = Net::empty();
        let p = net.add_place(Place::new("P").with_tokens(DEFAULT_TOKEN, 1));
        let timed = net.add_transition(Transition::new("T"));
        let immediate = net.add_transition(Transition::immediate("I"));
        net.add_input_arc(p, timed, 1);
        net.add_input_arc(p, immediate, 2);

        let classifier = StateClassifier::new(&net);
        let initial = net.initial_marking();
        assert_eq!(classifier.classification(&initial), Classification::Tangible);

        let state = classifier.classify(Marking::from_counts(1, vec![2.into()]));
        assert!(state.is_vanishing());
    }
}
