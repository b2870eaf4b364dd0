//! State machine trait for lifecycle enums.

use super::ValidationError;

/// Trait for status enums whose values move along a fixed edge set.
///
/// Implementors list their outbound edges; `transition_to` then refuses
/// anything outside that set.
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if moving from self to target is an allowed edge.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from the current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs the transition, returning an error for a disallowed edge.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if the current state has no outbound edges.
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Delivery {
        Received,
        Admitted,
        Settled,
    }

    impl StateMachine for Delivery {
        fn can_transition_to(&self, target: &Self) -> bool {
            self.valid_transitions().contains(target)
        }

        fn valid_transitions(&self) -> Vec<Self> {
            match self {
                Delivery::Received => vec![Delivery::Admitted],
                Delivery::Admitted => vec![Delivery::Settled, Delivery::Received],
                Delivery::Settled => vec![],
            }
        }
    }

    #[test]
    fn allowed_edge_returns_target() {
        assert_eq!(
            Delivery::Received.transition_to(Delivery::Admitted),
            Ok(Delivery::Admitted)
        );
    }

    #[test]
    fn disallowed_edge_names_both_states() {
        let err = Delivery::Received
            .transition_to(Delivery::Settled)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Received"));
        assert!(msg.contains("Settled"));
    }

    #[test]
    fn state_without_edges_is_terminal() {
        assert!(Delivery::Settled.is_terminal());
        assert!(!Delivery::Admitted.is_terminal());
    }
}
