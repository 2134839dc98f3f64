//! Transition rules and validation

use super::types::State;
use thiserror::Error;

/// Operator requested a transition the rules do not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid transition from {from} to {to}")]
pub struct InvalidTransitionError {
    pub from: State,
    pub to: State,
}

/// Stateless transition rules.
///
/// An operator may always step down to any lower state, or step up by exactly
/// one, except that `CALIBRATE -> READY` is never operator-reachable: READY is
/// entered from CALIBRATE only when calibration completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateMachine;

impl StateMachine {
    pub fn is_valid_transition(current: State, next: State) -> bool {
        if current == State::Calibrate && next == State::Ready {
            return false;
        }
        Self::is_ordered_step(current, next)
    }

    /// Ordering rule without the calibration gate: any step down, or exactly
    /// one step up. Self-transitions are never a step.
    pub fn is_ordered_step(current: State, next: State) -> bool {
        let (from, to) = (current.order(), next.order());
        to < from || to == from + 1
    }

    pub fn apply(current: State, next: State) -> Result<State, InvalidTransitionError> {
        if Self::is_valid_transition(current, next) {
            Ok(next)
        } else {
            Err(InvalidTransitionError {
                from: current,
                to: next,
            })
        }
    }

    /// Targets an operator may request from `current`, lowest order first.
    pub fn available_transitions(current: State) -> Vec<State> {
        State::ALL
            .into_iter()
            .filter(|next| Self::is_valid_transition(current, *next))
            .collect()
    }
}
