//! # Operating state
//!
//! The five ordered operating states and the pure rules deciding which
//! operator-requested transitions are legal.
//!
//! Nothing in here holds mutable state; the current state of a session lives
//! in [`crate::controller::Controller`].

pub mod transitions;
pub mod types;

pub use transitions::{InvalidTransitionError, StateMachine};
pub use types::{State, StateSnapshot, UnknownState};
