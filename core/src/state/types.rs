//! Operating-state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Operating state of the remote device.
///
/// The five states are totally ordered; the order is carried by each value
/// (see [`State::order`]) and drives the transition rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    #[default]
    Off,
    Standby,
    Calibrate,
    Ready,
    Active,
}

impl State {
    /// All states, lowest order first.
    pub const ALL: [State; 5] = [
        State::Off,
        State::Standby,
        State::Calibrate,
        State::Ready,
        State::Active,
    ];

    /// Position in the total order (`OFF` = 0 .. `ACTIVE` = 4).
    pub const fn order(self) -> u8 {
        match self {
            State::Off => 0,
            State::Standby => 1,
            State::Calibrate => 2,
            State::Ready => 3,
            State::Active => 4,
        }
    }

    pub fn from_order(order: u8) -> Result<Self, UnknownState> {
        match order {
            0 => Ok(State::Off),
            1 => Ok(State::Standby),
            2 => Ok(State::Calibrate),
            3 => Ok(State::Ready),
            4 => Ok(State::Active),
            other => Err(UnknownState(other.to_string())),
        }
    }

    /// Wire name, e.g. `"CALIBRATE"`.
    pub const fn as_str(self) -> &'static str {
        match self {
            State::Off => "OFF",
            State::Standby => "STANDBY",
            State::Calibrate => "CALIBRATE",
            State::Ready => "READY",
            State::Active => "ACTIVE",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state name or order value outside the five known states.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid state: {0}")]
pub struct UnknownState(pub String);

impl FromStr for State {
    type Err = UnknownState;

    /// Parses the exact upper-case wire name; anything else fails closed.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        State::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

/// A committed state plus the time it was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub state: State,
    pub changed_at: DateTime<Utc>,
}

impl StateSnapshot {
    pub fn new(state: State) -> Self {
        Self {
            state,
            changed_at: Utc::now(),
        }
    }
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self::new(State::Off)
    }
}
