//! Reasons keeping the RF core powered
//!
//! The core may power down only once the command queue constraint is released. RAT channel
//! constraints and the explicit power management lock are checked by the power-down step itself.

use crate::rat::N_RAT_CHANNELS;

/// A single reason to keep the core powered
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Constraint {
    /// The RAT channel with the given index is armed
    RatCh(usize),
    /// Commands are queued or running
    CmdQ,
    /// Automatic power management is disabled by a client
    Disallow,
}

impl Constraint {
    const fn bit(self) -> u8 {
        match self {
            Constraint::RatCh(index) if index < N_RAT_CHANNELS => 1 << index,
            Constraint::RatCh(_) => 0,
            Constraint::CmdQ => 1 << 3,
            Constraint::Disallow => 1 << 7,
        }
    }
}

/// Set of held constraints
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Constraints(u8);

impl Constraints {
    /// No constraint held
    pub const fn new() -> Self {
        Self(0)
    }

    /// Holds `constraint`
    pub fn set(&mut self, constraint: Constraint) {
        self.0 |= constraint.bit();
    }

    /// Releases `constraint`
    ///
    /// Returns whether a power-down should be evaluated, which is the case whenever the command
    /// queue constraint is not held.
    #[must_use]
    pub fn release(&mut self, constraint: Constraint) -> bool {
        self.0 &= !constraint.bit();
        !self.contains(Constraint::CmdQ)
    }

    /// Whether `constraint` is held
    pub fn contains(&self, constraint: Constraint) -> bool {
        self.0 & constraint.bit() != 0
    }

    /// Whether nothing is held
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}
