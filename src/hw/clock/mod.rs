//! Portable time services
//!
//! The driver needs the always running RTC to reason about time while the RF core is powered off,
//! and a handful of one-shot timers to come back later: to power up ahead of a deadline, to power
//! down after a period of inactivity and to end a request access window.

pub mod traits;

pub use traits::{Clocks, TimerId};
