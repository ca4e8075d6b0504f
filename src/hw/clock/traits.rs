//! Traits required from the platform time services

use crate::client::Client;

#[cfg(test)]
use mockall::*;

/// One-shot timers used by the driver
///
/// The platform reports an expired timer through
/// [`RfDriver::on_timer`](crate::driver::RfDriver::on_timer).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerId {
    /// Wakes the core up ahead of the next command or RAT event
    PowerUp,
    /// Releases the command queue after a period without work
    Inactivity,
    /// Ends the request access window of a client
    RequestAccess(Client),
}

/// Real-time clock and one-shot timers
#[cfg_attr(test, automock)]
pub trait Clocks {
    /// Free running RTC in seconds, 32.32 fixed point
    fn rtc_now(&self) -> u64;

    /// Start or restart `timer` to expire after `timeout_us`
    fn start(&self, timer: TimerId, timeout_us: u32);

    /// Stop `timer`; stopping an idle timer has no effect
    fn stop(&self, timer: TimerId);

    /// Whether `timer` runs
    fn is_active(&self, timer: TimerId) -> bool;

    /// Microseconds left until `timer` expires, 0 when idle
    fn remaining_us(&self, timer: TimerId) -> u32;
}
