//! Traits required from the operating system

use crate::client::Client;

#[cfg(test)]
use mockall::*;

/// Software interrupts owned by the driver
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Swi {
    /// Runs [`RfDriver::run_fsm`](crate::driver::RfDriver::run_fsm)
    Fsm,
    /// Runs [`RfDriver::run_rat`](crate::driver::RfDriver::run_rat)
    Rat,
}

/// Interrupt and synchronization services
#[cfg_attr(test, automock)]
pub trait Os {
    /// Request `swi` to run; requests made before it runs are merged
    fn post_swi(&self, swi: Swi);

    /// Set the CPE interrupt pending so that the dispatcher runs at interrupt priority
    fn pend_cpe_interrupt(&self);

    /// Block the calling task until [`sem_post`](Os::sem_post) is called for `client`
    fn sem_pend(&self, client: Client);

    /// Release a task blocked in [`sem_pend`](Os::sem_pend)
    fn sem_post(&self, client: Client);

    /// Priority of the RF core interrupts
    fn set_hwi_priority(&self, priority: u32);

    /// Priority of the driver software interrupts
    fn set_swi_priority(&self, priority: u32);
}
