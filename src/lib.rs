#![cfg_attr(not(any(test, doctest)), no_std)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::missing_doc_code_examples)]

//! Multi-mode RF driver sharing one RF core between several radio protocols.
//!
//! Clients open the driver with their own PHY and submit radio operations. The driver keeps one
//! queue for all of them, powers the RF core up in time for the next operation, switches the PHY
//! when the owner of the next operation changes and powers the core down when it is no longer
//! needed. Radio timer channels are shared the same way.
//!
//! The hardware and operating system services are provided by a port implementing the traits of
//! [`hw`]. Start with [`RfDriver`](driver::RfDriver).

#[macro_use]
mod log;

// lazy_mut crate is used in driver tests sharing a driver with a blocking semaphore hook
#[cfg(test)]
#[macro_use]
extern crate lazy_mut;

pub mod client;
pub mod cmd;
pub mod constraint;
pub mod crit_sect;
pub mod dispatch;
pub mod driver;
pub mod event;
pub mod hw;
pub mod mutex;
pub mod op;
pub mod rat;
pub mod sched;
pub mod time;
pub mod utils;

/// Defines errors reported by this crate
pub mod error;

/// Macro used to build tests on a host
///
/// It is used for unit tests and doctest targets
#[doc(hidden)]
#[macro_export]
macro_rules! missing_test_fns {
    () => {
        #[no_mangle]
        pub extern "C" fn __primask_r() -> u32 {
            0
        }

        #[no_mangle]
        pub extern "C" fn __cpsie() {}

        #[no_mangle]
        pub extern "C" fn __cpsid() {}
    };
}

#[cfg(test)]
missing_test_fns!();
