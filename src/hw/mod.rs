//! Hardware and operating system services the driver runs on
//!
//! A port provides one type implementing every trait of the submodules. The driver is generic
//! over that type, see [`Platform`].

pub mod clock;
pub mod os;
pub mod rfc;

#[cfg(test)]
pub(crate) mod fake;

/// Everything the driver needs from its platform
pub trait Platform: rfc::Doorbell + rfc::CorePower + clock::Clocks + os::Os {}

impl<T> Platform for T where T: rfc::Doorbell + rfc::CorePower + clock::Clocks + os::Os {}
