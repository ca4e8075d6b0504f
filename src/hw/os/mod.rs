//! Operating system services
//!
//! The driver runs in three contexts: RF core interrupts, its own software interrupts and client
//! tasks. Only client tasks block, on one semaphore per client.

pub mod traits;

pub use traits::{Os, Swi};
