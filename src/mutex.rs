//! Mutex guarding the driver state touched from task, SWI and RF core IRQ contexts.
//!
//! Access requires the [`CriticalSection`] token handed out by [`crit_sect::locked`].

use crate::crit_sect::{self, CriticalSection};
use core::cell::{Ref, RefCell, RefMut};

/// Wraps a variable shared with the radio interrupts
pub struct Mutex<T>(RefCell<T>);

impl<T> Mutex<T> {
    /// Creates new wrapper for a variable shared with the radio interrupts
    ///
    /// # Example
    ///
    /// ```
    /// use rf_multimode::mutex::Mutex;
    ///
    /// static PENDING_EVENTS: Mutex<u32> = Mutex::new(0);
    /// ```
    pub const fn new(value: T) -> Mutex<T> {
        Self(RefCell::new(value))
    }

    /// Borrows the wrapped variable for reading
    ///
    /// # Example
    ///
    /// ```no_run
    /// # #[macro_use] extern crate rf_multimode;
    /// # missing_test_fns!();
    /// # fn main() {
    /// use rf_multimode::crit_sect;
    /// use rf_multimode::mutex::Mutex;
    ///
    /// static RAT_CHANNELS_MASK: Mutex<u8> = Mutex::new(0x7);
    ///
    /// crit_sect::locked(|cs| {
    ///   assert_eq!(*RAT_CHANNELS_MASK.borrow(cs), 0x7);
    /// });
    /// # }
    /// ```
    pub fn borrow<'cs>(&'cs self, _cs: &'cs CriticalSection) -> Ref<'cs, T> {
        self.0.borrow()
    }

    /// Mutably borrows the wrapped variable
    pub fn borrow_mut<'cs>(&'cs self, _cs: &'cs CriticalSection) -> RefMut<'cs, T> {
        self.0.borrow_mut()
    }

    /// Enters a critical section and runs `f` on the wrapped variable
    ///
    /// # Example
    ///
    /// ```no_run
    /// # #[macro_use] extern crate rf_multimode;
    /// # missing_test_fns!();
    /// # fn main() {
    /// use rf_multimode::mutex::Mutex;
    ///
    /// static SEQ_POSTED: Mutex<u16> = Mutex::new(0);
    ///
    /// let seq = SEQ_POSTED.locked(|seq| {
    ///   *seq += 1;
    ///   *seq
    /// });
    /// assert_eq!(seq, 1);
    /// # }
    /// ```
    pub fn locked<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        crit_sect::locked(|cs| f(&mut self.borrow_mut(cs)))
    }
}

// Safety: Mutex is Sync assuming the contained type is Send and the CriticalSection module
// prevents concurrent access from multiple contexts. The RefCell verifies it at run-time.
unsafe impl<T> Sync for Mutex<T> where T: Send {}
