//! Critical sections protecting driver state shared between task, SWI and radio IRQ contexts

// TODO: Implement own mutex abstraction instead of relying on cortex_m blocking IRQs
//       It should block only the RF core IRQs and the driver SWIs

/// Proof that the caller runs with the radio interrupts masked
pub struct CriticalSection<'a> {
    _internal_cs: &'a cortex_m::interrupt::CriticalSection,
}

impl<'a> CriticalSection<'a> {
    fn new(internal_cs: &'a cortex_m::interrupt::CriticalSection) -> Self {
        Self {
            _internal_cs: internal_cs,
        }
    }
}

/// Runs `f` with interrupts disabled
///
/// Sections are expected to be short and must never block.
pub fn locked<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    #[cfg(not(test))]
    return cortex_m::interrupt::free(|cs| f(&CriticalSection::new(cs)));

    // Host unit tests have no interrupts to mask and `cortex_m::interrupt::free` panics off-target
    #[cfg(test)]
    {
        // SAFETY: host tests run without interrupt handlers that could preempt the section
        let cs = unsafe { cortex_m::interrupt::CriticalSection::new() };
        f(&CriticalSection::new(&cs))
    }
}
