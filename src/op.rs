//! Radio operation descriptors
//!
//! A radio operation is handed to the RF core as an opaque descriptor. The driver only reads the
//! common header: command number, status, start trigger, start time, chaining condition and the
//! next operation. Protocol specific parameters travel in the opaque payload.

use core::sync::atomic::{AtomicU16, Ordering};

/// Upper bound of operations walked in a chain, protecting against closed loops
pub const MAX_CHAIN_LEN: usize = 8;

/// Command numbers the driver recognizes
pub mod command {
    /// Radio setup for the generic PHY
    pub const RADIO_SETUP: u16 = 0x0802;
    /// Frequency synthesizer programming
    pub const FS: u16 = 0x0803;
    /// Frequency synthesizer shutdown
    pub const FS_OFF: u16 = 0x0804;
    /// Stops the radio timer and reports its value
    pub const SYNC_STOP_RAT: u16 = 0x0809;
    /// Starts the radio timer from a given origin
    pub const SYNC_START_RAT: u16 = 0x080A;
    /// BLE5 radio setup
    pub const BLE5_RADIO_SETUP: u16 = 0x1820;
    /// Proprietary radio setup
    pub const PROP_RADIO_SETUP: u16 = 0x3806;
    /// Proprietary radio setup, divider based
    pub const PROP_RADIO_DIV_SETUP: u16 = 0x3807;
    /// First IEEE 802.15.4 foreground command
    pub const IEEE_TX: u16 = 0x2C01;
    /// IEEE 802.15.4 CSMA-CA
    pub const IEEE_CSMA: u16 = 0x2C02;
    /// IEEE 802.15.4 ACK reception
    pub const IEEE_RX_ACK: u16 = 0x2C03;
    /// IEEE 802.15.4 background receive
    pub const IEEE_RX: u16 = 0x2801;

    pub(crate) const IEEE_FG_MASK: u16 = 0xFC00;
    pub(crate) const IEEE_FG_GROUP: u16 = 0x2C00;
}

/// Status values written by the RF core into the operation header
pub mod status {
    /// Not yet submitted
    pub const IDLE: u16 = 0x0000;
    /// Submitted, waiting for its start trigger
    pub const PENDING: u16 = 0x0001;
    /// Running
    pub const ACTIVE: u16 = 0x0002;
    /// Finished normally
    pub const DONE_OK: u16 = 0x0400;
    /// The synthesizer failed to calibrate
    pub const ERROR_SYNTH_PROG: u16 = 0x0809;
}

/// Event starting a radio operation
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trigger {
    /// Starts as soon as submitted
    Now,
    /// Never starts on its own
    Never,
    /// Starts at the radio timer value in the start time field
    AbsTime,
    /// Starts relative to submission
    RelSubmit,
    /// Starts relative to the start of this operation
    RelStart,
    /// Starts relative to the start of the previous operation
    RelPrevStart,
    /// Starts relative to the start of the first operation of the chain
    RelFirstStart,
    /// Starts relative to the end of the previous operation
    RelPrevEnd,
    /// Starts on an external event
    External,
}

/// Rule deciding whether the next operation of a chain runs
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Condition {
    /// Always run the next operation
    Always,
    /// Never run the next operation
    Never,
    /// Run it only if this operation succeeded
    StopOnFalse,
    /// Run it only if this operation failed
    StopOnTrue,
}

/// Header of a radio operation plus its opaque parameters
///
/// Operations are `'static` because the RF core reads them after submission and writes their
/// status while they run.
///
/// # Example
///
/// ```
/// use rf_multimode::op::{command, RadioOp, Trigger};
///
/// static FS: RadioOp = RadioOp::new(command::FS);
/// static TX: RadioOp = RadioOp::new(0x1801)
///     .with_start(Trigger::AbsTime, 4_000_000)
///     .with_next(&FS);
///
/// assert!(TX.has_abs_start());
/// assert_eq!(TX.first_fs().map(|op| op.command_no()), Some(command::FS));
/// ```
#[derive(Debug)]
pub struct RadioOp {
    command_no: u16,
    status: AtomicU16,
    start_trigger: Trigger,
    start_time: u32,
    condition: Condition,
    next: Option<&'static RadioOp>,
    payload: &'static [u8],
}

impl RadioOp {
    /// Creates an operation starting now, not chained to anything
    pub const fn new(command_no: u16) -> Self {
        Self {
            command_no,
            status: AtomicU16::new(status::IDLE),
            start_trigger: Trigger::Now,
            start_time: 0,
            condition: Condition::Never,
            next: None,
            payload: &[],
        }
    }

    /// Sets the start trigger and the start time used by [`Trigger::AbsTime`]
    pub const fn with_start(mut self, trigger: Trigger, start_time: u32) -> Self {
        self.start_trigger = trigger;
        self.start_time = start_time;
        self
    }

    /// Chains `next` after this operation, to be run unconditionally
    pub const fn with_next(mut self, next: &'static RadioOp) -> Self {
        self.next = Some(next);
        self.condition = Condition::Always;
        self
    }

    /// Overrides the chaining condition
    pub const fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    /// Attaches the protocol specific parameters
    pub const fn with_payload(mut self, payload: &'static [u8]) -> Self {
        self.payload = payload;
        self
    }

    /// Command number
    pub const fn command_no(&self) -> u16 {
        self.command_no
    }

    /// Status as last written by the RF core
    pub fn status(&self) -> u16 {
        self.status.load(Ordering::Acquire)
    }

    /// Overwrites the status; used by the RF core interface
    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::Release);
    }

    /// Start trigger
    pub const fn start_trigger(&self) -> Trigger {
        self.start_trigger
    }

    /// Start time in radio timer ticks, meaningful for [`Trigger::AbsTime`]
    pub const fn start_time(&self) -> u32 {
        self.start_time
    }

    /// Chaining condition
    pub const fn condition(&self) -> Condition {
        self.condition
    }

    /// Next operation of the chain
    pub const fn next(&self) -> Option<&'static RadioOp> {
        self.next
    }

    /// Opaque protocol parameters
    pub const fn payload(&self) -> &'static [u8] {
        self.payload
    }

    /// Whether the operation starts at an absolute radio timer value
    pub fn has_abs_start(&self) -> bool {
        self.start_trigger == Trigger::AbsTime
    }

    /// Whether this is one of the known radio setup commands
    pub const fn is_setup(&self) -> bool {
        matches!(
            self.command_no,
            command::RADIO_SETUP
                | command::BLE5_RADIO_SETUP
                | command::PROP_RADIO_SETUP
                | command::PROP_RADIO_DIV_SETUP
        )
    }

    /// Whether this programs or shuts down the frequency synthesizer
    pub const fn is_fs(&self) -> bool {
        matches!(self.command_no, command::FS | command::FS_OFF)
    }

    /// Whether this is an IEEE 802.15.4 foreground command
    pub const fn is_ieee_foreground(&self) -> bool {
        (self.command_no & command::IEEE_FG_MASK) == command::IEEE_FG_GROUP
    }

    /// Iterates over this operation and the ones chained after it
    ///
    /// At most [`MAX_CHAIN_LEN`] + 1 operations are visited.
    pub fn chain(&'static self) -> impl Iterator<Item = &'static RadioOp> {
        core::iter::successors(Some(self), |op| op.next).take(MAX_CHAIN_LEN + 1)
    }

    /// Last operation of the chain
    pub fn end_of_chain(&'static self) -> &'static RadioOp {
        self.chain().last().unwrap_or(self)
    }

    /// First synthesizer operation of the chain
    pub fn first_fs(&'static self) -> Option<&'static RadioOp> {
        self.chain().take(MAX_CHAIN_LEN).find(|op| op.is_fs())
    }
}

// Operations are identified by their address, the RF core writes their status in place
impl PartialEq for RadioOp {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self, other)
    }
}

impl Eq for RadioOp {}
