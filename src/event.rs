//! Command, client and global events
//!
//! Command events are a 64-bit mask: the low word mirrors the RF core CPE interrupt flags, the
//! high word mirrors the RF hardware interrupt flags plus driver-synthesized events (cancel,
//! abort, RAT). [`EventMask::from_hw`] and [`EventMask::cpe_flags`]/[`EventMask::hw_flags`] are
//! the only places where raw interrupt registers meet event masks.

use core::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// Set of command events
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventMask(u64);

impl EventMask {
    /// No events
    pub const NONE: Self = Self(0);
    /// A radio operation finished
    pub const CMD_DONE: Self = Self(1 << 0);
    /// The last radio operation of a chain finished
    pub const LAST_CMD_DONE: Self = Self(1 << 1);
    /// A foreground radio operation finished
    pub const FG_CMD_DONE: Self = Self(1 << 2);
    /// The last foreground radio operation of a chain finished
    pub const LAST_FG_CMD_DONE: Self = Self(1 << 3);
    /// Packet transmitted
    pub const TX_DONE: Self = Self(1 << 4);
    /// ACK packet transmitted
    pub const TX_ACK: Self = Self(1 << 5);
    /// Control packet transmitted
    pub const TX_CTRL: Self = Self(1 << 6);
    /// Acknowledgement received on a transmitted control packet
    pub const TX_CTRL_ACK: Self = Self(1 << 7);
    /// Acknowledgement received on a transmitted control packet, and acknowledgement transmitted
    pub const TX_CTRL_ACK_ACK: Self = Self(1 << 8);
    /// Packet retransmitted
    pub const TX_RETRANS: Self = Self(1 << 9);
    /// TX queue data entry state changed to finished
    pub const TX_ENTRY_DONE: Self = Self(1 << 10);
    /// A buffer change is complete
    pub const TX_BUFFER_CHANGE: Self = Self(1 << 11);
    /// The PA configuration changed
    pub const PA_CHANGED: Self = Self(1 << 14);
    /// Sample buffer entry finished
    pub const SAMPLES_ENTRY_DONE: Self = Self(1 << 15);
    /// Packet received with CRC OK
    pub const RX_OK: Self = Self(1 << 16);
    /// Packet received with CRC error
    pub const RX_NOK: Self = Self(1 << 17);
    /// Packet received and ignored
    pub const RX_IGNORED: Self = Self(1 << 18);
    /// Empty packet received
    pub const RX_EMPTY: Self = Self(1 << 19);
    /// Control packet received
    pub const RX_CTRL: Self = Self(1 << 20);
    /// Control packet received and acknowledged
    pub const RX_CTRL_ACK: Self = Self(1 << 21);
    /// Packet received that did not fit in the RX queue
    pub const RX_BUF_FULL: Self = Self(1 << 22);
    /// RX queue data entry finished
    pub const RX_ENTRY_DONE: Self = Self(1 << 23);
    /// Data written to a partial read RX buffer
    pub const DATA_WRITTEN: Self = Self(1 << 24);
    /// Specified number of bytes written to a partial read RX buffer
    pub const N_DATA_WRITTEN: Self = Self(1 << 25);
    /// Packet reception stopped before the packet was done
    pub const RX_ABORTED: Self = Self(1 << 26);
    /// A collision was indicated during packet reception
    pub const RX_COLLISION_DETECTED: Self = Self(1 << 27);
    /// Protected RF core modules were unlocked
    pub const MODULES_UNLOCKED: Self = Self(1 << 29);
    /// The RF core reported an internal error
    pub const INTERNAL_ERROR: Self = Self(1 << 31);
    /// Synchronization word detected (modem soft interrupt)
    pub const MDM_SOFT: Self = Self(0x0000_0020_0000_0000);
    /// The command was pre-empted by another client
    pub const PREEMPTED: Self = Self(0x0100_0000_0000_0000);
    /// A RAT channel reported an error
    pub const ERROR: Self = Self(0x0200_0000_0000_0000);
    /// The radio powered up
    pub const POWER_UP: Self = Self(0x0400_0000_0000_0000);
    /// A RAT channel compare or capture event
    pub const RAT_CH: Self = Self(0x0800_0000_0000_0000);
    /// The command was cancelled before it started
    pub const CANCELLED: Self = Self(0x1000_0000_0000_0000);
    /// The command was aborted
    pub const ABORTED: Self = Self(0x2000_0000_0000_0000);
    /// The command was stopped gracefully
    pub const STOPPED: Self = Self(0x4000_0000_0000_0000);

    /// Events after which a command is no longer executed
    pub const TERMINATION: Self = Self(
        Self::LAST_CMD_DONE.0
            | Self::LAST_FG_CMD_DONE.0
            | Self::ABORTED.0
            | Self::STOPPED.0
            | Self::CANCELLED.0,
    );

    /// Events delivered in a separate, final callback when present
    pub const ABORT_CLASS: Self =
        Self(Self::CANCELLED.0 | Self::ABORTED.0 | Self::STOPPED.0 | Self::PREEMPTED.0);

    /// Completion events held back from the interim callback of an aborted command
    pub const COMPLETION: Self = Self(
        Self::CMD_DONE.0 | Self::LAST_CMD_DONE.0 | Self::FG_CMD_DONE.0 | Self::LAST_FG_CMD_DONE.0,
    );

    /// Flags used by the driver itself, never enabled as interrupts on behalf of a client
    pub const INTERNAL: Self = Self(0xFFFF_FFDF_6000_1000);

    /// Creates a mask from raw bits
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits of the mask
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Combines CPE and RF hardware interrupt flags into one mask
    pub const fn from_hw(cpe_flags: u32, hw_flags: u32) -> Self {
        Self((cpe_flags as u64) | ((hw_flags as u64) << 32))
    }

    /// CPE interrupt flags of this mask
    pub const fn cpe_flags(self) -> u32 {
        self.0 as u32
    }

    /// RF hardware interrupt flags of this mask
    pub const fn hw_flags(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Whether no event is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether any event of `other` is set
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether all events of `other` are set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Mask without the events of `other`
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Mask with the events of `other` added
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for EventMask {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Not for EventMask {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

/// A single event kind, for code that reasons about one event at a time
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// See [`EventMask::CMD_DONE`]
    CmdDone,
    /// See [`EventMask::LAST_CMD_DONE`]
    LastCmdDone,
    /// See [`EventMask::FG_CMD_DONE`]
    FgCmdDone,
    /// See [`EventMask::LAST_FG_CMD_DONE`]
    LastFgCmdDone,
    /// See [`EventMask::MDM_SOFT`]
    MdmSoft,
    /// See [`EventMask::PREEMPTED`]
    Preempted,
    /// See [`EventMask::ERROR`]
    Error,
    /// See [`EventMask::POWER_UP`]
    PowerUp,
    /// See [`EventMask::RAT_CH`]
    RatCh,
    /// See [`EventMask::CANCELLED`]
    Cancelled,
    /// See [`EventMask::ABORTED`]
    Aborted,
    /// See [`EventMask::STOPPED`]
    Stopped,
}

impl Event {
    /// Mask holding only this event
    pub const fn mask(self) -> EventMask {
        match self {
            Event::CmdDone => EventMask::CMD_DONE,
            Event::LastCmdDone => EventMask::LAST_CMD_DONE,
            Event::FgCmdDone => EventMask::FG_CMD_DONE,
            Event::LastFgCmdDone => EventMask::LAST_FG_CMD_DONE,
            Event::MdmSoft => EventMask::MDM_SOFT,
            Event::Preempted => EventMask::PREEMPTED,
            Event::Error => EventMask::ERROR,
            Event::PowerUp => EventMask::POWER_UP,
            Event::RatCh => EventMask::RAT_CH,
            Event::Cancelled => EventMask::CANCELLED,
            Event::Aborted => EventMask::ABORTED,
            Event::Stopped => EventMask::STOPPED,
        }
    }
}

impl From<Event> for EventMask {
    fn from(event: Event) -> Self {
        event.mask()
    }
}

/// Events reported to a client through its client event callback
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientEvent {
    /// The radio finished powering up
    PowerUpFinished,
    /// The conditions that blocked the client's access to the radio are gone
    RadioFree,
    /// The radio is about to be configured for this client
    SwitchClientEntered,
}

impl ClientEvent {
    /// Subscription bit of this event in [`Params::client_event_mask`](crate::client::Params)
    pub const fn bit(self) -> u32 {
        match self {
            ClientEvent::PowerUpFinished => 1 << 0,
            ClientEvent::RadioFree => 1 << 1,
            ClientEvent::SwitchClientEntered => 1 << 2,
        }
    }
}

/// Board level events reported through the global callback
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GlobalEvent {
    /// A setup command is about to be submitted
    RadioSetup,
    /// The radio core was powered down
    RadioPowerDown,
    /// The first client opened the driver
    Init,
    /// A radio operation is about to be submitted
    CmdStart,
    /// A radio operation finished
    CmdStop,
    /// A client forwarded a coexistence control request
    CoexControl,
}

impl GlobalEvent {
    /// Subscription bit of this event in [`HwAttrs::global_event_mask`](crate::driver::HwAttrs)
    pub const fn bit(self) -> u32 {
        match self {
            GlobalEvent::RadioSetup => 1 << 0,
            GlobalEvent::RadioPowerDown => 1 << 1,
            GlobalEvent::Init => 1 << 2,
            GlobalEvent::CmdStart => 1 << 3,
            GlobalEvent::CmdStop => 1 << 4,
            GlobalEvent::CoexControl => 1 << 5,
        }
    }
}
