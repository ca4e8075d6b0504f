//! Radio timer (RAT) channels
//!
//! The radio timer has three user channels, each usable either in compare mode (fire at a radio
//! timer value) or in capture mode (timestamp an external signal). The timer only runs while the
//! RF core is powered, so channels are suspended back to pending before every power-down and
//! re-armed after every power-up.
//!
//! A channel moves through `Idle -> Pending -> Running`, falls back to `Pending` while the core is
//! off and returns to `Idle` when freed.

use crate::client::Client;
use crate::constraint::{Constraint, Constraints};
use crate::error::Error;
use crate::event::EventMask;
use crate::hw::rfc::{self, DirectCmd, Doorbell};
use crate::time;

/// Number of RAT channels available to clients
pub const N_RAT_CHANNELS: usize = 3;

/// Channels available after reset
pub const DEFAULT_AVAILABLE_CHANNELS: u8 = (1 << N_RAT_CHANNELS) - 1;

const ERROR_SHIFT: usize = 4;

/// Handle of an allocated RAT channel
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RatHandle(u8);

impl RatHandle {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u8)
    }

    /// Index of the channel
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Hardware channel number
    pub const fn hw_channel(self) -> u8 {
        rfc::RAT_CH_LOWEST + self.0
    }
}

/// Callback reporting a compare or capture event, or a re-arm error
///
/// The last argument is the compare or capture value; it is 0 for [`EventMask::ERROR`].
pub type RatCallback = fn(Client, RatHandle, EventMask, u32);

/// Channel requested by a client
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RatChannelSelect {
    /// First available channel
    #[default]
    Any,
    /// Channel with the given index
    Index(usize),
}

/// Signal timestamped by a capture channel
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RatCaptureSource {
    /// RTC update signal
    RtcUpdate = 20,
    /// Generic event of the event fabric
    EventGeneric = 21,
    /// RF core GPI 0, routed from a GPIO
    #[default]
    RfcGpi0 = 22,
    /// RF core GPI 1, routed from a GPIO
    RfcGpi1 = 23,
}

/// Edge triggering a capture
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RatCaptureMode {
    /// Rising edge
    #[default]
    Rising = 0,
    /// Falling edge
    Falling = 1,
    /// Both edges
    Both = 2,
}

/// Behavior of the output connected to a channel
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RatOutputMode {
    /// One clock period pulse
    #[default]
    Pulse = 0,
    /// Set high on the event
    Set = 1,
    /// Set low on the event
    Clear = 2,
    /// Toggle on the event
    Toggle = 3,
    /// Always low
    AlwaysZero = 4,
    /// Always high
    AlwaysOne = 5,
}

/// RAT output line connected to a channel
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RatOutputSelect {
    /// RAT_GPO1
    #[default]
    Gpo1 = 1,
    /// RAT_GPO2
    Gpo2 = 2,
    /// RAT_GPO3
    Gpo3 = 3,
    /// RAT_GPO4
    Gpo4 = 4,
    /// RAT_GPO5
    Gpo5 = 5,
    /// RAT_GPO6
    Gpo6 = 6,
    /// RAT_GPO7
    Gpo7 = 7,
}

/// Compare channel configuration
#[derive(Clone, Copy, Debug, Default)]
pub struct RatConfigCompare {
    /// Called when the compare value is reached
    pub callback: Option<RatCallback>,
    /// Requested channel
    pub channel: RatChannelSelect,
    /// Radio timer value firing the channel
    pub timeout: u32,
}

/// Capture channel configuration
#[derive(Clone, Copy, Debug, Default)]
pub struct RatConfigCapture {
    /// Called on every capture
    pub callback: Option<RatCallback>,
    /// Requested channel
    pub channel: RatChannelSelect,
    /// Captured signal
    pub source: RatCaptureSource,
    /// Captured edge
    pub capture_mode: RatCaptureMode,
    /// Keep the channel armed after a capture
    pub repeat: bool,
}

/// Output driven by a channel
#[derive(Clone, Copy, Debug, Default)]
pub struct RatConfigOutput {
    /// Output behavior
    pub mode: RatOutputMode,
    /// Output line
    pub select: RatOutputSelect,
}

/// Mode of an allocated channel
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RatMode {
    /// Fires at a radio timer value
    Compare,
    /// Timestamps an external signal
    Capture,
}

/// Lifecycle state of a channel
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RatStatus {
    /// Free
    Idle,
    /// Allocated, waiting to be armed on a powered core
    Pending,
    /// Armed in the hardware
    Running,
}

/// Event of a channel, ready to be delivered outside the critical section
#[derive(Clone, Copy, Debug)]
pub(crate) struct RatEvent {
    pub client: Client,
    pub handle: RatHandle,
    pub callback: Option<RatCallback>,
    pub events: EventMask,
    pub value: u32,
    pub power_down: bool,
}

impl RatEvent {
    pub fn deliver(&self) {
        if let Some(callback) = self.callback {
            callback(self.client, self.handle, self.events, self.value);
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct RatChannel {
    client: Option<Client>,
    mode: Option<RatMode>,
    status: RatStatus,
    callback: Option<RatCallback>,
    ch_cmd: Option<DirectCmd>,
    io_cmd: Option<DirectCmd>,
}

impl RatChannel {
    const fn new() -> Self {
        Self {
            client: None,
            mode: None,
            status: RatStatus::Idle,
            callback: None,
            ch_cmd: None,
            io_cmd: None,
        }
    }

    fn repeats(&self) -> bool {
        matches!(self.ch_cmd, Some(DirectCmd::SetRatCapture { config }) if config & rfc::CAPTURE_REPEAT != 0)
    }

    fn compare_time(&self) -> Option<u32> {
        match self.ch_cmd {
            Some(DirectCmd::SetRatCompare { compare_time, .. }) => Some(compare_time),
            _ => None,
        }
    }
}

/// Table of RAT channels
#[derive(Debug)]
pub(crate) struct RatModule {
    channels: [RatChannel; N_RAT_CHANNELS],
    available: u8,
    num_active: u32,
    pending_int: u8,
}

impl RatModule {
    pub const fn new() -> Self {
        Self {
            channels: [RatChannel::new(); N_RAT_CHANNELS],
            available: DEFAULT_AVAILABLE_CHANNELS,
            num_active: 0,
            pending_int: 0,
        }
    }

    /// Allocates a compare channel
    pub fn alloc_compare(
        &mut self,
        client: Client,
        config: &RatConfigCompare,
        output: Option<&RatConfigOutput>,
    ) -> Option<RatHandle> {
        let timeout = config.timeout;
        self.alloc(
            client,
            config.channel,
            RatMode::Compare,
            config.callback,
            output,
            |channel| DirectCmd::SetRatCompare {
                channel,
                compare_time: timeout,
            },
        )
    }

    /// Allocates a capture channel
    pub fn alloc_capture(
        &mut self,
        client: Client,
        config: &RatConfigCapture,
        output: Option<&RatConfigOutput>,
    ) -> Option<RatHandle> {
        let (source, mode, repeat) = (config.source, config.capture_mode, config.repeat);
        self.alloc(
            client,
            config.channel,
            RatMode::Capture,
            config.callback,
            output,
            |channel| DirectCmd::SetRatCapture {
                config: rfc::capture_config(channel, source as u8, mode as u8, repeat),
            },
        )
    }

    fn alloc<F>(
        &mut self,
        client: Client,
        select: RatChannelSelect,
        mode: RatMode,
        callback: Option<RatCallback>,
        output: Option<&RatConfigOutput>,
        ch_cmd: F,
    ) -> Option<RatHandle>
    where
        F: FnOnce(u8) -> DirectCmd,
    {
        let index = (0..N_RAT_CHANNELS).find(|i| {
            self.available & (1 << i) != 0
                && self.channels[*i].status == RatStatus::Idle
                && match select {
                    RatChannelSelect::Any => true,
                    RatChannelSelect::Index(wanted) => wanted == *i,
                }
        })?;

        let handle = RatHandle::new(index);
        let hw_channel = handle.hw_channel();
        self.available &= !(1 << index);
        self.num_active += 1;
        self.channels[index] = RatChannel {
            client: Some(client),
            mode: Some(mode),
            status: RatStatus::Pending,
            callback,
            ch_cmd: Some(ch_cmd(hw_channel)),
            io_cmd: output.map(|output| DirectCmd::SetRatOutput {
                config: rfc::output_config(hw_channel, output.mode as u8, output.select as u8),
            }),
        };

        debug!("RAT channel {} allocated", index);
        Some(handle)
    }

    /// Returns a channel to `Idle`
    ///
    /// The hardware interrupt is disabled only while the timer runs. Returns whether a power-down
    /// should be evaluated; freeing an idle channel does nothing.
    pub fn free<D: Doorbell>(
        &mut self,
        handle: RatHandle,
        rfc: &D,
        rat_running: bool,
        constraints: &mut Constraints,
    ) -> bool {
        let index = handle.index();
        if self.channels[index].status == RatStatus::Idle {
            return false;
        }

        if rat_running {
            rfc.hw_disable(rfc::hw::rat_ch(index));
            rfc.hw_clear(rfc::hw::rat_ch(index));
        }

        self.channels[index] = RatChannel::new();
        self.available |= 1 << index;
        self.num_active = self.num_active.saturating_sub(1);

        debug!("RAT channel {} freed", index);
        constraints.release(Constraint::RatCh(index))
    }

    /// Arms a pending channel in the hardware
    pub fn arm<D: Doorbell>(
        &mut self,
        handle: RatHandle,
        rfc: &D,
        constraints: &mut Constraints,
    ) -> Result<(), Error> {
        let index = handle.index();
        let channel = &mut self.channels[index];
        if channel.status != RatStatus::Pending {
            return Err(Error::InvalidParams);
        }

        rfc.hw_clear(rfc::hw::rat_ch(index));
        rfc.hw_enable(rfc::hw::rat_ch(index));
        constraints.set(Constraint::RatCh(index));

        let ch_cmd = channel.ch_cmd.ok_or(Error::InvalidParams)?;
        let mut accepted = rfc::cmd_accepted(rfc.send_direct(ch_cmd));
        if accepted {
            if let Some(io_cmd) = channel.io_cmd {
                accepted = rfc::cmd_accepted(rfc.send_direct(io_cmd));
            }
        }

        if accepted {
            channel.status = RatStatus::Running;
            Ok(())
        } else {
            Err(Error::CmdDoneError)
        }
    }

    /// Re-arms every pending channel after a power-up
    ///
    /// A channel that cannot be armed gets an error recorded for the RAT software interrupt.
    /// Returns whether such an error was recorded.
    pub fn restart<D: Doorbell>(&mut self, rfc: &D, constraints: &mut Constraints) -> bool {
        let mut failed = false;
        for index in 0..N_RAT_CHANNELS {
            if self.channels[index].status != RatStatus::Pending {
                continue;
            }
            if self.arm(RatHandle::new(index), rfc, constraints).is_err() {
                warn!("RAT channel {} could not be re-armed", index);
                self.pending_int |= (1 | (1 << ERROR_SHIFT)) << index;
                failed = true;
            }
        }
        failed
    }

    /// Moves every allocated channel back to `Pending` ahead of a power-down
    pub fn suspend(&mut self, constraints: &mut Constraints) {
        for (index, channel) in self.channels.iter_mut().enumerate() {
            if channel.status != RatStatus::Idle {
                channel.status = RatStatus::Pending;
                let _ = constraints.release(Constraint::RatCh(index));
            }
        }
    }

    /// Time left until the core must be powered for the earliest channel
    ///
    /// Capture channels need the core now. `overhead_us` is the power-up overhead of the loaded
    /// client.
    pub fn dispatch_delay(&self, now: u32, overhead_us: u32) -> Option<u32> {
        self.channels
            .iter()
            .filter(|channel| channel.status != RatStatus::Idle)
            .filter_map(|channel| match channel.mode {
                Some(RatMode::Capture) => Some(0),
                Some(RatMode::Compare) => channel
                    .compare_time()
                    .map(|compare_time| time::delta_to_deadline(now, compare_time, overhead_us)),
                None => None,
            })
            .min()
    }

    /// Records RAT channel interrupts raised by the hardware
    ///
    /// Returns whether the RAT software interrupt has work.
    pub fn record_interrupts(&mut self, flags: u32) -> bool {
        let channels = ((flags & rfc::hw::RAT_CH_MASK) >> rfc::hw::RAT_CH_BASE_BIT) as u8;
        self.pending_int |= channels;
        channels != 0
    }

    /// Takes the recorded interrupt of the lowest channel
    ///
    /// Single captures, compares and failed channels are freed; a repeated capture stays armed.
    pub fn take_event<D: Doorbell>(
        &mut self,
        rfc: &D,
        rat_running: bool,
        constraints: &mut Constraints,
    ) -> Option<RatEvent> {
        let index = (0..N_RAT_CHANNELS).find(|i| self.pending_int & (1 << i) != 0)?;
        let error_bit = 1 << (index + ERROR_SHIFT);
        let error = self.pending_int & error_bit != 0;
        self.pending_int &= !((1 << index) | error_bit);

        let channel = self.channels[index];
        let client = channel.client?;
        if channel.status == RatStatus::Idle {
            return None;
        }

        let handle = RatHandle::new(index);
        let value = if error {
            0
        } else {
            rfc.rat_channel_value(handle.hw_channel())
        };

        let keep = channel.mode == Some(RatMode::Capture) && channel.repeats() && !error;
        let power_down = !keep && self.free(handle, rfc, rat_running, constraints);

        Some(RatEvent {
            client,
            handle,
            callback: channel.callback,
            events: if error {
                EventMask::ERROR
            } else {
                EventMask::RAT_CH
            },
            value,
            power_down,
        })
    }

    /// Whether channel interrupts wait for the RAT software interrupt
    pub fn has_pending_interrupts(&self) -> bool {
        self.pending_int != 0
    }

    /// Number of allocated channels
    pub fn num_active(&self) -> u32 {
        self.num_active
    }

    /// Mask of channels free to allocate
    pub fn available(&self) -> u8 {
        self.available
    }

    /// Overrides the mask of channels free to allocate
    pub fn set_available(&mut self, mask: u8) {
        self.available = mask & DEFAULT_AVAILABLE_CHANNELS;
    }

    /// Lifecycle state of a channel
    pub fn status(&self, handle: RatHandle) -> RatStatus {
        self.channels[handle.index()].status
    }

    /// Owner of an allocated channel
    pub fn owner(&self, handle: RatHandle) -> Option<Client> {
        let channel = self.channels.get(handle.index())?;
        match channel.status {
            RatStatus::Idle => None,
            _ => channel.client,
        }
    }
}
