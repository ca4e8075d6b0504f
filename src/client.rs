//! Client configuration and per-client driver state

use crate::cmd::CmdHandle;
use crate::event::{ClientEvent, EventMask};
use crate::op::RadioOp;

/// Maximum number of clients sharing the radio
pub const N_MAX_CLIENTS: usize = 2;

/// Inactivity timeout value keeping the radio powered until the client yields
pub const WAIT_FOREVER: u32 = u32::MAX;

/// Power-up duration assumed until one is measured
pub const DEFAULT_POWER_UP_US: u32 = 2500;
/// Lower bound of a measured power-up duration
pub const MIN_POWER_UP_US: u32 = 300;
/// Default safety margin added to the power-up duration
pub const DEFAULT_POWER_UP_MARGIN_US: u32 = 314;
/// Default safety margin added to the PHY switching duration
pub const DEFAULT_PHY_SWITCHING_MARGIN_US: u32 = 314;
/// PHY switching duration assumed until one is measured
pub const DEFAULT_PHY_SWITCHING_US: u32 = 500;
/// Extra power-up time when the analog front-end must be reconfigured
pub const ANALOG_CFG_TIME_US: u32 = 96;

/// Handle of an open client
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Client(u8);

impl Client {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u8)
    }

    /// Index of the client slot
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Callback notified once the radio is powered up for the client
pub type PowerCallback = fn(Client, EventMask);

/// Callback notified about asynchronous radio errors
pub type ErrorCallback = fn(Client, ErrorCode, EventMask);

/// Callback notified about [`ClientEvent`]s the client subscribed to
pub type ClientCallback = fn(Client, ClientEvent);

/// Asynchronous errors reported through the [`ErrorCallback`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorCode {
    /// The synthesizer could not be programmed while restoring the client's frequency
    CmdFsSynthProg,
}

/// RF mode of a client, with the optional firmware patches the mode needs
#[derive(Clone, Copy, Debug)]
pub struct Mode {
    /// RF mode selector written to the power controller
    pub rf_mode: u8,
    /// Command and packet engine patch
    pub cpe_patch: Option<fn()>,
    /// Modem patch
    pub mce_patch: Option<fn()>,
    /// RF engine patch
    pub rfe_patch: Option<fn()>,
}

impl Mode {
    /// Mode without patches
    pub const fn new(rf_mode: u8) -> Self {
        Self {
            rf_mode,
            cpe_patch: None,
            mce_patch: None,
            rfe_patch: None,
        }
    }

    pub(crate) fn has_ram_patches(&self) -> bool {
        self.mce_patch.is_some() || self.rfe_patch.is_some()
    }
}

/// Parameters of [`RfDriver::open`](crate::driver::RfDriver::open)
#[derive(Clone, Copy, Debug)]
pub struct Params {
    /// Time of inactivity before the radio may power down; [`WAIT_FOREVER`] waits for a yield
    pub inactivity_timeout_us: u32,
    /// Fixed power-up duration; 0 lets the driver measure it
    pub power_up_duration_us: u32,
    /// Margin added to the power-up duration
    pub power_up_margin_us: u32,
    /// Margin added to the PHY switching duration
    pub phy_switching_margin_us: u32,
    /// Called when the radio is powered up for this client
    pub power_callback: Option<PowerCallback>,
    /// Called on asynchronous errors
    pub error_callback: Option<ErrorCallback>,
    /// Called on subscribed client events
    pub client_event_callback: Option<ClientCallback>,
    /// Subscribed client events, see [`ClientEvent::bit`]
    pub client_event_mask: u32,
    /// Free form client identifier
    pub id: u32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            inactivity_timeout_us: WAIT_FOREVER,
            power_up_duration_us: 0,
            power_up_margin_us: DEFAULT_POWER_UP_MARGIN_US,
            phy_switching_margin_us: DEFAULT_PHY_SWITCHING_MARGIN_US,
            power_callback: None,
            error_callback: None,
            client_event_callback: None,
            client_event_mask: 0,
            id: 0,
        }
    }
}

/// Timing estimates of one client, used to plan wake-ups and PHY switches
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
    /// Power-up duration for chains not starting with a synthesizer command
    pub power_up_us: u32,
    /// Power-up duration for chains starting with a synthesizer command
    pub power_up_fs_us: u32,
    /// Margin added to power-up durations
    pub power_up_margin_us: u32,
    /// Time needed to switch the radio to this client's PHY
    pub phy_switching_us: u32,
    /// Margin added to the PHY switching duration
    pub phy_switching_margin_us: u32,
}

impl Timing {
    fn new(params: &Params) -> Self {
        let power_up_us = if params.power_up_duration_us != 0 {
            params.power_up_duration_us
        } else {
            DEFAULT_POWER_UP_US
        };
        Self {
            power_up_us,
            power_up_fs_us: power_up_us,
            power_up_margin_us: params.power_up_margin_us,
            phy_switching_us: DEFAULT_PHY_SWITCHING_US,
            phy_switching_margin_us: params.phy_switching_margin_us,
        }
    }

    /// Power-up overhead of `op`, including the RAT restore compensation
    pub fn power_up_overhead_us(&self, op: Option<&RadioOp>, rat_compensation_us: u32) -> u32 {
        let duration = match op {
            Some(op) if op.is_fs() => self.power_up_fs_us,
            _ => self.power_up_us,
        };
        duration
            .saturating_add(self.power_up_margin_us)
            .saturating_add(rat_compensation_us)
    }

    /// PHY switching overhead including its margin
    pub fn phy_switching_overhead_us(&self) -> u32 {
        self.phy_switching_us
            .saturating_add(self.phy_switching_margin_us)
    }

    /// Folds a new power-up measurement into the estimate
    ///
    /// A shorter measurement is averaged with the previous estimate, and the result is clamped
    /// to the plausible range.
    pub(crate) fn updated_power_up(previous_us: u32, measured_us: u32) -> u32 {
        let measured_us = if previous_us > measured_us {
            (previous_us + measured_us) / 2
        } else {
            measured_us
        };
        measured_us.clamp(MIN_POWER_UP_US, DEFAULT_POWER_UP_US)
    }
}

/// Blocking wait of a client on events of one of its commands
#[derive(Clone, Copy, Debug)]
pub(crate) struct SyncWait {
    pub handle: CmdHandle,
    pub mask: EventMask,
}

/// Driver side state of an open client
pub(crate) struct ClientState {
    pub mode: &'static Mode,
    pub setup: &'static RadioOp,
    pub timing: Timing,
    pub measure_power_up: bool,
    pub update_setup: bool,
    pub inactivity_timeout_us: u32,
    pub power_callback: Option<PowerCallback>,
    pub error_callback: Option<ErrorCallback>,
    pub client_callback: Option<ClientCallback>,
    pub client_event_mask: u32,
    pub id: u32,
    pub cached_fs: Option<&'static RadioOp>,
    pub yielded: bool,
    pub sync: Option<SyncWait>,
    pub unpend_cause: EventMask,
}

impl ClientState {
    pub fn new(mode: &'static Mode, setup: &'static RadioOp, params: &Params) -> Self {
        Self {
            mode,
            setup,
            timing: Timing::new(params),
            measure_power_up: params.power_up_duration_us == 0,
            update_setup: true,
            inactivity_timeout_us: params.inactivity_timeout_us,
            power_callback: params.power_callback,
            error_callback: params.error_callback,
            client_callback: params.client_event_callback,
            client_event_mask: params.client_event_mask,
            id: params.id,
            cached_fs: None,
            yielded: false,
            sync: None,
            unpend_cause: EventMask::NONE,
        }
    }

    /// Client callback, if the client subscribed to `event`
    pub fn subscribed(&self, event: ClientEvent) -> Option<ClientCallback> {
        if self.client_event_mask & event.bit() != 0 {
            self.client_callback
        } else {
            None
        }
    }
}
