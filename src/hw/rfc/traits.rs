//! Traits used for RF core portability
//!
//! Each port of the driver to another radio platform shall implement the traits described in this
//! module. Register layouts stay on the platform side; the driver only sees interrupt flag masks,
//! command status words and operation descriptors.

use crate::client::Mode;
use crate::op::RadioOp;

#[cfg(test)]
use mockall::*;

/// Direct and immediate commands sent through the doorbell
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DirectCmd {
    /// Abort the running operations immediately
    Abort,
    /// Stop the running operations gracefully
    Stop,
    /// Read the RSSI of the ongoing reception
    GetRssi,
    /// Keep the system bus available to the RF core while the CPU sleeps
    BusRequest(bool),
    /// Arm a RAT channel in compare mode
    SetRatCompare {
        /// Hardware channel number
        channel: u8,
        /// Radio timer value firing the channel
        compare_time: u32,
    },
    /// Arm a RAT channel in capture mode, see [`capture_config`](super::capture_config)
    SetRatCapture {
        /// Encoded capture configuration
        config: u16,
    },
    /// Connect a RAT channel to an output, see [`output_config`](super::output_config)
    SetRatOutput {
        /// Encoded output configuration
        config: u16,
    },
    /// Disarm a RAT channel
    DisableRatCh {
        /// Hardware channel number
        channel: u8,
    },
    /// Immediate command given by its descriptor
    Immediate(&'static RadioOp),
    /// Raw direct command word provided by a client
    Raw(u32),
}

/// Operations submitted when the RF core boots or switches PHY
///
/// The platform links them into one chain: the client's setup, the radio timer start, then the
/// synthesizer operation.
#[derive(Clone, Copy, Debug)]
pub struct SetupChain {
    /// Radio setup of the loaded client
    pub setup: &'static RadioOp,
    /// Reconfigure the analog front-end in the setup
    pub analog_update: bool,
    /// Start the radio timer from this origin
    pub rat_start: Option<u32>,
    /// Synthesizer operation restoring the last used frequency
    pub fs: Option<&'static RadioOp>,
}

/// Doorbell and interrupt registers of the RF core
#[cfg_attr(test, automock)]
pub trait Doorbell {
    /// Submit a radio operation chain
    fn submit(&self, op: &'static RadioOp);

    /// Submit the boot or PHY switch chain
    fn submit_setup(&self, chain: &SetupChain);

    /// Start the radio timer from `rat0`, followed by the synthesizer operation if any
    ///
    /// Used when the setup was submitted before the crystal oscillator settled.
    fn submit_rat_start(&self, rat0: u32, fs: Option<&'static RadioOp>);

    /// Send a direct or immediate command and return the command status word
    fn send_direct(&self, cmd: DirectCmd) -> u32;

    /// Read and clear the given CPE interrupt flags
    fn cpe_get_and_clear(&self, mask: u32) -> u32;

    /// Enable CPE interrupt sources
    fn cpe_enable(&self, mask: u32);

    /// Disable CPE interrupt sources
    fn cpe_disable(&self, mask: u32);

    /// Clear CPE interrupt flags
    fn cpe_clear(&self, mask: u32);

    /// Read and clear the given hardware interrupt flags
    fn hw_get_and_clear(&self, mask: u32) -> u32;

    /// Currently enabled hardware interrupt sources
    fn hw_enabled(&self) -> u32;

    /// Enable hardware interrupt sources
    fn hw_enable(&self, mask: u32);

    /// Disable hardware interrupt sources
    fn hw_disable(&self, mask: u32);

    /// Clear hardware interrupt flags
    fn hw_clear(&self, mask: u32);

    /// Current radio timer value; meaningful only while the core is powered
    fn rat_now(&self) -> u32;

    /// Compare or capture value of a RAT channel
    fn rat_channel_value(&self, channel: u8) -> u32;
}

/// Power constraints held on the platform power manager
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerConstraint {
    /// Keep the flash powered while the core boots
    NeedFlash,
    /// Prevent the system from entering standby
    DisallowStandby,
    /// Keep the RF core power domain on
    RfCoreDomain,
    /// Keep the high frequency crystal oscillator running
    XoscHf,
    /// Switch to the high frequency crystal oscillator on request rather than automatically
    SwitchXoscHfManually,
}

/// Power, clock and patch control of the RF core
#[cfg_attr(test, automock)]
pub trait CorePower {
    /// Bit mask of RF modes the silicon supports, indexed by the mode selector
    fn supported_modes(&self) -> u32;

    /// Select the RF mode before powering the core
    fn select_mode(&self, rf_mode: u8);

    /// Enable the RF core clocks
    fn clock_enable(&self);

    /// Disable the RF core clocks
    fn clock_disable(&self);

    /// Enable or disable the clocks of the modem and RF engine RAMs
    fn ram_clocks(&self, enable: bool);

    /// Undo the command and packet engine patch of the previous PHY
    fn reset_cpe_patch(&self);

    /// Whether the radio timer counts
    fn rat_running(&self) -> bool;

    /// Stop the radio timer synchronized with the RTC and return the new radio timer origin
    fn rat_sync_stop(&self) -> u32;

    /// Shut down the synthesizer before powering off
    fn synth_off(&self);

    /// Whether the high frequency crystal oscillator drives the system clock
    fn xosc_hf_ready(&self) -> bool;

    /// Switch the system clock to the high frequency crystal oscillator
    fn switch_xosc_hf(&self);

    /// Identifier of the low frequency clock source
    fn lf_clock_source(&self) -> u8;

    /// Hold a power constraint
    fn set_constraint(&self, constraint: PowerConstraint);

    /// Release a power constraint
    fn release_constraint(&self, constraint: PowerConstraint);
}

/// Applies the patches of `mode` to a freshly booted core or while switching PHY
///
/// The command and packet engine patch is only loaded at boot; on a PHY switch the previous one
/// is reset instead.
pub fn apply_patches<P: CorePower>(power: &P, mode: &Mode, switching: bool) {
    if switching {
        if mode.has_ram_patches() {
            power.ram_clocks(true);
        }
        if mode.cpe_patch.is_some() {
            power.reset_cpe_patch();
        }
    } else if let Some(patch) = mode.cpe_patch {
        patch();
    }

    if let Some(patch) = mode.mce_patch {
        patch();
    }
    if let Some(patch) = mode.rfe_patch {
        patch();
    }
    if mode.has_ram_patches() {
        power.ram_clocks(false);
    }
}
