//! RF core abstraction
//!
//! The RF core runs radio operations submitted through a doorbell. It reports progress through
//! two interrupt lines: the command and packet engine (CPE) flags and the RF hardware flags. This
//! module holds the flag layout shared with every platform and the encodings of the RAT channel
//! commands.

pub mod traits;

pub use traits::{apply_patches, CorePower, DirectCmd, Doorbell, PowerConstraint, SetupChain};

/// CPE flags
pub mod cpe {
    /// The last operation of a chain finished
    pub const LAST_CMD_DONE: u32 = 1 << 1;
    /// The last foreground operation of a chain finished
    pub const LAST_FG_CMD_DONE: u32 = 1 << 3;
    /// The PA configuration changed
    pub const PA_CHANGED: u32 = 1 << 14;
    /// The core finished booting
    pub const BOOT_DONE: u32 = 1 << 30;
    /// Every flag
    pub const ALL: u32 = u32::MAX;
}

/// RF hardware flags
pub mod hw {
    /// Modem soft interrupt
    pub const MDM_SOFT: u32 = 1 << 5;
    /// Flag of the first RAT channel available to clients
    pub const RAT_CH_BASE_BIT: u32 = 17;
    /// Flags of all RAT channels available to clients
    pub const RAT_CH_MASK: u32 = 0x7 << RAT_CH_BASE_BIT;
    /// Every flag
    pub const ALL: u32 = u32::MAX;

    /// Flag of the RAT channel with `index`
    pub const fn rat_ch(index: usize) -> u32 {
        1 << (RAT_CH_BASE_BIT as usize + index)
    }
}

/// Command status of an accepted direct or immediate command
pub const CMDSTA_DONE: u32 = 0x01;

/// Hardware number of the first RAT channel available to clients
pub const RAT_CH_LOWEST: u8 = 5;

/// Capture configuration bit keeping the channel armed after a capture
pub const CAPTURE_REPEAT: u16 = 1 << 12;

/// Whether a command status word reports an accepted command
pub const fn cmd_accepted(cmdsta: u32) -> bool {
    cmdsta & 0xFF == CMDSTA_DONE
}

/// Encodes the configuration of a capture channel
pub const fn capture_config(channel: u8, source: u8, mode: u8, repeat: bool) -> u16 {
    let mut config = ((source as u16) & 0x1F) << 3;
    config |= ((channel as u16) & 0xF) << 8;
    if repeat {
        config |= CAPTURE_REPEAT;
    }
    config | (((mode as u16) & 0x3) << 13)
}

/// Encodes the output configuration of a RAT channel
pub const fn output_config(channel: u8, mode: u8, select: u8) -> u16 {
    (((select as u16) & 0x7) << 2) | (((mode as u16) & 0x7) << 5) | (((channel as u16) & 0xF) << 8)
}
