/// Errors reported by the radio driver
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The command pool or the RAT channel table has no free entry
    AllocError,
    /// No timing gap fits the command and delaying it was not allowed
    ScheduleError,
    /// Unknown handle, foreign client or unsupported option value
    InvalidParams,
    /// The requested change is not allowed while the radio has work or a reservation
    Busy,
    /// The radio core is not powered
    RadioInactive,
    /// The radio core rejected a direct or immediate command
    CmdDoneError,
    /// The cancelled command already finished
    CmdEnded,
    /// All client slots are taken
    NoClientSlot,
    /// The radio core does not support the requested RF mode
    UnsupportedMode,
}
