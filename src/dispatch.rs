//! Dispatch decisions for the head of the pending queue
//!
//! The dispatcher decides whether the next pending command may start now, has to wait for its
//! start time, or conflicts with running commands. Conflicts due now are resolved by an
//! [`ExecutionPolicy`].

use crate::cmd::{CmdSlot, Command};
use crate::sched::QueueView;
use crate::time;

/// Power-up compensation per active RAT channel, covering its re-arming
pub const RAT_COMPENSATION_US: u32 = 25;

/// Resolution of a conflict between running and pending commands
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExecuteAction {
    /// Let the queue drain naturally
    #[default]
    None,
    /// Abort the running background command in favor of the pending one
    AbortOngoing,
    /// Cancel the pending command
    RejectIncoming,
}

/// Decides how a pending command due now is treated
pub trait ExecutionPolicy {
    /// Action for the pending command
    ///
    /// `conflict` tells whether the command cannot start next to the running ones, in which case
    /// `conflict_cmd` is the first pending command with an absolute start time.
    fn execute(
        &self,
        view: &QueueView,
        conflict: bool,
        conflict_cmd: Option<&Command>,
    ) -> ExecuteAction;
}

/// Policy never interfering with the queue order
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultExecutionPolicy;

impl ExecutionPolicy for DefaultExecutionPolicy {
    fn execute(&self, _view: &QueueView, _conflict: bool, _cmd: Option<&Command>) -> ExecuteAction {
        ExecuteAction::None
    }
}

/// Whether the head of the pending queue may start next to the running commands
///
/// Nothing may run, or the head must be a foreground command of the client whose background
/// command runs while no foreground command does.
pub fn can_start_now(view: &QueueView) -> bool {
    let Some(head) = view.pending_head() else {
        return false;
    };

    match (view.background(), view.foreground()) {
        (None, None) => true,
        (Some(bg), None) => bg.client() == head.client() && head.is_foreground(),
        _ => false,
    }
}

/// Command the dispatch timing is measured against, with the delay in microseconds
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DispatchTime {
    /// Reference command
    pub slot: CmdSlot,
    /// Time left until the core must start preparing for the command, 0 when due now
    pub delay_us: u32,
}

/// Time left until the next pending command must be prepared
///
/// Without a conflict the head of the pending queue is the reference and the overhead is the
/// owner's power-up time. With a conflict the first command with an absolute start is the
/// reference and the overhead is the owner's PHY switching time. Commands without an absolute
/// start are due now.
pub fn cmd_dispatch_time(
    view: &QueueView,
    conflict: bool,
    now: u32,
    active_rat_channels: u32,
) -> Option<DispatchTime> {
    let slot = if conflict {
        view.pending().find(|slot| view.get(*slot).has_abs_start())?
    } else {
        view.pending().next()?
    };

    let cmd = view.get(slot);
    let delay_us = match cmd.client().and_then(|client| view.timing(client)) {
        Some(timing) if cmd.has_abs_start() => {
            let overhead = if conflict {
                timing.phy_switching_overhead_us()
            } else {
                timing.power_up_overhead_us(
                    cmd.op(),
                    RAT_COMPENSATION_US.saturating_mul(active_rat_channels),
                )
            };
            time::delta_to_deadline(now, cmd.schedule().start_time, overhead)
        }
        _ => 0,
    };

    Some(DispatchTime { slot, delay_us })
}

/// Earlier of two optional delays
pub fn earliest(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
