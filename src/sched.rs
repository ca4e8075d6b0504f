//! Admission of new commands into the pending queue
//!
//! A scheduled command is placed at the head of the pending queue, between two queued commands,
//! or at the tail. A placement is accepted only if the timing gaps on both sides leave room for
//! the PHY switch between clients. The decision is taken by a [`SubmitPolicy`];
//! [`DefaultSubmitPolicy`] implements the gap fitting described in [`how_to_schedule`].

use crate::client::{Client, Timing, N_MAX_CLIENTS};
use crate::cmd::{CmdQueue, CmdSlot, Command, Priority};
use crate::time;

/// Interpretation of [`ScheduleParams::start_time`]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartType {
    /// Taken from the operation's start trigger
    #[default]
    NotSpecified,
    /// Absolute radio timer value
    Abs,
}

/// Interpretation of [`ScheduleParams::end_time`]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EndType {
    /// The command has no known end
    #[default]
    NotSpecified,
    /// Absolute radio timer value
    Abs,
    /// Radio timer value derived by the client from the start time
    Rel,
}

/// Timing constraints of a scheduled command
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScheduleParams {
    /// Start time in radio timer ticks
    pub start_time: u32,
    /// Meaning of `start_time`
    pub start_type: StartType,
    /// End time in radio timer ticks
    pub end_time: u32,
    /// Meaning of `end_time`
    pub end_type: EndType,
    /// Append to the tail when no gap fits instead of rejecting the command
    pub allow_delay: bool,
    /// Expected duration in radio timer ticks
    pub duration: u32,
    /// Free form value passed through to custom policies
    pub activity_info: u32,
    /// Priority of the command
    pub priority: Priority,
}

impl ScheduleParams {
    /// Parameters of a command with no timing constraints that may be delayed
    pub const fn new() -> Self {
        Self {
            start_time: 0,
            start_type: StartType::NotSpecified,
            end_time: 0,
            end_type: EndType::NotSpecified,
            allow_delay: true,
            duration: 0,
            activity_info: 0,
            priority: Priority::Normal,
        }
    }

    /// Whether the end of the command is known
    pub fn has_end(&self) -> bool {
        self.end_type != EndType::NotSpecified
    }
}

impl Default for ScheduleParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a new command enters the pending queue
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Placement {
    /// Before every pending command
    Top,
    /// Directly after the given pending command
    After(CmdSlot),
    /// After every pending command
    Tail,
}

/// Read-only snapshot of the command queues handed to policies
pub struct QueueView<'a> {
    queue: &'a CmdQueue,
    timing: [Option<Timing>; N_MAX_CLIENTS],
}

impl<'a> QueueView<'a> {
    pub(crate) fn new(queue: &'a CmdQueue, timing: [Option<Timing>; N_MAX_CLIENTS]) -> Self {
        Self { queue, timing }
    }

    /// Command stored in `slot`
    pub fn get(&self, slot: CmdSlot) -> &'a Command {
        self.queue.pool.get(slot)
    }

    /// Running background command
    pub fn background(&self) -> Option<&'a Command> {
        self.queue.bg.map(|slot| self.get(slot))
    }

    /// Running foreground command
    pub fn foreground(&self) -> Option<&'a Command> {
        self.queue.fg.map(|slot| self.get(slot))
    }

    /// Slots of the pending commands in dispatch order
    pub fn pending(&self) -> impl Iterator<Item = CmdSlot> + 'a {
        self.queue.pending.iter()
    }

    /// Slots of the finished commands awaiting delivery
    pub fn done(&self) -> impl Iterator<Item = CmdSlot> + 'a {
        self.queue.done.iter()
    }

    /// First pending command
    pub fn pending_head(&self) -> Option<&'a Command> {
        self.queue.pending.head().map(|slot| self.get(slot))
    }

    /// Pending command following `slot`
    pub fn pending_after(&self, slot: CmdSlot) -> Option<CmdSlot> {
        self.queue.pending.next_after(slot)
    }

    /// Timing estimates of an open client
    pub fn timing(&self, client: Client) -> Option<&Timing> {
        self.timing.get(client.index())?.as_ref()
    }

    /// Time to switch from the PHY of `prev` to the PHY of `next`, 0 for the same client
    pub fn switching_us(&self, prev: &Command, next: &Command) -> u32 {
        match next.client() {
            Some(client) if prev.client() != next.client() => self
                .timing(client)
                .map_or(0, |timing| timing.phy_switching_us),
            _ => 0,
        }
    }
}

/// Decides where a scheduled command enters the pending queue
pub trait SubmitPolicy {
    /// Placement of `new`, or `None` to reject it
    ///
    /// `new` is allocated but not yet part of any queue in `view`.
    fn submit(&self, new: &Command, view: &QueueView) -> Option<Placement>;
}

/// Gap fitting policy, see [`how_to_schedule`]
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultSubmitPolicy;

impl SubmitPolicy for DefaultSubmitPolicy {
    fn submit(&self, new: &Command, view: &QueueView) -> Option<Placement> {
        how_to_schedule(new, view)
    }
}

/// Whether `new` fits between `prev` and `next`
///
/// Without a `next` the command may go anywhere; otherwise it needs a known end. A `prev` without
/// a known end leaves no room after it, and a `next` without an absolute start leaves no room
/// before it. Each gap must exceed the PHY switching time between the clients involved.
pub fn verify_gap(
    new: &Command,
    prev: Option<&Command>,
    next: Option<&Command>,
    view: &QueueView,
) -> bool {
    let mut after_prev = prev.is_none();
    let mut before_next = next.is_none();

    if before_next || new.schedule().has_end() {
        if let Some(prev) = prev.filter(|prev| prev.schedule().has_end()) {
            let gap = time::gap_us(
                prev.schedule().end_time,
                new.schedule().start_time,
                view.switching_us(prev, new),
            );
            after_prev = time::gap_fits(gap);
        }

        if let Some(next) = next.filter(|next| after_prev && next.has_abs_start()) {
            let gap = time::gap_us(
                new.schedule().end_time,
                next.schedule().start_time,
                view.switching_us(new, next),
            );
            before_next = time::gap_fits(gap);
        }
    }

    after_prev && before_next
}

/// Default placement of a scheduled command
///
/// The head of the queue is tried first, between the running background command and the first
/// pending one. Commands with an absolute start are then fitted after each pending command in
/// turn. A command allowed to be delayed falls back to the tail; any other is rejected.
pub fn how_to_schedule(new: &Command, view: &QueueView) -> Option<Placement> {
    if verify_gap(new, view.background(), view.pending_head(), view) {
        return Some(Placement::Top);
    }

    if new.has_abs_start() {
        for slot in view.pending() {
            let next = view.pending_after(slot).map(|next| view.get(next));
            if verify_gap(new, Some(view.get(slot)), next, view) {
                return Some(Placement::After(slot));
            }
        }
    }

    if new.schedule().allow_delay {
        Some(Placement::Tail)
    } else {
        None
    }
}
