//! Command pool and command queues
//!
//! Commands live in a fixed pool. The pending and done queues hold pool slot indices, and at most
//! one background and one foreground command run at a time. A command's handle is drawn from a
//! counter wrapping within [`CMD_HANDLE_WINDOW`]; the pool is smaller than the window so two live
//! commands never share a handle.

use crate::client::Client;
use crate::event::EventMask;
use crate::op::RadioOp;
use crate::sched::ScheduleParams;
use crate::utils::slot_list::SlotList;

/// Number of commands that can be queued or running at once
pub const N_CMD_POOL: usize = 8;

/// Number of distinct command handles before the handle counter wraps
pub const CMD_HANDLE_WINDOW: u16 = 0x1000;

const _: () = assert!(N_CMD_POOL < CMD_HANDLE_WINDOW as usize);

/// Callback delivering command events
pub type CmdCallback = fn(Client, CmdHandle, EventMask);

/// Handle of a posted or scheduled command
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CmdHandle(u16);

impl CmdHandle {
    /// Addresses every command of a client in cancel and flush requests
    pub const FLUSH_ALL: Self = Self(u16::MAX);

    const RETIRED: Self = Self(u16::MAX - 2);

    pub(crate) const fn new(seq: u16) -> Self {
        Self(seq)
    }

    /// Raw handle value
    pub const fn value(self) -> u16 {
        self.0
    }
}

/// Next value of a handle counter
pub(crate) const fn next_seq(seq: u16) -> u16 {
    seq.wrapping_add(1) % CMD_HANDLE_WINDOW
}

/// Previous value of a handle counter
pub(crate) const fn prev_seq(seq: u16) -> u16 {
    seq.wrapping_add(CMD_HANDLE_WINDOW - 1) % CMD_HANDLE_WINDOW
}

/// Priority of a command
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    /// Default priority
    #[default]
    Normal,
    /// Elevated priority, meaningful to custom policies
    High,
    /// Reserved for pre-emption
    Highest,
}

/// Index of a command in the pool
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CmdSlot(u8);

impl CmdSlot {
    /// Index in the pool
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Ordered list of pool slots
pub type CmdList = SlotList<CmdSlot, N_CMD_POOL>;

const FLAG_FOREGROUND: u8 = 1 << 4;
const FLAG_ALLOCATED: u8 = 1 << 7;

/// A submitted command
#[derive(Debug)]
pub struct Command {
    pub(crate) op: Option<&'static RadioOp>,
    pub(crate) client: Option<Client>,
    pub(crate) handle: CmdHandle,
    pub(crate) callback: Option<CmdCallback>,
    pub(crate) priority: Priority,
    pub(crate) sched: ScheduleParams,
    pub(crate) bm_event: EventMask,
    pub(crate) rfifg: EventMask,
    pub(crate) pastifg: EventMask,
    flags: u8,
}

impl Command {
    const fn new() -> Self {
        Self {
            op: None,
            client: None,
            handle: CmdHandle::RETIRED,
            callback: None,
            priority: Priority::Normal,
            sched: ScheduleParams::new(),
            bm_event: EventMask::NONE,
            rfifg: EventMask::NONE,
            pastifg: EventMask::NONE,
            flags: 0,
        }
    }

    /// Radio operation chain of the command
    pub fn op(&self) -> Option<&'static RadioOp> {
        self.op
    }

    /// Owning client
    pub fn client(&self) -> Option<Client> {
        self.client
    }

    /// Handle of the command
    pub fn handle(&self) -> CmdHandle {
        self.handle
    }

    /// Priority of the command
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Scheduling constraints of the command
    pub fn schedule(&self) -> &ScheduleParams {
        &self.sched
    }

    /// Whether the command may run next to a background command of the same client
    pub fn is_foreground(&self) -> bool {
        self.flags & FLAG_FOREGROUND != 0
    }

    /// Whether the slot holds a live command
    pub fn is_allocated(&self) -> bool {
        self.flags & FLAG_ALLOCATED != 0
    }

    /// Whether the first operation starts at an absolute time
    pub fn has_abs_start(&self) -> bool {
        self.op.map_or(false, |op| op.has_abs_start())
    }

    /// Whether the first operation programs the synthesizer
    pub fn starts_with_fs(&self) -> bool {
        self.op.map_or(false, |op| op.is_fs())
    }

    pub(crate) fn set_foreground(&mut self, foreground: bool) {
        if foreground {
            self.flags |= FLAG_FOREGROUND;
        } else {
            self.flags &= !FLAG_FOREGROUND;
        }
    }

    pub(crate) fn mark_allocated(&mut self) {
        self.flags |= FLAG_ALLOCATED;
    }

    /// Frees the slot; the handle is retired so it cannot alias a later command
    pub(crate) fn release(&mut self) {
        self.flags = 0;
        self.handle = CmdHandle::RETIRED;
    }

    /// Records events observed by the hardware or the driver
    ///
    /// The events are kept both for the next callback and for late [pend](crate::driver) calls.
    pub(crate) fn store_events(&mut self, events: EventMask) {
        self.rfifg |= events;
        self.pastifg |= events;
    }

    /// Takes the events not yet delivered through the callback
    pub(crate) fn take_events(&mut self) -> EventMask {
        core::mem::take(&mut self.rfifg)
    }
}

/// Fixed pool of commands
#[derive(Debug)]
pub struct CmdPool {
    cmds: [Command; N_CMD_POOL],
}

impl CmdPool {
    /// Creates a pool with every slot free
    pub const fn new() -> Self {
        // using magic number because of https://github.com/JoshMcguigan/arr_macro/issues/2
        Self {
            cmds: arr_macro::arr![Command::new(); 8],
        }
    }

    /// Finds a free slot; the slot is claimed once the caller marks it allocated
    pub fn alloc(&self) -> Option<CmdSlot> {
        self.cmds
            .iter()
            .position(|cmd| !cmd.is_allocated())
            .map(|i| CmdSlot(i as u8))
    }

    /// Command in `slot`
    pub fn get(&self, slot: CmdSlot) -> &Command {
        &self.cmds[slot.index()]
    }

    /// Mutable command in `slot`
    pub fn get_mut(&mut self, slot: CmdSlot) -> &mut Command {
        &mut self.cmds[slot.index()]
    }

    /// Finds the command with `handle` owned by `client`
    ///
    /// Without `allocated_only` a slot is matched by handle and owner alone.
    pub fn find(&self, client: Client, handle: CmdHandle, allocated_only: bool) -> Option<CmdSlot> {
        self.cmds
            .iter()
            .position(|cmd| {
                cmd.handle == handle
                    && cmd.client == Some(client)
                    && (!allocated_only || cmd.is_allocated())
            })
            .map(|i| CmdSlot(i as u8))
    }

    /// Number of allocated commands
    pub fn allocated(&self) -> usize {
        self.cmds.iter().filter(|cmd| cmd.is_allocated()).count()
    }
}

impl Default for CmdPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Commands and the queues they move through
#[derive(Debug)]
pub struct CmdQueue {
    pub(crate) pool: CmdPool,
    pub(crate) pending: CmdList,
    pub(crate) done: CmdList,
    pub(crate) bg: Option<CmdSlot>,
    pub(crate) fg: Option<CmdSlot>,
    pub(crate) cb: Option<CmdSlot>,
    pub(crate) seq_posted: u16,
    pub(crate) seq_done: u16,
}

impl CmdQueue {
    pub(crate) const fn new() -> Self {
        Self {
            pool: CmdPool::new(),
            pending: CmdList::new(),
            done: CmdList::new(),
            bg: None,
            fg: None,
            cb: None,
            seq_posted: 0,
            seq_done: 0,
        }
    }

    /// Whether every posted command was delivered
    pub(crate) fn all_done(&self) -> bool {
        self.seq_posted == self.seq_done
    }

    /// Whether a background or foreground command runs
    pub(crate) fn is_running(&self) -> bool {
        self.bg.is_some() || self.fg.is_some()
    }

    /// Running command of `client`, background first
    pub(crate) fn running_of(&self, client: Client) -> Option<CmdSlot> {
        [self.bg, self.fg]
            .into_iter()
            .flatten()
            .find(|slot| self.pool.get(*slot).client == Some(client))
    }

    /// Last pending command of `client`
    pub(crate) fn last_pending_of(&self, client: Client) -> Option<CmdSlot> {
        self.pending
            .iter()
            .filter(|slot| self.pool.get(*slot).client == Some(client))
            .last()
    }

    /// Last done command of `client`
    pub(crate) fn last_done_of(&self, client: Client) -> Option<CmdSlot> {
        self.done
            .iter()
            .filter(|slot| self.pool.get(*slot).client == Some(client))
            .last()
    }

    /// Stores events in both running commands
    pub(crate) fn store_running_events(&mut self, events: EventMask) {
        for slot in [self.bg, self.fg].into_iter().flatten() {
            self.pool.get_mut(slot).store_events(events);
        }
    }

    /// Moves a command to the done queue
    pub(crate) fn complete(&mut self, slot: CmdSlot) {
        self.pending.remove(slot);
        if self.done.push_back(slot).is_err() {
            error!("done queue overflow");
        }
    }

    /// Frees the delivered head of the done queue
    pub(crate) fn free_done_head(&mut self) -> Option<CmdSlot> {
        let slot = self.done.pop_front()?;
        let cmd = self.pool.get_mut(slot);
        cmd.release();
        self.seq_done = next_seq(self.seq_done);
        Some(slot)
    }
}
