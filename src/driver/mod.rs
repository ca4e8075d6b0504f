//! Multi-client RF driver
//!
//! [`RfDriver`] shares one RF core between up to [`N_MAX_CLIENTS`] clients. Each client loads its
//! own PHY through a radio setup; commands of different clients are queued together and the
//! driver powers the core up, switches PHY and powers it down as the queue requires.
//!
//! The driver runs in three contexts. Client tasks call the public API, the platform forwards the
//! RF core interrupts to [`RfDriver::on_cpe_interrupt`] and [`RfDriver::on_hw_interrupt`], and
//! runs [`RfDriver::run_fsm`] and [`RfDriver::run_rat`] when the driver posts the matching
//! [`Swi`](crate::hw::os::Swi). Expired timers are reported through [`RfDriver::on_timer`].
//!
//! # Examples
//!
//! ```no_run
//! # #[macro_use] extern crate rf_multimode;
//! # missing_test_fns!();
//! # fn main() {}
//! use rf_multimode::client::{Mode, Params};
//! use rf_multimode::cmd::Priority;
//! use rf_multimode::driver::{HwAttrs, RfDriver};
//! use rf_multimode::event::EventMask;
//! use rf_multimode::hw::Platform;
//! use rf_multimode::op::{command, RadioOp};
//!
//! static MODE: Mode = Mode::new(0x05);
//! static SETUP: RadioOp = RadioOp::new(command::PROP_RADIO_DIV_SETUP);
//! static TX: RadioOp = RadioOp::new(0x3801);
//!
//! fn transmit<P: Platform>(driver: &RfDriver<P>) {
//!     let client = driver.open(&MODE, &SETUP, &Params::default()).unwrap();
//!     let events = driver
//!         .run(client, &TX, Priority::Normal, None, EventMask::NONE)
//!         .unwrap();
//!     assert!(events.contains(EventMask::LAST_CMD_DONE));
//!     driver.close(client);
//! }
//! ```

mod fsm;
mod irq;
mod state;

use crate::client::{
    Client, ClientState, Mode, Params, SyncWait, ANALOG_CFG_TIME_US, N_MAX_CLIENTS,
};
use crate::cmd::{self, CmdCallback, CmdHandle, CmdSlot, Priority};
use crate::constraint::Constraint;
use crate::dispatch::{DefaultExecutionPolicy, ExecutionPolicy};
use crate::error::Error;
use crate::event::{EventMask, GlobalEvent};
use crate::hw::clock::TimerId;
use crate::hw::rfc::{DirectCmd, PowerConstraint};
use crate::hw::Platform;
use crate::mutex::Mutex;
use crate::op::RadioOp;
use crate::rat::{RatConfigCapture, RatConfigCompare, RatConfigOutput, RatHandle};
use crate::sched::{DefaultSubmitPolicy, EndType, Placement, ScheduleParams, StartType, SubmitPolicy};

use fsm::FsmEvent;
use state::{radio_free, Core, CoreStatus, Deferred, Env};

pub use state::DEFAULT_RAT_RTC_ERR_TOL_US;

/// Longest request access window
pub const MAX_ACCESS_DURATION_US: u32 = 1_000_000;

/// RSSI reported when the value cannot be read
pub const RSSI_INVALID: i8 = -128;

/// Argument of the [`GlobalCallback`]
#[derive(Clone, Copy, Debug)]
pub enum GlobalArg {
    /// No argument
    None,
    /// Radio setup about to be submitted
    Op(&'static RadioOp),
    /// Command starting or stopping, with its operation chain
    Cmd(CmdHandle, &'static RadioOp),
    /// Coexistence control value forwarded from [`Control::CoexControl`]
    Coex(u32),
}

/// Board level hook notified about [`GlobalEvent`]s
///
/// It runs with the radio interrupts masked and must not call the driver.
pub type GlobalCallback = fn(Option<Client>, GlobalEvent, GlobalArg);

/// Board configuration of the driver
#[derive(Clone, Copy, Debug, Default)]
pub struct HwAttrs {
    /// Priority of the RF core interrupts
    pub hwi_priority: u32,
    /// Priority of the driver software interrupts
    pub swi_priority: u32,
    /// Keep the high frequency crystal oscillator on for as long as a client is open
    pub xosc_hf_always_needed: bool,
    /// Board level hook
    pub global_callback: Option<GlobalCallback>,
    /// Events passed to `global_callback`, see [`GlobalEvent::bit`]
    pub global_event_mask: u32,
}

/// How [`RfDriver::cancel`] and [`RfDriver::flush`] stop a running command
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CancelMode {
    /// Let the running operation end gracefully instead of aborting it
    pub graceful: bool,
    /// Tag the commands as pre-empted and notify the owner once the radio is free again
    pub preempt: bool,
}

/// Query of [`RfDriver::get_info`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InfoType {
    /// Handle of the running background command
    CurrentCmd,
    /// Mask of RAT channels free to allocate
    AvailableRatChannels,
    /// Whether the core is powered
    RadioActive,
    /// Open clients
    ClientList,
    /// Measured PHY switching time of each client
    ClientSwitchingTime,
}

/// Answer of [`RfDriver::get_info`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Info {
    /// See [`InfoType::CurrentCmd`]
    CurrentCmd(Option<CmdHandle>),
    /// See [`InfoType::AvailableRatChannels`]
    AvailableRatChannels(u8),
    /// See [`InfoType::RadioActive`]
    RadioActive(bool),
    /// See [`InfoType::ClientList`]
    ClientList([Option<Client>; N_MAX_CLIENTS]),
    /// See [`InfoType::ClientSwitchingTime`]; 0 for a free client slot
    SwitchingTimeUs([u32; N_MAX_CLIENTS]),
}

/// Options of [`RfDriver::control`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Control {
    /// Inactivity timeout of the client
    SetInactivityTimeout(u32),
    /// Reconfigure the analog front-end on the next setup
    UpdateSetup,
    /// Margin added to the power-up duration of the client
    PowerUpMargin(u32),
    /// Margin added to the PHY switching duration of the client
    PhySwitchingMargin(u32),
    /// Tolerated drift between the radio timer and the RTC before a resynchronization
    RatRtcErrTol(u32),
    /// Enable or disable the automatic power-down of the core
    PowerMgmt(bool),
    /// Priority of the RF core interrupts; only while the core is off and nothing is queued
    HwiPriority(u32),
    /// Priority of the driver software interrupts; only while the core is off and nothing is queued
    SwiPriority(u32),
    /// Mask of RAT channels the driver may allocate
    AvailableRatChannels(u8),
    /// Value forwarded to the global callback as a [`GlobalEvent::CoexControl`]
    CoexControl(u32),
}

/// Driver of a shared RF core
///
/// `S` places scheduled commands in the queue and `E` resolves conflicts of pending commands with
/// running ones.
pub struct RfDriver<
    P: Platform,
    S: SubmitPolicy = DefaultSubmitPolicy,
    E: ExecutionPolicy = DefaultExecutionPolicy,
> {
    platform: P,
    attrs: HwAttrs,
    core: Mutex<Core>,
    submit_policy: S,
    exec_policy: E,
}

impl<P: Platform> RfDriver<P> {
    /// Creates a driver with the default scheduling policies
    pub const fn new(platform: P, attrs: HwAttrs) -> Self {
        Self::with_policies(platform, attrs, DefaultSubmitPolicy, DefaultExecutionPolicy)
    }
}

impl<P: Platform, S: SubmitPolicy, E: ExecutionPolicy> RfDriver<P, S, E> {
    /// Creates a driver with custom scheduling policies
    pub const fn with_policies(platform: P, attrs: HwAttrs, submit_policy: S, exec_policy: E) -> Self {
        Self {
            platform,
            attrs,
            core: Mutex::new(Core::new()),
            submit_policy,
            exec_policy,
        }
    }

    /// Platform the driver runs on
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Runs `func` in a critical section, then delivers the callbacks it collected
    fn with_core<F, R>(&self, func: F) -> R
    where
        F: FnOnce(&mut Core, &Env<P, E>, &mut Deferred) -> R,
    {
        let env = Env {
            platform: &self.platform,
            attrs: &self.attrs,
            exec: &self.exec_policy,
        };
        let mut deferred = Deferred::new();
        let result = self.core.locked(|core| func(core, &env, &mut deferred));
        deferred.deliver();
        result
    }

    /// Opens a client with its RF mode and radio setup
    ///
    /// The first client to open initializes the driver.
    pub fn open(
        &self,
        mode: &'static Mode,
        setup: &'static RadioOp,
        params: &Params,
    ) -> Result<Client, Error> {
        self.with_core(|core, env, _| {
            let platform = env.platform;
            let mode_bit = 1u32.checked_shl(mode.rf_mode as u32).unwrap_or(0);
            if platform.supported_modes() & mode_bit == 0 {
                warn!("RF mode {} not supported", mode.rf_mode);
                return Err(Error::UnsupportedMode);
            }
            let index = core
                .clients
                .iter()
                .position(Option::is_none)
                .ok_or(Error::NoClientSlot)?;
            let client = Client::new(index);

            if core.num_clients == 0 {
                core.init();
                env.global(Some(client), GlobalEvent::Init, GlobalArg::None);
                if env.attrs.xosc_hf_always_needed {
                    platform.set_constraint(PowerConstraint::XoscHf);
                }
                platform.set_hwi_priority(env.attrs.hwi_priority);
                platform.set_swi_priority(env.attrs.swi_priority);
            }

            core.clients[index] = Some(ClientState::new(mode, setup, params));
            core.num_clients += 1;
            info!("client {} opened", index);
            Ok(client)
        })
    }

    /// Closes a client once its commands finished
    ///
    /// Closing the last client powers the core down.
    pub fn close(&self, client: Client) {
        let last_cmd = self.with_core(|core, _, _| {
            if core.queue.all_done() {
                return None;
            }
            core.queue
                .last_pending_of(client)
                .or_else(|| core.queue.running_of(client))
                .or_else(|| core.queue.last_done_of(client))
                .map(|slot| core.queue.pool.get(slot).handle())
        });
        if let Some(handle) = last_cmd {
            self.pend(client, handle, EventMask::TERMINATION);
        }

        let wait_power_down = self.with_core(|core, env, _| {
            let Some(slot) = core.clients.get_mut(client.index()) else {
                return false;
            };
            if slot.take().is_none() {
                return false;
            }
            core.num_clients -= 1;
            info!("client {} closed", client.index());

            if core.num_clients == 0 {
                core.curr = Some(client);
                let _ = core.constraints.release(Constraint::Disallow);
                if core.status == CoreStatus::Active {
                    core.release_cmd_q(env.platform);
                    return true;
                }
            }
            false
        });
        if wait_power_down {
            self.platform.sem_pend(client);
        }

        self.with_core(|core, env, _| {
            if core.num_clients == 0 && env.attrs.xosc_hf_always_needed {
                env.platform.release_constraint(PowerConstraint::XoscHf);
            }
            if core.curr == Some(client) {
                core.curr = None;
            }
        });
    }

    /// Reserves a pool slot and fills it for `client`; the slot is claimed by the caller
    fn prepare_cmd(
        core: &mut Core,
        platform: &P,
        client: Client,
        op: &'static RadioOp,
        callback: Option<CmdCallback>,
    ) -> Result<(CmdSlot, CmdHandle), Error> {
        if core.client(client).is_none() {
            return Err(Error::InvalidParams);
        }
        let slot = core.queue.pool.alloc().ok_or(Error::AllocError)?;
        platform.stop(TimerId::Inactivity);
        core.queue.seq_posted = cmd::next_seq(core.queue.seq_posted);
        let handle = CmdHandle::new(core.queue.seq_posted);

        let cmd = core.queue.pool.get_mut(slot);
        cmd.op = Some(op);
        cmd.client = Some(client);
        cmd.handle = handle;
        cmd.callback = callback;
        cmd.rfifg = EventMask::NONE;
        cmd.pastifg = EventMask::NONE;
        cmd.set_foreground(false);
        Ok((slot, handle))
    }

    fn claim_cmd(core: &mut Core, client: Client, slot: CmdSlot) {
        core.queue.pool.get_mut(slot).mark_allocated();
        if let Some(state) = core.client_mut(client) {
            state.yielded = false;
        }
    }

    /// Appends a command to the pending queue
    ///
    /// `event_mask` selects the events delivered to `callback`; the end of the chain is always
    /// delivered. A first operation with an absolute start trigger makes the driver wake up in
    /// time for it.
    pub fn post(
        &self,
        client: Client,
        op: &'static RadioOp,
        priority: Priority,
        callback: Option<CmdCallback>,
        event_mask: EventMask,
    ) -> Result<CmdHandle, Error> {
        self.with_core(|core, env, _| {
            let platform = env.platform;
            let (slot, handle) = Self::prepare_cmd(core, platform, client, op, callback)?;

            let cmd = core.queue.pool.get_mut(slot);
            cmd.priority = priority;
            cmd.bm_event = (event_mask | EventMask::LAST_CMD_DONE).without(EventMask::INTERNAL);
            cmd.sched = ScheduleParams::new();
            if op.has_abs_start() {
                cmd.sched.start_type = StartType::Abs;
                cmd.sched.start_time = op.start_time();
            }

            if core.queue.pending.push_back(slot).is_err() {
                core.queue.seq_posted = cmd::prev_seq(core.queue.seq_posted);
                return Err(Error::AllocError);
            }
            Self::claim_cmd(core, client, slot);
            debug!("command {} posted", handle.value());

            if core.queue.pending.head() == Some(slot) {
                core.dispatch_next_event(platform);
            }
            Ok(handle)
        })
    }

    /// Places a command in the pending queue according to its timing
    ///
    /// The submit policy decides the place; see
    /// [`how_to_schedule`](crate::sched::how_to_schedule) for the default one. A command that
    /// fits nowhere is rejected with [`Error::ScheduleError`] and the client is notified once the
    /// radio is free, as it is when another client holds a request access window.
    pub fn schedule(
        &self,
        client: Client,
        op: &'static RadioOp,
        params: &ScheduleParams,
        callback: Option<CmdCallback>,
        event_mask: EventMask,
    ) -> Result<CmdHandle, Error> {
        self.with_core(|core, env, _| {
            let platform = env.platform;
            let other_access = (0..N_MAX_CLIENTS)
                .filter(|index| *index != client.index())
                .any(|index| platform.is_active(TimerId::RequestAccess(Client::new(index))));
            if other_access {
                core.subscribe_radio_free(client, radio_free::CMDREJECT);
                return Err(Error::ScheduleError);
            }

            let (slot, handle) = Self::prepare_cmd(core, platform, client, op, callback)?;

            let cmd = core.queue.pool.get_mut(slot);
            cmd.priority = params.priority;
            cmd.sched = *params;
            if cmd.sched.end_type == EndType::NotSpecified && cmd.sched.end_time != 0 {
                cmd.sched.end_type = EndType::Abs;
            }
            if cmd.sched.start_type == StartType::NotSpecified && op.has_abs_start() {
                cmd.sched.start_type = StartType::Abs;
                cmd.sched.start_time = op.start_time();
            }

            let mut bm_event = event_mask.without(EventMask::INTERNAL);
            if op.end_of_chain().is_ieee_foreground() {
                cmd.set_foreground(true);
                bm_event |= EventMask::LAST_FG_CMD_DONE;
            } else {
                bm_event |= EventMask::LAST_CMD_DONE;
            }
            cmd.bm_event = bm_event;

            if core.radio_free.client == Some(client) {
                core.radio_free.flags &= !radio_free::PREEMPT;
            }

            let placement = self
                .submit_policy
                .submit(core.queue.pool.get(slot), &core.view());
            let inserted = match placement {
                Some(Placement::Top) => core.queue.pending.push_front(slot).is_ok(),
                Some(Placement::After(prev)) => core.queue.pending.insert_after(prev, slot).is_ok(),
                Some(Placement::Tail) => core.queue.pending.push_back(slot).is_ok(),
                None => false,
            };
            if !inserted {
                info!("command rejected");
                core.queue.seq_posted = cmd::prev_seq(core.queue.seq_posted);
                core.subscribe_radio_free(client, radio_free::CMDREJECT);
                return Err(Error::ScheduleError);
            }

            Self::claim_cmd(core, client, slot);
            debug!("command {} scheduled", handle.value());

            if core.queue.pending.head() == Some(slot) || op.has_abs_start() {
                core.dispatch_next_event(platform);
            }
            Ok(handle)
        })
    }

    /// Blocks until one of `event_mask` occurs on the command, or the command ends
    ///
    /// Returns the events that released the wait. Events which occurred before the call are
    /// returned at once; a command which was already delivered returns
    /// [`EventMask::LAST_CMD_DONE`].
    pub fn pend(&self, client: Client, handle: CmdHandle, event_mask: EventMask) -> EventMask {
        let ready = self.with_core(|core, _, _| {
            let Some(slot) = core.queue.pool.find(client, handle, true) else {
                return Some(EventMask::LAST_CMD_DONE);
            };
            let mask = event_mask | EventMask::TERMINATION;

            let cmd = core.queue.pool.get_mut(slot);
            let past = cmd.pastifg & mask;
            if !past.is_empty() {
                cmd.pastifg &= !past;
                if let Some(state) = core.client_mut(client) {
                    state.unpend_cause = past;
                }
                return Some(past);
            }

            match core.client_mut(client) {
                Some(state) => {
                    state.sync = Some(SyncWait { handle, mask });
                    None
                }
                None => Some(EventMask::LAST_CMD_DONE),
            }
        });

        match ready {
            Some(events) => events,
            None => {
                self.platform.sem_pend(client);
                self.with_core(|core, _, _| {
                    core.client(client)
                        .map_or(EventMask::LAST_CMD_DONE, |state| state.unpend_cause)
                })
            }
        }
    }

    /// Posts a command and waits until it ends
    pub fn run(
        &self,
        client: Client,
        op: &'static RadioOp,
        priority: Priority,
        callback: Option<CmdCallback>,
        event_mask: EventMask,
    ) -> Result<EventMask, Error> {
        let handle = self.post(client, op, priority, callback, event_mask)?;
        Ok(self.pend(client, handle, EventMask::TERMINATION))
    }

    /// Schedules a command and waits until it ends
    pub fn run_schedule(
        &self,
        client: Client,
        op: &'static RadioOp,
        params: &ScheduleParams,
        callback: Option<CmdCallback>,
        event_mask: EventMask,
    ) -> Result<EventMask, Error> {
        let handle = self.schedule(client, op, params, callback, event_mask)?;
        Ok(self.pend(client, handle, EventMask::TERMINATION))
    }

    /// Cancels a command of `client`
    ///
    /// A pending command is delivered with [`EventMask::CANCELLED`]. A running one is stopped or
    /// aborted, which completes asynchronously. [`CmdHandle::FLUSH_ALL`] targets the running
    /// command of the client, or the head of the queue.
    pub fn cancel(&self, client: Client, handle: CmdHandle, mode: CancelMode) -> Result<(), Error> {
        self.with_core(|core, env, _| {
            core.abort(env, client, handle, mode.graceful, false, mode.preempt)
        })
    }

    /// Cancels a command and every later pending command of `client`
    pub fn flush(&self, client: Client, handle: CmdHandle, mode: CancelMode) -> Result<(), Error> {
        self.with_core(|core, env, _| {
            core.abort(env, client, handle, mode.graceful, true, mode.preempt)
        })
    }

    /// Gives the radio up until the client submits again
    ///
    /// Without pending work the core may power down at once; otherwise the inactivity timeout of
    /// the client is skipped once its commands are done.
    pub fn yield_radio(&self, client: Client) {
        self.with_core(|core, env, deferred| {
            // Forces a resynchronization of the radio timer at the next power-down
            core.active_time_us = u32::MAX;
            env.platform.stop(TimerId::RequestAccess(client));
            if core.queue.all_done()
                && core.status != CoreStatus::Active
                && core.radio_free.flags != 0
            {
                core.issue_radio_free(env.platform, radio_free::ALL, deferred);
            }
        });

        self.with_core(|core, env, _| {
            if core.queue.all_done() {
                env.platform.stop(TimerId::Inactivity);
                core.release_cmd_q(env.platform);
            } else if let Some(state) = core.client_mut(client) {
                state.yielded = true;
            }
        });
    }

    /// Reserves the radio for `duration_us` without a command
    ///
    /// While the window is open commands of the other client are rejected. A request made while
    /// any window is open fails with [`Error::Busy`] and the client is notified once the radio
    /// is free. Windows are granted first come, first served; `_priority` does not rank them.
    pub fn request_access(&self, client: Client, duration_us: u32, _priority: u8) -> Result<(), Error> {
        if duration_us > MAX_ACCESS_DURATION_US {
            return Err(Error::InvalidParams);
        }

        self.with_core(|core, env, _| {
            if core.access_active(env.platform) {
                core.subscribe_radio_free(client, radio_free::REQACCESS);
                return Err(Error::Busy);
            }
            core.client(client).ok_or(Error::InvalidParams)?;
            env.platform.start(TimerId::RequestAccess(client), duration_us);
            Ok(())
        })
    }

    /// Reads driver state
    pub fn get_info(&self, client: Client, info: InfoType) -> Result<Info, Error> {
        self.with_core(|core, _, _| {
            core.client(client).ok_or(Error::InvalidParams)?;
            Ok(match info {
                InfoType::CurrentCmd => Info::CurrentCmd(
                    core.queue.bg.map(|slot| core.queue.pool.get(slot).handle()),
                ),
                InfoType::AvailableRatChannels => Info::AvailableRatChannels(core.rat.available()),
                InfoType::RadioActive => Info::RadioActive(core.status == CoreStatus::Active),
                InfoType::ClientList => {
                    let mut clients = [None; N_MAX_CLIENTS];
                    for (index, entry) in clients.iter_mut().enumerate() {
                        *entry = core.clients[index].as_ref().map(|_| Client::new(index));
                    }
                    Info::ClientList(clients)
                }
                InfoType::ClientSwitchingTime => {
                    let mut times = [0; N_MAX_CLIENTS];
                    for (time, state) in times.iter_mut().zip(core.clients.iter()) {
                        *time = state.as_ref().map_or(0, |state| state.timing.phy_switching_us);
                    }
                    Info::SwitchingTimeUs(times)
                }
            })
        })
    }

    /// Operation chain of a queued or running command
    pub fn get_cmd_op(&self, client: Client, handle: CmdHandle) -> Option<&'static RadioOp> {
        self.with_core(|core, _, _| {
            let slot = core.queue.pool.find(client, handle, true)?;
            core.queue.pool.get(slot).op()
        })
    }

    /// Allocates a RAT channel firing at a radio timer value
    ///
    /// The channel is armed once the core runs; the driver powers the core up in time.
    pub fn rat_compare(
        &self,
        client: Client,
        config: &RatConfigCompare,
        output: Option<&RatConfigOutput>,
    ) -> Result<RatHandle, Error> {
        self.with_core(|core, env, _| {
            core.client(client).ok_or(Error::InvalidParams)?;
            let handle = core
                .rat
                .alloc_compare(client, config, output)
                .ok_or(Error::AllocError)?;
            core.curr.get_or_insert(client);
            core.dispatch_next_event(env.platform);
            Ok(handle)
        })
    }

    /// Allocates a RAT channel capturing an input signal
    ///
    /// Capturing needs the core powered, so it powers up at once.
    pub fn rat_capture(
        &self,
        client: Client,
        config: &RatConfigCapture,
        output: Option<&RatConfigOutput>,
    ) -> Result<RatHandle, Error> {
        self.with_core(|core, env, _| {
            core.client(client).ok_or(Error::InvalidParams)?;
            let handle = core
                .rat
                .alloc_capture(client, config, output)
                .ok_or(Error::AllocError)?;
            core.curr.get_or_insert(client);
            core.dispatch_next_event(env.platform);
            Ok(handle)
        })
    }

    /// Frees a RAT channel of `client`
    pub fn rat_disable(&self, client: Client, handle: RatHandle) -> Result<(), Error> {
        self.with_core(|core, env, _| {
            let platform = env.platform;
            if core.rat.owner(handle) != Some(client) {
                return Err(Error::InvalidParams);
            }

            let rat_on = core.rat_on();
            if core.status == CoreStatus::Active {
                let cmdsta = platform.send_direct(DirectCmd::DisableRatCh {
                    channel: handle.hw_channel(),
                });
                if !crate::hw::rfc::cmd_accepted(cmdsta) {
                    return Err(Error::CmdDoneError);
                }
                if core.rat.free(handle, platform, rat_on, &mut core.constraints) {
                    core.post(platform, FsmEvent::PowerDown);
                }
            } else {
                let _ = core.rat.free(handle, platform, rat_on, &mut core.constraints);
                core.dispatch_next_event(platform);
            }
            Ok(())
        })
    }

    /// Changes a runtime option
    pub fn control(&self, client: Client, control: Control) -> Result<(), Error> {
        self.with_core(|core, env, _| {
            let platform = env.platform;
            core.client(client).ok_or(Error::InvalidParams)?;

            match control {
                Control::SetInactivityTimeout(timeout_us) => {
                    if let Some(state) = core.client_mut(client) {
                        state.inactivity_timeout_us = timeout_us;
                    }
                }
                Control::UpdateSetup => {
                    if let Some(state) = core.client_mut(client) {
                        state.update_setup = true;
                        state.timing.power_up_us += ANALOG_CFG_TIME_US;
                        state.timing.power_up_fs_us += ANALOG_CFG_TIME_US;
                    }
                }
                Control::PowerUpMargin(margin_us) => {
                    if let Some(state) = core.client_mut(client) {
                        state.timing.power_up_margin_us = margin_us;
                    }
                }
                Control::PhySwitchingMargin(margin_us) => {
                    if let Some(state) = core.client_mut(client) {
                        state.timing.phy_switching_margin_us = margin_us;
                    }
                }
                Control::RatRtcErrTol(tolerance_us) => core.err_tol_us = tolerance_us,
                Control::PowerMgmt(true) => {
                    if core.constraints.release(Constraint::Disallow) {
                        core.post(platform, FsmEvent::PowerDown);
                    }
                }
                Control::PowerMgmt(false) => core.constraints.set(Constraint::Disallow),
                Control::HwiPriority(priority) | Control::SwiPriority(priority) => {
                    if core.status != CoreStatus::Idle || core.queue.pending.head().is_some() {
                        return Err(Error::Busy);
                    }
                    if let Control::HwiPriority(_) = control {
                        platform.set_hwi_priority(priority);
                    } else {
                        platform.set_swi_priority(priority);
                    }
                }
                Control::AvailableRatChannels(mask) => core.rat.set_available(mask),
                Control::CoexControl(value) => {
                    env.global(Some(client), GlobalEvent::CoexControl, GlobalArg::Coex(value))
                }
            }
            Ok(())
        })
    }

    /// Sends a raw direct command; the client must own the powered core
    pub fn run_direct(&self, client: Client, cmd: u32) -> Result<u32, Error> {
        self.with_core(|core, env, _| core.send_direct(env.platform, client, DirectCmd::Raw(cmd)))
    }

    /// Sends an immediate command; the client must own the powered core
    pub fn run_immediate(&self, client: Client, op: &'static RadioOp) -> Result<u32, Error> {
        self.with_core(|core, env, _| {
            core.send_direct(env.platform, client, DirectCmd::Immediate(op))
        })
    }

    /// RSSI of the ongoing reception, [`RSSI_INVALID`] when it cannot be read
    pub fn get_rssi(&self, client: Client) -> i8 {
        self.with_core(|core, env, _| core.send_direct(env.platform, client, DirectCmd::GetRssi))
            .map_or(RSSI_INVALID, |cmdsta| (cmdsta >> 16) as u8 as i8)
    }

    /// Current radio timer value, synthesized from the RTC while the core is off
    pub fn current_time(&self) -> u32 {
        self.with_core(|core, env, _| core.rat_now(env.platform))
    }
}

#[cfg(test)]
mod tests;
