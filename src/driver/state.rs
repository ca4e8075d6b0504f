//! Driver core shared by the client API, the RF core interrupts and the driver SWIs
//!
//! Everything in [`Core`] is only touched inside a critical section. Callbacks to clients are
//! collected in [`Deferred`] and delivered once the section is left.

use super::fsm::{FsmEvent, FsmState};
use super::{GlobalArg, HwAttrs};
use crate::client::{
    Client, ClientCallback, ClientState, ErrorCallback, ErrorCode, PowerCallback, Timing,
    N_MAX_CLIENTS, WAIT_FOREVER,
};
use crate::cmd::{CmdCallback, CmdHandle, CmdQueue, CmdSlot};
use crate::constraint::{Constraint, Constraints};
use crate::dispatch::{self, ExecuteAction, ExecutionPolicy, RAT_COMPENSATION_US};
use crate::error::Error;
use crate::event::{ClientEvent, EventMask, GlobalEvent};
use crate::hw::clock::TimerId;
use crate::hw::os::Swi;
use crate::hw::rfc::{self, DirectCmd};
use crate::hw::Platform;
use crate::op::status;
use crate::rat::{RatEvent, RatModule};
use crate::sched::QueueView;
use crate::time;
use crate::utils::work_queue::WorkQueue;

/// Default tolerated drift between the radio timer and the RTC
pub const DEFAULT_RAT_RTC_ERR_TOL_US: u32 = 5;

/// Combined crystal drift, as a power of two, turning the tolerance into an active time budget
const XTAL_DRIFT_SHIFT: u32 = 11;

/// Most callbacks one critical section collects: the interim, terminal and radio free
/// notifications of a delivered command, or the error, power and client events of a power-up
const DEFERRED_CAPACITY: usize = 3;

/// Reasons to notify a client once the radio becomes free
pub(crate) mod radio_free {
    /// A command of the client was pre-empted
    pub const PREEMPT: u8 = 1 << 0;
    /// A request access of the client was refused, or the client yielded
    pub const REQACCESS: u8 = 1 << 1;
    /// A command of the client was rejected
    pub const CMDREJECT: u8 = 1 << 2;
    /// Every reason
    pub const ALL: u8 = PREEMPT | REQACCESS | CMDREJECT;
}

/// Power state of the RF core as seen by the clients
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum CoreStatus {
    Idle,
    PoweringUp,
    Active,
    PhySwitching,
    PoweringDown,
}

/// Handler of the CPE interrupt line
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum CpeMode {
    PowerFsm,
    Active,
    ChangePhy,
}

/// Client waiting for the radio to become free, with the reasons still pending
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct RadioFree {
    pub client: Option<Client>,
    pub flags: u8,
}

/// Callback invocation collected inside a critical section
#[derive(Clone, Copy)]
pub(crate) enum Notification {
    Cmd(CmdCallback, Client, CmdHandle, EventMask),
    Power(PowerCallback, Client, EventMask),
    Error(ErrorCallback, Client, ErrorCode, EventMask),
    Client(ClientCallback, Client, ClientEvent),
    Rat(RatEvent),
}

impl Notification {
    fn deliver(self) {
        match self {
            Notification::Cmd(callback, client, handle, events) => callback(client, handle, events),
            Notification::Power(callback, client, events) => callback(client, events),
            Notification::Error(callback, client, code, events) => callback(client, code, events),
            Notification::Client(callback, client, event) => callback(client, event),
            Notification::Rat(event) => event.deliver(),
        }
    }
}

/// Callbacks waiting for the end of the critical section
pub(crate) struct Deferred {
    items: [Option<Notification>; DEFERRED_CAPACITY],
    len: usize,
}

impl Deferred {
    pub const fn new() -> Self {
        Self {
            items: [None; DEFERRED_CAPACITY],
            len: 0,
        }
    }

    pub fn push(&mut self, notification: Notification) {
        debug_assert!(self.len < DEFERRED_CAPACITY, "deferred notifications overflow");
        match self.items.get_mut(self.len) {
            Some(item) => {
                *item = Some(notification);
                self.len += 1;
            }
            None => error!("notification dropped"),
        }
    }

    /// Invokes the collected callbacks in order; must run outside of critical sections
    pub fn deliver(self) {
        for notification in self.items.into_iter().flatten() {
            notification.deliver();
        }
    }
}

/// Platform and board configuration seen by the core
pub(crate) struct Env<'a, P, E> {
    pub platform: &'a P,
    pub attrs: &'a HwAttrs,
    pub exec: &'a E,
}

impl<'a, P, E> Env<'a, P, E> {
    /// Notifies the board about `event` if it subscribed to it
    ///
    /// Runs inside the critical section, right before or after the hardware access it brackets.
    pub fn global(&self, client: Option<Client>, event: GlobalEvent, arg: GlobalArg) {
        if let Some(callback) = self.attrs.global_callback {
            if self.attrs.global_event_mask & event.bit() != 0 {
                callback(client, event, arg);
            }
        }
    }
}

const NO_CLIENT: Option<ClientState> = None;

pub(crate) struct Core {
    pub clients: [Option<ClientState>; N_MAX_CLIENTS],
    pub num_clients: usize,
    pub curr: Option<Client>,
    pub queue: CmdQueue,
    pub rat: RatModule,
    pub constraints: Constraints,
    pub events: WorkQueue<FsmEvent>,
    pub state: FsmState,
    pub status: CoreStatus,
    pub cpe_mode: CpeMode,
    pub rat_synced: bool,
    pub rat0: u32,
    pub active_time_us: u32,
    pub err_tol_us: u32,
    pub power_up_stamp: u32,
    pub switch_stamp: u32,
    pub lf_source: Option<u8>,
    pub fs_chained: bool,
    pub manual_xosc: bool,
    pub radio_free: RadioFree,
}

impl Core {
    pub const fn new() -> Self {
        Self {
            clients: [NO_CLIENT; N_MAX_CLIENTS],
            num_clients: 0,
            curr: None,
            queue: CmdQueue::new(),
            rat: RatModule::new(),
            constraints: Constraints::new(),
            events: WorkQueue::new(),
            state: FsmState::Idle,
            status: CoreStatus::Idle,
            cpe_mode: CpeMode::PowerFsm,
            rat_synced: false,
            rat0: 0,
            active_time_us: 0,
            err_tol_us: DEFAULT_RAT_RTC_ERR_TOL_US,
            power_up_stamp: 0,
            switch_stamp: 0,
            lf_source: None,
            fs_chained: false,
            manual_xosc: false,
            radio_free: RadioFree {
                client: None,
                flags: 0,
            },
        }
    }

    /// Resets the shared state when the first client opens
    pub fn init(&mut self) {
        self.cpe_mode = CpeMode::PowerFsm;
        self.status = CoreStatus::Idle;
        self.state = FsmState::Idle;
        self.rat_synced = false;
        self.active_time_us = 0;
        self.err_tol_us = DEFAULT_RAT_RTC_ERR_TOL_US;
        self.rat.set_available(crate::rat::DEFAULT_AVAILABLE_CHANNELS);
        self.constraints = Constraints::new();
        self.events.clear();
    }

    pub fn client(&self, client: Client) -> Option<&ClientState> {
        self.clients.get(client.index())?.as_ref()
    }

    pub fn client_mut(&mut self, client: Client) -> Option<&mut ClientState> {
        self.clients.get_mut(client.index())?.as_mut()
    }

    /// Whether the radio timer runs on the core
    pub fn rat_on(&self) -> bool {
        matches!(self.status, CoreStatus::Active | CoreStatus::PhySwitching)
    }

    pub fn post<P: Platform>(&mut self, platform: &P, event: FsmEvent) {
        self.events.post(event);
        platform.post_swi(Swi::Fsm);
    }

    /// Releases the command queue constraint, evaluating a power-down if nothing else holds it
    pub fn release_cmd_q<P: Platform>(&mut self, platform: &P) {
        if self.constraints.release(Constraint::CmdQ) {
            self.post(platform, FsmEvent::PowerDown);
        }
    }

    /// Current radio timer value, synthesized from the RTC while the core is off
    pub fn rat_now<P: Platform>(&self, platform: &P) -> u32 {
        if self.rat_on() {
            platform.rat_now()
        } else {
            time::rtc_to_rat(platform.rtc_now(), self.rat0)
        }
    }

    pub fn view(&self) -> QueueView<'_> {
        let mut timing: [Option<Timing>; N_MAX_CLIENTS] = [None; N_MAX_CLIENTS];
        for (slot, client) in timing.iter_mut().zip(self.clients.iter()) {
            *slot = client.as_ref().map(|client| client.timing);
        }
        QueueView::new(&self.queue, timing)
    }

    /// Time until the core is needed for the next command or RAT channel
    pub fn next_dispatch_delay<P: Platform>(&self, platform: &P) -> Option<u32> {
        let now = self.rat_now(platform);
        let active = self.rat.num_active();
        let cmd = dispatch::cmd_dispatch_time(&self.view(), false, now, active)
            .map(|time| time.delay_us);
        let overhead = self
            .curr
            .and_then(|client| self.client(client))
            .map_or(0, |client| {
                client
                    .timing
                    .power_up_overhead_us(None, RAT_COMPENSATION_US.saturating_mul(active))
            });
        dispatch::earliest(cmd, self.rat.dispatch_delay(now, overhead))
    }

    /// Plans the next action of the core: dispatch when powered, otherwise wake up now or later
    pub fn dispatch_next_event<P: Platform>(&mut self, platform: &P) {
        match self.status {
            CoreStatus::Active => platform.pend_cpe_interrupt(),
            CoreStatus::PoweringUp | CoreStatus::PhySwitching => {}
            CoreStatus::Idle | CoreStatus::PoweringDown => match self.next_dispatch_delay(platform) {
                Some(0) => {
                    platform.stop(TimerId::PowerUp);
                    self.post(platform, FsmEvent::Wakeup);
                }
                Some(delay_us) => {
                    trace!("wake-up in {} us", delay_us);
                    platform.start(TimerId::PowerUp, delay_us);
                }
                None => platform.stop(TimerId::PowerUp),
            },
        }
    }

    /// Starts the head of the pending queue if it may run now
    pub fn dispatch_next_cmd<P: Platform, E: ExecutionPolicy>(&mut self, env: &Env<P, E>) {
        let platform = env.platform;
        let Some(head) = self.queue.pending.head() else {
            self.post(platform, FsmEvent::LastCommandDone);
            return;
        };

        let mut do_now = dispatch::can_start_now(&self.view());
        let now = self.rat_now(platform);
        let time =
            dispatch::cmd_dispatch_time(&self.view(), !do_now, now, self.rat.num_active());

        if let Some(time) = time {
            if !do_now && time.delay_us > 0 {
                platform.start(TimerId::PowerUp, time.delay_us);
                return;
            }

            if time.delay_us == 0 {
                let view = self.view();
                let conflict_cmd = if do_now { None } else { Some(view.get(time.slot)) };
                let action = env.exec.execute(&view, !do_now, conflict_cmd);
                match action {
                    ExecuteAction::None => {}
                    ExecuteAction::AbortOngoing => {
                        info!("policy aborts the ongoing command");
                        if let Some(bg) = self.queue.bg {
                            let cmd = self.queue.pool.get(bg);
                            if let Some(client) = cmd.client() {
                                let handle = cmd.handle();
                                let _ = self.abort(env, client, handle, false, true, true);
                            }
                        }
                        do_now = false;
                    }
                    ExecuteAction::RejectIncoming => {
                        info!("policy rejects the incoming command");
                        let slot = if do_now { head } else { time.slot };
                        let cmd = self.queue.pool.get(slot);
                        if let Some(client) = cmd.client() {
                            let handle = cmd.handle();
                            let _ = self.abort(env, client, handle, false, false, true);
                        }
                        do_now = false;
                    }
                }
            }
        }

        if !do_now {
            return;
        }

        let head_client = self.queue.pool.get(head).client();
        if head_client != self.curr {
            self.post(platform, FsmEvent::InitChangePhy);
        } else if time.map_or(false, |time| time.delay_us > 0) && !self.queue.is_running() {
            self.release_cmd_q(platform);
        } else {
            self.start_cmd(env, head);
        }
    }

    fn start_cmd<P: Platform, E>(&mut self, env: &Env<P, E>, slot: CmdSlot) {
        let platform = env.platform;
        self.constraints.set(Constraint::CmdQ);
        self.queue.pending.remove(slot);

        let cmd = self.queue.pool.get(slot);
        if cmd.is_foreground() {
            self.queue.fg = Some(slot);
        } else {
            self.queue.bg = Some(slot);
        }

        let bm_event = cmd.bm_event;
        platform.cpe_clear(bm_event.cpe_flags());
        platform.cpe_enable(bm_event.cpe_flags());
        platform.hw_clear(bm_event.hw_flags());
        platform.hw_enable(bm_event.hw_flags());

        let Some(op) = cmd.op() else {
            error!("command without operation");
            return;
        };
        env.global(self.curr, GlobalEvent::CmdStart, GlobalArg::Cmd(cmd.handle(), op));
        debug!("command {} started", cmd.handle().value());
        platform.submit(op);
        if op.is_setup() {
            env.global(self.curr, GlobalEvent::RadioSetup, GlobalArg::Op(op));
        }

        self.post(platform, FsmEvent::RunScheduler);
    }

    /// Queues the callback of a command and releases a client pending on `events`
    pub fn notify_cmd<P: Platform>(
        &mut self,
        platform: &P,
        slot: CmdSlot,
        events: EventMask,
        deferred: &mut Deferred,
    ) {
        let cmd = self.queue.pool.get(slot);
        let Some(client) = cmd.client() else {
            return;
        };
        let handle = cmd.handle();
        if let Some(callback) = cmd.callback {
            deferred.push(Notification::Cmd(callback, client, handle, events));
        }

        let Some(state) = self.clients.get_mut(client.index()).and_then(Option::as_mut) else {
            return;
        };
        let Some(sync) = state.sync.filter(|sync| sync.handle == handle) else {
            return;
        };
        let cause = events & sync.mask;
        if cause.is_empty() {
            return;
        }

        state.unpend_cause = cause;
        state.sync = None;
        self.queue.pool.get_mut(slot).pastifg &= !cause;
        platform.sem_post(client);
    }

    /// Delivers the head of the done queue and frees it
    pub fn op_done<P: Platform>(&mut self, platform: &P, deferred: &mut Deferred) {
        let Some(slot) = self.queue.done.head() else {
            return;
        };

        let cmd = self.queue.pool.get_mut(slot);
        let fs = cmd.op().and_then(|op| op.first_fs());
        let client = cmd.client();
        let mut events = cmd.take_events();
        if let Some(fs) = fs {
            if let Some(state) = client.and_then(|client| self.client_mut(client)) {
                state.cached_fs = Some(fs);
            }
        }

        if events.intersects(EventMask::ABORT_CLASS) {
            let interim = events.without(EventMask::ABORT_CLASS | EventMask::COMPLETION);
            if !interim.is_empty() {
                self.notify_cmd(platform, slot, interim, deferred);
            }
            events &= EventMask::ABORT_CLASS;
        }
        self.notify_cmd(platform, slot, events, deferred);

        self.queue.free_done_head();
        if self.queue.all_done() {
            self.set_inactivity_timeout(platform, deferred);
        }
    }

    /// Arms the inactivity timer with the longest timeout of the clients
    fn set_inactivity_timeout<P: Platform>(&mut self, platform: &P, deferred: &mut Deferred) {
        let mut src = radio_free::PREEMPT | radio_free::CMDREJECT;
        if self
            .curr
            .and_then(|client| self.client(client))
            .map_or(false, |client| client.yielded)
        {
            src |= radio_free::REQACCESS;
        }
        self.issue_radio_free(platform, src, deferred);

        let mut timeout_us = 0;
        for client in self.clients.iter_mut().flatten() {
            if !client.yielded {
                timeout_us = timeout_us.max(client.inactivity_timeout_us);
            }
            client.yielded = false;
        }

        match timeout_us {
            0 => self.inactivity_elapsed(platform),
            WAIT_FOREVER => {}
            timeout_us => platform.start(TimerId::Inactivity, timeout_us),
        }
    }

    /// Releases the command queue once every command was delivered
    pub fn inactivity_elapsed<P: Platform>(&mut self, platform: &P) {
        if self.queue.all_done() {
            self.release_cmd_q(platform);
        }
    }

    /// Clears `src` and notifies the waiting client once the radio is free
    pub fn issue_radio_free<P: Platform>(&mut self, platform: &P, src: u8, deferred: &mut Deferred) {
        self.radio_free.flags &= !src;
        if self.radio_free.flags != 0 || self.access_active(platform) {
            return;
        }

        if let Some(client) = self.radio_free.client.take() {
            if let Some(callback) = self
                .client(client)
                .and_then(|state| state.subscribed(ClientEvent::RadioFree))
            {
                deferred.push(Notification::Client(callback, client, ClientEvent::RadioFree));
            }
        }
    }

    /// Records `client` for a radio free notification
    pub fn subscribe_radio_free(&mut self, client: Client, src: u8) {
        self.radio_free.client = Some(client);
        self.radio_free.flags |= src;
    }

    /// Whether a request access window of any client is open
    pub fn access_active<P: Platform>(&self, platform: &P) -> bool {
        (0..N_MAX_CLIENTS).any(|index| {
            self.clients[index].is_some()
                && platform.is_active(TimerId::RequestAccess(Client::new(index)))
        })
    }

    fn owns(&self, client: Client, slot: Option<CmdSlot>) -> Option<CmdSlot> {
        slot.filter(|slot| self.queue.pool.get(*slot).client() == Some(client))
    }

    /// Cancels a running or pending command, see [`RfDriver::cancel`](super::RfDriver::cancel)
    pub fn abort<P: Platform, E>(
        &mut self,
        env: &Env<P, E>,
        client: Client,
        handle: CmdHandle,
        graceful: bool,
        flush: bool,
        preempt: bool,
    ) -> Result<(), Error> {
        let platform = env.platform;
        let event = if graceful {
            EventMask::STOPPED
        } else {
            EventMask::ABORTED
        };

        let target = if handle == CmdHandle::FLUSH_ALL {
            self.owns(client, self.queue.bg)
                .or_else(|| self.owns(client, self.queue.fg))
                .or_else(|| self.queue.pending.head())
        } else {
            self.queue.pool.find(client, handle, false)
        };

        let target = target.ok_or(Error::InvalidParams)?;
        if !self.queue.pool.get(target).is_allocated() {
            return Err(Error::CmdEnded);
        }

        if Some(target) == self.queue.bg || Some(target) == self.queue.fg {
            self.queue.store_running_events(event);
            platform.send_direct(if graceful {
                DirectCmd::Stop
            } else {
                DirectCmd::Abort
            });
            if preempt {
                self.queue.store_running_events(EventMask::PREEMPTED);
                if let Some(owner) = self.queue.pool.get(target).client() {
                    self.subscribe_radio_free(owner, radio_free::PREEMPT);
                }
            }
            if flush {
                if let Some(head) = self.queue.pending.head() {
                    self.discard_pending(client, head, true, preempt);
                }
            }
            info!("running command aborted");
            return Ok(());
        }

        if self.discard_pending(client, target, flush, preempt) > 0 {
            if !matches!(self.status, CoreStatus::PoweringUp | CoreStatus::PhySwitching) {
                self.post(platform, FsmEvent::LastCommandDone);
                self.post(platform, FsmEvent::RunScheduler);
            }
            Ok(())
        } else {
            Err(Error::CmdEnded)
        }
    }

    /// Moves pending commands of `client` to the done queue, starting at `from`
    ///
    /// Only `from` is considered unless `flush` is set. Returns the number of commands moved.
    fn discard_pending(&mut self, client: Client, from: CmdSlot, flush: bool, preempt: bool) -> usize {
        let mut discarded = 0;
        let mut next = self.queue.pending.contains(from).then_some(from);

        while let Some(slot) = next {
            next = self.queue.pending.next_after(slot);
            if self.queue.pool.get(slot).client() == Some(client) {
                let cmd = self.queue.pool.get_mut(slot);
                cmd.store_events(EventMask::CANCELLED);
                if preempt {
                    cmd.store_events(EventMask::PREEMPTED);
                    self.subscribe_radio_free(client, radio_free::PREEMPT);
                }
                self.queue.complete(slot);
                discarded += 1;
            }
            if !flush {
                break;
            }
        }

        discarded
    }

    /// Sends a direct or immediate command on behalf of the loaded client
    pub fn send_direct<P: Platform>(
        &self,
        platform: &P,
        client: Client,
        cmd: DirectCmd,
    ) -> Result<u32, Error> {
        if self.curr != Some(client) {
            return Err(Error::InvalidParams);
        }
        if self.status != CoreStatus::Active {
            return Err(Error::RadioInactive);
        }

        let cmdsta = platform.send_direct(cmd);
        if rfc::cmd_accepted(cmdsta) {
            Ok(cmdsta)
        } else {
            warn!("direct command rejected");
            Err(Error::CmdDoneError)
        }
    }

    /// Whether the synthesizer chained after the last setup failed
    pub fn fs_error(&self) -> bool {
        self.fs_chained
            && self
                .curr
                .and_then(|client| self.client(client))
                .and_then(|client| client.cached_fs)
                .map_or(false, |fs| fs.status() == status::ERROR_SYNTH_PROG)
    }

    /// Reports a synthesizer programming error to the loaded client
    pub fn report_fs_error(&self, deferred: &mut Deferred) {
        let Some(client) = self.curr else {
            return;
        };
        warn!("synthesizer programming failed");
        if let Some(callback) = self.client(client).and_then(|state| state.error_callback) {
            deferred.push(Notification::Error(
                callback,
                client,
                ErrorCode::CmdFsSynthProg,
                EventMask::ERROR,
            ));
        }
    }

    /// Whether the radio timer needs to be resynchronized with the RTC at power-down
    pub fn rat_sync_due(&self) -> bool {
        !self.rat_synced || self.active_time_us > (self.err_tol_us << XTAL_DRIFT_SHIFT)
    }
}
