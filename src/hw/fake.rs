//! Deterministic platform for driver tests
//!
//! Records doorbell traffic and emulates the flags, timers and counters of a real port. The boot
//! completes as soon as the core clocks are enabled and a setup chain finishes after
//! [`FakePlatform::setup_us`] of clock time; radio operations finish only when a test calls
//! [`FakePlatform::finish`].

use core::cell::{Cell, RefCell};

use crate::client::{Client, N_MAX_CLIENTS};
use crate::driver::RfDriver;
use crate::dispatch::ExecutionPolicy;
use crate::hw::clock::{Clocks, TimerId};
use crate::hw::os::{Os, Swi};
use crate::hw::rfc::{self, cpe, CorePower, DirectCmd, Doorbell, PowerConstraint, SetupChain};
use crate::op::{status, RadioOp};
use crate::sched::SubmitPolicy;

const PUMP_LIMIT: usize = 1000;

pub(crate) struct FakePlatform {
    pub submitted: RefCell<Vec<&'static RadioOp>>,
    pub setups: RefCell<Vec<SetupChain>>,
    pub rat_starts: RefCell<Vec<(u32, Option<&'static RadioOp>)>>,
    pub directs: RefCell<Vec<DirectCmd>>,
    pub cmdsta: Cell<u32>,
    pub direct_value: Cell<u32>,
    pub cpe_flags: Cell<u32>,
    pub cpe_enabled: Cell<u32>,
    pub hw_flags: Cell<u32>,
    pub hw_enabled: Cell<u32>,
    pub cpe_pended: Cell<bool>,
    pub running_ops: Cell<u32>,
    pub rtc: Cell<u64>,
    pub rat: Cell<u32>,
    pub rat_running: Cell<bool>,
    /// Clock time a setup chain takes
    pub setup_us: Cell<u32>,
    pub clock_on: Cell<bool>,
    pub xosc_ready: Cell<bool>,
    pub supported_modes: Cell<u32>,
    pub timers: RefCell<Vec<(TimerId, u32)>>,
    pub swis: RefCell<Vec<Swi>>,
    pub sems: [Cell<u32>; N_MAX_CLIENTS],
    pub sem_hook: Cell<Option<fn()>>,
    pub constraints: RefCell<Vec<PowerConstraint>>,
    pub priorities: Cell<(u32, u32)>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            submitted: RefCell::new(Vec::new()),
            setups: RefCell::new(Vec::new()),
            rat_starts: RefCell::new(Vec::new()),
            directs: RefCell::new(Vec::new()),
            cmdsta: Cell::new(rfc::CMDSTA_DONE),
            direct_value: Cell::new(0),
            cpe_flags: Cell::new(0),
            cpe_enabled: Cell::new(0),
            hw_flags: Cell::new(0),
            hw_enabled: Cell::new(0),
            cpe_pended: Cell::new(false),
            running_ops: Cell::new(0),
            rtc: Cell::new(0),
            rat: Cell::new(0),
            rat_running: Cell::new(false),
            setup_us: Cell::new(0),
            clock_on: Cell::new(false),
            xosc_ready: Cell::new(true),
            supported_modes: Cell::new(u32::MAX),
            timers: RefCell::new(Vec::new()),
            swis: RefCell::new(Vec::new()),
            sems: [Cell::new(0), Cell::new(0)],
            sem_hook: Cell::new(None),
            constraints: RefCell::new(Vec::new()),
            priorities: Cell::new((0, 0)),
        }
    }

    fn raise_cpe(&self, flags: u32) {
        self.cpe_flags.set(self.cpe_flags.get() | flags);
    }

    /// Finishes the running operations, raising `cpe_flags`
    pub fn finish(&self, cpe_flags: u32) {
        self.running_ops.set(0);
        self.raise_cpe(cpe_flags);
    }

    /// Raises hardware flags, e.g. a RAT channel event
    pub fn raise_hw(&self, flags: u32) {
        self.hw_flags.set(self.hw_flags.get() | flags);
    }

    /// Moves both clocks forward
    pub fn advance_us(&self, us: u32) {
        self.rat
            .set(self.rat.get().wrapping_add(crate::time::us_to_ticks(us)));
        self.rtc
            .set(self.rtc.get().wrapping_add(((us as u64) << 32) / 1_000_000));
    }

    pub fn timer(&self, timer: TimerId) -> Option<u32> {
        self.timers
            .borrow()
            .iter()
            .find(|(id, _)| *id == timer)
            .map(|(_, timeout)| *timeout)
    }

    pub fn holds(&self, constraint: PowerConstraint) -> bool {
        self.constraints.borrow().contains(&constraint)
    }

    fn take_swi(&self) -> Option<Swi> {
        let mut swis = self.swis.borrow_mut();
        if swis.is_empty() {
            None
        } else {
            Some(swis.remove(0))
        }
    }

    fn cpe_irq(&self) -> bool {
        self.cpe_pended.replace(false) || self.cpe_flags.get() & self.cpe_enabled.get() != 0
    }

    fn hw_irq(&self) -> bool {
        self.hw_flags.get() & self.hw_enabled.get() != 0
    }
}

/// Runs interrupts and software interrupts until the driver settles
pub(crate) fn pump<S: SubmitPolicy, E: ExecutionPolicy>(driver: &RfDriver<FakePlatform, S, E>) {
    for _ in 0..PUMP_LIMIT {
        let platform = driver.platform();
        if platform.cpe_irq() {
            driver.on_cpe_interrupt();
        } else if platform.hw_irq() {
            driver.on_hw_interrupt();
        } else if let Some(swi) = platform.take_swi() {
            match swi {
                Swi::Fsm => driver.run_fsm(),
                Swi::Rat => driver.run_rat(),
            }
        } else {
            return;
        }
    }
    panic!("driver does not settle");
}

/// Expires `timer` and lets the driver settle
pub(crate) fn fire<S: SubmitPolicy, E: ExecutionPolicy>(
    driver: &RfDriver<FakePlatform, S, E>,
    timer: TimerId,
) {
    let platform = driver.platform();
    let timeout = platform.timer(timer).unwrap_or(0);
    platform.advance_us(timeout);
    platform.timers.borrow_mut().retain(|(id, _)| *id != timer);
    driver.on_timer(timer);
    pump(driver);
}

impl Doorbell for FakePlatform {
    fn submit(&self, op: &'static RadioOp) {
        op.set_status(status::ACTIVE);
        self.running_ops.set(self.running_ops.get() + 1);
        self.submitted.borrow_mut().push(op);
    }

    fn submit_setup(&self, chain: &SetupChain) {
        if chain.rat_start.is_some() {
            self.rat_running.set(true);
        }
        self.setups.borrow_mut().push(*chain);
        self.advance_us(self.setup_us.get());
        self.raise_cpe(cpe::LAST_CMD_DONE);
    }

    fn submit_rat_start(&self, rat0: u32, fs: Option<&'static RadioOp>) {
        self.rat_running.set(true);
        self.rat_starts.borrow_mut().push((rat0, fs));
        self.raise_cpe(cpe::LAST_CMD_DONE);
    }

    fn send_direct(&self, cmd: DirectCmd) -> u32 {
        self.directs.borrow_mut().push(cmd);
        if matches!(cmd, DirectCmd::Abort | DirectCmd::Stop) && self.running_ops.get() != 0 {
            self.finish(cpe::LAST_CMD_DONE | cpe::LAST_FG_CMD_DONE);
        }
        self.cmdsta.get() | (self.direct_value.get() << 16)
    }

    fn cpe_get_and_clear(&self, mask: u32) -> u32 {
        let flags = self.cpe_flags.get() & mask;
        self.cpe_flags.set(self.cpe_flags.get() & !flags);
        flags
    }

    fn cpe_enable(&self, mask: u32) {
        self.cpe_enabled.set(self.cpe_enabled.get() | mask);
    }

    fn cpe_disable(&self, mask: u32) {
        self.cpe_enabled.set(self.cpe_enabled.get() & !mask);
    }

    fn cpe_clear(&self, mask: u32) {
        self.cpe_flags.set(self.cpe_flags.get() & !mask);
    }

    fn hw_get_and_clear(&self, mask: u32) -> u32 {
        let flags = self.hw_flags.get() & mask;
        self.hw_flags.set(self.hw_flags.get() & !flags);
        flags
    }

    fn hw_enabled(&self) -> u32 {
        self.hw_enabled.get()
    }

    fn hw_enable(&self, mask: u32) {
        self.hw_enabled.set(self.hw_enabled.get() | mask);
    }

    fn hw_disable(&self, mask: u32) {
        self.hw_enabled.set(self.hw_enabled.get() & !mask);
    }

    fn hw_clear(&self, mask: u32) {
        self.hw_flags.set(self.hw_flags.get() & !mask);
    }

    fn rat_now(&self) -> u32 {
        self.rat.get()
    }

    fn rat_channel_value(&self, _channel: u8) -> u32 {
        self.rat.get()
    }
}

impl CorePower for FakePlatform {
    fn supported_modes(&self) -> u32 {
        self.supported_modes.get()
    }

    fn select_mode(&self, _rf_mode: u8) {}

    fn clock_enable(&self) {
        self.clock_on.set(true);
        self.raise_cpe(cpe::BOOT_DONE);
    }

    fn clock_disable(&self) {
        self.clock_on.set(false);
        self.rat_running.set(false);
    }

    fn ram_clocks(&self, _enable: bool) {}

    fn reset_cpe_patch(&self) {}

    fn rat_running(&self) -> bool {
        self.rat_running.get()
    }

    fn rat_sync_stop(&self) -> u32 {
        self.rat_running.set(false);
        self.rat.get()
    }

    fn synth_off(&self) {}

    fn xosc_hf_ready(&self) -> bool {
        self.xosc_ready.get()
    }

    fn switch_xosc_hf(&self) {
        self.xosc_ready.set(true);
    }

    fn lf_clock_source(&self) -> u8 {
        0
    }

    fn set_constraint(&self, constraint: PowerConstraint) {
        self.constraints.borrow_mut().push(constraint);
    }

    fn release_constraint(&self, constraint: PowerConstraint) {
        let mut constraints = self.constraints.borrow_mut();
        if let Some(pos) = constraints.iter().position(|held| *held == constraint) {
            constraints.remove(pos);
        }
    }
}

impl Clocks for FakePlatform {
    fn rtc_now(&self) -> u64 {
        self.rtc.get()
    }

    fn start(&self, timer: TimerId, timeout_us: u32) {
        let mut timers = self.timers.borrow_mut();
        timers.retain(|(id, _)| *id != timer);
        timers.push((timer, timeout_us));
    }

    fn stop(&self, timer: TimerId) {
        self.timers.borrow_mut().retain(|(id, _)| *id != timer);
    }

    fn is_active(&self, timer: TimerId) -> bool {
        self.timer(timer).is_some()
    }

    fn remaining_us(&self, timer: TimerId) -> u32 {
        self.timer(timer).unwrap_or(0)
    }
}

impl Os for FakePlatform {
    fn post_swi(&self, swi: Swi) {
        let mut swis = self.swis.borrow_mut();
        if !swis.contains(&swi) {
            swis.push(swi);
        }
    }

    fn pend_cpe_interrupt(&self) {
        self.cpe_pended.set(true);
    }

    fn sem_pend(&self, client: Client) {
        let sem = &self.sems[client.index()];
        for _ in 0..PUMP_LIMIT {
            if sem.get() != 0 {
                sem.set(sem.get() - 1);
                return;
            }
            match self.sem_hook.get() {
                Some(hook) => hook(),
                None => break,
            }
        }
        panic!("semaphore of client {} never posted", client.index());
    }

    fn sem_post(&self, client: Client) {
        let sem = &self.sems[client.index()];
        sem.set(1);
    }

    fn set_hwi_priority(&self, priority: u32) {
        self.priorities.set((priority, self.priorities.get().1));
    }

    fn set_swi_priority(&self, priority: u32) {
        self.priorities.set((self.priorities.get().0, priority));
    }
}
