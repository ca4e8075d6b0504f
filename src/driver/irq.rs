//! Entry points called by the platform from interrupt and software interrupt context

use super::fsm::{FsmEvent, FsmState};
use super::state::{radio_free, Core, CoreStatus, CpeMode, Env, Notification};
use super::{GlobalArg, RfDriver};
use crate::dispatch::ExecutionPolicy;
use crate::event::{EventMask, GlobalEvent};
use crate::hw::clock::TimerId;
use crate::hw::os::Swi;
use crate::hw::rfc::{cpe, hw, PowerConstraint};
use crate::hw::Platform;
use crate::sched::SubmitPolicy;

/// Time before a planned power-up in which a standby wake-up starts the power-up right away
pub const WAKEUP_LEAD_US: u32 = 300;

impl<P: Platform, S: SubmitPolicy, E: ExecutionPolicy> RfDriver<P, S, E> {
    /// Handler of the CPE interrupt line
    pub fn on_cpe_interrupt(&self) {
        self.with_core(|core, env, _| match core.cpe_mode {
            CpeMode::PowerFsm => core.power_fsm_interrupt(env),
            CpeMode::ChangePhy => {
                if env.platform.cpe_get_and_clear(cpe::LAST_CMD_DONE) != 0 {
                    core.post(env.platform, FsmEvent::FinishChangePhy);
                }
            }
            CpeMode::Active => core.command_interrupt(env),
        });
    }

    /// Handler of the RF hardware interrupt line: modem soft events and RAT channels
    pub fn on_hw_interrupt(&self) {
        self.with_core(|core, env, _| {
            let platform = env.platform;
            let flags =
                platform.hw_get_and_clear(hw::MDM_SOFT | hw::RAT_CH_MASK) & platform.hw_enabled();

            if flags & hw::MDM_SOFT != 0 {
                if let Some(bg) = core.queue.bg {
                    core.queue
                        .pool
                        .get_mut(bg)
                        .store_events(EventMask::from_hw(0, hw::MDM_SOFT));
                    core.queue.cb = Some(bg);
                    core.post(platform, FsmEvent::CpeInt);
                }
            }

            if core.rat.record_interrupts(flags) {
                platform.post_swi(Swi::Rat);
            }
        });
    }

    /// Body of the FSM software interrupt
    pub fn run_fsm(&self) {
        while self.with_core(|core, env, deferred| {
            let Some(event) = core.next_fsm_event() else {
                return false;
            };
            core.handle_fsm_event(env, event, deferred);
            true
        }) {}
    }

    /// Body of the RAT software interrupt, delivering one channel event per call
    pub fn run_rat(&self) {
        self.with_core(|core, env, deferred| {
            let platform = env.platform;
            let rat_on = core.rat_on();
            if let Some(event) = core.rat.take_event(platform, rat_on, &mut core.constraints) {
                if event.power_down {
                    core.post(platform, FsmEvent::PowerDown);
                }
                deferred.push(Notification::Rat(event));
            }
            if core.rat.has_pending_interrupts() {
                platform.post_swi(Swi::Rat);
            }
        });
    }

    /// Handler of an expired driver timer
    pub fn on_timer(&self, timer: TimerId) {
        self.with_core(|core, env, deferred| {
            let platform = env.platform;
            match timer {
                TimerId::PowerUp => {
                    if core.state == FsmState::Active {
                        core.dispatch_next_event(platform);
                    } else {
                        core.post(platform, FsmEvent::Wakeup);
                    }
                }
                TimerId::Inactivity => core.inactivity_elapsed(platform),
                TimerId::RequestAccess(_) => core.issue_radio_free(platform, radio_free::ALL, deferred),
            }
        });
    }

    /// Hook for the platform power manager, called when the system leaves standby
    ///
    /// A power-up due within [`WAKEUP_LEAD_US`] starts now, with the crystal oscillator switched
    /// by the driver.
    pub fn on_standby_wakeup(&self) {
        self.with_core(|core, env, _| {
            let platform = env.platform;
            if platform.is_active(TimerId::PowerUp)
                && platform.remaining_us(TimerId::PowerUp) < WAKEUP_LEAD_US
            {
                platform.stop(TimerId::PowerUp);
                platform.set_constraint(PowerConstraint::SwitchXoscHfManually);
                core.manual_xosc = true;
                core.post(platform, FsmEvent::Wakeup);
            }
        });
    }
}

impl Core {
    /// CPE interrupt while the core boots
    fn power_fsm_interrupt<P: Platform, E: ExecutionPolicy>(&mut self, env: &Env<P, E>) {
        let platform = env.platform;
        let flags = platform.cpe_get_and_clear(cpe::ALL);

        if self.state == FsmState::Active {
            self.cpe_mode = CpeMode::Active;
            self.status = CoreStatus::Active;
            if !self.fs_error() {
                if self.rat.restart(platform, &mut self.constraints) {
                    platform.post_swi(Swi::Rat);
                }
                self.dispatch_next_cmd(env);
            }
        }

        if flags & (cpe::BOOT_DONE | cpe::LAST_CMD_DONE) != 0 {
            self.post(platform, FsmEvent::PowerStep);
        }
    }

    /// CPE interrupt of the running commands
    fn command_interrupt<P: Platform, E: ExecutionPolicy>(&mut self, env: &Env<P, E>) {
        let platform = env.platform;

        if platform.cpe_get_and_clear(cpe::PA_CHANGED) != 0 {
            let setup = self
                .curr
                .and_then(|client| self.client(client))
                .map(|state| state.setup);
            if let Some(setup) = setup {
                env.global(self.curr, GlobalEvent::RadioSetup, GlobalArg::Op(setup));
            }
        }

        for slot in [self.queue.bg, self.queue.fg].into_iter().flatten() {
            let cmd = self.queue.pool.get_mut(slot);
            let bm_event = cmd.bm_event;
            let flags = platform.cpe_get_and_clear(bm_event.cpe_flags());
            let events = EventMask::from_hw(flags, 0);
            cmd.store_events(events);

            if events.intersects(EventMask::LAST_CMD_DONE | EventMask::LAST_FG_CMD_DONE) {
                platform
                    .cpe_disable(bm_event.cpe_flags() & !(cpe::LAST_CMD_DONE | cpe::PA_CHANGED));
                platform.hw_disable(bm_event.hw_flags());
                let handle = cmd.handle();
                if let Some(op) = cmd.op() {
                    env.global(self.curr, GlobalEvent::CmdStop, GlobalArg::Cmd(handle, op));
                }

                if self.queue.bg == Some(slot) {
                    self.queue.bg = None;
                }
                if self.queue.fg == Some(slot) {
                    self.queue.fg = None;
                }
                self.queue.complete(slot);
                debug!("command {} done", handle.value());
                self.post(platform, FsmEvent::LastCommandDone);
            } else if !events.is_empty() {
                self.queue.cb = Some(slot);
                self.post(platform, FsmEvent::CpeInt);
            }
        }

        if self.rat.restart(platform, &mut self.constraints) {
            platform.post_swi(Swi::Rat);
        }
        self.dispatch_next_cmd(env);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Client, Mode, Params};
    use crate::constraint::Constraint;
    use crate::driver::HwAttrs;
    use crate::hw::clock::Clocks;
    use crate::hw::fake::{fire, pump, FakePlatform};
    use crate::op::RadioOp;
    use crate::rat::RatConfigCompare;
    use crate::time;

    static MODE: Mode = Mode::new(1);
    static SETUP: RadioOp = RadioOp::new(crate::op::command::PROP_RADIO_DIV_SETUP);

    fn open(driver: &RfDriver<FakePlatform>) -> Client {
        driver.open(&MODE, &SETUP, &Params::default()).unwrap()
    }

    #[test]
    fn test_standby_wakeup_starts_imminent_power_up() {
        let driver = RfDriver::new(FakePlatform::new(), HwAttrs::default());
        let client = open(&driver);
        let platform = driver.platform();

        let config = RatConfigCompare {
            timeout: time::us_to_ticks(1_000_000),
            ..Default::default()
        };
        driver.rat_compare(client, &config, None).unwrap();
        platform.start(TimerId::PowerUp, WAKEUP_LEAD_US - 1);
        driver.on_standby_wakeup();

        assert!(!platform.is_active(TimerId::PowerUp));
        assert!(platform.holds(PowerConstraint::SwitchXoscHfManually));
        pump(&driver);
        assert_eq!(platform.setups.borrow().len(), 1);
    }

    #[test]
    fn test_standby_wakeup_keeps_distant_power_up() {
        let driver = RfDriver::new(FakePlatform::new(), HwAttrs::default());
        let _client = open(&driver);
        let platform = driver.platform();

        platform.start(TimerId::PowerUp, WAKEUP_LEAD_US);
        driver.on_standby_wakeup();

        assert_eq!(platform.timer(TimerId::PowerUp), Some(WAKEUP_LEAD_US));
        assert!(!platform.holds(PowerConstraint::SwitchXoscHfManually));
    }

    #[test]
    fn test_hw_interrupt_ignores_disabled_sources() {
        let driver = RfDriver::new(FakePlatform::new(), HwAttrs::default());
        let _client = open(&driver);
        let platform = driver.platform();

        platform.raise_hw(hw::rat_ch(0) | hw::MDM_SOFT);
        driver.on_hw_interrupt();

        assert!(platform.swis.borrow().is_empty());
        assert_eq!(platform.hw_flags.get(), 0);
    }

    #[test]
    fn test_rat_compare_wakes_core_and_fires() {
        use std::sync::Mutex;
        static FIRED: Mutex<Vec<(EventMask, u32)>> = Mutex::new(Vec::new());
        fn callback(_client: Client, _handle: crate::rat::RatHandle, events: EventMask, value: u32) {
            FIRED.lock().unwrap().push((events, value));
        }

        let driver = RfDriver::new(FakePlatform::new(), HwAttrs::default());
        let client = open(&driver);
        let platform = driver.platform();

        let config = RatConfigCompare {
            callback: Some(callback),
            timeout: time::us_to_ticks(100_000),
            ..Default::default()
        };
        let handle = driver.rat_compare(client, &config, None).unwrap();
        assert!(platform.is_active(TimerId::PowerUp));

        fire(&driver, TimerId::PowerUp);
        assert!(platform.holds(PowerConstraint::RfCoreDomain));
        assert!(core_constraint(&driver, Constraint::RatCh(handle.index())));

        platform.raise_hw(hw::rat_ch(handle.index()));
        pump(&driver);

        let fired = FIRED.lock().unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, EventMask::RAT_CH);
        assert!(!core_constraint(&driver, Constraint::RatCh(handle.index())));
    }

    fn core_constraint(driver: &RfDriver<FakePlatform>, constraint: Constraint) -> bool {
        driver.with_core(|core, _, _| core.constraints.contains(constraint))
    }

    #[test]
    fn test_inactivity_timer_releases_core() {
        let driver = RfDriver::new(FakePlatform::new(), HwAttrs::default());
        let client = open(&driver);
        let platform = driver.platform();

        static OP: RadioOp = RadioOp::new(0x3801);
        driver
            .control(client, crate::driver::Control::SetInactivityTimeout(1000))
            .unwrap();
        driver
            .post(client, &OP, crate::cmd::Priority::Normal, None, EventMask::NONE)
            .unwrap();
        pump(&driver);
        platform.finish(cpe::LAST_CMD_DONE);
        pump(&driver);

        assert_eq!(platform.timer(TimerId::Inactivity), Some(1000));
        assert!(platform.clock_on.get());
        fire(&driver, TimerId::Inactivity);
        assert!(!platform.clock_on.get());
        assert!(!platform.holds(PowerConstraint::RfCoreDomain));
    }
}
