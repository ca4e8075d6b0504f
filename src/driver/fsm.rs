//! Power and PHY state machine of the RF core
//!
//! The machine runs in the FSM software interrupt, one [`FsmEvent`] at a time. Events left after
//! the one being handled stay queued; an event the current state does not handle is dropped.

use super::state::{radio_free, Core, CoreStatus, CpeMode, Deferred, Env, Notification};
use super::GlobalArg;
use crate::client::{Timing, DEFAULT_POWER_UP_US};
use crate::constraint::Constraint;
use crate::dispatch::ExecutionPolicy;
use crate::event::{ClientEvent, EventMask, GlobalEvent};
use crate::hw::clock::TimerId;
use crate::hw::rfc::{self, cpe, DirectCmd, PowerConstraint, SetupChain};
use crate::hw::Platform;
use crate::op::RadioOp;
use crate::time;
use crate::utils::work_queue::WorkItem;

/// Period of polling the crystal oscillator while it settles
pub const XOSC_POLL_US: u32 = 50;

/// Work of the FSM software interrupt, highest priority first
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum FsmEvent {
    CpeInt,
    PowerStep,
    LastCommandDone,
    InitChangePhy,
    FinishChangePhy,
    PowerDown,
    RunScheduler,
    Wakeup,
}

impl WorkItem for FsmEvent {
    const ALL: &'static [Self] = &[
        FsmEvent::CpeInt,
        FsmEvent::PowerStep,
        FsmEvent::LastCommandDone,
        FsmEvent::InitChangePhy,
        FsmEvent::FinishChangePhy,
        FsmEvent::PowerDown,
        FsmEvent::RunScheduler,
        FsmEvent::Wakeup,
    ];
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum FsmState {
    /// Core powered off
    Idle,
    /// Clocks enabled, waiting for the boot to finish
    Setup,
    /// Setup submitted, waiting for the crystal oscillator before starting the radio timer
    Xosc,
    /// Core powered
    Active,
}

impl FsmState {
    pub fn handles(self, event: FsmEvent) -> bool {
        match self {
            FsmState::Idle => matches!(event, FsmEvent::LastCommandDone | FsmEvent::Wakeup),
            FsmState::Setup => event == FsmEvent::PowerStep,
            FsmState::Xosc => matches!(event, FsmEvent::PowerStep | FsmEvent::Wakeup),
            FsmState::Active => event != FsmEvent::Wakeup,
        }
    }
}

impl Core {
    /// Takes the next event the current state handles
    pub fn next_fsm_event(&mut self) -> Option<FsmEvent> {
        while let Some(event) = self.events.take_next() {
            if self.state.handles(event) {
                return Some(event);
            }
            trace!("FSM event dropped");
        }
        None
    }

    pub fn handle_fsm_event<P: Platform, E: ExecutionPolicy>(
        &mut self,
        env: &Env<P, E>,
        event: FsmEvent,
        deferred: &mut Deferred,
    ) {
        match (self.state, event) {
            (FsmState::Idle, FsmEvent::Wakeup) => self.wake_up(env, deferred),
            (FsmState::Idle, FsmEvent::LastCommandDone) => {
                self.op_done(env.platform, deferred);
                if self.queue.done.is_empty() {
                    self.dispatch_next_event(env.platform);
                } else {
                    self.post(env.platform, FsmEvent::LastCommandDone);
                }
            }
            (FsmState::Setup, FsmEvent::PowerStep) => self.submit_setup(env),
            (FsmState::Xosc, FsmEvent::PowerStep | FsmEvent::Wakeup) => self.poll_xosc(env),
            (FsmState::Active, FsmEvent::CpeInt) => self.deliver_interim(env.platform, deferred),
            (FsmState::Active, FsmEvent::PowerStep) => self.powered_up(env.platform, deferred),
            (FsmState::Active, FsmEvent::LastCommandDone) => {
                self.op_done(env.platform, deferred);
                if !self.queue.done.is_empty() {
                    self.post(env.platform, FsmEvent::LastCommandDone);
                }
            }
            (FsmState::Active, FsmEvent::InitChangePhy) => self.init_change_phy(env, deferred),
            (FsmState::Active, FsmEvent::FinishChangePhy) => {
                self.finish_change_phy(env.platform, deferred)
            }
            (FsmState::Active, FsmEvent::PowerDown) => {
                self.power_down(env, deferred);
                self.dispatch_next_event(env.platform);
            }
            (FsmState::Active, FsmEvent::RunScheduler) => self.dispatch_next_event(env.platform),
            _ => {}
        }
    }

    /// Starts powering the core for the client owning the next pending command
    fn wake_up<P: Platform, E>(&mut self, env: &Env<P, E>, deferred: &mut Deferred) {
        let platform = env.platform;
        let next = self
            .queue
            .pending
            .head()
            .and_then(|slot| self.queue.pool.get(slot).client())
            .or(self.curr);
        let Some(next) = next else {
            warn!("wake-up without a client");
            return;
        };

        platform.set_constraint(PowerConstraint::NeedFlash);
        self.power_up_stamp = time::rtc_fraction(platform.rtc_now());

        if self.curr.is_some() && self.curr != Some(next) {
            if let Some(state) = self.client_mut(next) {
                state.update_setup = true;
                if let Some(callback) = state.subscribed(ClientEvent::SwitchClientEntered) {
                    deferred.push(Notification::Client(
                        callback,
                        next,
                        ClientEvent::SwitchClientEntered,
                    ));
                }
            }
        }
        self.curr = Some(next);

        let Some(mode) = self.client(next).map(|state| state.mode) else {
            return;
        };

        info!("waking up the RF core");
        platform.select_mode(mode.rf_mode);
        platform.set_constraint(PowerConstraint::DisallowStandby);
        platform.set_constraint(PowerConstraint::RfCoreDomain);
        self.status = CoreStatus::PoweringUp;

        if !env.attrs.xosc_hf_always_needed {
            platform.set_constraint(PowerConstraint::XoscHf);
        }
        if mode.has_ram_patches() {
            platform.ram_clocks(true);
        }

        platform.clock_enable();
        platform.cpe_disable(cpe::ALL);
        platform.cpe_enable(cpe::BOOT_DONE | cpe::LAST_CMD_DONE | cpe::PA_CHANGED);
        self.state = FsmState::Setup;
    }

    /// Synthesizer restoring the frequency of the loaded client, unless the next command sets it
    fn chained_fs(&self) -> Option<&'static RadioOp> {
        let head_sets_fs = self
            .queue
            .pending
            .head()
            .map_or(false, |slot| self.queue.pool.get(slot).starts_with_fs());
        if head_sets_fs {
            None
        } else {
            self.curr
                .and_then(|client| self.client(client))
                .and_then(|state| state.cached_fs)
        }
    }

    /// Chain of the loaded client's setup, taking the pending analog update
    fn setup_chain(
        &mut self,
        rat_start: Option<u32>,
        fs: Option<&'static RadioOp>,
    ) -> Option<SetupChain> {
        let state = self.client_mut(self.curr?)?;
        let analog_update = core::mem::take(&mut state.update_setup);
        Some(SetupChain {
            setup: state.setup,
            analog_update,
            rat_start,
            fs,
        })
    }

    /// Boots the loaded client's PHY once the core clocks run
    fn submit_setup<P: Platform, E>(&mut self, env: &Env<P, E>) {
        let platform = env.platform;
        let Some(mode) = self.curr.and_then(|client| self.client(client)).map(|state| state.mode)
        else {
            return;
        };

        rfc::apply_patches(platform, mode, false);
        platform.send_direct(DirectCmd::BusRequest(true));

        let fs = self.chained_fs();
        let Some(mut chain) = self.setup_chain(Some(self.rat0), fs) else {
            return;
        };
        self.fs_chained = fs.is_some();
        self.state = FsmState::Active;

        if self.manual_xosc {
            platform.switch_xosc_hf();
        } else if !platform.xosc_hf_ready() {
            chain.rat_start = None;
            chain.fs = None;
            self.state = FsmState::Xosc;
        }

        debug!("setup submitted");
        platform.submit_setup(&chain);
        env.global(self.curr, GlobalEvent::RadioSetup, GlobalArg::Op(chain.setup));
    }

    /// Starts the radio timer once the crystal oscillator settled
    fn poll_xosc<P: Platform, E>(&mut self, env: &Env<P, E>) {
        let platform = env.platform;
        if platform.xosc_hf_ready() {
            self.state = FsmState::Active;
            let fs = if self.fs_chained {
                self.chained_fs()
            } else {
                None
            };
            platform.submit_rat_start(self.rat0, fs);
        } else {
            platform.start(TimerId::PowerUp, XOSC_POLL_US);
        }
    }

    /// Delivers events of the command that raised a non terminating interrupt
    fn deliver_interim<P: Platform>(&mut self, platform: &P, deferred: &mut Deferred) {
        let Some(slot) = self.queue.cb.take() else {
            return;
        };
        let cmd = self.queue.pool.get_mut(slot);
        if !cmd.is_allocated() || cmd.rfifg.intersects(EventMask::TERMINATION) {
            return;
        }
        let events = cmd.take_events();
        if !events.is_empty() {
            self.notify_cmd(platform, slot, events, deferred);
        }
    }

    /// Finishes the power-up once the setup chain completed
    fn powered_up<P: Platform>(&mut self, platform: &P, deferred: &mut Deferred) {
        platform.release_constraint(PowerConstraint::NeedFlash);
        self.measure_power_up(platform);

        if self.fs_error() {
            self.report_fs_error(deferred);
            if self.queue.pending.head().is_some() {
                self.dispatch_next_event(platform);
            } else {
                self.post(platform, FsmEvent::LastCommandDone);
            }
        }

        let Some(client) = self.curr else {
            return;
        };
        info!("RF core active");
        if let Some(state) = self.client(client) {
            if let Some(callback) = state.power_callback {
                deferred.push(Notification::Power(callback, client, EventMask::POWER_UP));
            }
            if let Some(callback) = state.subscribed(ClientEvent::PowerUpFinished) {
                deferred.push(Notification::Client(
                    callback,
                    client,
                    ClientEvent::PowerUpFinished,
                ));
            }
        }
    }

    /// Folds the duration of the last power-up into the loaded client's estimates
    fn measure_power_up<P: Platform>(&mut self, platform: &P) {
        let lf_source = platform.lf_clock_source();
        let elapsed_us = time::rtc_elapsed_us(
            self.power_up_stamp,
            time::rtc_fraction(platform.rtc_now()),
        );
        let same_source = self.lf_source.replace(lf_source) == Some(lf_source);
        let stamp = self.power_up_stamp;
        let bg_sets_fs = self
            .queue
            .bg
            .map_or(false, |slot| self.queue.pool.get(slot).starts_with_fs());

        // Fixed durations configured by the client are kept as they are
        let Some(state) = self
            .curr
            .and_then(|client| self.client_mut(client))
            .filter(|state| state.measure_power_up)
        else {
            return;
        };
        if !same_source {
            state.timing.power_up_us = DEFAULT_POWER_UP_US;
            state.timing.power_up_fs_us = DEFAULT_POWER_UP_US;
        } else if stamp != 0 {
            let estimate = if bg_sets_fs {
                &mut state.timing.power_up_fs_us
            } else {
                &mut state.timing.power_up_us
            };
            *estimate = Timing::updated_power_up(*estimate, elapsed_us);
            trace!("power-up took {} us", elapsed_us);
        }
    }

    /// Loads the PHY of the client owning the next pending command
    fn init_change_phy<P: Platform, E>(&mut self, env: &Env<P, E>, deferred: &mut Deferred) {
        let platform = env.platform;
        if self.status != CoreStatus::Active || self.queue.is_running() {
            return;
        }
        let Some(head) = self.queue.pending.head() else {
            return;
        };
        let Some(next) = self.queue.pool.get(head).client() else {
            return;
        };

        info!("switching PHY");
        self.status = CoreStatus::PhySwitching;
        self.cpe_mode = CpeMode::ChangePhy;
        platform.stop(TimerId::Inactivity);
        self.switch_stamp = time::rtc_fraction(platform.rtc_now());
        platform.set_constraint(PowerConstraint::NeedFlash);
        self.curr = Some(next);

        let Some(state) = self.client_mut(next) else {
            return;
        };
        if let Some(callback) = state.subscribed(ClientEvent::SwitchClientEntered) {
            deferred.push(Notification::Client(
                callback,
                next,
                ClientEvent::SwitchClientEntered,
            ));
        }
        rfc::apply_patches(platform, state.mode, true);
        state.update_setup = true;

        let fs = self.chained_fs();
        if self.queue.pool.get(head).starts_with_fs() {
            // The switch then ends with the synthesizer, which would skew the measurement
            self.switch_stamp = 0;
        }
        self.fs_chained = fs.is_some();
        let Some(chain) = self.setup_chain(None, fs) else {
            return;
        };

        platform.submit_setup(&chain);
        env.global(self.curr, GlobalEvent::RadioSetup, GlobalArg::Op(chain.setup));
    }

    fn finish_change_phy<P: Platform>(&mut self, platform: &P, deferred: &mut Deferred) {
        platform.release_constraint(PowerConstraint::NeedFlash);
        if self.fs_error() {
            self.report_fs_error(deferred);
        }

        if self.switch_stamp != 0 {
            let elapsed_us = time::rtc_elapsed_us(
                self.switch_stamp,
                time::rtc_fraction(platform.rtc_now()),
            );
            if let Some(state) = self.curr.and_then(|client| self.client_mut(client)) {
                state.timing.phy_switching_us = elapsed_us;
            }
            self.switch_stamp = 0;
        }

        self.cpe_mode = CpeMode::Active;
        self.status = CoreStatus::Active;
        if !self.queue.done.is_empty() {
            self.post(platform, FsmEvent::LastCommandDone);
        }
        debug!("PHY switched");
        self.dispatch_next_event(platform);
    }

    /// Suspends the RAT channels if nothing needs the core soon
    fn release_rat_channels<P: Platform>(&mut self, platform: &P) -> bool {
        if self.constraints.contains(Constraint::CmdQ)
            || self.constraints.contains(Constraint::Disallow)
        {
            return false;
        }
        if self.next_dispatch_delay(platform) == Some(0) || self.rat.has_pending_interrupts() {
            return false;
        }
        self.rat.suspend(&mut self.constraints);
        true
    }

    /// Powers the core down when nothing runs and nothing holds it
    fn power_down<P: Platform, E>(&mut self, env: &Env<P, E>, deferred: &mut Deferred) {
        let platform = env.platform;
        if self.status != CoreStatus::Active
            || self.queue.is_running()
            || !self.release_rat_channels(platform)
        {
            return;
        }

        info!("powering the RF core down");
        self.status = CoreStatus::PoweringDown;
        platform.stop(TimerId::Inactivity);

        platform.cpe_disable(cpe::ALL);
        platform.hw_disable(rfc::hw::ALL);
        self.cpe_mode = CpeMode::PowerFsm;

        let elapsed_us = time::rtc_elapsed_us(
            self.power_up_stamp,
            time::rtc_fraction(platform.rtc_now()),
        );
        self.active_time_us = self.active_time_us.saturating_add(elapsed_us);
        if self.rat_sync_due() {
            if platform.rat_running() {
                self.rat0 = platform.rat_sync_stop();
                trace!("radio timer synchronized");
            }
            self.rat_synced = true;
            self.active_time_us = 0;
        }

        platform.synth_off();
        platform.clock_disable();
        env.global(self.curr, GlobalEvent::RadioPowerDown, GlobalArg::None);

        platform.release_constraint(PowerConstraint::DisallowStandby);
        platform.release_constraint(PowerConstraint::RfCoreDomain);
        if self.num_clients == 0 {
            if let Some(client) = self.curr {
                platform.sem_post(client);
            }
        }
        if !env.attrs.xosc_hf_always_needed {
            platform.release_constraint(PowerConstraint::XoscHf);
        }
        if core::mem::take(&mut self.manual_xosc) {
            platform.release_constraint(PowerConstraint::SwitchXoscHfManually);
        }

        self.state = FsmState::Idle;
        self.status = CoreStatus::Idle;

        let mut src = radio_free::REQACCESS;
        if self.queue.all_done() {
            src |= radio_free::PREEMPT | radio_free::CMDREJECT;
        }
        self.issue_radio_free(platform, src, deferred);
    }
}
