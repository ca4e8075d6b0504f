use super::fsm::{FsmState, XOSC_POLL_US};
use super::*;
use crate::client::{ErrorCode, Timing, DEFAULT_PHY_SWITCHING_US, DEFAULT_POWER_UP_US};
use crate::event::ClientEvent;
use crate::hw::clock::Clocks;
use crate::hw::fake::{fire, pump, FakePlatform};
use crate::hw::rfc::{self, cpe};
use crate::op::{command, status, Trigger};
use crate::rat::DEFAULT_AVAILABLE_CHANNELS;
use crate::time::{self, us_to_ticks};
use serial_test::serial;
use std::sync::Mutex as StdMutex;

static MODE_A: Mode = Mode::new(1);
static MODE_B: Mode = Mode::new(2);
static SETUP_A: RadioOp = RadioOp::new(command::PROP_RADIO_DIV_SETUP);
static SETUP_B: RadioOp = RadioOp::new(command::RADIO_SETUP);
static OP_A: RadioOp = RadioOp::new(0x3801);
static OP_B: RadioOp = RadioOp::new(0x3802);

fn driver() -> RfDriver<FakePlatform> {
    RfDriver::new(FakePlatform::new(), HwAttrs::default())
}

fn open_a(driver: &RfDriver<FakePlatform>) -> Client {
    driver.open(&MODE_A, &SETUP_A, &Params::default()).unwrap()
}

fn open_b(driver: &RfDriver<FakePlatform>) -> Client {
    driver.open(&MODE_B, &SETUP_B, &Params::default()).unwrap()
}

fn pending_handles(driver: &RfDriver<FakePlatform>) -> Vec<CmdHandle> {
    driver.with_core(|core, _, _| {
        core.queue
            .pending
            .iter()
            .map(|slot| core.queue.pool.get(slot).handle())
            .collect()
    })
}

#[test]
fn test_open_rejects_unsupported_mode() {
    let driver = driver();
    driver.platform().supported_modes.set(1 << 2);

    assert_eq!(
        driver.open(&MODE_A, &SETUP_A, &Params::default()),
        Err(Error::UnsupportedMode)
    );
    assert!(driver.open(&MODE_B, &SETUP_B, &Params::default()).is_ok());
}

#[test]
fn test_open_fails_without_free_client_slot() {
    let driver = driver();
    let a = open_a(&driver);
    let _b = open_b(&driver);

    assert_eq!(
        driver.open(&MODE_A, &SETUP_A, &Params::default()),
        Err(Error::NoClientSlot)
    );

    driver.close(a);
    assert_eq!(open_a(&driver), a);
}

#[test]
fn test_first_open_initializes_board() {
    static SEEN: StdMutex<Vec<GlobalEvent>> = StdMutex::new(Vec::new());
    fn global_callback(_client: Option<Client>, event: GlobalEvent, _arg: GlobalArg) {
        SEEN.lock().unwrap().push(event);
    }

    let attrs = HwAttrs {
        hwi_priority: 3,
        swi_priority: 5,
        xosc_hf_always_needed: true,
        global_callback: Some(global_callback),
        global_event_mask: GlobalEvent::Init.bit(),
    };
    let driver = RfDriver::new(FakePlatform::new(), attrs);
    let platform = driver.platform();

    let a = open_a(&driver);
    let b = open_b(&driver);
    assert_eq!(*SEEN.lock().unwrap(), vec![GlobalEvent::Init]);
    assert_eq!(platform.priorities.get(), (3, 5));
    assert!(platform.holds(PowerConstraint::XoscHf));

    driver.close(a);
    assert!(platform.holds(PowerConstraint::XoscHf));
    driver.close(b);
    assert!(!platform.holds(PowerConstraint::XoscHf));
}

#[test]
fn test_post_with_absolute_start_waits_for_wakeup() {
    static TIMED: RadioOp = RadioOp::new(0x3801).with_start(Trigger::AbsTime, us_to_ticks(50_000));

    let driver = driver();
    let platform = driver.platform();
    let client = open_a(&driver);

    driver
        .post(client, &TIMED, Priority::Normal, None, EventMask::NONE)
        .unwrap();
    pump(&driver);

    let delay_us = platform.timer(TimerId::PowerUp).unwrap();
    assert!(delay_us > 0 && delay_us < 50_000);
    assert!(platform.setups.borrow().is_empty());
    assert!(platform.submitted.borrow().is_empty());

    fire(&driver, TimerId::PowerUp);
    assert_eq!(platform.setups.borrow().len(), 1);
    assert_eq!(*platform.submitted.borrow(), vec![&TIMED]);
}

#[test]
fn test_post_powers_up_and_delivers_completion() {
    static DONE: StdMutex<Vec<(u16, EventMask)>> = StdMutex::new(Vec::new());
    fn callback(_client: Client, handle: CmdHandle, events: EventMask) {
        DONE.lock().unwrap().push((handle.value(), events));
    }

    let driver = driver();
    let platform = driver.platform();
    let client = open_a(&driver);

    let handle = driver
        .post(client, &OP_A, Priority::Normal, Some(callback), EventMask::NONE)
        .unwrap();
    pump(&driver);

    let setups = platform.setups.borrow().clone();
    assert_eq!(setups.len(), 1);
    assert!(core::ptr::eq(setups[0].setup, &SETUP_A));
    assert!(setups[0].rat_start.is_some());
    assert_eq!(*platform.submitted.borrow(), vec![&OP_A]);
    assert_eq!(driver.get_info(client, InfoType::CurrentCmd), Ok(Info::CurrentCmd(Some(handle))));
    assert_eq!(driver.get_info(client, InfoType::RadioActive), Ok(Info::RadioActive(true)));
    assert!(driver.get_cmd_op(client, handle).is_some());

    platform.finish(cpe::LAST_CMD_DONE);
    pump(&driver);

    assert_eq!(*DONE.lock().unwrap(), vec![(handle.value(), EventMask::LAST_CMD_DONE)]);
    assert_eq!(driver.get_info(client, InfoType::CurrentCmd), Ok(Info::CurrentCmd(None)));
    assert_eq!(driver.get_cmd_op(client, handle), None);
    assert_eq!(driver.pend(client, handle, EventMask::NONE), EventMask::LAST_CMD_DONE);
}

#[test]
fn test_foreground_command_joins_running_background() {
    static RX: RadioOp = RadioOp::new(command::IEEE_RX);
    static TX: RadioOp = RadioOp::new(command::IEEE_TX);
    static DONE: StdMutex<Vec<(u16, EventMask)>> = StdMutex::new(Vec::new());
    fn callback(_client: Client, handle: CmdHandle, events: EventMask) {
        DONE.lock().unwrap().push((handle.value(), events));
    }

    let driver = driver();
    let platform = driver.platform();
    let client = open_a(&driver);
    let params = ScheduleParams::new();

    let rx = driver
        .schedule(client, &RX, &params, Some(callback), EventMask::NONE)
        .unwrap();
    pump(&driver);
    let tx = driver
        .schedule(client, &TX, &params, Some(callback), EventMask::NONE)
        .unwrap();
    pump(&driver);

    assert_eq!(*platform.submitted.borrow(), vec![&RX, &TX]);

    platform.cpe_flags.set(cpe::LAST_FG_CMD_DONE);
    pump(&driver);

    assert_eq!(*DONE.lock().unwrap(), vec![(tx.value(), EventMask::LAST_FG_CMD_DONE)]);
    assert_eq!(driver.get_info(client, InfoType::CurrentCmd), Ok(Info::CurrentCmd(Some(rx))));
}

#[test]
fn test_earlier_command_of_other_client_is_scheduled_first() {
    static LATE: RadioOp = RadioOp::new(0x3801).with_start(Trigger::AbsTime, us_to_ticks(100_000));
    static EARLY: RadioOp = RadioOp::new(0x3802).with_start(Trigger::AbsTime, us_to_ticks(10_000));

    let driver = driver();
    let platform = driver.platform();
    let a = open_a(&driver);
    let b = open_b(&driver);

    let late = driver
        .schedule(a, &LATE, &ScheduleParams::new(), None, EventMask::NONE)
        .unwrap();
    let late_wakeup = platform.timer(TimerId::PowerUp).unwrap();

    let params = ScheduleParams {
        end_time: us_to_ticks(15_000),
        end_type: EndType::Abs,
        allow_delay: false,
        ..ScheduleParams::new()
    };
    let early = driver.schedule(b, &EARLY, &params, None, EventMask::NONE).unwrap();

    assert_eq!(pending_handles(&driver), vec![early, late]);
    assert!(platform.timer(TimerId::PowerUp).unwrap() < late_wakeup);
}

#[test]
fn test_schedule_rejects_command_that_fits_nowhere() {
    static FREED: StdMutex<Vec<Client>> = StdMutex::new(Vec::new());
    fn client_callback(client: Client, event: ClientEvent) {
        assert_eq!(event, ClientEvent::RadioFree);
        FREED.lock().unwrap().push(client);
    }

    let driver = driver();
    let a = open_a(&driver);
    let params = Params {
        client_event_callback: Some(client_callback),
        client_event_mask: ClientEvent::RadioFree.bit(),
        ..Params::default()
    };
    let b = driver.open(&MODE_B, &SETUP_B, &params).unwrap();

    driver
        .post(a, &OP_A, Priority::Normal, None, EventMask::NONE)
        .unwrap();
    pump(&driver);

    let strict = ScheduleParams {
        allow_delay: false,
        ..ScheduleParams::new()
    };
    driver.post(a, &OP_A, Priority::Normal, None, EventMask::NONE).unwrap();
    assert_eq!(
        driver.schedule(b, &OP_B, &strict, None, EventMask::NONE),
        Err(Error::ScheduleError)
    );

    driver.platform().finish(cpe::LAST_CMD_DONE);
    pump(&driver);
    driver.platform().finish(cpe::LAST_CMD_DONE);
    pump(&driver);
    assert_eq!(*FREED.lock().unwrap(), vec![b]);
}

#[test]
fn test_flush_cancels_pending_commands_and_keeps_running_one() {
    static DONE: StdMutex<Vec<(u16, EventMask)>> = StdMutex::new(Vec::new());
    fn callback(_client: Client, handle: CmdHandle, events: EventMask) {
        DONE.lock().unwrap().push((handle.value(), events));
    }

    let driver = driver();
    let client = open_a(&driver);
    let handles: Vec<CmdHandle> = (0..4)
        .map(|_| {
            driver
                .post(client, &OP_A, Priority::Normal, Some(callback), EventMask::NONE)
                .unwrap()
        })
        .collect();
    pump(&driver);
    assert_eq!(pending_handles(&driver), handles[1..].to_vec());

    driver.flush(client, handles[1], CancelMode::default()).unwrap();
    pump(&driver);

    let expected: Vec<(u16, EventMask)> = handles[1..]
        .iter()
        .map(|handle| (handle.value(), EventMask::CANCELLED))
        .collect();
    assert_eq!(*DONE.lock().unwrap(), expected);
    assert!(pending_handles(&driver).is_empty());
    assert_eq!(
        driver.get_info(client, InfoType::CurrentCmd),
        Ok(Info::CurrentCmd(Some(handles[0])))
    );
    assert_eq!(
        driver.cancel(client, handles[2], CancelMode::default()),
        Err(Error::InvalidParams)
    );
}

#[test]
fn test_abort_delivers_interim_events_before_abort() {
    static DONE: StdMutex<Vec<EventMask>> = StdMutex::new(Vec::new());
    fn callback(_client: Client, _handle: CmdHandle, events: EventMask) {
        DONE.lock().unwrap().push(events);
    }

    let driver = driver();
    let platform = driver.platform();
    let client = open_a(&driver);

    let handle = driver
        .post(client, &OP_A, Priority::Normal, Some(callback), EventMask::RX_OK)
        .unwrap();
    pump(&driver);

    platform.cpe_flags.set(EventMask::RX_OK.cpe_flags());
    driver.cancel(client, handle, CancelMode::default()).unwrap();
    assert!(platform.directs.borrow().contains(&DirectCmd::Abort));
    pump(&driver);

    assert_eq!(*DONE.lock().unwrap(), vec![EventMask::RX_OK, EventMask::ABORTED]);
}

#[test]
fn test_graceful_cancel_stops_running_command() {
    let driver = driver();
    let platform = driver.platform();
    let client = open_a(&driver);

    let handle = driver
        .post(client, &OP_A, Priority::Normal, None, EventMask::NONE)
        .unwrap();
    pump(&driver);

    let mode = CancelMode {
        graceful: true,
        preempt: false,
    };
    driver.cancel(client, CmdHandle::FLUSH_ALL, mode).unwrap();
    assert!(platform.directs.borrow().contains(&DirectCmd::Stop));
    assert!(driver.with_core(|core, _, _| {
        let slot = core.queue.pool.find(client, handle, true).unwrap();
        core.queue.pool.get(slot).pastifg.contains(EventMask::STOPPED)
    }));
}

#[test]
fn test_pend_returns_events_that_already_occurred() {
    let driver = driver();
    let platform = driver.platform();
    let client = open_a(&driver);

    let handle = driver
        .post(client, &OP_A, Priority::Normal, None, EventMask::RX_OK)
        .unwrap();
    pump(&driver);
    platform.cpe_flags.set(EventMask::RX_OK.cpe_flags());
    pump(&driver);

    assert_eq!(driver.pend(client, handle, EventMask::RX_OK), EventMask::RX_OK);
}

#[test]
fn test_phy_switch_between_clients() {
    let driver = driver();
    let platform = driver.platform();
    let a = open_a(&driver);
    let b = open_b(&driver);

    driver.post(a, &OP_A, Priority::Normal, None, EventMask::NONE).unwrap();
    driver.post(b, &OP_B, Priority::Normal, None, EventMask::NONE).unwrap();
    pump(&driver);
    assert_eq!(*platform.submitted.borrow(), vec![&OP_A]);

    platform.finish(cpe::LAST_CMD_DONE);
    pump(&driver);

    let setups = platform.setups.borrow().clone();
    assert_eq!(setups.len(), 2);
    assert!(core::ptr::eq(setups[1].setup, &SETUP_B));
    assert!(setups[1].rat_start.is_none());
    assert_eq!(*platform.submitted.borrow(), vec![&OP_A, &OP_B]);
    assert!(matches!(
        driver.get_info(b, InfoType::ClientSwitchingTime),
        Ok(Info::SwitchingTimeUs(_))
    ));
}

fn post_and_finish(driver: &RfDriver<FakePlatform>, client: Client, op: &'static RadioOp) {
    driver.post(client, op, Priority::Normal, None, EventMask::NONE).unwrap();
    pump(driver);
    driver.platform().finish(cpe::LAST_CMD_DONE);
    pump(driver);
}

#[test]
fn test_phy_switch_measures_switching_time() {
    let driver = driver();
    let platform = driver.platform();
    platform.setup_us.set(600);
    let a = open_a(&driver);
    let b = open_b(&driver);

    post_and_finish(&driver, a, &OP_A);
    post_and_finish(&driver, b, &OP_B);

    let measured_us = time::rtc_elapsed_us(0, ((600u64 << 32) / 1_000_000) as u32);
    assert_eq!(
        driver.get_info(b, InfoType::ClientSwitchingTime),
        Ok(Info::SwitchingTimeUs([DEFAULT_PHY_SWITCHING_US, measured_us]))
    );
}

#[test]
fn test_switch_client_entered_only_when_client_changes() {
    static ENTERED: StdMutex<Vec<Client>> = StdMutex::new(Vec::new());
    fn client_callback(client: Client, event: ClientEvent) {
        if event == ClientEvent::SwitchClientEntered {
            ENTERED.lock().unwrap().push(client);
        }
    }

    let driver = driver();
    let platform = driver.platform();
    let params = Params {
        inactivity_timeout_us: 0,
        client_event_callback: Some(client_callback),
        client_event_mask: ClientEvent::SwitchClientEntered.bit(),
        ..Params::default()
    };
    let a = driver.open(&MODE_A, &SETUP_A, &params).unwrap();
    let b = driver.open(&MODE_B, &SETUP_B, &params).unwrap();

    post_and_finish(&driver, a, &OP_A);
    assert!(ENTERED.lock().unwrap().is_empty());
    assert!(!platform.clock_on.get());

    driver.post(b, &OP_B, Priority::Normal, None, EventMask::NONE).unwrap();
    pump(&driver);
    assert_eq!(*ENTERED.lock().unwrap(), vec![b]);

    let setups = platform.setups.borrow().clone();
    assert_eq!(setups.len(), 2);
    assert!(setups[0].analog_update);
    assert!(core::ptr::eq(setups[1].setup, &SETUP_B));
    assert!(setups[1].analog_update);
}

#[test]
fn test_fixed_power_up_duration_survives_boots() {
    let driver = driver();
    let params = Params {
        power_up_duration_us: 1200,
        inactivity_timeout_us: 0,
        ..Params::default()
    };
    let client = driver.open(&MODE_A, &SETUP_A, &params).unwrap();

    post_and_finish(&driver, client, &OP_A);
    post_and_finish(&driver, client, &OP_A);

    let timing = driver.with_core(|core, _, _| core.client(client).unwrap().timing);
    assert_eq!(timing.power_up_us, 1200);
    assert_eq!(timing.power_up_fs_us, 1200);
}

#[test]
fn test_power_up_duration_is_measured() {
    let driver = driver();
    let platform = driver.platform();
    platform.advance_us(10);
    platform.setup_us.set(600);
    let params = Params {
        inactivity_timeout_us: 0,
        ..Params::default()
    };
    let client = driver.open(&MODE_A, &SETUP_A, &params).unwrap();

    // The first boot only records the clock source
    post_and_finish(&driver, client, &OP_A);
    let timing = driver.with_core(|core, _, _| core.client(client).unwrap().timing);
    assert_eq!(timing.power_up_us, DEFAULT_POWER_UP_US);

    post_and_finish(&driver, client, &OP_A);
    let measured_us = time::rtc_elapsed_us(0, ((600u64 << 32) / 1_000_000) as u32);
    let timing = driver.with_core(|core, _, _| core.client(client).unwrap().timing);
    assert_eq!(
        timing.power_up_us,
        Timing::updated_power_up(DEFAULT_POWER_UP_US, measured_us)
    );
    assert_eq!(timing.power_up_fs_us, DEFAULT_POWER_UP_US);
}

#[test]
fn test_rat_starts_after_crystal_oscillator_settles() {
    let driver = driver();
    let platform = driver.platform();
    platform.xosc_ready.set(false);
    let client = open_a(&driver);

    driver.post(client, &OP_A, Priority::Normal, None, EventMask::NONE).unwrap();
    pump(&driver);

    assert_eq!(driver.with_core(|core, _, _| core.state), FsmState::Xosc);
    assert_eq!(platform.timer(TimerId::PowerUp), Some(XOSC_POLL_US));
    assert_eq!(platform.setups.borrow().len(), 1);
    assert!(platform.setups.borrow()[0].rat_start.is_none());
    assert!(platform.rat_starts.borrow().is_empty());
    assert!(platform.submitted.borrow().is_empty());

    fire(&driver, TimerId::PowerUp);
    assert_eq!(driver.with_core(|core, _, _| core.state), FsmState::Xosc);
    assert_eq!(platform.timer(TimerId::PowerUp), Some(XOSC_POLL_US));
    assert!(platform.rat_starts.borrow().is_empty());

    platform.xosc_ready.set(true);
    fire(&driver, TimerId::PowerUp);
    assert_eq!(driver.with_core(|core, _, _| core.state), FsmState::Active);
    assert_eq!(*platform.rat_starts.borrow(), vec![(0, None)]);
    assert_eq!(*platform.submitted.borrow(), vec![&OP_A]);
}

#[test]
fn test_first_power_down_resyncs_rat() {
    let driver = driver();
    let platform = driver.platform();
    let params = Params {
        inactivity_timeout_us: 0,
        ..Params::default()
    };
    let client = driver.open(&MODE_A, &SETUP_A, &params).unwrap();

    driver.post(client, &OP_A, Priority::Normal, None, EventMask::NONE).unwrap();
    pump(&driver);
    platform.rat.set(40_000);
    platform.finish(cpe::LAST_CMD_DONE);
    pump(&driver);
    assert!(!platform.clock_on.get());
    assert_eq!(driver.with_core(|core, _, _| core.rat0), 40_000);

    // Powered for no measurable time, well below the drift budget
    driver.post(client, &OP_A, Priority::Normal, None, EventMask::NONE).unwrap();
    pump(&driver);
    assert_eq!(platform.setups.borrow()[1].rat_start, Some(40_000));
    platform.rat.set(90_000);
    platform.finish(cpe::LAST_CMD_DONE);
    pump(&driver);
    assert!(!platform.clock_on.get());
    assert_eq!(driver.with_core(|core, _, _| core.rat0), 40_000);
}

#[test]
fn test_synth_error_of_cached_fs_reported_on_wakeup() {
    static FS_A: RadioOp = RadioOp::new(command::FS);
    static ERRORS: StdMutex<Vec<(Client, ErrorCode)>> = StdMutex::new(Vec::new());
    static POWERED: StdMutex<Vec<Client>> = StdMutex::new(Vec::new());
    static CLIENT_EVENTS: StdMutex<Vec<ClientEvent>> = StdMutex::new(Vec::new());
    fn error_callback(client: Client, error: ErrorCode, _events: EventMask) {
        ERRORS.lock().unwrap().push((client, error));
    }
    fn power_callback(client: Client, _events: EventMask) {
        POWERED.lock().unwrap().push(client);
    }
    fn client_callback(_client: Client, event: ClientEvent) {
        CLIENT_EVENTS.lock().unwrap().push(event);
    }

    let driver = driver();
    let platform = driver.platform();
    let params = Params {
        inactivity_timeout_us: 0,
        power_callback: Some(power_callback),
        error_callback: Some(error_callback),
        client_event_callback: Some(client_callback),
        client_event_mask: ClientEvent::PowerUpFinished.bit(),
        ..Params::default()
    };
    let client = driver.open(&MODE_A, &SETUP_A, &params).unwrap();

    post_and_finish(&driver, client, &FS_A);
    assert!(ERRORS.lock().unwrap().is_empty());
    assert!(!platform.clock_on.get());

    FS_A.set_status(status::ERROR_SYNTH_PROG);
    driver.post(client, &OP_A, Priority::Normal, None, EventMask::NONE).unwrap();
    pump(&driver);

    assert_eq!(platform.setups.borrow()[1].fs, Some(&FS_A));
    assert_eq!(*ERRORS.lock().unwrap(), vec![(client, ErrorCode::CmdFsSynthProg)]);
    assert_eq!(*POWERED.lock().unwrap(), vec![client, client]);
    assert_eq!(
        *CLIENT_EVENTS.lock().unwrap(),
        vec![ClientEvent::PowerUpFinished, ClientEvent::PowerUpFinished]
    );
}

#[test]
fn test_synth_error_of_cached_fs_reported_on_phy_switch() {
    static FS_B: RadioOp = RadioOp::new(command::FS);
    static ERRORS: StdMutex<Vec<(Client, ErrorCode)>> = StdMutex::new(Vec::new());
    fn error_callback(client: Client, error: ErrorCode, _events: EventMask) {
        ERRORS.lock().unwrap().push((client, error));
    }

    let driver = driver();
    let platform = driver.platform();
    let a = open_a(&driver);
    let params = Params {
        error_callback: Some(error_callback),
        ..Params::default()
    };
    let b = driver.open(&MODE_B, &SETUP_B, &params).unwrap();

    post_and_finish(&driver, b, &FS_B);
    post_and_finish(&driver, a, &OP_A);
    assert!(ERRORS.lock().unwrap().is_empty());
    assert_eq!(platform.setups.borrow()[1].fs, None);

    FS_B.set_status(status::ERROR_SYNTH_PROG);
    driver.post(b, &OP_B, Priority::Normal, None, EventMask::NONE).unwrap();
    pump(&driver);

    let setups = platform.setups.borrow().clone();
    assert_eq!(setups.len(), 3);
    assert!(core::ptr::eq(setups[2].setup, &SETUP_B));
    assert_eq!(setups[2].fs, Some(&FS_B));
    assert_eq!(*ERRORS.lock().unwrap(), vec![(b, ErrorCode::CmdFsSynthProg)]);
}

#[test]
fn test_direct_commands_need_loaded_client() {
    let driver = driver();
    let platform = driver.platform();
    let a = open_a(&driver);
    let b = open_b(&driver);

    assert_eq!(driver.run_direct(a, 0x0401), Err(Error::InvalidParams));

    driver.post(a, &OP_A, Priority::Normal, None, EventMask::NONE).unwrap();
    pump(&driver);

    assert_eq!(driver.run_direct(a, 0x0401), Ok(rfc::CMDSTA_DONE));
    assert!(platform.directs.borrow().contains(&DirectCmd::Raw(0x0401)));
    assert_eq!(driver.run_immediate(a, &OP_B), Ok(rfc::CMDSTA_DONE));

    platform.direct_value.set(0xC4);
    assert_eq!(driver.get_rssi(a), -60);
    assert_eq!(driver.get_rssi(b), RSSI_INVALID);

    platform.cmdsta.set(0x81);
    platform.direct_value.set(0);
    assert_eq!(driver.run_direct(a, 0x0401), Err(Error::CmdDoneError));
    assert_eq!(driver.get_rssi(a), RSSI_INVALID);
}

#[test]
fn test_control_options() {
    let driver = driver();
    let platform = driver.platform();
    let client = open_a(&driver);

    assert_eq!(driver.control(client, Control::HwiPriority(7)), Ok(()));
    assert_eq!(driver.control(client, Control::SwiPriority(9)), Ok(()));
    assert_eq!(platform.priorities.get(), (7, 9));

    driver.control(client, Control::UpdateSetup).unwrap();
    let (power_up_us, update_setup) = driver.with_core(|core, _, _| {
        let state = core.client(client).unwrap();
        (state.timing.power_up_us, state.update_setup)
    });
    assert_eq!(power_up_us, crate::client::DEFAULT_POWER_UP_US + ANALOG_CFG_TIME_US);
    assert!(update_setup);

    driver.control(client, Control::AvailableRatChannels(0b001)).unwrap();
    assert_eq!(
        driver.get_info(client, InfoType::AvailableRatChannels),
        Ok(Info::AvailableRatChannels(0b001))
    );

    driver.control(client, Control::PowerMgmt(false)).unwrap();
    assert!(driver.with_core(|core, _, _| core.constraints.contains(Constraint::Disallow)));
    driver.control(client, Control::PowerMgmt(true)).unwrap();
    assert!(!driver.with_core(|core, _, _| core.constraints.contains(Constraint::Disallow)));

    driver.post(client, &OP_A, Priority::Normal, None, EventMask::NONE).unwrap();
    assert_eq!(driver.control(client, Control::HwiPriority(1)), Err(Error::Busy));
}

#[test]
fn test_power_management_lock_keeps_core_on() {
    let driver = driver();
    let platform = driver.platform();
    let client = open_a(&driver);

    driver.control(client, Control::PowerMgmt(false)).unwrap();
    driver.post(client, &OP_A, Priority::Normal, None, EventMask::NONE).unwrap();
    pump(&driver);
    platform.finish(cpe::LAST_CMD_DONE);
    pump(&driver);

    driver.yield_radio(client);
    pump(&driver);
    assert!(platform.clock_on.get());

    driver.control(client, Control::PowerMgmt(true)).unwrap();
    pump(&driver);
    assert!(!platform.clock_on.get());
}

#[test]
fn test_request_access_blocks_other_client() {
    static FREED: StdMutex<Vec<Client>> = StdMutex::new(Vec::new());
    fn client_callback(client: Client, _event: ClientEvent) {
        FREED.lock().unwrap().push(client);
    }

    let driver = driver();
    let platform = driver.platform();
    let a = open_a(&driver);
    let params = Params {
        client_event_callback: Some(client_callback),
        client_event_mask: ClientEvent::RadioFree.bit(),
        ..Params::default()
    };
    let b = driver.open(&MODE_B, &SETUP_B, &params).unwrap();

    assert_eq!(
        driver.request_access(a, MAX_ACCESS_DURATION_US + 1, 0),
        Err(Error::InvalidParams)
    );
    assert_eq!(driver.request_access(a, 1000, 1), Ok(()));
    assert_eq!(platform.timer(TimerId::RequestAccess(a)), Some(1000));

    assert_eq!(driver.request_access(b, 1000, 1), Err(Error::Busy));
    assert_eq!(driver.request_access(b, 1000, 2), Err(Error::Busy));
    assert_eq!(
        driver.schedule(b, &OP_B, &ScheduleParams::new(), None, EventMask::NONE),
        Err(Error::ScheduleError)
    );
    assert!(FREED.lock().unwrap().is_empty());

    fire(&driver, TimerId::RequestAccess(a));
    assert_eq!(*FREED.lock().unwrap(), vec![b]);
    assert!(driver
        .schedule(b, &OP_B, &ScheduleParams::new(), None, EventMask::NONE)
        .is_ok());
}

#[test]
fn test_yield_powers_down_idle_core() {
    let driver = driver();
    let platform = driver.platform();
    let client = open_a(&driver);

    driver.post(client, &OP_A, Priority::Normal, None, EventMask::NONE).unwrap();
    pump(&driver);
    platform.finish(cpe::LAST_CMD_DONE);
    pump(&driver);
    assert!(platform.clock_on.get());

    driver.yield_radio(client);
    pump(&driver);
    assert!(!platform.clock_on.get());
    assert_eq!(driver.get_info(client, InfoType::RadioActive), Ok(Info::RadioActive(false)));
}

#[test]
fn test_rat_channel_is_owned_by_its_client() {
    let driver = driver();
    let platform = driver.platform();
    let a = open_a(&driver);
    let b = open_b(&driver);

    let config = crate::rat::RatConfigCompare {
        timeout: us_to_ticks(500_000),
        ..Default::default()
    };
    let handle = driver.rat_compare(a, &config, None).unwrap();
    assert!(platform.is_active(TimerId::PowerUp));
    assert_eq!(
        driver.get_info(a, InfoType::AvailableRatChannels),
        Ok(Info::AvailableRatChannels(DEFAULT_AVAILABLE_CHANNELS & !(1 << handle.index())))
    );

    assert_eq!(driver.rat_disable(b, handle), Err(Error::InvalidParams));
    assert_eq!(driver.rat_disable(a, handle), Ok(()));
    assert!(!platform.is_active(TimerId::PowerUp));
    assert_eq!(
        driver.get_info(a, InfoType::AvailableRatChannels),
        Ok(Info::AvailableRatChannels(DEFAULT_AVAILABLE_CHANNELS))
    );
}

#[test]
fn test_current_time_follows_rat_while_powered() {
    let driver = driver();
    let platform = driver.platform();
    let client = open_a(&driver);

    driver.post(client, &OP_A, Priority::Normal, None, EventMask::NONE).unwrap();
    pump(&driver);
    platform.rat.set(12_345);
    assert_eq!(driver.current_time(), 12_345);
}

#[test]
#[serial]
#[cfg_attr(miri, ignore)]
fn test_run_blocks_until_command_ends_and_close_powers_down() {
    lazy_mut! {
        static mut DRIVER: RfDriver<FakePlatform> =
            RfDriver::new(FakePlatform::new(), HwAttrs::default());
    };

    fn hook() {
        let driver = unsafe { &*DRIVER };
        let platform = driver.platform();
        if platform.running_ops.get() != 0 {
            platform.finish(cpe::LAST_CMD_DONE);
        }
        pump(driver);
    }

    unsafe { DRIVER.init() };
    let driver = unsafe { &*DRIVER };
    let platform = driver.platform();
    platform.sem_hook.set(Some(hook));
    let client = open_a(driver);

    let events = driver
        .run(client, &OP_A, Priority::Normal, None, EventMask::NONE)
        .unwrap();
    assert_eq!(events, EventMask::LAST_CMD_DONE);
    assert!(platform.clock_on.get());

    driver.close(client);
    assert!(!platform.clock_on.get());
    assert_eq!(
        driver.get_info(client, InfoType::RadioActive),
        Err(Error::InvalidParams)
    );
}

#[test]
#[serial]
#[cfg_attr(miri, ignore)]
fn test_close_waits_for_pending_commands() {
    lazy_mut! {
        static mut DRIVER: RfDriver<FakePlatform> =
            RfDriver::new(FakePlatform::new(), HwAttrs::default());
    };
    static DONE: StdMutex<Vec<u16>> = StdMutex::new(Vec::new());

    fn hook() {
        let driver = unsafe { &*DRIVER };
        let platform = driver.platform();
        if platform.running_ops.get() != 0 {
            platform.finish(cpe::LAST_CMD_DONE);
        }
        pump(driver);
    }

    fn callback(_client: Client, handle: CmdHandle, _events: EventMask) {
        DONE.lock().unwrap().push(handle.value());
    }

    unsafe { DRIVER.init() };
    let driver = unsafe { &*DRIVER };
    driver.platform().sem_hook.set(Some(hook));
    let client = open_a(driver);

    let first = driver
        .post(client, &OP_A, Priority::Normal, Some(callback), EventMask::NONE)
        .unwrap();
    let second = driver
        .post(client, &OP_B, Priority::Normal, Some(callback), EventMask::NONE)
        .unwrap();

    driver.close(client);
    assert_eq!(*DONE.lock().unwrap(), vec![first.value(), second.value()]);
    assert!(!driver.platform().clock_on.get());
}
