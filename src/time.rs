//! Radio timer and real-time clock arithmetic
//!
//! The radio timer (RAT) ticks at 4 MHz, but only while the RF core is powered. While the core is
//! off its time is synthesized from the always-running RTC plus the RAT origin captured at the
//! last power-down. All timestamps are 32-bit and wrap; differences are taken modulo 2^32.

/// Radio timer ticks per microsecond
pub const RAT_TICKS_PER_US: u32 = 4;

/// Longest delay (us) the dispatcher is willing to wait for
///
/// Anything further in the future is treated as already in the past.
pub const DISPATCH_MAX_TIME_US: u32 = u32::MAX / RAT_TICKS_PER_US * 3 / 4;

/// Negative gap (us) below which a difference of two timestamps is taken as a wrapped positive gap
pub const DISPATCH_MAX_TIME_WRAPAROUND_US: i32 =
    DISPATCH_MAX_TIME_US.wrapping_sub(u32::MAX / RAT_TICKS_PER_US) as i32;

/// Time spent powering the core down before it can be powered up again
pub const POWER_DOWN_DURATION_US: u32 = 1000;

/// RTC increment of one 32 kHz period in the 32.32 fixed point seconds format
pub const RTC_TICK_INC: u64 = 0x1_0000_0000 / 32768;

const RAT_TICKS_PER_SECOND: u64 = 4_000_000;
const RTC_TO_US_SHIFT: u32 = 12;

/// Unsigned difference `later - earlier` in a circular 32-bit space
pub const fn udiff(earlier: u32, later: u32) -> u32 {
    later.wrapping_sub(earlier)
}

/// Converts radio timer ticks to microseconds
pub const fn ticks_to_us(ticks: u32) -> u32 {
    ticks / RAT_TICKS_PER_US
}

/// Converts microseconds to radio timer ticks
pub const fn us_to_ticks(us: u32) -> u32 {
    us.wrapping_mul(RAT_TICKS_PER_US)
}

/// Low 32 bits of a 32.32 RTC value
///
/// This is the sub-second part, wrapping once per second.
pub const fn rtc_fraction(rtc: u64) -> u32 {
    rtc as u32
}

/// Approximate microseconds between two RTC fraction stamps
pub const fn rtc_elapsed_us(start: u32, end: u32) -> u32 {
    udiff(start, end) >> RTC_TO_US_SHIFT
}

/// Synthesizes the radio timer value from the RTC while the core is powered off
///
/// `rtc` is the 32.32 fixed point RTC value and `rat0` the radio timer origin. One RTC period is
/// added to cover the coarser RTC resolution.
pub const fn rtc_to_rat(rtc: u64, rat0: u32) -> u32 {
    let ticks = rtc
        .wrapping_add(RTC_TICK_INC)
        .wrapping_mul(RAT_TICKS_PER_SECOND)
        .wrapping_add((rat0 as u64) << 32);
    (ticks >> 32) as u32
}

/// Microseconds left until the core must start preparing for the event at `abs_time`
///
/// `now` and `abs_time` are radio timer ticks, `overhead_us` is the time needed to get the core
/// ready. Returns 0 when the event is due now: when it is closer than `overhead_us` plus the
/// power-down duration, or further away than [`DISPATCH_MAX_TIME_US`] (a timestamp in the past).
/// A positive result is never below 1.
///
/// # Examples
///
/// ```
/// use rf_multimode::time::delta_to_deadline;
///
/// // 10 ms ahead, 2 ms overhead
/// assert_eq!(delta_to_deadline(0, 40_000, 2_000), 8_000);
/// // Too close to bother powering down in between
/// assert_eq!(delta_to_deadline(0, 4_000, 200), 0);
/// // Already passed
/// assert_eq!(delta_to_deadline(40_000, 0, 2_000), 0);
/// ```
pub const fn delta_to_deadline(now: u32, abs_time: u32, overhead_us: u32) -> u32 {
    let delta_us = ticks_to_us(udiff(now, abs_time));
    let window_us = overhead_us.saturating_add(POWER_DOWN_DURATION_US);

    if delta_us > window_us && delta_us <= DISPATCH_MAX_TIME_US {
        let wait = delta_us - overhead_us;
        if wait > 1 {
            wait
        } else {
            1
        }
    } else {
        0
    }
}

/// Signed gap in microseconds from `end` to `start`, both in radio timer ticks
pub const fn gap_us(end: u32, start: u32, overhead_us: u32) -> i32 {
    (ticks_to_us(start) as i32)
        .wrapping_sub(ticks_to_us(end) as i32)
        .wrapping_sub(overhead_us as i32)
}

/// Whether a signed gap from [`gap_us`] leaves room for the command
///
/// A very large negative gap is a wrapped positive one.
pub const fn gap_fits(gap: i32) -> bool {
    gap < DISPATCH_MAX_TIME_WRAPAROUND_US || gap > 0
}
