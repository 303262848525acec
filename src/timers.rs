//! Interval timers delivering real-time signals, and the `WFS` wait primitive.
//!
//! The source arms each timer via POSIX `timer_create`/`timer_settime` with
//! `sigev_value.sival_int` carrying the timer's own id, and waits for any of five
//! consecutive real-time signals with `sigwaitinfo`. Neither has a safe wrapper in the
//! ecosystem, so this module is a thin, narrowly scoped `libc` FFI boundary.

use std::mem::MaybeUninit;
use std::time::Duration;

use crate::consts::MAX_TIMERS;
use crate::error::VmError;

/// Five consecutive real-time signal offsets from `SIGRTMIN`, matching the notification
/// kinds the external-variable bridge can deliver plus the plain interval timer.
pub const SIG_TIMER_OFFSET: i32 = 5;
pub const SIG_VAR_MODIFIED_OFFSET: i32 = 6;
pub const SIG_VAR_CALC_OFFSET: i32 = 7;
pub const SIG_VAR_VALIDATE_OFFSET: i32 = 8;
pub const SIG_VAR_PRINT_OFFSET: i32 = 9;

fn rt_signal(offset: i32) -> i32 {
    unsafe { libc::SIGRTMIN() + offset }
}

/// One signal delivery observed by `WFS`: the signal's semantic offset from
/// `SIGRTMIN` and the integer payload carried in `si_value.sival_int`.
#[derive(Debug, Clone, Copy)]
pub struct SignalEvent {
    pub signal_offset: i32,
    pub id: i32,
}

/// Up to [`MAX_TIMERS`] host interval timers, keyed by a 1-based VM-visible id (id 0 is
/// reserved as invalid). Each slot owns the `timer_t` the kernel handed back on arm.
#[derive(Debug, Default)]
pub struct TimerTable {
    timers: [Option<libc::timer_t>; MAX_TIMERS],
}

// `libc::timer_t` is an opaque kernel-owned handle; moving it between threads is fine,
// sharing requires external synchronization which `Vm`'s single-threaded loop provides.
unsafe impl Send for TimerTable {}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn teardown(&mut self, id: u32) {
        if let Some(timer) = self.timers[id as usize].take() {
            unsafe {
                libc::timer_delete(timer);
            }
        }
    }

    /// `STM id, ms`: arms a periodic timer delivering [`SIG_TIMER_OFFSET`] with
    /// `si_value.sival_int == id`. Re-arming an already-armed id tears down the old
    /// host timer and replaces it with the new interval (see DESIGN.md).
    pub fn arm(&mut self, id: u32, interval_ms: u32) -> Result<(), VmError> {
        if id == 0 || id as usize >= MAX_TIMERS {
            return Err(VmError::InvalidTimerId(id));
        }
        self.teardown(id);

        let mut sev: libc::sigevent = unsafe { MaybeUninit::zeroed().assume_init() };
        sev.sigev_notify = libc::SIGEV_SIGNAL;
        sev.sigev_signo = rt_signal(SIG_TIMER_OFFSET);
        sev.sigev_value = libc::sigval {
            sival_ptr: id as usize as *mut libc::c_void,
        };

        let mut timer: libc::timer_t = std::ptr::null_mut();
        let rc = unsafe { libc::timer_create(libc::CLOCK_MONOTONIC, &mut sev, &mut timer) };
        if rc != 0 {
            return Err(VmError::InvalidTimerId(id));
        }

        let interval = ms_to_timespec(interval_ms);
        let spec = libc::itimerspec {
            it_interval: interval,
            it_value: interval,
        };
        let rc = unsafe { libc::timer_settime(timer, 0, &spec, std::ptr::null_mut()) };
        if rc != 0 {
            unsafe {
                libc::timer_delete(timer);
            }
            return Err(VmError::InvalidTimerId(id));
        }

        self.timers[id as usize] = Some(timer);
        Ok(())
    }

    /// `CTM id`: disarms a timer. Disarming an id that was never armed is fatal.
    pub fn disarm(&mut self, id: u32) -> Result<(), VmError> {
        if id == 0 || id as usize >= MAX_TIMERS || self.timers[id as usize].is_none() {
            return Err(VmError::InvalidTimerId(id));
        }
        self.teardown(id);
        Ok(())
    }
}

impl Drop for TimerTable {
    fn drop(&mut self) {
        for id in 1..MAX_TIMERS as u32 {
            self.teardown(id);
        }
    }
}

fn ms_to_timespec(ms: u32) -> libc::timespec {
    libc::timespec {
        tv_sec: (ms / 1000) as libc::time_t,
        tv_nsec: ((ms % 1000) * 1_000_000) as libc::c_long,
    }
}

/// Blocks the calling thread awaiting one of the five real-time signals this VM
/// reserves, mirroring a `sigwaitinfo`-equivalent call. Returns the signal's semantic
/// offset and the integer payload it carried.
pub fn wait_for_signal() -> std::io::Result<SignalEvent> {
    unsafe {
        let mut set: libc::sigset_t = MaybeUninit::zeroed().assume_init();
        libc::sigemptyset(&mut set);
        for offset in [
            SIG_TIMER_OFFSET,
            SIG_VAR_MODIFIED_OFFSET,
            SIG_VAR_CALC_OFFSET,
            SIG_VAR_VALIDATE_OFFSET,
            SIG_VAR_PRINT_OFFSET,
        ] {
            libc::sigaddset(&mut set, rt_signal(offset));
        }

        let mut info: libc::siginfo_t = MaybeUninit::zeroed().assume_init();
        let signo = libc::sigwaitinfo(&set, &mut info);
        if signo < 0 {
            return Err(std::io::Error::last_os_error());
        }

        Ok(SignalEvent {
            signal_offset: signo - libc::SIGRTMIN(),
            id: info.si_value().sival_ptr as i32,
        })
    }
}

pub fn delay(ms: u32) {
    std::thread::sleep(Duration::from_millis(ms as u64));
}

#[cfg(test)]
mod tests {
    use super::{ms_to_timespec, TimerTable, MAX_TIMERS};
    use crate::error::VmError;

    #[test]
    fn timer_id_zero_is_reserved_on_both_arm_and_disarm() {
        let mut table = TimerTable::new();
        assert!(matches!(table.arm(0, 100), Err(VmError::InvalidTimerId(0))));
        assert!(matches!(table.disarm(0), Err(VmError::InvalidTimerId(0))));
    }

    #[test]
    fn timer_id_past_the_table_capacity_is_rejected() {
        let mut table = TimerTable::new();
        let out_of_range = MAX_TIMERS as u32;
        assert!(matches!(table.arm(out_of_range, 100), Err(VmError::InvalidTimerId(_))));
    }

    #[test]
    fn disarming_a_never_armed_timer_is_an_error() {
        let mut table = TimerTable::new();
        assert!(table.disarm(1).is_err());
    }

    #[test]
    fn ms_to_timespec_splits_whole_seconds_from_the_nanosecond_remainder() {
        let ts = ms_to_timespec(1_500);
        assert_eq!(ts.tv_sec, 1);
        assert_eq!(ts.tv_nsec, 500_000_000);
    }

    #[test]
    fn arming_and_then_disarming_a_real_timer_succeeds() {
        let mut table = TimerTable::new();
        table.arm(1, 60_000).expect("arming a fresh timer should succeed");
        table.disarm(1).expect("disarming an armed timer should succeed");
    }
}
