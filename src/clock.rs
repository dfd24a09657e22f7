//! Realtime clock access behind a small seam.
//!
//! The timing loop samples the clock millions of times per second; the trait
//! exists so scenario tests can drive the loop with a scripted clock instead.

/// One reading of the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallTime {
    /// Seconds since the Unix epoch.
    pub sec: i64,
    /// Nanoseconds within the current second, `0..1_000_000_000`.
    pub nsec: u32,
}

impl WallTime {
    pub fn new(sec: i64, nsec: u32) -> Self {
        WallTime { sec, nsec }
    }

    /// Nanoseconds since the Unix epoch.
    pub fn as_nanos(&self) -> i64 {
        self.sec * 1_000_000_000 + self.nsec as i64
    }
}

/// Source of wall-clock readings.
pub trait WallClock {
    fn now(&self) -> WallTime;
}

/// `CLOCK_REALTIME`, i.e. the NTP-disciplined system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[cfg(unix)]
impl WallClock for SystemClock {
    fn now(&self) -> WallTime {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // clock_gettime(CLOCK_REALTIME) cannot fail with a valid timespec.
        unsafe {
            libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts);
        }
        WallTime {
            sec: ts.tv_sec as i64,
            nsec: ts.tv_nsec as u32,
        }
    }
}

#[cfg(not(unix))]
impl WallClock for SystemClock {
    fn now(&self) -> WallTime {
        let d = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        WallTime {
            sec: d.as_secs() as i64,
            nsec: d.subsec_nanos(),
        }
    }
}

/// Scripted clock for deterministic tests: every `now()` returns the current
/// reading, then advances it by the configured step.
#[derive(Debug)]
pub struct ManualClock {
    sec: std::cell::Cell<i64>,
    nsec: std::cell::Cell<u32>,
    step_ns: std::cell::Cell<u32>,
}

impl ManualClock {
    pub fn new(start: WallTime, step_ns: u32) -> Self {
        ManualClock {
            sec: std::cell::Cell::new(start.sec),
            nsec: std::cell::Cell::new(start.nsec),
            step_ns: std::cell::Cell::new(step_ns),
        }
    }

    /// Jump to an absolute reading (models an NTP step).
    pub fn set(&self, t: WallTime) {
        self.sec.set(t.sec);
        self.nsec.set(t.nsec);
    }

    pub fn set_step(&self, step_ns: u32) {
        self.step_ns.set(step_ns);
    }

    pub fn peek(&self) -> WallTime {
        WallTime {
            sec: self.sec.get(),
            nsec: self.nsec.get(),
        }
    }

    fn advance(&self) {
        let mut nsec = self.nsec.get() + self.step_ns.get();
        let mut sec = self.sec.get();
        while nsec >= 1_000_000_000 {
            nsec -= 1_000_000_000;
            sec += 1;
        }
        self.sec.set(sec);
        self.nsec.set(nsec);
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> WallTime {
        let t = self.peek();
        self.advance();
        t
    }
}
