//! Fixed-rate tick scheduling.
//!
//! After each tick the scheduler sleeps for whatever is left of the period.
//! An overrunning tick is followed immediately by the next one; missed
//! periods are not made up.
//!
//! ```text
//!   |<──────── period ────────>|<──────── period ────────>|
//!   [ tick work ][   sleep    ][ tick work          ][tick ...
//!                                            overrun ─┘ no sleep
//! ```

use std::thread;
use std::time::{Duration, Instant};

/// How the end of a tick was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickTiming {
    /// Work finished early; slept for the remainder.
    Slept(Duration),
    /// Work took at least a full period; the next tick starts now.
    Overran(Duration),
}

/// Paces the control loop at a fixed frame rate.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    period: Duration,
}

impl TickScheduler {
    /// Scheduler for `fps` ticks per second. `fps` of 0 is treated as 1.
    pub fn new(fps: u32) -> Self {
        Self {
            period: Duration::from_secs(1) / fps.max(1),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time left in the period after `elapsed` of work, if any.
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.period.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    /// Finish a tick that started at `tick_start`.
    pub fn wait(&self, tick_start: Instant) -> TickTiming {
        let elapsed = tick_start.elapsed();
        match self.remaining(elapsed) {
            Some(rest) => {
                thread::sleep(rest);
                TickTiming::Slept(rest)
            }
            None => TickTiming::Overran(elapsed - self.period),
        }
    }
}
