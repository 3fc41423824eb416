//! Point-in-time copy of the loop counters.

use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopSnapshot {
    pub uptime: Duration,
    pub ticks: u64,
    pub overruns: u64,
    pub skipped_ticks: u64,
    pub fingers_matched: u64,
    pub key_downs: u64,
    pub key_ups: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub signals_received: u64,
}

impl LoopSnapshot {
    /// Average tick rate over the session.
    pub fn ticks_per_second(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.ticks as f64 / secs
        } else {
            0.0
        }
    }

    /// Share of ticks that overran the period, in [0, 1].
    pub fn overrun_rate(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            self.overruns as f64 / self.ticks as f64
        }
    }

    /// Uptime as `1h 02m 03s`, `2m 03s` or `3s`.
    pub fn uptime_human(&self) -> String {
        let total = self.uptime.as_secs();
        let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
        if h > 0 {
            format!("{}h {:02}m {:02}s", h, m, s)
        } else if m > 0 {
            format!("{}m {:02}s", m, s)
        } else {
            format!("{}s", s)
        }
    }
}

impl fmt::Display for LoopSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] ticks {} ({:.1}/s, {:.0}% overrun, {} skipped) | keys {} down / {} up",
            self.uptime_human(),
            self.ticks,
            self.ticks_per_second(),
            self.overrun_rate() * 100.0,
            self.skipped_ticks,
            self.key_downs,
            self.key_ups
        )?;
        if self.frames_sent > 0 || self.frames_dropped > 0 {
            write!(f, " | frames {} sent / {} dropped", self.frames_sent, self.frames_dropped)?;
        }
        if self.signals_received > 0 {
            write!(f, " | signals {} received", self.signals_received)?;
        }
        Ok(())
    }
}
