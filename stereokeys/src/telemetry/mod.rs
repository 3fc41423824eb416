//! Control loop telemetry.
//!
//! Lock-free counters updated by the loop, copied into a snapshot for
//! display:
//!
//! ```text
//! ControlLoop ─────► LoopMetrics ─────► LoopSnapshot ─────► Views
//!                    (atomic counters)  (point-in-time copy) (CLI summary, logs)
//! ```

mod metrics;
mod snapshot;

pub use metrics::LoopMetrics;
pub use snapshot::LoopSnapshot;
