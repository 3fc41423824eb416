//! Pairs top and front frame records by sequence id.

use tracing::trace;

use super::records::FrameRecord;
use crate::frame::CameraId;

/// Buffers the latest record per capture id until both cameras have
/// delivered the same sequence id.
///
/// A newer record for a camera replaces the buffered one, so a lost
/// datagram costs one pair rather than stalling the stream.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    top: Option<FrameRecord>,
    front: Option<FrameRecord>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record; returns `(top, front)` once both ids share a sequence.
    pub fn push(&mut self, record: FrameRecord) -> Option<(FrameRecord, FrameRecord)> {
        let slot = match record.camera {
            CameraId::Top => &mut self.top,
            CameraId::Front => &mut self.front,
        };
        if let Some(previous) = slot.as_ref() {
            if previous.sequence_id != record.sequence_id {
                trace!(
                    camera = %record.camera,
                    dropped = previous.sequence_id,
                    "Replacing unpaired frame record"
                );
            }
        }
        *slot = Some(record);

        let paired = matches!(
            (&self.top, &self.front),
            (Some(top), Some(front)) if top.sequence_id == front.sequence_id
        );
        if !paired {
            return None;
        }
        Some((self.top.take()?, self.front.take()?))
    }

    /// Drop any buffered records.
    pub fn clear(&mut self) {
        self.top = None;
        self.front = None;
    }
}
