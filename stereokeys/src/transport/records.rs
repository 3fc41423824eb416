//! Fixed-size datagram records.
//!
//! # Key signal (8 bytes)
//!
//! ```text
//!   0        4     5        8
//!   ├────────┼─────┼────────┤
//!   │ code   │state│ (pad)  │   code: u32 LE, state: 0 up / 1 down
//!   └────────┴─────┴────────┘
//! ```
//!
//! # Frame record (65507 bytes)
//!
//! ```text
//!   0      2     3     4                              65507
//!   ├──────┼─────┼─────┼───────────────────────────────┤
//!   │ size │ cap │ seq │ JPEG data (size bytes used)   │
//!   └──────┴─────┴─────┴───────────────────────────────┘
//!   size: u16 LE, cap: capture id (0 top, 1 front), seq: u8 sequence id
//! ```
//!
//! A frame record always fills one maximum-size IPv4 UDP payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use thiserror::Error;

use crate::event::{KeyEvent, KeyState};
use crate::frame::{CameraId, Frame};

/// Size of an encoded key signal.
pub const KEY_SIGNAL_SIZE: usize = 8;

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Size of the frame record header.
pub const FRAME_HEADER_SIZE: usize = 4;

/// JPEG bytes a single frame record can carry.
pub const FRAME_DATA_CAPACITY: usize = MAX_DATAGRAM_SIZE - FRAME_HEADER_SIZE;

/// Record encode/decode failures.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record is {actual} bytes, expected {expected}")]
    Size { expected: usize, actual: usize },

    #[error("invalid key state byte {0}")]
    KeyState(u8),

    #[error("invalid capture id {0}")]
    CaptureId(u8),

    #[error("frame data is {size} bytes, capacity is {capacity}")]
    Oversized { size: usize, capacity: usize },

    #[error("frame codec error: {0}")]
    Image(#[from] image::ImageError),
}

/// Key transition on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySignal {
    pub code: u32,
    pub state: KeyState,
}

impl KeySignal {
    pub fn encode(&self) -> [u8; KEY_SIGNAL_SIZE] {
        let mut buf = [0u8; KEY_SIGNAL_SIZE];
        let mut cursor = &mut buf[..];
        cursor.put_u32_le(self.code);
        cursor.put_u8(self.state.as_u8());
        buf
    }

    pub fn decode(mut data: &[u8]) -> Result<Self, RecordError> {
        if data.len() != KEY_SIGNAL_SIZE {
            return Err(RecordError::Size {
                expected: KEY_SIGNAL_SIZE,
                actual: data.len(),
            });
        }
        let code = data.get_u32_le();
        let state_byte = data.get_u8();
        let state = KeyState::from_u8(state_byte).ok_or(RecordError::KeyState(state_byte))?;
        Ok(Self { code, state })
    }
}

impl From<KeyEvent> for KeySignal {
    fn from(event: KeyEvent) -> Self {
        Self {
            code: event.key,
            state: event.state,
        }
    }
}

impl From<KeySignal> for KeyEvent {
    fn from(signal: KeySignal) -> Self {
        Self {
            key: signal.code,
            state: signal.state,
        }
    }
}

/// One JPEG-compressed camera frame on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub camera: CameraId,
    pub sequence_id: u8,
    pub data: Bytes,
}

impl FrameRecord {
    /// Compress a frame with the given JPEG quality.
    ///
    /// Fails with [`RecordError::Oversized`] when the encoding does not fit
    /// one record.
    pub fn from_frame(
        frame: &Frame,
        camera: CameraId,
        sequence_id: u8,
        quality: u8,
    ) -> Result<Self, RecordError> {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode_image(frame)?;
        if jpeg.len() > FRAME_DATA_CAPACITY {
            return Err(RecordError::Oversized {
                size: jpeg.len(),
                capacity: FRAME_DATA_CAPACITY,
            });
        }
        Ok(Self {
            camera,
            sequence_id,
            data: Bytes::from(jpeg),
        })
    }

    /// Decompress the carried frame.
    pub fn to_frame(&self) -> Result<Frame, RecordError> {
        let image = image::load_from_memory_with_format(&self.data, ImageFormat::Jpeg)?;
        Ok(image.to_rgb8())
    }

    /// Serialize into a full-size record.
    pub fn encode(&self) -> Result<Bytes, RecordError> {
        if self.data.len() > FRAME_DATA_CAPACITY {
            return Err(RecordError::Oversized {
                size: self.data.len(),
                capacity: FRAME_DATA_CAPACITY,
            });
        }
        let mut buf = BytesMut::with_capacity(MAX_DATAGRAM_SIZE);
        buf.put_u16_le(self.data.len() as u16);
        buf.put_u8(self.camera.capture_id());
        buf.put_u8(self.sequence_id);
        buf.put_slice(&self.data);
        buf.resize(MAX_DATAGRAM_SIZE, 0);
        Ok(buf.freeze())
    }

    /// Parse a received record. Only the first `real_data_size` data bytes
    /// are kept.
    pub fn decode(datagram: &[u8]) -> Result<Self, RecordError> {
        if datagram.len() < FRAME_HEADER_SIZE {
            return Err(RecordError::Size {
                expected: MAX_DATAGRAM_SIZE,
                actual: datagram.len(),
            });
        }
        let mut header = &datagram[..FRAME_HEADER_SIZE];
        let size = header.get_u16_le() as usize;
        let capture_id = header.get_u8();
        let sequence_id = header.get_u8();

        let camera = CameraId::from_capture_id(capture_id).ok_or(RecordError::CaptureId(capture_id))?;
        let body = &datagram[FRAME_HEADER_SIZE..];
        if size > body.len() {
            return Err(RecordError::Size {
                expected: FRAME_HEADER_SIZE + size,
                actual: datagram.len(),
            });
        }
        Ok(Self {
            camera,
            sequence_id,
            data: Bytes::copy_from_slice(&body[..size]),
        })
    }
}
