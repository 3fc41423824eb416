//! Datagram transport between a capturing host and a receiving host.
//!
//! Two record types cross the wire:
//!
//! - **Key signals**: one key transition per datagram, sent by a detecting
//!   instance to a remote instance that injects the keys.
//! - **Frame records**: one JPEG-compressed camera frame per datagram, sent
//!   in top/front pairs sharing a sequence id, for remote detection.
//!
//! ```text
//!   capture-only-sender ──frame records──► remote-detect-receiver
//!   local-full (forward) ──key signals───► remote-receiver
//!   dummy-sender ──────────key signals───► dummy-receiver
//! ```

mod assembler;
mod error;
mod records;
mod udp;

pub use assembler::FrameAssembler;
pub use error::TransportError;
pub use records::{
    FrameRecord, KeySignal, RecordError, FRAME_DATA_CAPACITY, FRAME_HEADER_SIZE, KEY_SIGNAL_SIZE,
    MAX_DATAGRAM_SIZE,
};
pub use udp::{
    resolve, FrameSender, KeySignalReceiver, KeySignalSender, SendOutcome, UdpFrameReceiver,
};
