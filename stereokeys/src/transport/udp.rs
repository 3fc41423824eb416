//! UDP endpoints for key signals and frame records.
//!
//! Senders are unconnected sockets bound to an ephemeral port. Receivers
//! bind the configured port with a read timeout, so a control loop blocked
//! on a receive still gets to check its stop flag.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::assembler::FrameAssembler;
use super::error::TransportError;
use super::records::{FrameRecord, KeySignal, RecordError, KEY_SIGNAL_SIZE, MAX_DATAGRAM_SIZE};
use crate::capture::{CaptureError, FrameSource};
use crate::frame::{CameraId, FramePair};

/// Shortest read timeout a receiver accepts.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Resolve `address:port`, accepting literal IPs and host names.
pub fn resolve(address: &str, port: u16) -> Result<SocketAddr, TransportError> {
    let label = format!("{}:{}", address, port);
    (address, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            address: label.clone(),
            source,
        })?
        .next()
        .ok_or(TransportError::NoAddress(label))
}

fn bind_ephemeral(target: &SocketAddr) -> Result<UdpSocket, TransportError> {
    let local = if target.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
    UdpSocket::bind(local).map_err(|source| TransportError::Bind {
        address: local.to_string(),
        source,
    })
}

fn bind_listener(address: &str, port: u16, timeout: Duration) -> Result<UdpSocket, TransportError> {
    let local = resolve(address, port)?;
    let socket = UdpSocket::bind(local).map_err(|source| TransportError::Bind {
        address: local.to_string(),
        source,
    })?;
    socket
        .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))
        .map_err(TransportError::Configure)?;
    Ok(socket)
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

fn send_all(socket: &UdpSocket, data: &[u8], target: SocketAddr) -> Result<(), TransportError> {
    let sent = socket.send_to(data, target).map_err(TransportError::Send)?;
    if sent != data.len() {
        return Err(TransportError::ShortSend {
            sent,
            expected: data.len(),
        });
    }
    Ok(())
}

// =============================================================================
// Key signals
// =============================================================================

/// Sends key signals to a remote receiver.
#[derive(Debug)]
pub struct KeySignalSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl KeySignalSender {
    pub fn connect(address: &str, port: u16) -> Result<Self, TransportError> {
        let target = resolve(address, port)?;
        let socket = bind_ephemeral(&target)?;
        info!(target = %target, "Key signal sender ready");
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn send(&self, signal: KeySignal) -> Result<(), TransportError> {
        send_all(&self.socket, &signal.encode(), self.target)
    }
}

/// Receives key signals.
#[derive(Debug)]
pub struct KeySignalReceiver {
    socket: UdpSocket,
}

impl KeySignalReceiver {
    pub fn bind(address: &str, port: u16, timeout: Duration) -> Result<Self, TransportError> {
        let socket = bind_listener(address, port, timeout)?;
        info!(local = ?socket.local_addr().ok(), "Key signal receiver listening");
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::Configure)
    }

    /// Wait for one signal. `Ok(None)` means the read timed out.
    ///
    /// A malformed datagram is reported as an error; the caller decides
    /// whether to keep listening.
    pub fn recv(&self) -> Result<Option<KeySignal>, TransportError> {
        // One spare byte so oversized datagrams are detected rather than
        // silently truncated to a valid length.
        let mut buf = [0u8; KEY_SIGNAL_SIZE + 1];
        match self.socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                let signal = KeySignal::decode(&buf[..len])?;
                debug!(from = %from, code = signal.code, state = %signal.state, "Key signal received");
                Ok(Some(signal))
            }
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(TransportError::Receive(e)),
        }
    }

    /// Wait for one signal, then collect whatever else is already queued,
    /// up to `max` signals in total.
    ///
    /// Malformed datagrams are skipped with a warning. An empty result
    /// means the first read timed out.
    pub fn recv_batch(&self, max: usize) -> Result<Vec<KeySignal>, TransportError> {
        let mut signals = Vec::new();
        match self.recv() {
            Ok(Some(signal)) => signals.push(signal),
            Ok(None) => return Ok(signals),
            Err(TransportError::Record(e)) => warn!(error = %e, "Discarding malformed key signal"),
            Err(e) => return Err(e),
        }

        self.socket.set_nonblocking(true).map_err(TransportError::Configure)?;
        let drained = self.drain_queued(&mut signals, max);
        self.socket.set_nonblocking(false).map_err(TransportError::Configure)?;
        drained?;
        Ok(signals)
    }

    fn drain_queued(&self, signals: &mut Vec<KeySignal>, max: usize) -> Result<(), TransportError> {
        while signals.len() < max {
            match self.recv() {
                Ok(Some(signal)) => signals.push(signal),
                Ok(None) => break,
                Err(TransportError::Record(e)) => {
                    warn!(error = %e, "Discarding malformed key signal");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

// =============================================================================
// Frames
// =============================================================================

/// Outcome of sending one frame pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { sequence_id: u8 },
    /// At least one frame did not fit a record; nothing was sent.
    Dropped,
}

/// JPEG-compresses frame pairs and sends them as two records.
#[derive(Debug)]
pub struct FrameSender {
    socket: UdpSocket,
    target: SocketAddr,
    sequence: u8,
    quality: u8,
}

impl FrameSender {
    pub fn connect(address: &str, port: u16, quality: u8) -> Result<Self, TransportError> {
        let target = resolve(address, port)?;
        let socket = bind_ephemeral(&target)?;
        info!(target = %target, quality, "Frame sender ready");
        Ok(Self {
            socket,
            target,
            sequence: 0,
            quality,
        })
    }

    /// Sequence id the next pair will carry.
    pub fn next_sequence(&self) -> u8 {
        self.sequence
    }

    /// Encode and send both frames under one sequence id.
    ///
    /// An oversized encoding drops the whole pair with a warning and leaves
    /// the sequence id unchanged.
    pub fn send_pair(&mut self, pair: &FramePair) -> Result<SendOutcome, TransportError> {
        let sequence_id = self.sequence;
        let quality = self.quality;
        let (top, front) = rayon::join(
            || FrameRecord::from_frame(&pair.top, CameraId::Top, sequence_id, quality),
            || FrameRecord::from_frame(&pair.front, CameraId::Front, sequence_id, quality),
        );

        let records = match (top, front) {
            (Ok(top), Ok(front)) => [top, front],
            (Err(RecordError::Oversized { size, capacity }), _)
            | (_, Err(RecordError::Oversized { size, capacity })) => {
                warn!(size, capacity, sequence_id, "Encoded frame exceeds record capacity, dropping");
                return Ok(SendOutcome::Dropped);
            }
            (Err(e), _) | (_, Err(e)) => return Err(e.into()),
        };

        for record in &records {
            send_all(&self.socket, &record.encode()?, self.target)?;
        }
        self.sequence = self.sequence.wrapping_add(1);
        Ok(SendOutcome::Sent { sequence_id })
    }
}

/// Receives frame records and reassembles them into pairs.
#[derive(Debug)]
pub struct UdpFrameReceiver {
    socket: UdpSocket,
    assembler: FrameAssembler,
    buffer: Vec<u8>,
    timeout: Duration,
}

impl UdpFrameReceiver {
    pub fn bind(address: &str, port: u16, timeout: Duration) -> Result<Self, TransportError> {
        let socket = bind_listener(address, port, timeout)?;
        info!(local = ?socket.local_addr().ok(), "Frame receiver listening");
        Ok(Self {
            socket,
            assembler: FrameAssembler::new(),
            buffer: vec![0u8; MAX_DATAGRAM_SIZE],
            timeout: timeout.max(MIN_READ_TIMEOUT),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::Configure)
    }

    /// Receive until a complete pair arrives or `timeout` elapses.
    ///
    /// Malformed records and undecodable frames are skipped with a warning.
    pub fn recv_pair(&mut self) -> Result<Option<FramePair>, TransportError> {
        let deadline = Instant::now() + self.timeout;
        while Instant::now() < deadline {
            let len = match self.socket.recv_from(&mut self.buffer) {
                Ok((len, _)) => len,
                Err(e) if is_timeout(&e) => return Ok(None),
                Err(e) => return Err(TransportError::Receive(e)),
            };

            let record = match FrameRecord::decode(&self.buffer[..len]) {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "Discarding malformed frame record");
                    continue;
                }
            };

            let Some((top, front)) = self.assembler.push(record) else {
                continue;
            };
            let sequence_id = top.sequence_id;
            match (top.to_frame(), front.to_frame()) {
                (Ok(top), Ok(front)) => {
                    debug!(sequence_id, "Frame pair received");
                    return Ok(Some(FramePair::new(top, front)));
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, sequence_id, "Discarding undecodable frame pair");
                }
            }
        }
        Ok(None)
    }
}

impl FrameSource for UdpFrameReceiver {
    fn grab(&mut self) -> Result<FramePair, CaptureError> {
        match self.recv_pair()? {
            Some(pair) => Ok(pair),
            None => Err(CaptureError::Timeout(self.timeout)),
        }
    }

    fn describe(&self) -> String {
        match self.socket.local_addr() {
            Ok(addr) => format!("udp://{}", addr),
            Err(_) => "udp".to_string(),
        }
    }
}
