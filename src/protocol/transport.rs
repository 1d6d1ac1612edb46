/// Transport seam between the protocol engine and whatever carries the bytes
///
/// Opening and configuring a physical port is the host's job. The engine only needs
/// to hand frames to `send` and to be told, one line at a time, what came back.
use anyhow::Result;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Invoked with one received line, terminator stripped.
pub type FrameCallback = Arc<dyn Fn(Bytes) + Send + Sync>;
/// Invoked when the underlying link reports a failure.
pub type ErrorCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Capability a driver consumes to talk on its link.
pub trait Transport: Send + Sync {
    /// Write a complete encoded frame.
    fn send(&self, frame: &[u8]) -> Result<()>;

    /// Register the receiver for complete lines. Replaces any previous receiver.
    fn on_frame(&self, callback: FrameCallback);

    /// Register the receiver for link errors. Replaces any previous receiver.
    fn on_error(&self, callback: ErrorCallback);
}

/// Splits a raw byte stream into CRLF-terminated ASCII lines.
///
/// Noise in front of the last ':' of a line is dropped, blank lines are skipped and
/// a buffer that grows past [`LineFramer::MAX_LINE`] without a terminator is discarded.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    /// ':' + 255 bytes as hex + LRC; anything longer is garbage.
    pub const MAX_LINE: usize = 513;

    pub fn new() -> Self {
        Self::default()
    }

    /// Feed received bytes and collect every line they complete.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(data);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(start) = line.iter().rposition(|b| *b == b':') {
                if start > 0 {
                    log::debug!("Dropping {start} bytes of noise before frame start");
                    line.drain(..start);
                }
            }
            if !line.is_empty() {
                lines.push(Bytes::from(line));
            }
        }

        if self.buf.len() > Self::MAX_LINE {
            match self.buf.iter().rposition(|b| *b == b':') {
                Some(start) if self.buf.len() - start <= Self::MAX_LINE => {
                    self.buf.drain(..start);
                }
                _ => {
                    log::warn!(
                        "Discarding {} bytes without a line terminator",
                        self.buf.len()
                    );
                    self.buf.clear();
                }
            }
        }

        lines
    }

    /// Bytes waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[derive(Default)]
struct Endpoint {
    framer: Mutex<LineFramer>,
    frame_cb: RwLock<Option<FrameCallback>>,
    error_cb: RwLock<Option<ErrorCallback>>,
}

impl Endpoint {
    fn receive(&self, data: &[u8]) {
        let lines = self.framer.lock().push(data);
        let callback = self.frame_cb.read().clone();
        match callback {
            Some(cb) => lines.into_iter().for_each(|line| cb(line)),
            None if !lines.is_empty() => {
                log::debug!("Loopback dropped {} lines: no receiver", lines.len())
            }
            None => {}
        }
    }

    fn raise(&self, err: String) {
        let callback = self.error_cb.read().clone();
        if let Some(cb) = callback {
            cb(err);
        }
    }
}

/// In-memory link; whatever one end sends is framed and delivered to the other end.
pub struct LoopbackTransport {
    local: Arc<Endpoint>,
    remote: Arc<Endpoint>,
}

impl LoopbackTransport {
    /// Create both ends of a link.
    pub fn pair() -> (Self, Self) {
        let a = Arc::new(Endpoint::default());
        let b = Arc::new(Endpoint::default());
        (
            Self {
                local: Arc::clone(&a),
                remote: Arc::clone(&b),
            },
            Self {
                local: b,
                remote: a,
            },
        )
    }

    /// Deliver raw bytes to this end as if they came off the wire.
    pub fn inject(&self, data: &[u8]) {
        self.local.receive(data);
    }

    /// Report a link failure to this end's error receiver.
    pub fn inject_error(&self, err: impl Into<String>) {
        self.local.raise(err.into());
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, frame: &[u8]) -> Result<()> {
        self.remote.receive(frame);
        Ok(())
    }

    fn on_frame(&self, callback: FrameCallback) {
        *self.local.frame_cb.write() = Some(callback);
    }

    fn on_error(&self, callback: ErrorCallback) {
        *self.local.error_cb.write() = Some(callback);
    }
}

/// Transport that only records what was sent. Lets the protocol cores be driven by hand.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent since the last call, oldest first.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, frame: &[u8]) -> Result<()> {
        self.sent
            .lock()
            .push(String::from_utf8_lossy(frame).into_owned());
        Ok(())
    }

    fn on_frame(&self, _callback: FrameCallback) {}

    fn on_error(&self, _callback: ErrorCallback) {}
}
