/// Driver-facing traits
///
/// [`Driver`] is the uniform surface of both roles. [`ModbusHook`] lets hosts observe the
/// wire without owning the transport.
use anyhow::Result;

use crate::{
    core::{
        addressing::ItemReading,
        bus::{EventKind, Listener, Notification, SubscriptionId},
        logs::FrameDirection,
    },
    error::Error,
    protocol::modbus::hex_dump,
};

/// Lifecycle and item access shared by master and slave drivers.
pub trait Driver: Send + Sync {
    fn port(&self) -> &str;

    /// Start polling (master) or answering requests (slave).
    fn start(&self) -> Result<()>;

    /// Cancel all pending work. A stopped driver can be started again.
    fn stop(&self);

    fn register(&self, name: &str) -> Result<(), Error>;

    /// `None` for names that were never registered.
    fn read_item(&self, name: &str) -> Option<ItemReading>;

    fn write_item(&self, name: &str, value: u16) -> Result<(), Error>;

    fn subscribe(&self, kind: EventKind, listener: Listener) -> SubscriptionId;

    fn subscribe_channel(&self, kind: EventKind)
        -> (SubscriptionId, flume::Receiver<Notification>);

    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Observer of the frames a driver exchanges. Every method defaults to doing nothing.
pub trait ModbusHook: Send + Sync {
    fn on_frame_sent(&self, _port: &str, _frame: &[u8]) {}
    fn on_frame_received(&self, _port: &str, _line: &[u8]) {}
    fn on_error(&self, _port: &str, _error: &str) {}
}

/// Call `f` on every hook in registration order.
pub fn execute_hook_chain<F>(hooks: &[std::sync::Arc<dyn ModbusHook>], f: F)
where
    F: Fn(&dyn ModbusHook),
{
    for hook in hooks {
        f(hook.as_ref());
    }
}

/// Hook that does nothing (useful for testing)
pub struct NoOpHook;

impl ModbusHook for NoOpHook {}

/// Logs every frame at info level as hex bytes.
pub struct LoggingHook;

impl LoggingHook {
    fn log_frame(port: &str, direction: FrameDirection, frame: &[u8]) {
        log::info!(
            "{port} {direction}: {}",
            hex_dump(frame.strip_suffix(b"\r\n").unwrap_or(frame))
        );
    }
}

impl ModbusHook for LoggingHook {
    fn on_frame_sent(&self, port: &str, frame: &[u8]) {
        Self::log_frame(port, FrameDirection::Outbound, frame);
    }

    fn on_frame_received(&self, port: &str, line: &[u8]) {
        Self::log_frame(port, FrameDirection::Inbound, line);
    }

    fn on_error(&self, port: &str, error: &str) {
        log::warn!("{port} error: {error}");
    }
}
