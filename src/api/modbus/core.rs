/// Event loop shared by the master and slave drivers
///
/// Transport callbacks and timers never touch a protocol core directly. They push a
/// [`DriverEvent`] into the driver's flume queue and a single tokio task drains it, so
/// frames are handled in arrival order and each core sees one caller at a time.
use anyhow::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{runtime::Handle, task::JoinHandle};

use super::traits::{execute_hook_chain, ModbusHook};
use crate::{
    core::{
        bus::{EventBus, ItemEvent, Notification},
        clock::TimerId,
        master::Master,
        slave::Slave,
        task_manager::spawn_task,
    },
    protocol::transport::Transport,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    Frame(Bytes),
    TransportError(String),
    Timer(TimerId),
    Shutdown,
}

/// What the event loop needs from a protocol core.
pub trait EventCore: Send + 'static {
    fn handle_frame(&mut self, line: &[u8]) -> Vec<ItemEvent>;
    fn handle_timer(&mut self, id: TimerId) -> Vec<ItemEvent>;
    fn handle_transport_error(&mut self, err: &str);
}

impl EventCore for Master {
    fn handle_frame(&mut self, line: &[u8]) -> Vec<ItemEvent> {
        self.on_frame(line)
    }

    fn handle_timer(&mut self, id: TimerId) -> Vec<ItemEvent> {
        self.on_timer(id)
    }

    fn handle_transport_error(&mut self, err: &str) {
        self.on_transport_error(err);
    }
}

impl EventCore for Slave {
    fn handle_frame(&mut self, line: &[u8]) -> Vec<ItemEvent> {
        self.on_frame(line)
    }

    fn handle_timer(&mut self, _id: TimerId) -> Vec<ItemEvent> {
        Vec::new()
    }

    fn handle_transport_error(&mut self, err: &str) {
        self.on_transport_error(err);
    }
}

/// Transport decorator that reports every outgoing frame to the hooks.
pub struct HookedTransport {
    port: String,
    inner: Arc<dyn Transport>,
    hooks: Vec<Arc<dyn ModbusHook>>,
}

impl HookedTransport {
    pub fn new(
        port: impl Into<String>,
        inner: Arc<dyn Transport>,
        hooks: Vec<Arc<dyn ModbusHook>>,
    ) -> Self {
        Self {
            port: port.into(),
            inner,
            hooks,
        }
    }
}

impl Transport for HookedTransport {
    fn send(&self, frame: &[u8]) -> Result<()> {
        execute_hook_chain(&self.hooks, |hook| hook.on_frame_sent(&self.port, frame));
        self.inner.send(frame).inspect_err(|err| {
            let msg = err.to_string();
            execute_hook_chain(&self.hooks, |hook| hook.on_error(&self.port, &msg));
        })
    }

    fn on_frame(&self, callback: crate::protocol::transport::FrameCallback) {
        self.inner.on_frame(callback);
    }

    fn on_error(&self, callback: crate::protocol::transport::ErrorCallback) {
        self.inner.on_error(callback);
    }
}

/// Route the transport's callbacks into the driver queue.
pub fn wire_transport(transport: &dyn Transport, events: &flume::Sender<DriverEvent>) {
    let frames = events.clone();
    transport.on_frame(Arc::new(move |line| {
        let _ = frames.send(DriverEvent::Frame(line));
    }));
    let errors = events.clone();
    transport.on_error(Arc::new(move |err| {
        let _ = errors.send(DriverEvent::TransportError(err));
    }));
}

/// Drain `events` until shutdown. Notifications are published after the core lock is
/// released so listeners may call back into the driver.
pub fn spawn_event_loop<C: EventCore>(
    handle: &Handle,
    port: String,
    events: flume::Receiver<DriverEvent>,
    core: Arc<Mutex<C>>,
    bus: Arc<EventBus>,
    hooks: Vec<Arc<dyn ModbusHook>>,
) -> JoinHandle<()> {
    spawn_task(handle, async move {
        while let Ok(event) = events.recv_async().await {
            match event {
                DriverEvent::Frame(line) => {
                    execute_hook_chain(&hooks, |hook| hook.on_frame_received(&port, &line));
                    let items = core.lock().handle_frame(&line);
                    bus.publish_items(items);
                }
                DriverEvent::Timer(id) => {
                    let items = core.lock().handle_timer(id);
                    bus.publish_items(items);
                }
                DriverEvent::TransportError(message) => {
                    execute_hook_chain(&hooks, |hook| hook.on_error(&port, &message));
                    core.lock().handle_transport_error(&message);
                    bus.publish(&Notification::TransportError { message });
                }
                DriverEvent::Shutdown => break,
            }
        }
        log::debug!("Event loop for {port} finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::transport::{LoopbackTransport, RecordingTransport};

    #[derive(Default)]
    struct SentHook(Mutex<Vec<Vec<u8>>>);

    impl ModbusHook for SentHook {
        fn on_frame_sent(&self, _port: &str, frame: &[u8]) {
            self.0.lock().push(frame.to_vec());
        }
    }

    #[test]
    fn test_hooked_transport_reports_sends() {
        let hook = Arc::new(SentHook::default());
        let inner = Arc::new(RecordingTransport::new());
        let transport = HookedTransport::new("COM1", inner.clone(), vec![hook.clone()]);

        transport.send(b":010300000001FB\r\n").unwrap();
        assert_eq!(hook.0.lock().len(), 1);
        assert_eq!(inner.sent_count(), 1);
    }

    #[test]
    fn test_wire_transport_queues_events() {
        let (a, b) = LoopbackTransport::pair();
        let (tx, rx) = flume::unbounded();
        wire_transport(&b, &tx);

        a.send(b":010300000001FB\r\n").unwrap();
        b.inject_error("unplugged");
        assert_eq!(
            rx.try_recv().unwrap(),
            DriverEvent::Frame(Bytes::from_static(b":010300000001FB"))
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            DriverEvent::TransportError("unplugged".to_string())
        );
    }
}
