use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::{
    config::SlaveConfig,
    core::{spawn_event_loop, wire_transport, DriverEvent, HookedTransport},
    traits::{Driver, ModbusHook},
};
use crate::{
    core::{
        addressing::ItemReading,
        bus::{EventBus, EventKind, Listener, Notification, SubscriptionId},
        slave::Slave,
        task_manager::current_runtime,
    },
    error::Error,
    protocol::transport::Transport,
};

/// Handle to a slave serving one register memory on one port
pub struct SlaveDriver {
    port: String,
    core: Arc<Mutex<Slave>>,
    bus: Arc<EventBus>,
    events: flume::Sender<DriverEvent>,
    task: JoinHandle<()>,
}

impl SlaveDriver {
    /// Create a slave from its configuration. Must be called inside a tokio runtime.
    pub fn new(
        config: &SlaveConfig,
        transport: Arc<dyn Transport>,
        hooks: Vec<Arc<dyn ModbusHook>>,
    ) -> Result<Self, Error> {
        let handle = current_runtime()?;
        let logger = config.logger()?;
        let block = config.to_block()?;
        let port = config.port.clone();
        let (tx, rx) = flume::unbounded();

        wire_transport(transport.as_ref(), &tx);
        let hooked: Arc<dyn Transport> =
            Arc::new(HookedTransport::new(&port, transport, hooks.clone()));
        let core = Arc::new(Mutex::new(Slave::new(logger, block, hooked)));
        let bus = Arc::new(EventBus::new());
        let task = spawn_event_loop(&handle, port.clone(), rx, core.clone(), bus.clone(), hooks);

        Ok(Self {
            port,
            core,
            bus,
            events: tx,
            task,
        })
    }

    pub fn slave_addr(&self) -> u8 {
        self.core.lock().slave_addr()
    }

    /// Bulk register write, for hosts seeding or updating memory.
    pub fn set_registers(&self, start: u16, values: &[u16]) -> Result<(), Error> {
        let items = self.core.lock().set_registers(start, values)?;
        self.bus.publish_items(items);
        Ok(())
    }

    /// Current register values, for hosts mirroring memory.
    pub fn registers(&self, start: u16, count: u16) -> Result<Vec<u16>, Error> {
        Ok(self.core.lock().block().store().read(start, count)?)
    }
}

impl Driver for SlaveDriver {
    fn port(&self) -> &str {
        &self.port
    }

    fn start(&self) -> Result<()> {
        if self.task.is_finished() {
            return Err(anyhow!("Event loop for {} is no longer running", self.port));
        }
        self.core.lock().start();
        Ok(())
    }

    fn stop(&self) {
        self.core.lock().stop();
    }

    fn register(&self, name: &str) -> Result<(), Error> {
        self.core.lock().register(name)
    }

    fn read_item(&self, name: &str) -> Option<ItemReading> {
        self.core.lock().read_item(name)
    }

    fn write_item(&self, name: &str, value: u16) -> Result<(), Error> {
        let items = self.core.lock().write_item(name, value)?;
        self.bus.publish_items(items);
        Ok(())
    }

    fn subscribe(&self, kind: EventKind, listener: Listener) -> SubscriptionId {
        self.bus.subscribe(kind, listener)
    }

    fn subscribe_channel(
        &self,
        kind: EventKind,
    ) -> (SubscriptionId, flume::Receiver<Notification>) {
        self.bus.subscribe_channel(kind)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }
}

impl Drop for SlaveDriver {
    fn drop(&mut self) {
        let _ = self.events.send(DriverEvent::Shutdown);
        self.task.abort();
    }
}
