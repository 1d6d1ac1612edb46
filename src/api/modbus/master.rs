use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::{
    config::MasterConfig,
    core::{spawn_event_loop, wire_transport, DriverEvent, HookedTransport},
    traits::{Driver, ModbusHook},
};
use crate::{
    core::{
        addressing::ItemReading,
        block::Block,
        bus::{EventBus, EventKind, Listener, Notification, SubscriptionId},
        clock::{Clock, TokioClock},
        logs::PortLogger,
        master::Master,
        task_manager::current_runtime,
    },
    error::Error,
    protocol::transport::Transport,
};

/// Handle to a master polling its configured blocks on one port
pub struct MasterDriver {
    port: String,
    core: Arc<Mutex<Master>>,
    bus: Arc<EventBus>,
    events: flume::Sender<DriverEvent>,
    clock: Arc<TokioClock>,
    task: JoinHandle<()>,
}

impl MasterDriver {
    /// Create a master from its configuration. Must be called inside a tokio runtime.
    ///
    /// Blocks with an invalid configuration are logged and skipped; an unsupported mode or
    /// log level fails the whole driver.
    pub fn new(
        config: &MasterConfig,
        transport: Arc<dyn Transport>,
        hooks: Vec<Arc<dyn ModbusHook>>,
    ) -> Result<Self, Error> {
        let logger = config.logger()?;
        let blocks = config.build_blocks(&logger);
        Self::with_blocks(logger, blocks, transport, hooks)
    }

    pub fn with_blocks(
        logger: PortLogger,
        blocks: Vec<Block>,
        transport: Arc<dyn Transport>,
        hooks: Vec<Arc<dyn ModbusHook>>,
    ) -> Result<Self, Error> {
        let handle = current_runtime()?;
        let port = logger.port().to_string();
        let (tx, rx) = flume::unbounded();

        let timer_tx = tx.clone();
        let clock = Arc::new(TokioClock::new(
            handle.clone(),
            Arc::new(move |id| {
                let _ = timer_tx.send(DriverEvent::Timer(id));
            }),
        ));

        wire_transport(transport.as_ref(), &tx);
        let hooked: Arc<dyn Transport> =
            Arc::new(HookedTransport::new(&port, transport, hooks.clone()));
        let core = Arc::new(Mutex::new(Master::new(
            logger,
            blocks,
            hooked,
            clock.clone() as Arc<dyn Clock>,
        )));
        let bus = Arc::new(EventBus::new());
        let task = spawn_event_loop(&handle, port.clone(), rx, core.clone(), bus.clone(), hooks);

        Ok(Self {
            port,
            core,
            bus,
            events: tx,
            clock,
            task,
        })
    }

    /// Names of the blocks that survived configuration.
    pub fn block_names(&self) -> Vec<String> {
        self.core
            .lock()
            .blocks()
            .map(|block| block.name().to_string())
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.core.lock().is_running()
    }
}

impl Driver for MasterDriver {
    fn port(&self) -> &str {
        &self.port
    }

    fn start(&self) -> Result<()> {
        if self.task.is_finished() {
            return Err(anyhow!("Event loop for {} is no longer running", self.port));
        }
        let items = self.core.lock().start();
        self.bus.publish_items(items);
        Ok(())
    }

    fn stop(&self) {
        self.core.lock().stop();
        self.clock.cancel_all();
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

impl Drop for MasterDriver {
    fn drop(&mut self) {
        self.core.lock().stop();
        let _ = self.events.send(DriverEvent::Shutdown);
        self.task.abort();
    }
}
