/// Slave role: serves one block of holding registers to the master on the link
use std::sync::Arc;

use super::{
    addressing::{self, ItemReading},
    block::Block,
    bus::ItemEvent,
    dispatcher,
    logs::{FrameDirection, PortLogger},
};
use crate::{
    error::{AddressError, Error},
    protocol::{
        modbus::{decode_ascii, seal},
        transport::Transport,
    },
};

pub struct Slave {
    logger: PortLogger,
    block: Block,
    transport: Arc<dyn Transport>,
    running: bool,
}

impl Slave {
    pub fn new(logger: PortLogger, block: Block, transport: Arc<dyn Transport>) -> Self {
        Self {
            logger,
            block,
            transport,
            running: false,
        }
    }

    pub fn slave_addr(&self) -> u8 {
        self.block.layout().slave_addr
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) {
        if !self.running {
            self.logger.info(format_args!(
                "Serving {} registers as slave {}",
                self.block.store().len(),
                self.slave_addr()
            ));
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Register an item, growing the memory block when it addresses past the end.
    ///
    /// Both `n:3` and `<block>@n:3` are accepted; the block part must name this slave's block.
    pub fn register(&mut self, name: &str) -> Result<(), Error> {
        let item = addressing::resolve(self.indexer(name)?)?;
        self.block.register_growing(name, item);
        Ok(())
    }

    pub fn read_item(&self, name: &str) -> Option<ItemReading> {
        self.block.read_item(name)
    }

    /// Write through a registered item. Bit items update only their bit of the word.
    pub fn write_item(&mut self, name: &str, value: u16) -> Result<Vec<ItemEvent>, Error> {
        let item = self.block.item(name)?;
        let current = self
            .block
            .store()
            .get(item.word)
            .map(|reg| reg.value)
            .unwrap_or_default();
        Ok(self
            .block
            .set_registers(item.word, &[item.merge(current, value)])?)
    }

    /// Bulk write used by hosts to seed or update memory.
    pub fn set_registers(&mut self, start: u16, values: &[u16]) -> Result<Vec<ItemEvent>, Error> {
        Ok(self.block.set_registers(start, values)?)
    }

    /// Handle one received line. Requests for other addresses and invalid requests get
    /// no reply.
    pub fn on_frame(&mut self, line: &[u8]) -> Vec<ItemEvent> {
        self.logger.frame(FrameDirection::Inbound, line);
        if !self.running {
            self.logger.debug(format_args!("Not running, frame ignored"));
            return Vec::new();
        }

        let request = match decode_ascii(line) {
            Ok(request) => request,
            Err(err) => {
                self.logger.warn(format_args!("Dropping frame: {err}"));
                return Vec::new();
            }
        };
        match request.first() {
            Some(addr) if *addr == self.slave_addr() => {}
            Some(addr) => {
                self.logger
                    .debug(format_args!("Request for slave {addr}, not ours"));
                return Vec::new();
            }
            None => return Vec::new(),
        }

        match dispatcher::dispatch(&mut self.block, &request) {
            Ok(out) => {
                let frame = seal(&out.reply);
                self.logger.frame(FrameDirection::Outbound, frame.as_bytes());
                if let Err(err) = self.transport.send(frame.as_bytes()) {
                    self.logger.error(format_args!("Failed to send reply: {err}"));
                }
                out.events
            }
            Err(err) => {
                self.logger.warn(format_args!("Rejected request: {err}"));
                Vec::new()
            }
        }
    }

    pub fn on_transport_error(&self, err: &str) {
        self.logger.error(format_args!("Transport error: {err}"));
    }

    fn indexer<'a>(&self, name: &'a str) -> Result<&'a str, AddressError> {
        if !name.contains('@') {
            return Ok(name);
        }
        let parsed = addressing::parse(name)?;
        if parsed.block != self.block.name() {
            return Err(AddressError::UnknownBlock(parsed.block.to_string()));
        }
        Ok(parsed.indexer)
    }
}
