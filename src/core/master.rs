/// Master role: polls blocks of holding registers over one half-duplex link
///
/// The core is event driven and never blocks. The owner feeds it received lines with
/// [`Master::on_frame`] and fired timer ids with [`Master::on_timer`]; every entry point
/// returns the item notifications it produced so they can be published once the owner
/// has released whatever lock guards the core.
use std::{collections::BTreeMap, sync::Arc};

use super::{
    addressing::{self, ItemReading},
    block::Block,
    bus::ItemEvent,
    clock::{Clock, TimerId},
    logs::{FrameDirection, PortLogger},
    registers::Quality,
    scheduler::{MasterScheduler, Operation, OperationKind, Pending, TimerEvent},
};
use crate::{
    error::{AddressError, Error, ProtocolError, TimeoutError},
    protocol::{
        modbus::{
            decode_ascii, generate_pull_get_holdings_request, generate_pull_set_holding_request,
            parse_pull_get_holdings, parse_pull_set_echo, seal,
        },
        transport::Transport,
    },
};

pub struct Master {
    logger: PortLogger,
    blocks: BTreeMap<String, Block>,
    scheduler: MasterScheduler,
    transport: Arc<dyn Transport>,
    running: bool,
}

impl Master {
    pub fn new(
        logger: PortLogger,
        blocks: Vec<Block>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let blocks = blocks
            .into_iter()
            .map(|block| (block.name().to_string(), block))
            .collect();
        Self {
            logger,
            blocks,
            scheduler: MasterScheduler::new(clock),
            transport,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.get(name)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn scheduler(&self) -> &MasterScheduler {
        &self.scheduler
    }

    /// Queue the read operation of every block. Calling it while running does nothing.
    pub fn start(&mut self) -> Vec<ItemEvent> {
        if self.running {
            return Vec::new();
        }
        self.running = true;
        self.logger
            .info(format_args!("Starting with {} blocks", self.blocks.len()));

        let reads: Vec<Operation> = self
            .blocks
            .values()
            .map(|block| Operation::read(block.name(), block.layout().read_interval))
            .collect();
        let mut events = Vec::new();
        for op in reads {
            let next = self.scheduler.enqueue(op);
            events.extend(self.run(next));
        }
        events
    }

    pub fn stop(&mut self) {
        self.scheduler.stop();
        if self.running {
            self.logger.info(format_args!("Stopped"));
        }
        self.running = false;
    }

    pub fn register(&mut self, name: &str) -> Result<(), Error> {
        let parsed = addressing::parse(name)?;
        let item = addressing::resolve(parsed.indexer)?;
        let block = self
            .blocks
            .get_mut(parsed.block)
            .ok_or_else(|| AddressError::UnknownBlock(parsed.block.to_string()))?;
        block.register(name, item)?;
        Ok(())
    }

    pub fn read_item(&self, name: &str) -> Option<ItemReading> {
        let parsed = addressing::parse(name).ok()?;
        self.blocks.get(parsed.block)?.read_item(name)
    }

    /// Queue a one-shot 0x06 write for a registered item.
    ///
    /// Bit items rewrite their whole word from the cached value, so that value has to be
    /// GOOD. The cache only changes once the slave echoes the write. A master that is not
    /// running refuses writes.
    pub fn write_item(&mut self, name: &str, value: u16) -> Result<Vec<ItemEvent>, Error> {
        let parsed = addressing::parse(name)?;
        let block = self
            .blocks
            .get(parsed.block)
            .ok_or_else(|| AddressError::UnknownBlock(parsed.block.to_string()))?;
        let item = block.item(name)?;
        if !self.running {
            return Err(Error::NotAvailable(name.to_string()));
        }

        let word_value = if item.is_bit() {
            match block.store().get(item.word) {
                Some(reg) if reg.quality == Quality::Good => item.merge(reg.value, value),
                _ => return Err(Error::NotAvailable(name.to_string())),
            }
        } else {
            value
        };

        let op = Operation::write(parsed.block, item.word, word_value);
        let next = self.scheduler.enqueue(op);
        Ok(self.run(next))
    }

    pub fn on_frame(&mut self, line: &[u8]) -> Vec<ItemEvent> {
        self.logger.frame(FrameDirection::Inbound, line);

        let Some(pending) = self.scheduler.take_reply() else {
            self.logger
                .warn(format_args!("{}, discarding", ProtocolError::UnexpectedData));
            return Vec::new();
        };
        let next = self.scheduler.dequeue();

        let mut events = match decode_ascii(line) {
            Ok(bytes) => self.complete(&pending, &bytes),
            Err(err) => {
                self.logger
                    .warn(format_args!("Bad reply for block {}: {err}", pending.op.block));
                self.fail(&pending.op)
            }
        };
        events.extend(self.run(next));
        events
    }

    pub fn on_timer(&mut self, id: TimerId) -> Vec<ItemEvent> {
        match self.scheduler.on_timer(id) {
            TimerEvent::Timeout(pending) => {
                let timeout = self
                    .blocks
                    .get(&pending.op.block)
                    .map(|block| block.layout().timeout.as_millis() as u64)
                    .unwrap_or_default();
                self.logger.warn(format_args!(
                    "Block {}: {}",
                    pending.op.block,
                    TimeoutError(timeout)
                ));
                let mut events = self.fail(&pending.op);
                let next = self.scheduler.dequeue();
                events.extend(self.run(next));
                events
            }
            TimerEvent::Repeat(op) => {
                let next = self.scheduler.enqueue(op);
                self.run(next)
            }
            TimerEvent::Stale => {
                self.logger.debug(format_args!("Ignoring stale {id}"));
                Vec::new()
            }
        }
    }

    pub fn on_transport_error(&self, err: &str) {
        self.logger.error(format_args!("Transport error: {err}"));
    }

    /// Execute `next` and, when sending fails, keep draining the queue.
    fn run(&mut self, mut next: Option<Operation>) -> Vec<ItemEvent> {
        let mut events = Vec::new();
        while let Some(op) = next.take() {
            match self.exec(&op) {
                Ok(()) => break,
                Err(Error::Scheduler(err)) => {
                    // the in-flight exchange owns the queue head; leave both untouched
                    self.logger.error(format_args!("Block {}: {err}", op.block));
                    break;
                }
                Err(err) => {
                    self.logger
                        .warn(format_args!("Block {}: exchange not started: {err}", op.block));
                    events.extend(self.fail(&op));
                    next = self.scheduler.dequeue();
                }
            }
        }
        events
    }

    fn exec(&mut self, op: &Operation) -> Result<(), Error> {
        let block = self
            .blocks
            .get(&op.block)
            .ok_or_else(|| AddressError::UnknownBlock(op.block.clone()))?;
        let layout = block.layout();
        let request = match op.kind {
            OperationKind::Read => generate_pull_get_holdings_request(
                layout.slave_addr,
                layout.start_reg,
                layout.num_reg,
            ),
            OperationKind::Write { index, value } => generate_pull_set_holding_request(
                layout.slave_addr,
                layout.start_reg.wrapping_add(index),
                value,
            ),
        };
        let timeout = layout.timeout;
        let frame = seal(&request);

        // arm first so a reply delivered during send always finds the exchange
        self.scheduler.arm(request, timeout)?;
        self.logger.frame(FrameDirection::Outbound, frame.as_bytes());
        if let Err(err) = self.transport.send(frame.as_bytes()) {
            self.scheduler.take_reply();
            return Err(Error::Transport(err.to_string()));
        }
        Ok(())
    }

    fn complete(&mut self, pending: &Pending, bytes: &[u8]) -> Vec<ItemEvent> {
        let Some(block) = self.blocks.get_mut(&pending.op.block) else {
            return Vec::new();
        };
        match pending.op.kind {
            OperationKind::Read => {
                let layout = block.layout();
                match parse_pull_get_holdings(layout.slave_addr, layout.num_reg, bytes) {
                    Ok(values) => block.apply_update(Quality::Good, Some(&values)),
                    Err(err) => {
                        self.logger
                            .warn(format_args!("Block {}: {err}", pending.op.block));
                        block.apply_update(Quality::Bad, None)
                    }
                }
            }
            OperationKind::Write { index, value } => {
                match parse_pull_set_echo(&pending.request, bytes) {
                    Ok(()) => block.set_registers(index, &[value]).unwrap_or_else(|err| {
                        self.logger
                            .warn(format_args!("Block {}: {err}", pending.op.block));
                        Vec::new()
                    }),
                    Err(err) => {
                        self.logger.warn(format_args!(
                            "Block {}: write of word {index} failed: {err}",
                            pending.op.block
                        ));
                        Vec::new()
                    }
                }
            }
        }
    }

    /// A failed poll degrades the block; a failed write leaves the cache alone.
    fn fail(&mut self, op: &Operation) -> Vec<ItemEvent> {
        match (&op.kind, self.blocks.get_mut(&op.block)) {
            (OperationKind::Read, Some(block)) => block.apply_update(Quality::Bad, None),
            _ => Vec::new(),
        }
    }
}
