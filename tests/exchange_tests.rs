use std::{collections::BTreeMap, sync::Arc, time::Duration};

use modbus_simple::{
    core::{
        block::{Block, BlockLayout, DEFAULT_TIMEOUT},
        bus::ItemEvent,
        clock::ManualClock,
        logs::PortLogger,
        master::Master,
        registers::Quality,
        slave::Slave,
    },
    protocol::transport::RecordingTransport,
};

const POLL: Duration = Duration::from_millis(1000);

struct Bench {
    clock: Arc<ManualClock>,
    master_wire: Arc<RecordingTransport>,
    slave_wire: Arc<RecordingTransport>,
    master: Master,
    slave: Slave,
}

#[derive(Default)]
struct Round {
    master: Vec<ItemEvent>,
    slave: Vec<ItemEvent>,
}

impl Bench {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new());
        let master_wire = Arc::new(RecordingTransport::new());
        let slave_wire = Arc::new(RecordingTransport::new());

        let plc = Block::new(
            "PLC",
            BlockLayout {
                slave_addr: 1,
                start_reg: 0,
                num_reg: 10,
                read_interval: Some(POLL),
                timeout: DEFAULT_TIMEOUT,
                next_block: None,
            },
        );
        let master = Master::new(
            PortLogger::default(),
            vec![plc],
            master_wire.clone(),
            clock.clone(),
        );

        let memory = Block::new(
            "memory",
            BlockLayout {
                slave_addr: 1,
                start_reg: 0,
                num_reg: 10,
                read_interval: None,
                timeout: DEFAULT_TIMEOUT,
                next_block: None,
            },
        );
        let mut slave = Slave::new(PortLogger::default(), memory, slave_wire.clone());
        slave.set_registers(0, &[0; 10]).unwrap();
        slave.start();

        Self {
            clock,
            master_wire,
            slave_wire,
            master,
            slave,
        }
    }

    /// Carry frames across the link until both sides are quiet.
    fn pump(&mut self) -> Round {
        let mut round = Round::default();
        loop {
            let requests = self.master_wire.take_sent();
            let replies = self.slave_wire.take_sent();
            if requests.is_empty() && replies.is_empty() {
                return round;
            }
            for frame in requests {
                round.slave.extend(self.slave.on_frame(frame.as_bytes()));
            }
            for frame in replies {
                round.master.extend(self.master.on_frame(frame.as_bytes()));
            }
        }
    }

    fn advance(&mut self, by: Duration) -> Round {
        let mut round = Round::default();
        for id in self.clock.advance(by) {
            round.master.extend(self.master.on_timer(id));
        }
        let pumped = self.pump();
        round.master.extend(pumped.master);
        round.slave.extend(pumped.slave);
        round
    }

    fn master_values(&self) -> Vec<u16> {
        self.master.block("PLC").unwrap().store().read(0, 10).unwrap()
    }

    fn slave_values(&self) -> Vec<u16> {
        self.slave.block().store().read(0, 10).unwrap()
    }
}

fn counts(events: &[ItemEvent]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for event in events {
        *counts.entry(event.name.as_str()).or_default() += 1;
    }
    counts
}

#[test]
fn test_first_poll_mirrors_slave_and_notifies_each_item_once() {
    let mut bench = Bench::new();
    let mut names: Vec<String> = (0..10).map(|i| format!("PLC@n:{i}")).collect();
    names.push("PLC@n:3.0".to_string());
    names.push("PLC@n:3.15".to_string());
    for name in &names {
        bench.master.register(name).unwrap();
    }

    bench.master.start();
    let round = bench.pump();

    assert_eq!(bench.master_values(), bench.slave_values());
    let counts = counts(&round.master);
    assert_eq!(counts.len(), names.len());
    assert!(counts.values().all(|count| *count == 1));
    assert!(round.master.iter().all(|e| e.quality == Quality::Good));
}

#[test]
fn test_repeat_poll_reports_only_changes() {
    let mut bench = Bench::new();
    bench.master.register("PLC@n:5").unwrap();
    bench.master.register("PLC@n:6").unwrap();
    bench.master.start();
    bench.pump();

    // nothing moved
    let round = bench.advance(POLL);
    assert!(round.master.is_empty());

    bench.slave.set_registers(5, &[1234]).unwrap();
    assert!(bench.advance(POLL - Duration::from_millis(1)).master.is_empty());
    let round = bench.advance(Duration::from_millis(1));
    assert_eq!(counts(&round.master), BTreeMap::from([("PLC@n:5", 1)]));
    assert_eq!(bench.master.read_item("PLC@n:5").unwrap().value, 1234);
}

#[test]
fn test_write_single_register_touches_only_word_three() {
    let mut bench = Bench::new();
    for name in ["PLC@n:2", "PLC@n:3", "PLC@n:3.0", "PLC@n:3.7", "PLC@n:4"] {
        bench.master.register(name).unwrap();
    }
    for name in ["n:2", "n:3", "n:3.0", "n:3.15", "n:4"] {
        bench.slave.register(name).unwrap();
    }
    bench.master.start();
    bench.pump();

    bench.master.write_item("PLC@n:3", 0xFFFF).unwrap();
    let round = bench.pump();

    assert_eq!(
        counts(&round.slave),
        BTreeMap::from([("n:3", 1), ("n:3.0", 1), ("n:3.15", 1)])
    );
    assert_eq!(
        counts(&round.master),
        BTreeMap::from([("PLC@n:3", 1), ("PLC@n:3.0", 1), ("PLC@n:3.7", 1)])
    );
    assert_eq!(bench.slave_values(), vec![0, 0, 0, 0xFFFF, 0, 0, 0, 0, 0, 0]);
    assert_eq!(bench.master_values(), bench.slave_values());
}

#[test]
fn test_write_bit_is_read_modify_write() {
    let mut bench = Bench::new();
    bench.master.register("PLC@n:3.2").unwrap();
    bench.master.register("PLC@n:3").unwrap();
    bench.slave.set_registers(3, &[0x0100]).unwrap();
    bench.master.start();
    bench.pump();

    bench.master.write_item("PLC@n:3.2", 1).unwrap();
    let round = bench.pump();
    assert_eq!(bench.slave.block().store().get(3).unwrap().value, 0x0104);
    assert_eq!(counts(&round.master).len(), 2);
}

#[test]
fn test_silent_slave_degrades_quality_until_it_answers_again() {
    let mut bench = Bench::new();
    bench.master.register("PLC@n:0").unwrap();
    bench.master.start();
    bench.pump();

    bench.slave.stop();
    let round = bench.advance(POLL);
    assert!(round.master.is_empty());
    let round = bench.advance(DEFAULT_TIMEOUT);
    assert_eq!(round.master.len(), 1);
    assert_eq!(round.master[0].quality, Quality::Bad);

    // still bad: no repeated notification
    bench.advance(POLL);
    assert!(bench.advance(DEFAULT_TIMEOUT).master.is_empty());

    bench.slave.start();
    let round = bench.advance(POLL);
    assert_eq!(round.master.len(), 1);
    assert_eq!(round.master[0].quality, Quality::Good);
}

#[test]
fn test_stop_cancels_polling() {
    let mut bench = Bench::new();
    bench.master.register("PLC@n:3").unwrap();
    bench.master.start();
    bench.pump();
    assert_eq!(bench.clock.pending(), 1);

    bench.master.stop();
    assert_eq!(bench.clock.pending(), 0);
    assert!(bench.advance(POLL * 5).master.is_empty());
    assert_eq!(bench.master_wire.sent_count(), 0);

    assert!(bench.master.write_item("PLC@n:3", 7).is_err());
    assert_eq!(bench.master_wire.sent_count(), 0);
    assert_eq!(bench.clock.pending(), 0);
    assert_eq!(bench.slave.block().store().get(3).unwrap().value, 0);
}
