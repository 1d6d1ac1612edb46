use std::{sync::Arc, time::Duration};

use modbus_simple::{
    api::modbus::{create, BlockConfig, Driver, DriverConfig, LoggingHook, ModbusBuilder},
    core::{
        bus::{EventKind, ItemEvent, Notification},
        registers::Quality,
    },
    protocol::transport::LoopbackTransport,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Wait for the first item event matching `pred`.
async fn wait_for(
    rx: &flume::Receiver<Notification>,
    pred: impl Fn(&ItemEvent) -> bool,
) -> ItemEvent {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match rx.recv_async().await {
                Ok(Notification::ItemValue(event)) if pred(&event) => return event,
                Ok(_) => continue,
                Err(err) => panic!("bus closed: {err}"),
            }
        }
    })
    .await
    .expect("no matching notification")
}

#[tokio::test]
async fn test_master_polls_slave_over_loopback() {
    init_logger();
    let (master_link, slave_link) = LoopbackTransport::pair();

    let slave = ModbusBuilder::new_slave(1)
        .with_port("SLAVE")
        .with_registers(10)
        .with_values(&[0, 10, 20, 30, 40])
        .build_slave(Arc::new(slave_link))
        .unwrap();
    tokio_test::assert_ok!(slave.start());

    let master = ModbusBuilder::new_master()
        .with_port("MASTER")
        .add_block("PLC", BlockConfig::holding(1, 0, 10).with_read_interval(50))
        .add_hook(Arc::new(LoggingHook))
        .build_master(Arc::new(master_link))
        .unwrap();
    master.register("PLC@n:4").unwrap();
    let (_, rx) = master.subscribe_channel(EventKind::ItemValue);
    tokio_test::assert_ok!(master.start());

    let event = wait_for(&rx, |e| e.name == "PLC@n:4").await;
    assert_eq!(event.value, 40);
    assert_eq!(event.quality, Quality::Good);

    master.write_item("PLC@n:4", 99).unwrap();
    wait_for(&rx, |e| e.name == "PLC@n:4" && e.value == 99).await;
    assert_eq!(slave.registers(4, 1).unwrap(), vec![99]);
    assert_eq!(master.read_item("PLC@n:4").unwrap().value, 99);

    master.stop();
    slave.stop();
}

#[tokio::test]
async fn test_slave_notifies_on_master_write() {
    init_logger();
    let (master_link, slave_link) = LoopbackTransport::pair();

    let slave = ModbusBuilder::new_slave(7)
        .with_port("SLAVE")
        .with_registers(4)
        .build_slave(Arc::new(slave_link))
        .unwrap();
    slave.register("n:2.1").unwrap();
    let (_, rx) = slave.subscribe_channel(EventKind::ItemValue);
    slave.start().unwrap();

    let master = ModbusBuilder::new_master()
        .with_port("MASTER")
        .add_block("dev", BlockConfig::holding(7, 0, 4))
        .build_master(Arc::new(master_link))
        .unwrap();
    master.register("dev@n:2").unwrap();
    master.start().unwrap();
    master.write_item("dev@n:2", 0b10).unwrap();

    let event = wait_for(&rx, |e| e.value == 1).await;
    assert_eq!(event.name, "n:2.1");
    assert_eq!(slave.read_item("n:2.1").unwrap().value, 1);
}

#[tokio::test]
async fn test_unanswered_poll_goes_bad() {
    init_logger();
    let (master_link, _silent) = LoopbackTransport::pair();

    let master = ModbusBuilder::new_master()
        .with_port("MASTER")
        .add_block("PLC", BlockConfig::holding(1, 0, 2).with_read_interval(50))
        .with_timeout(100)
        .build_master(Arc::new(master_link))
        .unwrap();
    master.register("PLC@n:0").unwrap();
    master.start().unwrap();

    // never GOOD, so a failed poll has nothing to report
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        master.read_item("PLC@n:0").map(|r| r.quality),
        Some(Quality::Bad)
    );
    assert!(master.is_running());
}

#[tokio::test]
async fn test_transport_errors_are_published() {
    init_logger();
    let (master_link, _peer) = LoopbackTransport::pair();
    let master_link = Arc::new(master_link);

    let master = ModbusBuilder::new_master()
        .with_port("MASTER")
        .build_master(master_link.clone())
        .unwrap();
    let (_, rx) = master.subscribe_channel(EventKind::TransportError);

    master_link.inject_error("port closed");
    let notification = tokio::time::timeout(Duration::from_secs(5), rx.recv_async())
        .await
        .expect("no transport error")
        .unwrap();
    assert_eq!(
        notification,
        Notification::TransportError {
            message: "port closed".to_string()
        }
    );
}

#[tokio::test]
async fn test_create_from_toml() {
    init_logger();
    let (master_link, slave_link) = LoopbackTransport::pair();

    let slave = create(
        DriverConfig::from_toml_str(
            r#"
type = "serial.slave"
port = "COM2"
slave_addr = 1
num_reg = 10
values = [5, 6, 7]
"#,
        )
        .unwrap(),
        Arc::new(slave_link),
    )
    .unwrap();
    slave.start().unwrap();

    let master = create(
        DriverConfig::from_toml_str(
            r#"
type = "serial.master"
port = "COM1"

[blocks.PLC_4x]
slave_addr = 1
num_reg = 3

[blocks.broken]
type = "1x"
slave_addr = 1
num_reg = 3
"#,
        )
        .unwrap(),
        Arc::new(master_link),
    )
    .unwrap();
    assert_eq!(master.port(), "COM1");
    master.register("PLC_4x@n:2").unwrap();
    assert!(master.register("broken@n:0").is_err());

    let (_, rx) = master.subscribe_channel(EventKind::ItemValue);
    master.start().unwrap();
    let event = wait_for(&rx, |_| true).await;
    assert_eq!(event.value, 7);
}
