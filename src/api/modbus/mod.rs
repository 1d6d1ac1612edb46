pub mod config;
pub mod core;
pub mod master;
pub mod slave;
pub mod traits;

use std::sync::Arc;

pub use config::{BlockConfig, DriverConfig, MasterConfig, SlaveConfig};
pub use master::MasterDriver;
pub use slave::SlaveDriver;
pub use traits::{execute_hook_chain, Driver, LoggingHook, ModbusHook, NoOpHook};

use crate::{
    error::{ConfigError, Error},
    protocol::transport::Transport,
};

/// Create the driver a configuration describes.
///
/// # Example
///
/// ```no_run
/// use modbus_simple::api::modbus::{create, DriverConfig};
/// use modbus_simple::protocol::transport::LoopbackTransport;
/// use std::sync::Arc;
///
/// # async fn demo() -> anyhow::Result<()> {
/// let config = DriverConfig::from_toml_str(r#"
///     type = "serial.slave"
///     port = "COM2"
///     slave_addr = 1
///     num_reg = 10
/// "#)?;
/// let (link, _peer) = LoopbackTransport::pair();
/// let driver = create(config, Arc::new(link))?;
/// driver.start()?;
/// # Ok(())
/// # }
/// ```
pub fn create(
    config: DriverConfig,
    transport: Arc<dyn Transport>,
) -> Result<Box<dyn Driver>, Error> {
    match config {
        DriverConfig::Master(config) => {
            Ok(Box::new(MasterDriver::new(&config, transport, Vec::new())?))
        }
        DriverConfig::Slave(config) => {
            Ok(Box::new(SlaveDriver::new(&config, transport, Vec::new())?))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderRole {
    Master,
    Slave { slave_addr: u8 },
}

/// Builder for driver configurations with hooks attached.
///
/// # Middleware Pattern
///
/// Hooks added with `.add_hook()` observe every frame sent and received, in the order
/// they were added.
///
/// # Example
///
/// ```no_run
/// use modbus_simple::api::modbus::{BlockConfig, LoggingHook, ModbusBuilder};
/// use modbus_simple::protocol::transport::LoopbackTransport;
/// use std::sync::Arc;
///
/// # async fn demo() -> anyhow::Result<()> {
/// let (link, _peer) = LoopbackTransport::pair();
/// let master = ModbusBuilder::new_master()
///     .with_port("COM1")
///     .add_block("PLC_4x", BlockConfig::holding(1, 0, 10).with_read_interval(1000))
///     .with_timeout(1500)
///     .add_hook(Arc::new(LoggingHook))
///     .build_master(Arc::new(link))?;
/// # Ok(())
/// # }
/// ```
pub struct ModbusBuilder {
    role: BuilderRole,
    port: Option<String>,
    mode: String,
    log_level: Option<String>,
    timeout_ms: Option<u64>,
    blocks: Vec<(String, BlockConfig)>,
    block_name: Option<String>,
    num_reg: u16,
    values: Vec<u16>,
    hooks: Vec<Arc<dyn ModbusHook>>,
}

impl ModbusBuilder {
    fn new(role: BuilderRole) -> Self {
        Self {
            role,
            port: None,
            mode: config::DEFAULT_MODE.to_string(),
            log_level: None,
            timeout_ms: None,
            blocks: Vec::new(),
            block_name: None,
            num_reg: 0,
            values: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// Create a new builder for a Modbus Master.
    pub fn new_master() -> Self {
        Self::new(BuilderRole::Master)
    }

    /// Create a new builder for a Modbus Slave answering on `slave_addr`.
    pub fn new_slave(slave_addr: u8) -> Self {
        Self::new(BuilderRole::Slave { slave_addr })
    }

    /// Set the port name used in logs and hooks.
    pub fn with_port(mut self, port: &str) -> Self {
        self.port = Some(port.to_string());
        self
    }

    /// Framing mode; only `ascii` builds.
    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = mode.to_string();
        self
    }

    pub fn with_log_level(mut self, level: &str) -> Self {
        self.log_level = Some(level.to_string());
        self
    }

    /// Add a polled block (Master only).
    pub fn add_block(mut self, name: &str, block: BlockConfig) -> Self {
        self.blocks.push((name.to_string(), block));
        self
    }

    /// Reply timeout for every block that does not set its own (Master only).
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Name of the slave's register memory (Slave only).
    pub fn with_block_name(mut self, name: &str) -> Self {
        self.block_name = Some(name.to_string());
        self
    }

    /// Initial memory size (Slave only).
    pub fn with_registers(mut self, num_reg: u16) -> Self {
        self.num_reg = num_reg;
        self
    }

    /// Initial register values from register 0 (Slave only).
    pub fn with_values(mut self, values: &[u16]) -> Self {
        self.values = values.to_vec();
        self
    }

    /// Add a hook to the middleware chain (can be called multiple times)
    pub fn add_hook(mut self, hook: Arc<dyn ModbusHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// The configuration this builder describes.
    pub fn config(&self) -> Result<DriverConfig, ConfigError> {
        let port = self.port.clone().ok_or(ConfigError::MissingConfig)?;
        match self.role {
            BuilderRole::Master => {
                let blocks = self
                    .blocks
                    .iter()
                    .map(|(name, block)| {
                        let mut block = block.clone();
                        if block.timeout.is_none() {
                            block.timeout = self.timeout_ms;
                        }
                        (name.clone(), block)
                    })
                    .collect();
                Ok(DriverConfig::Master(MasterConfig {
                    port,
                    mode: self.mode.clone(),
                    log_level: self.log_level.clone(),
                    blocks,
                }))
            }
            BuilderRole::Slave { slave_addr } => Ok(DriverConfig::Slave(SlaveConfig {
                port,
                mode: self.mode.clone(),
                log_level: self.log_level.clone(),
                slave_addr,
                block: self
                    .block_name
                    .clone()
                    .unwrap_or_else(|| config::DEFAULT_SLAVE_BLOCK.to_string()),
                num_reg: self.num_reg,
                values: self.values.clone(),
            })),
        }
    }

    pub fn build_master(self, transport: Arc<dyn Transport>) -> Result<MasterDriver, Error> {
        match self.config()? {
            DriverConfig::Master(config) => MasterDriver::new(&config, transport, self.hooks),
            DriverConfig::Slave(_) => Err(ConfigError::WrongRole("Slave, not Master").into()),
        }
    }

    pub fn build_slave(self, transport: Arc<dyn Transport>) -> Result<SlaveDriver, Error> {
        match self.config()? {
            DriverConfig::Slave(config) => SlaveDriver::new(&config, transport, self.hooks),
            DriverConfig::Master(_) => Err(ConfigError::WrongRole("Master, not Slave").into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_builder_master_config() {
        let config = ModbusBuilder::new_master()
            .with_port("COM1")
            .with_log_level("info")
            .add_block("a", BlockConfig::holding(1, 0, 4))
            .add_block("b", BlockConfig::holding(2, 0, 4).with_timeout(100))
            .with_timeout(750)
            .config()
            .unwrap();

        let DriverConfig::Master(master) = config else {
            panic!("expected a master config");
        };
        assert_eq!(master.blocks["a"].timeout, Some(750));
        assert_eq!(master.blocks["b"].timeout, Some(100));
        let block = master.blocks["a"].to_block("a").unwrap();
        assert_eq!(block.layout().timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_builder_requires_port() {
        assert!(matches!(
            ModbusBuilder::new_slave(1).config(),
            Err(ConfigError::MissingConfig)
        ));
    }

    #[test]
    fn test_builder_slave_config() {
        let config = ModbusBuilder::new_slave(3)
            .with_port("COM2")
            .with_registers(8)
            .with_values(&[1, 2, 3])
            .config()
            .unwrap();
        let DriverConfig::Slave(slave) = config else {
            panic!("expected a slave config");
        };
        assert_eq!(slave.slave_addr, 3);
        assert_eq!(slave.block, config::DEFAULT_SLAVE_BLOCK);
        assert_eq!(slave.to_block().unwrap().store().len(), 8);
    }

    #[test]
    fn test_create_needs_runtime() {
        let (link, _peer) = crate::protocol::transport::LoopbackTransport::pair();
        let config = DriverConfig::Slave(SlaveConfig::new("COM2", 1));
        assert!(matches!(
            create(config, Arc::new(link)),
            Err(Error::Config(ConfigError::NoRuntime))
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_rtu() {
        let (link, _peer) = crate::protocol::transport::LoopbackTransport::pair();
        let mut config = MasterConfig::new("COM1");
        config.mode = "rtu".to_string();
        assert!(matches!(
            create(DriverConfig::Master(config), Arc::new(link)),
            Err(Error::Config(ConfigError::UnsupportedMode(_)))
        ));
    }
}
