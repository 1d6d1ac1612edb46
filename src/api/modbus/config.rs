/// Driver configuration
///
/// Configs are plain serde types so hosts can keep them in TOML or JSON. Reading the
/// file is up to the host; these helpers only parse the text.
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};

use crate::{
    core::{
        block::{Block, BlockLayout, DEFAULT_TIMEOUT},
        logs::{parse_level, PortLogger, Role},
    },
    error::ConfigError,
    protocol::modbus::MAX_REGISTERS,
};

/// Only holding registers are implemented.
pub const HOLDING_BLOCK: &str = "4x";
pub const DEFAULT_MODE: &str = "ascii";
pub const DEFAULT_SLAVE_BLOCK: &str = "memory";

fn default_mode() -> String {
    DEFAULT_MODE.to_string()
}

fn default_block_kind() -> String {
    HOLDING_BLOCK.to_string()
}

fn default_slave_block() -> String {
    DEFAULT_SLAVE_BLOCK.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DriverConfig {
    #[serde(rename = "serial.master")]
    Master(MasterConfig),
    #[serde(rename = "serial.slave")]
    Slave(SlaveConfig),
}

impl DriverConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    pub fn port(&self) -> &str {
        match self {
            DriverConfig::Master(config) => &config.port,
            DriverConfig::Slave(config) => &config.port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterConfig {
    pub port: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default)]
    pub blocks: BTreeMap<String, BlockConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockConfig {
    #[serde(rename = "type", default = "default_block_kind")]
    pub kind: String,
    pub slave_addr: u8,
    #[serde(default)]
    pub start_reg: u16,
    pub num_reg: u16,
    /// Poll period in ms; absent means read once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_interval: Option<u64>,
    /// Reply timeout in ms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_block: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaveConfig {
    pub port: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    pub slave_addr: u8,
    #[serde(default = "default_slave_block")]
    pub block: String,
    /// Initial size of the register memory. Registering items may grow it.
    #[serde(default)]
    pub num_reg: u16,
    /// Initial register values, written from register 0.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<u16>,
}

/// Only the ASCII framing is available.
pub fn check_mode(mode: &str) -> Result<(), ConfigError> {
    if mode.eq_ignore_ascii_case(DEFAULT_MODE) {
        Ok(())
    } else {
        Err(ConfigError::UnsupportedMode(mode.to_string()))
    }
}

fn log_filter(level: Option<&str>) -> Result<LevelFilter, ConfigError> {
    level.map_or(Ok(LevelFilter::Warn), parse_level)
}

impl BlockConfig {
    pub fn holding(slave_addr: u8, start_reg: u16, num_reg: u16) -> Self {
        Self {
            kind: HOLDING_BLOCK.to_string(),
            slave_addr,
            start_reg,
            num_reg,
            read_interval: None,
            timeout: None,
            next_block: None,
        }
    }

    pub fn with_read_interval(mut self, interval_ms: u64) -> Self {
        self.read_interval = Some(interval_ms);
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    pub fn to_block(&self, name: &str) -> Result<Block, ConfigError> {
        if self.kind != HOLDING_BLOCK {
            return Err(ConfigError::InvalidBlockType {
                block: name.to_string(),
                kind: self.kind.clone(),
            });
        }
        let invalid = |reason: String| ConfigError::InvalidBlock {
            block: name.to_string(),
            reason,
        };
        if self.num_reg == 0 || self.num_reg > MAX_REGISTERS {
            return Err(invalid(format!(
                "num_reg {} outside 1..={MAX_REGISTERS}",
                self.num_reg
            )));
        }
        if self.start_reg as u32 + self.num_reg as u32 > 0x1_0000 {
            return Err(invalid(format!(
                "registers {}..{} exceed the address space",
                self.start_reg,
                self.start_reg as u32 + self.num_reg as u32
            )));
        }
        if self.read_interval == Some(0) {
            return Err(invalid("read_interval must be positive".to_string()));
        }
        if name.contains('@') {
            return Err(invalid("block names cannot contain '@'".to_string()));
        }

        Ok(Block::new(
            name,
            BlockLayout {
                slave_addr: self.slave_addr,
                start_reg: self.start_reg,
                num_reg: self.num_reg,
                read_interval: self.read_interval.map(Duration::from_millis),
                timeout: self.timeout.map_or(DEFAULT_TIMEOUT, Duration::from_millis),
                next_block: self.next_block.clone(),
            },
        ))
    }
}

impl MasterConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            mode: default_mode(),
            log_level: None,
            blocks: BTreeMap::new(),
        }
    }

    pub fn logger(&self) -> Result<PortLogger, ConfigError> {
        check_mode(&self.mode)?;
        Ok(PortLogger::new(
            Role::Master,
            &self.port,
            log_filter(self.log_level.as_deref())?,
        ))
    }

    /// Build every valid block. Invalid ones are reported through `logger` and left out.
    pub fn build_blocks(&self, logger: &PortLogger) -> Vec<Block> {
        self.blocks
            .iter()
            .filter_map(|(name, config)| match config.to_block(name) {
                Ok(block) => Some(block),
                Err(err) => {
                    logger.error(format_args!("Skipping block: {err}"));
                    None
                }
            })
            .collect()
    }
}

impl SlaveConfig {
    pub fn new(port: impl Into<String>, slave_addr: u8) -> Self {
        Self {
            port: port.into(),
            mode: default_mode(),
            log_level: None,
            slave_addr,
            block: default_slave_block(),
            num_reg: 0,
            values: Vec::new(),
        }
    }

    pub fn logger(&self) -> Result<PortLogger, ConfigError> {
        check_mode(&self.mode)?;
        Ok(PortLogger::new(
            Role::Slave,
            &self.port,
            log_filter(self.log_level.as_deref())?,
        ))
    }

    /// The slave's memory, sized to hold both `num_reg` and the initial values.
    pub fn to_block(&self) -> Result<Block, ConfigError> {
        let size = u16::try_from(self.values.len())
            .map_err(|_| ConfigError::InvalidBlock {
                block: self.block.clone(),
                reason: format!("{} initial values", self.values.len()),
            })?
            .max(self.num_reg);

        let mut block = Block::new(
            self.block.clone(),
            BlockLayout {
                slave_addr: self.slave_addr,
                start_reg: 0,
                num_reg: size,
                read_interval: None,
                timeout: DEFAULT_TIMEOUT,
                next_block: None,
            },
        );
        if !self.values.is_empty() {
            block
                .set_registers(0, &self.values)
                .map_err(|err| ConfigError::InvalidBlock {
                    block: self.block.clone(),
                    reason: err.to_string(),
                })?;
        }
        Ok(block)
    }
}
