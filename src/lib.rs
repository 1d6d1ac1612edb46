//! modbus_simple: Modbus ASCII master/slave engine for half-duplex serial links
//!
//! The crate is split the same way data flows through it:
//! - [`protocol`] holds the ASCII frame codec, request/reply builders and the
//!   [`Transport`](protocol::transport::Transport) seam the host implements.
//! - [`core`] holds the sans-IO protocol cores: register memory with change
//!   detection, item addressing, the master's single-flight scheduler and the
//!   slave's function-code table.
//! - [`api`] wraps the cores into tokio-driven drivers built from serde
//!   configurations.
//!
//! Opening serial ports and installing a `log` backend are left to the host.

pub mod api;
pub mod core;
pub mod error;
pub mod protocol;

pub use api::modbus::{create, Driver, DriverConfig, ModbusBuilder};
pub use error::{Error, Result};
