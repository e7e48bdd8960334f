//! Connection settings consumed from the outer system
//!
//! The surrounding meter dispatcher parses its configuration (YAML or
//! otherwise) into [`ConnectionSettings`] and selects the transport by the
//! protocol discriminator. This module validates the settings and builds the
//! SolarmanV5 client when that protocol is chosen; the other transports are
//! external collaborators.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::SolarmanClient;
use crate::error::{SolarmanError, SolarmanResult};
use crate::session::{DEFAULT_SLAVE_ID, DEFAULT_TIMEOUT};

/// Transport protocol discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Protocol {
    /// Plain Modbus TCP
    #[default]
    #[serde(rename = "tcp")]
    Tcp,
    /// Modbus RTU framing tunneled over TCP
    #[serde(rename = "rtu-over-tcp")]
    RtuOverTcp,
    /// Serial RS-485
    #[serde(rename = "serial")]
    Serial,
    /// SolarmanV5 data-logger encapsulation
    #[serde(rename = "solarmanv5")]
    SolarmanV5,
}

fn default_slave_id() -> u8 {
    DEFAULT_SLAVE_ID
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

/// One meter endpoint as the outer configuration describes it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Host or host:port
    pub uri: String,
    /// Modbus slave ID (1-247)
    #[serde(default = "default_slave_id")]
    pub id: u8,
    /// Data-logger serial; required when protocol is SolarmanV5
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger_serial: Option<u32>,
    /// Transport selection
    #[serde(default)]
    pub protocol: Protocol,
    /// Exchange deadline in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ConnectionSettings {
    /// Check the settings for the constraints the transports rely on
    pub fn validate(&self) -> SolarmanResult<()> {
        if self.uri.is_empty() {
            return Err(SolarmanError::config("uri cannot be empty"));
        }
        if self.id == 0 || self.id > 247 {
            return Err(SolarmanError::config(format!(
                "invalid slave ID: {} (must be 1-247)",
                self.id
            )));
        }
        if self.protocol == Protocol::SolarmanV5 && self.logger_serial.is_none() {
            return Err(SolarmanError::config(
                "logger_serial is required for solarmanv5",
            ));
        }
        Ok(())
    }

    /// Build the SolarmanV5 client these settings describe.
    ///
    /// Returns a configuration error for any other protocol; the dispatcher
    /// owns those transports.
    pub fn build_solarman(&self) -> SolarmanResult<SolarmanClient> {
        self.validate()?;
        if self.protocol != Protocol::SolarmanV5 {
            return Err(SolarmanError::config(format!(
                "protocol {:?} is not handled by this transport",
                self.protocol
            )));
        }

        // validate() guarantees the serial is present
        let logger_serial = self
            .logger_serial
            .ok_or_else(|| SolarmanError::config("logger_serial is required for solarmanv5"))?;

        let mut client = SolarmanClient::with_slave(&self.uri, logger_serial, self.id)?;
        client
            .session_mut()
            .set_timeout(Duration::from_millis(self.timeout_ms));
        Ok(client)
    }
}
