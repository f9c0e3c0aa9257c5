//! Service configuration

use std::net::{IpAddr, SocketAddr};

use clap::Args;

use crate::error::{DaytimeError, Result};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9013;

/// Address, port and socket options a session service is bound with.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct DaytimeConfig {
    /// Local address to listen on
    #[arg(short, long, value_name = "ADDR", default_value = DEFAULT_BIND_ADDR)]
    pub bind_addr: String,

    /// Listening port
    #[arg(short, long, value_name = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Disable Nagle's algorithm on accepted connections
    #[arg(long, value_name = "BOOL", default_value_t = true, action = clap::ArgAction::Set)]
    pub tcp_nodelay: bool,

    /// Report the time in UTC instead of local time
    #[arg(long)]
    pub utc: bool,
}

impl Default for DaytimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_PORT,
            tcp_nodelay: true,
            utc: false,
        }
    }
}

impl DaytimeConfig {
    /// Check the values before anything is bound.
    ///
    /// # Errors
    /// Returns [`DaytimeError::InvalidConfig`] for port 0 or a bind address
    /// that is not an IP literal.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(DaytimeError::InvalidConfig("port cannot be 0".to_string()));
        }
        self.ip()?;
        Ok(())
    }

    pub fn ip(&self) -> Result<IpAddr> {
        self.bind_addr.parse().map_err(|_| {
            DaytimeError::InvalidConfig(format!("invalid bind address: {}", self.bind_addr))
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(self.ip()?, self.port))
    }
}
