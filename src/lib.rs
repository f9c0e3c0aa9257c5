//! Daytime protocol server (RFC 867 style)
//!
//! Every accepted TCP connection receives one timestamp line followed by a
//! server-side close.

pub mod config;
pub mod error;
pub mod handler;
pub mod server;
pub mod transport;

pub use config::DaytimeConfig;
pub use error::{DaytimeError, Result};
pub use handler::{render_daytime, DaytimeHandler};
pub use server::{activate, ServiceHandle};
