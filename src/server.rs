//! Service activation and teardown

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::config::DaytimeConfig;
use crate::error::Result;
use crate::handler::DaytimeHandler;
use crate::transport::TcpSessionService;

/// A running daytime service.
///
/// Dropping the handle stops the service as well; [`ServiceHandle::deactivate`]
/// additionally waits until the listening socket is released.
pub struct ServiceHandle {
    service: TcpSessionService,
    local_addr: SocketAddr,
}

/// Bind the configured address, register the daytime handler and start serving.
///
/// # Errors
/// Returns an error for an invalid configuration (including port 0) or when
/// the address cannot be bound. Nothing is left listening on failure.
pub async fn activate(config: DaytimeConfig) -> Result<ServiceHandle> {
    config.validate()?;

    let handler = DaytimeHandler::new(config.utc);
    let mut service = TcpSessionService::new(config);
    service.set_session_listener(Arc::new(handler));
    let local_addr = service.start().await?;

    info!("Daytime service activated on {}", local_addr);
    Ok(ServiceHandle {
        service,
        local_addr,
    })
}

impl ServiceHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the service. Open sessions are severed, not drained.
    pub async fn deactivate(mut self) {
        self.service.dispose().await;
        info!("Daytime service on {} deactivated", self.local_addr);
    }
}
