//! Shared helpers for daytime integration tests.

#![allow(dead_code)]

use std::time::Duration;

use daytime::{activate, DaytimeConfig, DaytimeError, ServiceHandle};

/// Run the given future with a timeout, failing the test if it elapses.
pub async fn run_with_timeout<F, T>(duration: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .expect("test timed out")
}

/// Activate on a fresh loopback port, retrying if another test grabbed the
/// reserved port before the service could bind it.
pub async fn activate_loopback(base: DaytimeConfig) -> ServiceHandle {
    let mut attempts = 0;
    loop {
        let config = DaytimeConfig {
            port: free_port(),
            ..base.clone()
        };
        match activate(config).await {
            Ok(handle) => return handle,
            Err(DaytimeError::Bind { .. }) if attempts < 10 => attempts += 1,
            Err(e) => panic!("activation failed: {e}"),
        }
    }
}

/// Reserve a loopback port by binding to :0 and releasing it again.
pub fn free_port() -> u16 {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    probe.local_addr().expect("Failed to get local address").port()
}

pub fn loopback_config() -> DaytimeConfig {
    DaytimeConfig {
        bind_addr: "127.0.0.1".to_string(),
        port: free_port(),
        ..Default::default()
    }
}
