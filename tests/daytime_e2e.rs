//! End-to-end tests over real TCP connections.

mod common;

use std::time::Duration;

use common::{activate_loopback, loopback_config, run_with_timeout};
use daytime::{activate, DaytimeConfig, DaytimeError};
use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

fn line_pattern() -> Regex {
    Regex::new(r"^\w+, \w+ \d{1,2}, \d{4} (\d{2}):\d{2}:\d{2}-\S+\r\n$").unwrap()
}

async fn fetch(addr: std::net::SocketAddr) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect failed");
    let mut received = Vec::new();
    stream
        .read_to_end(&mut received)
        .await
        .expect("read failed");
    String::from_utf8(received).expect("non-ascii payload")
}

#[tokio::test]
async fn client_receives_one_line_then_close() {
    let handle = activate_loopback(loopback_config()).await;
    let addr = handle.local_addr();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut received = Vec::new();
    // read_to_end only returns once the server has closed its side
    run_with_timeout(Duration::from_secs(5), stream.read_to_end(&mut received))
        .await
        .unwrap();

    let line = String::from_utf8(received).unwrap();
    assert_eq!(line.matches("\r\n").count(), 1);
    let caps = line_pattern()
        .captures(&line)
        .unwrap_or_else(|| panic!("malformed line: {line:?}"));
    let hour: u32 = caps[1].parse().unwrap();
    assert!(hour <= 23);

    // no further bytes after close
    let mut extra = [0u8; 16];
    assert_eq!(stream.read(&mut extra).await.unwrap(), 0);

    handle.deactivate().await;
}

#[tokio::test]
async fn client_that_sends_data_still_gets_line() {
    use tokio::io::AsyncWriteExt;

    let handle = activate_loopback(loopback_config()).await;
    let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();
    stream.write_all(b"ignored request\r\n").await.unwrap();

    let mut received = Vec::new();
    run_with_timeout(Duration::from_secs(5), stream.read_to_end(&mut received))
        .await
        .unwrap();
    assert!(line_pattern().is_match(std::str::from_utf8(&received).unwrap()));

    handle.deactivate().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_concurrent_clients_each_get_one_line() {
    let handle = activate_loopback(DaytimeConfig {
        utc: true,
        ..loopback_config()
    })
    .await;
    let addr = handle.local_addr();

    let clients: Vec<_> = (0..100).map(|_| tokio::spawn(fetch(addr))).collect();
    let lines = run_with_timeout(Duration::from_secs(20), async {
        let mut lines = Vec::with_capacity(clients.len());
        for client in clients {
            lines.push(client.await.unwrap());
        }
        lines
    })
    .await;

    let pattern = line_pattern();
    for line in &lines {
        assert!(pattern.is_match(line), "malformed line: {line:?}");
        assert!(line.trim_end().ends_with("-UTC"));
    }
    assert_eq!(lines.len(), 100);

    handle.deactivate().await;
}

#[tokio::test]
async fn deactivate_releases_listening_port() {
    let handle = activate_loopback(loopback_config()).await;
    let addr = handle.local_addr();

    for _ in 0..3 {
        let line = run_with_timeout(Duration::from_secs(5), fetch(addr)).await;
        assert!(line_pattern().is_match(&line));
    }
    handle.deactivate().await;

    let rebound = TcpListener::bind(addr).await;
    assert!(rebound.is_ok(), "port still held: {rebound:?}");
}

#[tokio::test]
async fn reactivation_on_same_port_succeeds() {
    let first = activate_loopback(loopback_config()).await;
    let config = DaytimeConfig {
        port: first.local_addr().port(),
        ..loopback_config()
    };
    first.deactivate().await;

    let second = activate(config).await.unwrap();
    let line = run_with_timeout(Duration::from_secs(5), fetch(second.local_addr())).await;
    assert!(line_pattern().is_match(&line));
    second.deactivate().await;
}

#[tokio::test]
async fn port_zero_fails_activation() {
    let config = DaytimeConfig {
        port: 0,
        ..loopback_config()
    };
    assert!(matches!(
        activate(config).await,
        Err(DaytimeError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn bound_port_fails_activation_and_holds_nothing() {
    let holder = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = holder.local_addr().unwrap();

    let config = DaytimeConfig {
        port: addr.port(),
        ..loopback_config()
    };
    let err = activate(config.clone()).await.err().expect("activation should fail");
    assert!(matches!(err, DaytimeError::Bind { .. }), "unexpected error: {err}");

    // Once the other owner lets go, the port is free: the failed activation kept nothing.
    drop(holder);
    let handle = activate(config).await.unwrap();
    handle.deactivate().await;
}

#[tokio::test]
async fn deactivate_severs_connected_client() {
    let handle = activate_loopback(loopback_config()).await;
    let addr = handle.local_addr();

    // Keep the client open so the session is still lingering on the server side.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut first = [0u8; 1];
    run_with_timeout(Duration::from_secs(5), stream.read_exact(&mut first))
        .await
        .unwrap();

    handle.deactivate().await;

    let mut rest = Vec::new();
    let _ = run_with_timeout(Duration::from_secs(2), stream.read_to_end(&mut rest)).await;
    assert!(TcpStream::connect(addr).await.is_err(), "still accepting after deactivate");
}
