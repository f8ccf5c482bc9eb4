//! End-to-end UDP transactions against a loopback server.

use std::time::Duration;

use ipkcp_config::TransportMode;
use ipkcp_core::{Served, client};
use ipkcp_core::codec::{Status, decode_response, encode_request};
use ipkcp_core::shutdown::Shutdown;
use ipkcp_test_utils::config::TestConfigBuilder;
use ipkcp_test_utils::server::TestServer;
use pretty_assertions::assert_eq;
use tokio::net::UdpSocket;

async fn udp_server() -> TestServer {
    ipkcp_test_utils::tracing_setup::init_test_tracing();
    TestServer::start(TestConfigBuilder::new().mode(TransportMode::Udp).build()).await
}

async fn transact(socket: &UdpSocket, datagram: &[u8]) -> (Status, String) {
    socket.send(datagram).await.unwrap();
    let mut buf = [0u8; 512];
    let len = tokio::time::timeout(Duration::from_secs(2), socket.recv(&mut buf))
        .await
        .expect("server should answer every datagram")
        .unwrap();
    decode_response(&buf[..len]).unwrap()
}

#[tokio::test]
async fn test_transactions_are_independent() {
    let server = udp_server().await;
    let socket = client::connect_udp(server.addr).await.unwrap();

    assert_eq!(
        transact(&socket, &encode_request("(+ 1 2)")).await,
        (Status::Ok, "3".to_string())
    );
    assert_eq!(
        transact(&socket, &encode_request("(/ 1 0)")).await,
        (Status::Error, "Calculation failed (division by zero).".to_string())
    );
    // A failure does not affect the next request.
    assert_eq!(
        transact(&socket, &encode_request("(* 6 7)")).await,
        (Status::Ok, "42".to_string())
    );

    assert_eq!(server.stop().await, Served::Udp(3));
}

#[tokio::test]
async fn test_malformed_datagrams_get_error_envelopes() {
    let server = udp_server().await;
    let socket = client::connect_udp(server.addr).await.unwrap();
    let invalid = (Status::Error, "Invalid request.".to_string());

    assert_eq!(transact(&socket, &[0x00]).await, invalid);
    assert_eq!(transact(&socket, b"\x01\x07(+ 1 2)").await, invalid);
    assert_eq!(transact(&socket, &encode_request("(+ 1)")).await, invalid);
    assert_eq!(transact(&socket, &encode_request("SOLVE (+ 1 2)")).await, invalid);
    assert_eq!(
        transact(&socket, &encode_request("(- 2 3)")).await,
        (Status::Error, "Calculation failed (negative result).".to_string())
    );

    server.stop().await;
}

#[tokio::test]
async fn test_udp_client_driver_against_server() {
    let server = udp_server().await;
    let socket = client::connect_udp(server.addr).await.unwrap();
    let shutdown = Shutdown::new();

    let input: &[u8] = b"(+ 10 (* 2 3))\n(/ 9 0)\n";
    let mut output = Vec::new();
    client::run_udp(
        input,
        &mut output,
        &socket,
        Some(Duration::from_secs(2)),
        shutdown.listener(),
    )
    .await
    .unwrap();

    assert_eq!(
        String::from_utf8(output).unwrap(),
        "OK:16\nERR:Calculation failed (division by zero).\n"
    );
    server.stop().await;
}
