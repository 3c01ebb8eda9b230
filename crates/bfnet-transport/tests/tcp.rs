//! Integration tests for the TCP transport.

use bfnet_transport::{Connection, TcpConnection, TcpTransport, Transport, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn test_tcp_accept_and_exchange() {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.expect("bind");
    let addr = transport.local_addr().expect("local addr");

    let accept = tokio::spawn(async move { transport.accept().await.expect("accept") });
    let mut client = TcpStream::connect(addr).await.expect("connect");
    let server_conn = accept.await.unwrap();

    assert_eq!(
        server_conn.peer_addr().map(|a| a.ip()),
        client.local_addr().ok().map(|a| a.ip())
    );

    client.write_all(b"ping").await.unwrap();
    let got = server_conn.recv().await.unwrap().expect("data");
    assert_eq!(got, b"ping");

    server_conn.send(b"pong").await.unwrap();
    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");
}

#[tokio::test]
async fn test_tcp_recv_none_on_client_shutdown() {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap();

    let accept = tokio::spawn(async move { transport.accept().await.unwrap() });
    let mut client = TcpStream::connect(addr).await.unwrap();
    let server_conn = accept.await.unwrap();

    client.shutdown().await.unwrap();
    assert!(server_conn.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn test_tcp_read_buffer_caps_read_event() {
    let transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let mut transport = transport.with_read_buffer(4);
    let addr = transport.local_addr().unwrap();

    let accept = tokio::spawn(async move { transport.accept().await.unwrap() });
    let mut client = TcpStream::connect(addr).await.unwrap();
    let server_conn = accept.await.unwrap();

    client.write_all(b"abcdefgh").await.unwrap();
    let first = server_conn.recv().await.unwrap().unwrap();
    assert!(first.len() <= 4);
    assert!(!first.is_empty());
}

#[tokio::test]
async fn test_tcp_connection_close_signals_eof_to_client() {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap().to_string();

    let accept = tokio::spawn(async move { transport.accept().await.unwrap() });
    let client = TcpConnection::connect(&addr).await.unwrap();
    let server_conn = accept.await.unwrap();

    server_conn.close().await.unwrap();
    assert!(client.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn test_tcp_connect_refused_reports_connect_failed() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = TcpConnection::connect(&addr).await.err().expect("nothing listens");
    assert!(matches!(err, TransportError::ConnectFailed(_)));
    assert!(err.to_string().starts_with("connect failed"));
}

#[tokio::test]
async fn test_tcp_successive_reads_respect_cap() {
    let transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let mut transport = transport.with_read_buffer(4);
    let addr = transport.local_addr().unwrap();

    let accept = tokio::spawn(async move { transport.accept().await.unwrap() });
    let mut client = TcpStream::connect(addr).await.unwrap();
    let server_conn = accept.await.unwrap();

    client.write_all(b"0123456789").await.unwrap();
    client.shutdown().await.unwrap();

    let mut got = Vec::new();
    while let Some(chunk) = server_conn.recv().await.unwrap() {
        assert!(!chunk.is_empty() && chunk.len() <= 4, "chunk of {} bytes", chunk.len());
        got.extend_from_slice(&chunk);
    }
    assert_eq!(got, b"0123456789");
}
