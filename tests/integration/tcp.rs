//! TCP adapter over loopback.

use std::time::Duration;

use netcom_core::frame::encode_frame;
use netcom_core::{Message, MessageKind};
use tokio::io::AsyncWriteExt;

use crate::*;

#[tokio::test]
async fn connecting_registers_without_subscribe() {
    let (mut server, addr) = start("tcp://localhost:0").await.unwrap();
    let mut peer = TcpPeer::connect(addr).await.unwrap();

    assert!(eventually(|| server.registry().len() == 1).await);

    peer.send(&info_request()).await.unwrap();
    let response = peer.recv().await.unwrap();
    assert_eq!(response.kind, MessageKind::InfoResponse);
    assert_eq!(response.clients.len(), 1);
    assert_eq!(response.clients[0].address, "127.0.0.1");
    assert_eq!(response.clients[0].port, peer.local_addr().port());
    assert!(response.clients[0].registered_at > 0);

    server.stop().await;
}

#[tokio::test]
async fn frame_split_across_writes() {
    let (mut server, addr) = start("tcp://localhost:0").await.unwrap();
    let mut peer = TcpPeer::connect(addr).await.unwrap();

    let frame = encode_frame(&info_request());
    for byte in frame.iter() {
        peer.send_raw(&[*byte]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let response = peer.recv().await.unwrap();
    assert_eq!(response.kind, MessageKind::InfoResponse);

    server.stop().await;
}

#[tokio::test]
async fn several_frames_in_one_write() {
    let (mut server, addr) = start("tcp://localhost:0").await.unwrap();
    let mut peer = TcpPeer::connect(addr).await.unwrap();

    let mut bytes = encode_frame(&info_request()).to_vec();
    bytes.extend_from_slice(&encode_frame(&Message::new(MessageKind::Ping)));
    bytes.extend_from_slice(&encode_frame(&info_request()));
    peer.send_raw(&bytes).await.unwrap();

    assert_eq!(peer.recv().await.unwrap().kind, MessageKind::InfoResponse);
    assert_eq!(peer.recv().await.unwrap().kind, MessageKind::InfoResponse);

    server.stop().await;
}

#[tokio::test]
async fn three_byte_payloads_are_accepted() {
    let (mut server, addr) = start("tcp://localhost:0").await.unwrap();
    let mut peer = TcpPeer::connect(addr).await.unwrap();

    // Kind plus reply port, no client count.
    let kind = u8::from(MessageKind::InfoRequest);
    peer.send_raw(&[0, 0, 0, 3, kind, 0, 0]).await.unwrap();

    assert_eq!(peer.recv().await.unwrap().kind, MessageKind::InfoResponse);
    server.stop().await;
}

#[tokio::test]
async fn zero_length_frame_closes_connection() {
    let (mut server, addr) = start("tcp://localhost:0").await.unwrap();
    let mut peer = TcpPeer::connect(addr).await.unwrap();
    assert!(eventually(|| server.registry().len() == 1).await);

    peer.send_raw(&[0, 0, 0, 0]).await.unwrap();

    assert!(peer.closed_by_server().await);
    assert!(eventually(|| server.registry().is_empty()).await);
    assert!(server.last_error().contains("zero-length"));

    server.stop().await;
}

#[tokio::test]
async fn oversized_frame_closes_connection() {
    let (mut server, addr) = start("tcp://localhost:0").await.unwrap();
    let mut peer = TcpPeer::connect(addr).await.unwrap();

    peer.send_raw(&u32::MAX.to_be_bytes()).await.unwrap();

    assert!(peer.closed_by_server().await);
    assert!(eventually(|| server.registry().is_empty()).await);

    server.stop().await;
}

#[tokio::test]
async fn undecodable_payload_closes_connection() {
    let (mut server, addr) = start("tcp://localhost:0").await.unwrap();
    let mut peer = TcpPeer::connect(addr).await.unwrap();

    peer.send_raw(&[0, 0, 0, 1, 0xEE]).await.unwrap();

    assert!(peer.closed_by_server().await);
    assert!(eventually(|| server.registry().is_empty()).await);
    assert!(!server.last_error().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn unsubscribe_closes_connection() {
    let (mut server, addr) = start("tcp://localhost:0").await.unwrap();
    let mut peer = TcpPeer::connect(addr).await.unwrap();
    assert!(eventually(|| server.registry().len() == 1).await);

    peer.send(&unsubscribe()).await.unwrap();

    assert!(peer.closed_by_server().await);
    assert!(eventually(|| server.registry().is_empty()).await);
    // A clean unsubscribe is not an error.
    assert_eq!(server.last_error(), "");

    server.stop().await;
}

#[tokio::test]
async fn reply_queued_before_unsubscribe_is_delivered() {
    let (mut server, addr) = start("tcp://localhost:0").await.unwrap();
    let mut peer = TcpPeer::connect(addr).await.unwrap();

    let mut bytes = encode_frame(&info_request()).to_vec();
    bytes.extend_from_slice(&encode_frame(&unsubscribe()));
    peer.send_raw(&bytes).await.unwrap();

    assert_eq!(peer.recv().await.unwrap().kind, MessageKind::InfoResponse);
    assert!(peer.closed_by_server().await);

    server.stop().await;
}

#[tokio::test]
async fn reply_survives_half_close() {
    let (mut server, addr) = start("tcp://localhost:0").await.unwrap();

    // The read side sees EOF right behind the request; repeat to catch the
    // read winning the race against the queued reply.
    for _ in 0..20 {
        let mut peer = TcpPeer::connect(addr).await.unwrap();
        peer.send(&info_request()).await.unwrap();
        peer.stream.shutdown().await.unwrap();

        let response = peer.recv().await.unwrap();
        assert_eq!(response.kind, MessageKind::InfoResponse);
        assert!(peer.closed_by_server().await);
    }
    assert!(eventually(|| server.registry().is_empty()).await);

    server.stop().await;
}

#[tokio::test]
async fn closed_connection_leaves_listing() {
    let (mut server, addr) = start("tcp://localhost:0").await.unwrap();
    let a = TcpPeer::connect(addr).await.unwrap();
    assert!(eventually(|| server.registry().len() == 1).await);
    // Distinct registration times, so the listing order is by arrival.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let mut b = TcpPeer::connect(addr).await.unwrap();
    assert!(eventually(|| server.registry().len() == 2).await);

    b.send(&info_request()).await.unwrap();
    let ports: Vec<u16> = b.recv().await.unwrap().clients.iter().map(|c| c.port).collect();
    assert_eq!(ports, vec![a.local_addr().port(), b.local_addr().port()]);

    drop(a);
    assert!(eventually(|| server.registry().len() == 1).await);

    b.send(&info_request()).await.unwrap();
    let ports: Vec<u16> = b.recv().await.unwrap().clients.iter().map(|c| c.port).collect();
    assert_eq!(ports, vec![b.local_addr().port()]);

    server.stop().await;
}
