//! UDP adapter over loopback.

use netcom_core::frame::encode_frame;
use netcom_core::{Message, MessageKind};

use crate::*;

#[tokio::test]
async fn replies_go_to_the_advertised_port() {
    let (mut server, addr) = start("udp://localhost:0").await.unwrap();
    let mut peer = UdpPeer::new(addr).await.unwrap();
    assert_ne!(peer.source().port(), peer.reply_port());

    peer.subscribe().await.unwrap();
    peer.send(&info_request()).await.unwrap();

    let response = peer.recv().await.unwrap();
    assert_eq!(response.kind, MessageKind::InfoResponse);
    assert_eq!(response.clients.len(), 1);
    // Listed under the identity it sends from, not its reply port.
    assert_eq!(response.clients[0].address, "127.0.0.1");
    assert_eq!(response.clients[0].port, peer.source().port());

    // Nothing arrives on the sending socket.
    let mut buf = [0u8; 64];
    let stray = tokio::time::timeout(SILENCE, peer.send.recv(&mut buf)).await;
    assert!(stray.is_err());

    server.stop().await;
}

#[tokio::test]
async fn unsubscribed_peer_leaves_listing() {
    let (mut server, addr) = start("udp://localhost:0").await.unwrap();
    let a = UdpPeer::new(addr).await.unwrap();
    let mut b = UdpPeer::new(addr).await.unwrap();

    a.subscribe().await.unwrap();
    b.subscribe().await.unwrap();
    assert!(eventually(|| server.registry().len() == 2).await);

    a.send(&unsubscribe()).await.unwrap();
    assert!(eventually(|| server.registry().len() == 1).await);

    b.send(&info_request()).await.unwrap();
    let response = b.recv().await.unwrap();
    let ports: Vec<u16> = response.clients.iter().map(|c| c.port).collect();
    assert_eq!(ports, vec![b.source().port()]);

    server.stop().await;
}

#[tokio::test]
async fn info_request_without_subscribe_gets_no_reply() {
    let (mut server, addr) = start("udp://localhost:0").await.unwrap();
    let registered = UdpPeer::new(addr).await.unwrap();
    let mut stranger = UdpPeer::new(addr).await.unwrap();
    registered.subscribe().await.unwrap();
    assert!(eventually(|| server.registry().len() == 1).await);

    stranger.send(&info_request()).await.unwrap();

    assert!(stranger.recv_within(SILENCE).await.unwrap().is_none());
    let mut buf = [0u8; 64];
    assert!(tokio::time::timeout(SILENCE, stranger.send.recv(&mut buf)).await.is_err());
    assert_eq!(server.registry().len(), 1);
    assert_eq!(server.last_error(), "");

    server.stop().await;
}

#[tokio::test]
async fn message_split_across_datagrams() {
    let (mut server, addr) = start("udp://localhost:0").await.unwrap();
    let mut peer = UdpPeer::new(addr).await.unwrap();

    let frame = encode_frame(&Message::subscribe(peer.reply_port()));
    peer.send_raw(&frame[..3]).await.unwrap();
    peer.send_raw(&frame[3..]).await.unwrap();
    assert!(eventually(|| server.registry().len() == 1).await);

    // Two requests in one datagram, two answers.
    let mut both = encode_frame(&info_request()).to_vec();
    both.extend_from_slice(&encode_frame(&info_request()));
    peer.send_raw(&both).await.unwrap();
    assert_eq!(peer.recv().await.unwrap().kind, MessageKind::InfoResponse);
    assert_eq!(peer.recv().await.unwrap().kind, MessageKind::InfoResponse);

    server.stop().await;
}

#[tokio::test]
async fn zero_length_frame_drops_peer() {
    let (mut server, addr) = start("udp://localhost:0").await.unwrap();
    let peer = UdpPeer::new(addr).await.unwrap();
    peer.subscribe().await.unwrap();
    assert!(eventually(|| server.registry().len() == 1).await);

    peer.send_raw(&[0, 0, 0, 0]).await.unwrap();

    assert!(eventually(|| server.registry().is_empty()).await);
    assert!(server.last_error().contains("zero-length"));

    server.stop().await;
}

#[tokio::test]
async fn resubscribe_after_unsubscribe() {
    let (mut server, addr) = start("udp://localhost:0").await.unwrap();
    let mut peer = UdpPeer::new(addr).await.unwrap();

    peer.subscribe().await.unwrap();
    peer.send(&unsubscribe()).await.unwrap();
    peer.subscribe().await.unwrap();
    peer.send(&info_request()).await.unwrap();

    let response = peer.recv().await.unwrap();
    assert_eq!(response.clients.len(), 1);

    server.stop().await;
}
