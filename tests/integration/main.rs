//! netcom integration test harness.
//!
//! Every test starts its own in-process server on an ephemeral loopback
//! port and talks to it with plain sockets, so tests run in parallel and
//! need no setup:
//!
//!   cargo test --test integration

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use netcom_core::config::LimitsConfig;
use netcom_core::frame::encode_frame;
use netcom_core::{FrameReassembler, Message, MessageKind};
use netcomd::Server;

mod tcp;
mod udp;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const REPLY_TIMEOUT: Duration = Duration::from_secs(2);
/// How long to wait before concluding that nothing is coming.
pub const SILENCE: Duration = Duration::from_millis(300);

/// Start a server for `url` and return it with its bound address.
pub async fn start(url: &str) -> Result<(Server, SocketAddr)> {
    let mut server = Server::new(url.parse()?, LimitsConfig::default());
    let addr = server.start().await?;
    Ok((server, addr))
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}

pub fn info_request() -> Message {
    Message::new(MessageKind::InfoRequest)
}

pub fn unsubscribe() -> Message {
    Message::new(MessageKind::Unsubscribe)
}

/// A raw TCP client.
pub struct TcpPeer {
    pub stream: TcpStream,
    reassembler: FrameReassembler,
}

impl TcpPeer {
    pub async fn connect(server: SocketAddr) -> Result<Self> {
        Ok(Self {
            stream: TcpStream::connect(server).await?,
            reassembler: FrameReassembler::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.stream.local_addr().expect("connected socket has a local address")
    }

    pub async fn send(&mut self, message: &Message) -> Result<()> {
        self.stream.write_all(&encode_frame(message)).await?;
        Ok(())
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<Message> {
        tokio::time::timeout(REPLY_TIMEOUT, async {
            let mut buf = [0u8; 4096];
            loop {
                if let Some(payload) = self.reassembler.next_frame()? {
                    return Ok::<_, anyhow::Error>(Message::decode(&payload)?);
                }
                let n = self.stream.read(&mut buf).await?;
                if n == 0 {
                    bail!("connection closed");
                }
                self.reassembler.push(&buf[..n]);
            }
        })
        .await
        .context("no reply within timeout")?
    }

    /// True once the server has closed the connection (EOF or reset).
    pub async fn closed_by_server(&mut self) -> bool {
        let mut buf = [0u8; 256];
        let read = tokio::time::timeout(REPLY_TIMEOUT, async {
            loop {
                match self.stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return true,
                    Ok(_) => continue,
                }
            }
        });
        read.await.unwrap_or(false)
    }
}

/// A UDP client with separate send and reply sockets.
pub struct UdpPeer {
    pub send: UdpSocket,
    pub reply: UdpSocket,
    reassembler: FrameReassembler,
}

impl UdpPeer {
    pub async fn new(server: SocketAddr) -> Result<Self> {
        let send = UdpSocket::bind("127.0.0.1:0").await?;
        send.connect(server).await?;
        let reply = UdpSocket::bind("127.0.0.1:0").await?;
        Ok(Self {
            send,
            reply,
            reassembler: FrameReassembler::new(),
        })
    }

    /// The identity the server sees.
    pub fn source(&self) -> SocketAddr {
        self.send.local_addr().expect("bound socket has a local address")
    }

    pub fn reply_port(&self) -> u16 {
        self.reply.local_addr().expect("bound socket has a local address").port()
    }

    pub async fn send(&self, message: &Message) -> Result<()> {
        self.send.send(&encode_frame(message)).await?;
        Ok(())
    }

    pub async fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        self.send.send(bytes).await?;
        Ok(())
    }

    pub async fn subscribe(&self) -> Result<()> {
        self.send(&Message::subscribe(self.reply_port())).await
    }

    /// Next message on the reply socket, or None after `wait`.
    pub async fn recv_within(&mut self, wait: Duration) -> Result<Option<Message>> {
        let result = tokio::time::timeout(wait, async {
            let mut buf = vec![0u8; 65_536];
            loop {
                if let Some(payload) = self.reassembler.next_frame()? {
                    return Ok::<_, anyhow::Error>(Message::decode(&payload)?);
                }
                let (n, _) = self.reply.recv_from(&mut buf).await?;
                self.reassembler.push(&buf[..n]);
            }
        })
        .await;
        match result {
            Ok(message) => Ok(Some(message?)),
            Err(_) => Ok(None),
        }
    }

    pub async fn recv(&mut self) -> Result<Message> {
        self.recv_within(REPLY_TIMEOUT)
            .await?
            .context("no reply within timeout")
    }
}
