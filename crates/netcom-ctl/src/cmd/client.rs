//! Connection to a netcomd instance, shared by every command.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use netcom_core::frame::encode_frame;
use netcom_core::{ClientRecord, Endpoint, FrameReassembler, Message, MessageKind, Protocol};

enum Link {
    Tcp(TcpStream),
    /// `send` is connected to the server; `reply` receives whatever the
    /// server's reply socket sends, from any source port.
    Udp { send: UdpSocket, reply: UdpSocket },
}

pub struct Client {
    link: Link,
    server: SocketAddr,
    reassembler: FrameReassembler,
    buf: Vec<u8>,
}

impl Client {
    pub async fn connect(endpoint: &Endpoint) -> Result<Self> {
        let server = server_addr(endpoint);
        let link = match endpoint.protocol {
            Protocol::Tcp => Link::Tcp(TcpStream::connect(server).await.with_context(|| {
                format!("failed to connect to netcomd at {server}, is it running?")
            })?),
            Protocol::Udp => {
                let any = unspecified_like(server.ip());
                let send = UdpSocket::bind((any, 0)).await.context("failed to bind send socket")?;
                send.connect(server).await.with_context(|| format!("failed to reach {server}"))?;
                let reply = UdpSocket::bind((any, 0)).await.context("failed to bind reply socket")?;
                Link::Udp { send, reply }
            }
        };
        Ok(Self {
            link,
            server,
            reassembler: FrameReassembler::new(),
            buf: vec![0u8; 65_536],
        })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let frame = encode_frame(message);
        match &mut self.link {
            Link::Tcp(stream) => stream.write_all(&frame).await?,
            Link::Udp { send, .. } => {
                send.send(&frame).await?;
            }
        }
        Ok(())
    }

    /// Register with the server. Over UDP this advertises the reply port;
    /// over TCP the connection itself is the registration.
    pub async fn subscribe(&mut self) -> Result<()> {
        let reply_port = match &self.link {
            Link::Tcp(_) => 0,
            Link::Udp { reply, .. } => reply.local_addr()?.port(),
        };
        self.send(&Message::subscribe(reply_port)).await
    }

    pub async fn unsubscribe(&mut self) -> Result<()> {
        self.send(&Message::new(MessageKind::Unsubscribe)).await
    }

    pub async fn ping(&mut self) -> Result<()> {
        self.send(&Message::new(MessageKind::Ping)).await
    }

    /// Ask for the current listing and wait for the answer.
    pub async fn request_info(&mut self, timeout: Duration) -> Result<Vec<ClientRecord>> {
        self.send(&Message::new(MessageKind::InfoRequest)).await?;
        tokio::time::timeout(timeout, self.next_info_response())
            .await
            .with_context(|| format!("no response from {} within {:?}", self.server, timeout))?
    }

    async fn next_info_response(&mut self) -> Result<Vec<ClientRecord>> {
        loop {
            while let Some(payload) = self.reassembler.next_frame()? {
                let message = Message::decode(&payload).context("undecodable response")?;
                if message.kind == MessageKind::InfoResponse {
                    return Ok(message.clients);
                }
            }

            let n = match &mut self.link {
                Link::Tcp(stream) => stream.read(&mut self.buf).await?,
                Link::Udp { reply, .. } => reply.recv_from(&mut self.buf).await?.0,
            };
            if n == 0 {
                if let Link::Tcp(_) = self.link {
                    bail!("server closed the connection");
                }
                continue;
            }
            self.reassembler.push(&self.buf[..n]);
        }
    }
}

/// Where to send: an unspecified listen address means "this machine".
fn server_addr(endpoint: &Endpoint) -> SocketAddr {
    let ip = match endpoint.address {
        IpAddr::V4(a) if a.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(a) if a.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        other => other,
    };
    SocketAddr::new(ip, endpoint.port)
}

fn unspecified_like(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

/// Registration age, for display.
pub fn age(registered_at: i64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    let secs = (now - registered_at).max(0) / 1000;
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m{}s", s / 60, s % 60),
        s => format!("{}h{}m", s / 3600, (s % 3600) / 60),
    }
}
