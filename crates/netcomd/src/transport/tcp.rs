//! TCP adapter.
//!
//! Accepting a connection registers the peer; closing it (either side, or
//! a protocol violation) unregisters it. Each connection task owns its
//! socket and its reassembly buffer. Replies reach the task through the
//! channel stored in the registry entry, so removing the entry ends the
//! connection.

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use netcom_core::frame::FrameReassembler;
use netcom_core::wire::Message;
use netcom_services::{PeerIdentity, ReplyChannel};

use super::{trace_payload, TransportContext};

const READ_CHUNK: usize = 8192;

/// Reply channel of a TCP peer: a queue drained by the connection task.
#[derive(Debug)]
pub struct TcpReply {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ReplyChannel for TcpReply {
    fn send(&self, frame: Bytes) -> io::Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"))
    }
}

/// Accept connections until `shutdown` fires, then drop every connection.
pub async fn accept_loop(
    listener: TcpListener,
    ctx: TransportContext,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut connections = JoinSet::new();

    match listener.local_addr() {
        Ok(addr) => tracing::info!(%addr, "tcp listener starting"),
        Err(e) => tracing::warn!(error = %e, "tcp listener starting, local address unknown"),
    }

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!(open = connections.len(), "tcp listener shutting down");
                break;
            }

            Some(_) = connections.join_next(), if !connections.is_empty() => {}

            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(a) => a,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        ctx.last_error.set(format!("accept: {e}"));
                        continue;
                    }
                };

                let peer = PeerIdentity::from(addr);
                if !ctx.admits(&peer) {
                    drop(stream);
                    continue;
                }

                let (tx, rx) = mpsc::unbounded_channel();
                ctx.registry().add(peer, Box::new(TcpReply { tx }));
                connections.spawn(connection(stream, peer, rx, ctx.clone()));
            }
        }
    }

    // Aborting drops each task's socket.
    connections.shutdown().await;
}

async fn connection(
    mut stream: TcpStream,
    peer: PeerIdentity,
    mut replies: mpsc::UnboundedReceiver<Bytes>,
    ctx: TransportContext,
) {
    let (mut reader, mut writer) = stream.split();
    let mut reassembler = ctx.new_reassembler();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut flush = true;

    loop {
        tokio::select! {
            biased;

            reply = replies.recv() => match reply {
                Some(frame) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        record(&ctx, &peer, "write", &e);
                        flush = false;
                        break;
                    }
                }
                None => {
                    tracing::debug!(%peer, "registry entry removed, closing connection");
                    break;
                }
            },

            read = reader.read(&mut buf) => match read {
                // Half-close: the peer may still be reading, so queued
                // replies are flushed below.
                Ok(0) => {
                    tracing::debug!(%peer, "remote closed connection");
                    break;
                }
                Ok(n) => {
                    reassembler.push(&buf[..n]);
                    if !process_frames(&ctx, peer, &mut reassembler) {
                        break;
                    }
                }
                Err(e) => {
                    record(&ctx, &peer, "read", &e);
                    flush = false;
                    break;
                }
            },
        }
    }

    ctx.registry().remove(&peer);

    // Replies queued by the last batch of frames (e.g. InfoRequest followed
    // by Unsubscribe) still go out before the socket closes.
    if flush {
        while let Ok(frame) = replies.try_recv() {
            if writer.write_all(&frame).await.is_err() {
                break;
            }
        }
    }
    let _ = writer.shutdown().await;
}

/// Dispatch every complete frame. Returns false when the connection must
/// close: framing violation, undecodable payload, or the peer is no
/// longer registered.
fn process_frames(
    ctx: &TransportContext,
    peer: PeerIdentity,
    reassembler: &mut FrameReassembler,
) -> bool {
    loop {
        let payload = match reassembler.next_frame() {
            Ok(Some(p)) => p,
            Ok(None) => return true,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "framing violation, closing connection");
                ctx.last_error.set(format!("{peer}: {e}"));
                return false;
            }
        };
        trace_payload(&peer, &payload);

        let message = match Message::decode(&payload) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "undecodable message, closing connection");
                ctx.last_error.set(format!("{peer}: {e}"));
                return false;
            }
        };

        // Registration happened on accept; Subscribe never opens a channel.
        ctx.dispatcher.dispatch(peer, &message, |_| {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "tcp peers are registered on accept",
            ))
        });

        if !ctx.registry().contains(&peer) {
            return false;
        }
    }
}

fn record(ctx: &TransportContext, peer: &PeerIdentity, op: &str, e: &io::Error) {
    tracing::warn!(%peer, error = %e, "{op} failed");
    ctx.last_error.set(format!("{peer}: {op}: {e}"));
}
