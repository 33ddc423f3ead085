//! Pairs one downstream connection with one upstream connection: the
//! downstream-to-upstream and upstream-to-downstream flows each run as
//! their own task, each direction's outbound queue drained by its own
//! writer task. The snapshot filter runs inline on the upstream-reading
//! task rather than as a fifth task, per the design's note that this is
//! acceptable since there is no valid downstream traffic during the
//! handshake anyway.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::resp::{self, Frame, MIN_READ_BUFFER};
use crate::snapshot;
use crate::topology::Topology;

/// Bounded queue capacity: enough to absorb a burst without unbounded
/// memory growth, applying backpressure on the producer once full.
const QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Handshaking = 0,
    SnapshotTransfer = 1,
    Streaming = 2,
    Closing = 3,
}

/// An `AtomicU8`-backed [`SessionState`], shared between the upstream
/// reader (the only task that ever transitions it) and tracing spans that
/// want to report the current phase.
struct SharedState(AtomicU8);

impl SharedState {
    fn new() -> Self {
        SharedState(AtomicU8::new(SessionState::Handshaking as u8))
    }

    fn set(&self, s: SessionState) {
        self.0.store(s as u8, Ordering::Relaxed);
    }

    fn get(&self) -> SessionState {
        match self.0.load(Ordering::Relaxed) {
            0 => SessionState::Handshaking,
            1 => SessionState::SnapshotTransfer,
            2 => SessionState::Streaming,
            _ => SessionState::Closing,
        }
    }
}

/// Runs one session to completion: dials upstream, wires up the four
/// concurrent tasks, and blocks until any one of them exits (EOF or
/// error), at which point the rest are aborted and their sockets close.
pub async fn run_session(downstream: TcpStream, peer_addr: SocketAddr, master_addr: String, topology: Arc<Topology>) {
    tracing::info!(peer = %peer_addr, "downstream session established");

    let upstream = match TcpStream::connect(&master_addr).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(peer = %peer_addr, master = %master_addr, error = %e, "failed to dial upstream, aborting session");
            return;
        }
    };
    let _ = upstream.set_nodelay(true);
    let _ = downstream.set_nodelay(true);

    let (d_read, d_write) = downstream.into_split();
    let (u_read, u_write) = upstream.into_split();

    let (to_upstream_tx, to_upstream_rx) = mpsc::channel::<Vec<u8>>(QUEUE_CAPACITY);
    let (to_downstream_tx, to_downstream_rx) = mpsc::channel::<Vec<u8>>(QUEUE_CAPACITY);

    let state = Arc::new(SharedState::new());

    let mut writer_up = tokio::spawn(writer_task(u_write, to_upstream_rx, peer_addr, "upstream"));
    let mut writer_down = tokio::spawn(writer_task(d_write, to_downstream_rx, peer_addr, "downstream"));
    let mut du = tokio::spawn(downstream_to_upstream(
        BufReader::with_capacity(MIN_READ_BUFFER, d_read),
        to_upstream_tx,
        to_downstream_tx.clone(),
        peer_addr,
    ));
    let mut ud = tokio::spawn(upstream_to_downstream(
        BufReader::with_capacity(MIN_READ_BUFFER, u_read),
        to_downstream_tx,
        topology,
        state.clone(),
        peer_addr,
    ));

    tokio::select! {
        _ = &mut du => {}
        _ = &mut ud => {}
        _ = &mut writer_up => {}
        _ = &mut writer_down => {}
    }
    state.set(SessionState::Closing);
    du.abort();
    ud.abort();
    writer_up.abort();
    writer_down.abort();

    tracing::info!(peer = %peer_addr, "session closed");
}

async fn writer_task<W>(
    mut sink: W,
    mut queue: mpsc::Receiver<Vec<u8>>,
    peer_addr: SocketAddr,
    direction: &'static str,
) where
    W: AsyncWriteExt + Unpin,
{
    while let Some(data) = queue.recv().await {
        if let Err(e) = sink.write_all(&data).await {
            tracing::warn!(peer = %peer_addr, direction, error = %e, "write failed, closing session");
            return;
        }
        if let Err(e) = sink.flush().await {
            tracing::warn!(peer = %peer_addr, direction, error = %e, "flush failed, closing session");
            return;
        }
    }
}

/// Whitelisted downstream commands that are forwarded to upstream
/// verbatim; anything else is rejected locally.
fn is_whitelisted_from_downstream(frame: &Frame) -> bool {
    match frame {
        Frame::Empty { .. } | Frame::SimpleReply { .. } => true,
        Frame::Array { args, .. } => match args.first().map(|a| a.to_ascii_uppercase()) {
            Some(cmd) if cmd == b"PING" => true,
            Some(cmd) if cmd == b"SYNC" || cmd == b"PSYNC" => true,
            Some(cmd) if cmd == b"REPLCONF" => {
                args.get(1).map(|a| a.eq_ignore_ascii_case(b"ACK")).unwrap_or(false)
            }
            _ => false,
        },
        Frame::BulkHeader { .. } => false,
    }
}

async fn downstream_to_upstream<R>(
    mut reader: R,
    to_upstream: mpsc::Sender<Vec<u8>>,
    to_downstream: mpsc::Sender<Vec<u8>>,
    peer_addr: SocketAddr,
) where
    R: tokio::io::AsyncBufRead + Unpin,
{
    loop {
        let frame = match resp::read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!(peer = %peer_addr, "downstream closed connection");
                return;
            }
            Err(e) => {
                tracing::warn!(peer = %peer_addr, error = %e, "downstream framing error, closing session");
                return;
            }
        };

        if matches!(frame, Frame::BulkHeader { .. }) {
            // The proxy is not a general RESP server: a bulk payload from
            // the downstream peer (never part of the expected handshake
            // traffic) is rejected like any other unrecognized command.
            if to_downstream
                .send(b"+ERR unknown command\r\n".to_vec())
                .await
                .is_err()
            {
                return;
            }
            continue;
        }

        if is_whitelisted_from_downstream(&frame) {
            if to_upstream.send(frame.raw().to_vec()).await.is_err() {
                return;
            }
        } else {
            tracing::debug!(peer = %peer_addr, "rejecting non-whitelisted downstream command");
            if to_downstream
                .send(b"+ERR unknown command\r\n".to_vec())
                .await
                .is_err()
            {
                return;
            }
        }
    }
}

async fn upstream_to_downstream<R>(
    mut reader: R,
    to_downstream: mpsc::Sender<Vec<u8>>,
    topology: Arc<Topology>,
    state: Arc<SharedState>,
    peer_addr: SocketAddr,
) where
    R: tokio::io::AsyncBufRead + Unpin,
{
    // Write commands are only ever replayed from the log after a snapshot
    // has been sent, but the key-membership rule applies unconditionally
    // regardless of phase.
    let mut snapshot_seen = false;

    loop {
        let frame = match resp::read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!(peer = %peer_addr, "upstream closed connection");
                return;
            }
            Err(e) => {
                tracing::warn!(peer = %peer_addr, error = %e, "upstream framing error, closing session");
                return;
            }
        };

        match frame {
            Frame::Empty { raw } | Frame::SimpleReply { raw, .. } => {
                if to_downstream.send(raw).await.is_err() {
                    return;
                }
            }
            Frame::Array { ref args, raw, .. } => {
                if args.len() == 1 && args[0].eq_ignore_ascii_case(b"PING") {
                    if to_downstream.send(raw).await.is_err() {
                        return;
                    }
                    continue;
                }
                // A write command from the replication log: forward only
                // if its key (by convention, the second array element)
                // belongs to this shard.
                let keep = match frame_key(args) {
                    Some(key) => topology.belongs(key),
                    None => true,
                };
                if keep {
                    if to_downstream.send(raw).await.is_err() {
                        return;
                    }
                } else {
                    tracing::trace!(peer = %peer_addr, "dropped write command for foreign shard");
                }
            }
            Frame::BulkHeader { len, .. } => {
                if snapshot_seen {
                    tracing::warn!(peer = %peer_addr, "unexpected second snapshot announcement, closing session");
                    return;
                }
                snapshot_seen = true;
                state.set(SessionState::SnapshotTransfer);
                tracing::info!(peer = %peer_addr, declared_len = len, "snapshot transfer starting");

                let topology = topology.clone();
                let filtered = match snapshot::filter_snapshot(&mut reader, len, move |key| topology.belongs(key)).await {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::error!(peer = %peer_addr, error = %e, "snapshot filtering failed, closing session");
                        return;
                    }
                };

                let mut framed = Vec::with_capacity(filtered.len() + 32);
                framed.extend_from_slice(format!("${}\r\n", filtered.len()).as_bytes());
                framed.extend_from_slice(&filtered);
                framed.extend_from_slice(b"\r\n");

                if to_downstream.send(framed).await.is_err() {
                    return;
                }

                state.set(SessionState::Streaming);
                tracing::info!(peer = %peer_addr, "snapshot transfer finished, streaming replication log");
            }
        }
    }
}

/// Extracts the key argument for a write command, by the convention
/// spec'd: the second array element (index 1). Commands with fewer than
/// two arguments (and anything that isn't itself a command at all) have
/// no key to filter on and are forwarded unconditionally.
fn frame_key(args: &[Vec<u8>]) -> Option<&[u8]> {
    args.get(1).map(Vec::as_slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelists_handshake_commands_only() {
        let ping = Frame::Array {
            args: vec![b"PING".to_vec()],
            raw: b"PING\r\n".to_vec(),
        };
        let sync = Frame::Array {
            args: vec![b"SYNC".to_vec()],
            raw: b"*1\r\n$4\r\nSYNC\r\n".to_vec(),
        };
        let psync = Frame::Array {
            args: vec![b"PSYNC".to_vec(), b"?".to_vec(), b"-1".to_vec()],
            raw: vec![],
        };
        let ack = Frame::Array {
            args: vec![b"REPLCONF".to_vec(), b"ACK".to_vec(), b"0".to_vec()],
            raw: vec![],
        };
        let get = Frame::Array {
            args: vec![b"GET".to_vec(), b"foo".to_vec()],
            raw: vec![],
        };
        let empty = Frame::Empty { raw: b"\r\n".to_vec() };

        assert!(is_whitelisted_from_downstream(&ping));
        assert!(is_whitelisted_from_downstream(&sync));
        assert!(is_whitelisted_from_downstream(&psync));
        assert!(is_whitelisted_from_downstream(&ack));
        assert!(is_whitelisted_from_downstream(&empty));
        assert!(!is_whitelisted_from_downstream(&get));
    }

    #[test]
    fn frame_key_is_second_array_element() {
        let args = vec![b"SET".to_vec(), b"key_7".to_vec(), b"x".to_vec()];
        assert_eq!(frame_key(&args), Some(&b"key_7"[..]));

        let single = vec![b"PING".to_vec()];
        assert_eq!(frame_key(&single), None);
    }

    #[test]
    fn session_state_roundtrips_through_shared_state() {
        let state = SharedState::new();
        assert_eq!(state.get(), SessionState::Handshaking);
        state.set(SessionState::SnapshotTransfer);
        assert_eq!(state.get(), SessionState::SnapshotTransfer);
        state.set(SessionState::Streaming);
        assert_eq!(state.get(), SessionState::Streaming);
        state.set(SessionState::Closing);
        assert_eq!(state.get(), SessionState::Closing);
    }
}
