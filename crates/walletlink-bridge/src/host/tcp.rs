//! TCP host: newline-delimited JSON frames to a backend process.
//!
//! One reader task and one writer task per link. `read_line` is not
//! cancel-safe, so the two directions never share a `select!`. When the
//! reader stops, the writer shuts the stream down.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use walletlink_core::error::{BridgeError, Result};
use walletlink_core::protocol::frame::{decode_line, encode_line, Frame};

use crate::config::HostSection;

use super::{HostBridge, HostEvent, HostLink, Invoke};

pub struct TcpHost {
    addr: Option<String>,
    max_frame_bytes: usize,
}

impl TcpHost {
    pub fn new(addr: Option<String>, max_frame_bytes: usize) -> Self {
        Self {
            addr,
            max_frame_bytes,
        }
    }

    pub fn from_config(cfg: &HostSection) -> Self {
        Self::new(cfg.addr.clone(), cfg.max_frame_bytes)
    }
}

#[async_trait]
impl HostBridge for TcpHost {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn is_present(&self) -> bool {
        self.addr.is_some()
    }

    async fn open(&self, buffer: usize) -> Result<HostLink> {
        let addr = self
            .addr
            .as_deref()
            .ok_or_else(|| BridgeError::ChannelUnavailable("no backend address configured".into()))?;

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| BridgeError::ChannelUnavailable(format!("connect {addr} failed: {e}")))?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "set_nodelay failed");
        }

        tracing::info!(%addr, "backend connected");
        Ok(link_over_stream(stream, buffer, self.max_frame_bytes))
    }
}

/// Run the frame protocol over any duplex byte stream.
pub fn link_over_stream<S>(stream: S, buffer: usize, max_frame_bytes: usize) -> HostLink
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (invoke_tx, invoke_rx) = mpsc::channel(buffer.max(1));
    let (event_tx, event_rx) = mpsc::channel(buffer.max(1));

    let (reader_done_tx, reader_done_rx) = oneshot::channel();

    let (rd, wr) = tokio::io::split(stream);
    tokio::spawn(write_loop(wr, invoke_rx, reader_done_rx));
    tokio::spawn(read_loop(rd, event_tx, max_frame_bytes, reader_done_tx));

    HostLink {
        tx: invoke_tx,
        rx: event_rx,
    }
}

async fn write_loop<W>(
    mut wr: W,
    mut invoke_rx: mpsc::Receiver<Invoke>,
    mut reader_done: oneshot::Receiver<()>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let inv = tokio::select! {
            inv = invoke_rx.recv() => match inv {
                Some(inv) => inv,
                None => break,
            },
            _ = &mut reader_done => {
                tracing::debug!("reader stopped; closing link");
                break;
            }
        };
        let line = match encode_line(&Frame::Call {
            id: inv.id,
            query: inv.query,
        }) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(id = inv.id, error = %e, "call frame encode failed");
                continue;
            }
        };
        if let Err(e) = wr.write_all(line.as_bytes()).await {
            tracing::warn!(error = %e, "backend write failed");
            break;
        }
        if let Err(e) = wr.flush().await {
            tracing::warn!(error = %e, "backend flush failed");
            break;
        }
    }
    let _ = wr.shutdown().await;
    tracing::debug!("writer stopped");
}

/// Dropping `_done` on return tells the writer to shut the stream down.
async fn read_loop<R>(
    rd: R,
    event_tx: mpsc::Sender<HostEvent>,
    max_frame_bytes: usize,
    _done: oneshot::Sender<()>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(rd);
    let mut line = String::new();
    let limit = max_frame_bytes as u64;

    loop {
        line.clear();
        let n = match (&mut reader).take(limit).read_line(&mut line).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "backend read failed");
                break;
            }
        };
        if n == 0 {
            tracing::info!("backend closed the channel");
            break;
        }
        if !line.ends_with('\n') && n as u64 >= limit {
            tracing::warn!(max_frame_bytes, "frame exceeds limit; closing link");
            break;
        }

        let ev = match decode_line(&line) {
            Ok(Frame::Response { id, payload }) => HostEvent::Response { id, payload },
            Ok(Frame::Push { payload }) => HostEvent::Push { payload },
            Ok(Frame::Call { id, .. }) => {
                tracing::warn!(id, "backend sent a call frame; ignored");
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping undecodable frame");
                continue;
            }
        };
        if event_tx.send(ev).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (ours, theirs) = duplex(4096);
        let mut link = link_over_stream(ours, 8, 1024);
        let (theirs_rd, mut theirs_wr) = tokio::io::split(theirs);
        let mut theirs_rd = BufReader::new(theirs_rd).lines();

        link.tx
            .send(Invoke { id: 1, query: "q".into() })
            .await
            .unwrap();
        let sent = theirs_rd.next_line().await.unwrap().unwrap();
        assert_eq!(decode_line(&sent).unwrap(), Frame::Call { id: 1, query: "q".into() });

        theirs_wr
            .write_all(b"garbage\n{\"type\":\"response\",\"id\":1,\"payload\":\"2\"}\n")
            .await
            .unwrap();
        assert_eq!(
            link.rx.recv().await,
            Some(HostEvent::Response { id: 1, payload: "2".into() })
        );
    }

    #[tokio::test]
    async fn oversized_frame_closes_link() {
        let (ours, mut theirs) = duplex(4096);
        let mut link = link_over_stream(ours, 8, 64);
        let big = format!("{{\"type\":\"push\",\"payload\":\"\\\"{}\\\"\"}}\n", "x".repeat(200));
        theirs.write_all(big.as_bytes()).await.unwrap();
        assert_eq!(link.rx.recv().await, None);

        // The write side is shut down too, so the backend sees EOF.
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(2), theirs.read(&mut buf))
            .await
            .expect("backend should see the link close")
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn backend_eof_shuts_down_writer() {
        let (ours, theirs) = duplex(4096);
        let mut link = link_over_stream(ours, 8, 1024);
        let (mut theirs_rd, mut theirs_wr) = tokio::io::split(theirs);

        theirs_wr.shutdown().await.unwrap();
        assert_eq!(link.rx.recv().await, None);

        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(2), theirs_rd.read(&mut buf))
            .await
            .expect("writer should shut down after backend EOF")
            .unwrap();
        assert_eq!(n, 0);
        // The invoke sender is still held, yet the link is gone.
        drop(link.tx);
    }
}
