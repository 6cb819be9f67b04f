//! Receive loop: pulls datagrams off the socket one at a time and hands
//! them to the dispatcher.

use std::sync::Arc;

use anyhow::Result;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use statecast_core::wire::OBJECT_FRAME_LEN;

use crate::dispatch::ProtocolDispatcher;
use crate::transport;

/// Larger than any valid datagram so oversized ones are seen, then truncated.
const RECV_BUF_LEN: usize = OBJECT_FRAME_LEN * 4;

pub struct ReceiveLoop {
    socket: Arc<UdpSocket>,
    dispatcher: ProtocolDispatcher,
    shutdown: broadcast::Receiver<()>,
}

impl ReceiveLoop {
    pub fn new(
        socket: Arc<UdpSocket>,
        dispatcher: ProtocolDispatcher,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            socket,
            dispatcher,
            shutdown,
        }
    }

    /// Run until shutdown. Receive errors are logged and skipped.
    pub async fn run(mut self) -> Result<()> {
        let mut buf = vec![0u8; RECV_BUF_LEN];

        tracing::info!(addr = ?self.socket.local_addr().ok(), "receive loop starting");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("receive loop shutting down");
                    return Ok(());
                }

                result = self.socket.recv_from(&mut buf) => {
                    let (len, from) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            // e.g. ICMP port-unreachable surfacing from an earlier send
                            tracing::warn!(error = %e, "recv_from failed");
                            continue;
                        }
                    };

                    if let Some(reply) = self.dispatcher.dispatch(from, &buf[..len]).await {
                        transport::send_all(&self.socket, std::slice::from_ref(&reply)).await;
                    }
                }
            }
        }
    }
}
