// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of one
//! client connection: framing, admission, dispatch, reply.

use crate::core::commands;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use crate::core::state::ServerState;
use crate::core::HustGateError;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

pub struct ConnectionHandler {
    framed: Framed<TcpStream, RespFrameCodec>,
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ConnectionHandler {
    pub fn new(
        socket: TcpStream,
        addr: SocketAddr,
        state: Arc<ServerState>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            framed: Framed::new(socket, RespFrameCodec),
            addr,
            state,
            shutdown_rx,
        }
    }

    /// The main event loop: commands are executed one at a time in pipeline
    /// order; a protocol error answers with `-ERR` and keeps the connection.
    pub async fn run(&mut self) -> Result<(), HustGateError> {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    let bye = RespFrame::Error("SHUTDOWN server is shutting down".to_string());
                    let _ = self.framed.send(bye).await;
                    return Ok(());
                }
                maybe = self.framed.next() => {
                    match maybe {
                        None => {
                            debug!("Client {} disconnected", self.addr);
                            return Ok(());
                        }
                        Some(Err(e @ HustGateError::Protocol(_))) => {
                            // The offending bytes cannot be re-framed; drop
                            // whatever is buffered and keep the connection.
                            self.framed.read_buffer_mut().clear();
                            self.framed
                                .send(RespFrame::Error(e.to_resp_error()))
                                .await?;
                        }
                        Some(Err(e)) => {
                            warn!("Read error from {}: {e}", self.addr);
                            return Err(e);
                        }
                        Some(Ok(frame)) => {
                            let args = frame_args(frame);
                            if args.is_empty() {
                                continue;
                            }
                            self.handle_command(args).await?;
                        }
                    }
                }
            }
        }
    }

    async fn handle_command(&mut self, args: Vec<Bytes>) -> Result<(), HustGateError> {
        // One admission token per command, held until the reply is written.
        let permit = self.state.dispatcher.admit().await?;
        let reply = commands::execute(&self.state.dispatcher, &args).await;
        self.framed.send(reply.into_frame()).await?;
        drop(permit);
        Ok(())
    }
}

/// Flattens a decoded request frame into command arguments.
fn frame_args(frame: RespFrame) -> Vec<Bytes> {
    match frame {
        RespFrame::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                RespFrame::BulkString(b) => Some(b),
                RespFrame::SimpleString(s) => Some(Bytes::from(s)),
                _ => None,
            })
            .collect(),
        RespFrame::BulkString(b) => vec![b],
        _ => Vec::new(),
    }
}
