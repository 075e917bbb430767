//! Binary wire transport.
//!
//! A TCP listener for node connections speaking the framed protocol from
//! `corral_protocol`. Each connection gets a read loop plus a writer task
//! that multiplexes direct replies with the membership StateSync broadcast.
//!
//! A frame with a bad magic, wrong version, or unknown message type leaves
//! the stream unsynchronized: the failure is reported back on an Error
//! frame and the connection is closed.

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use corral_ids::NodeId;
use corral_protocol::http_types::AgentSpec;
use corral_protocol::{
    ErrorPayload, Header, HeartbeatPayload, JobResultPayload, JobSubmitPayload, Message, MsgType,
    NodeInfoPayload, StateSyncPayload, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use crate::coordinator::Coordinator;

/// Outbound senders per registered node, used to forward placed jobs to
/// their executing node.
type Connections = Arc<Mutex<HashMap<NodeId, UnboundedSender<Message>>>>;

pub async fn serve(coordinator: Arc<Coordinator>, listener: TcpListener) -> Result<()> {
    let connections: Connections = Arc::new(Mutex::new(HashMap::new()));
    info!("Wire transport listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        let coordinator = coordinator.clone();
        let connections = connections.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(coordinator, connections, stream, peer).await {
                debug!(peer = %peer, error = %e, "Connection closed with error");
            }
        });
    }
}

async fn handle_connection(
    coordinator: Arc<Coordinator>,
    connections: Connections,
    stream: TcpStream,
    peer: SocketAddr,
) -> Result<()> {
    debug!(peer = %peer, "Node connected");
    let (mut read_half, write_half) = stream.into_split();

    let (out_tx, out_rx) = mpsc::unbounded_channel::<Message>();
    let sync_rx = coordinator.subscribe_sync();
    let writer = tokio::spawn(write_loop(write_half, out_rx, sync_rx));

    // The node id this connection identified as, once a NodeInfo arrives.
    let mut identified: Option<NodeId> = None;

    loop {
        let mut header_buf = [0u8; HEADER_SIZE];
        if read_half.read_exact(&mut header_buf).await.is_err() {
            break; // EOF or reset
        }

        let header = match Header::unpack(&header_buf) {
            Ok(header) => header,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Dropping malformed frame, closing connection");
                send_error(&out_tx, format!("malformed frame: {e}"));
                break;
            }
        };

        if header.payload_len as usize > MAX_PAYLOAD_SIZE {
            warn!(peer = %peer, len = header.payload_len, "Oversized frame, closing connection");
            send_error(&out_tx, "payload too large".to_string());
            break;
        }

        let mut payload = vec![0u8; header.payload_len as usize];
        if read_half.read_exact(&mut payload).await.is_err() {
            break;
        }
        let msg = Message { header, payload };

        match dispatch(&coordinator, &connections, &out_tx, &mut identified, &msg) {
            Ok(()) => {}
            Err(e) => {
                warn!(peer = %peer, msg_type = ?msg.header.msg_type, error = %e, "Frame handling failed");
                send_error(&out_tx, e);
            }
        }
    }

    if let Some(node_id) = identified {
        connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&node_id);
        debug!(node = %node_id, "Node connection closed");
    }
    // Dropping the last sender lets the writer drain queued frames (the
    // error report included) before it exits.
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

/// Handle one inbound frame. A returned error is reported to the peer but
/// does not close the connection (the stream is still framed).
fn dispatch(
    coordinator: &Arc<Coordinator>,
    connections: &Connections,
    out_tx: &UnboundedSender<Message>,
    identified: &mut Option<NodeId>,
    msg: &Message,
) -> std::result::Result<(), String> {
    match msg.header.msg_type {
        MsgType::Heartbeat => {
            let payload: HeartbeatPayload = msg.decode().map_err(|e| e.to_string())?;
            if !coordinator.heartbeat(&payload.node_id) {
                return Err(format!("unknown node: {}", payload.node_id));
            }
            Ok(())
        }
        MsgType::NodeInfo => {
            let payload: NodeInfoPayload = msg.decode().map_err(|e| e.to_string())?;
            // Register the outbound channel first so a job placed right
            // after the node becomes visible can already be dispatched.
            connections
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(payload.node_id.clone(), out_tx.clone());
            coordinator.register_node(&payload);
            *identified = Some(payload.node_id);
            Ok(())
        }
        MsgType::AgentRegister => {
            let spec: AgentSpec = msg.decode().map_err(|e| e.to_string())?;
            coordinator.register_agent_spec(&spec);
            Ok(())
        }
        MsgType::AgentUpdate => {
            let spec: AgentSpec = msg.decode().map_err(|e| e.to_string())?;
            if !coordinator.update_agent_spec(&spec) {
                return Err("agent update requires a known id".to_string());
            }
            Ok(())
        }
        MsgType::JobSubmit => {
            let payload: JobSubmitPayload = msg.decode().map_err(|e| e.to_string())?;
            let input = BASE64
                .decode(payload.input.as_bytes())
                .map_err(|e| format!("invalid input encoding: {e}"))?;

            let job_id = coordinator
                .submit(payload.agent_id.clone(), input, payload.metadata.clone())
                .map_err(|e| e.to_string())?;

            // Forward the placed job to its executing node, if connected.
            if let Some(job) = coordinator.router().get(&job_id) {
                if let Some(node_id) = &job.executed_by {
                    let dispatch = JobSubmitPayload {
                        job_id: Some(job_id.clone()),
                        ..payload
                    };
                    forward_to_node(connections, node_id, &dispatch);
                }
            }
            Ok(())
        }
        MsgType::JobResult => {
            let payload: JobResultPayload = msg.decode().map_err(|e| e.to_string())?;
            if !coordinator.handle_job_result(&payload) {
                return Err(format!("unknown or settled job: {}", payload.job_id));
            }
            Ok(())
        }
        MsgType::StateSync => {
            // Broadcast-only; inbound copies are ignored.
            debug!("Ignoring inbound StateSync frame");
            Ok(())
        }
        MsgType::Error => {
            let payload: ErrorPayload = msg.decode().map_err(|e| e.to_string())?;
            warn!(message = %payload.message, "Peer reported error");
            Ok(())
        }
    }
}

fn forward_to_node(connections: &Connections, node_id: &NodeId, payload: &JobSubmitPayload) {
    let sender = connections
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(node_id)
        .cloned();
    let Some(sender) = sender else {
        debug!(node = %node_id, "Executing node has no live connection, skipping dispatch");
        return;
    };
    match Message::encode(MsgType::JobSubmit, payload) {
        Ok(msg) => {
            let _ = sender.send(msg);
        }
        Err(e) => warn!(node = %node_id, error = %e, "Failed to encode dispatch frame"),
    }
}

fn send_error(out_tx: &UnboundedSender<Message>, message: String) {
    if let Ok(msg) = Message::encode(MsgType::Error, &ErrorPayload { message }) {
        let _ = out_tx.send(msg);
    }
}

async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut out_rx: mpsc::UnboundedReceiver<Message>,
    mut sync_rx: broadcast::Receiver<StateSyncPayload>,
) {
    loop {
        let msg = tokio::select! {
            direct = out_rx.recv() => match direct {
                Some(msg) => msg,
                None => break,
            },
            event = sync_rx.recv() => match event {
                Ok(payload) => match Message::encode(MsgType::StateSync, &payload) {
                    Ok(msg) => msg,
                    Err(_) => continue,
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Sync subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        let Ok(bytes) = msg.pack() else { continue };
        if write_half.write_all(&bytes).await.is_err() {
            break;
        }
    }
}
