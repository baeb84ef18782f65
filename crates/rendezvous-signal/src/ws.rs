//! WebSocket upgrades for operators and participants

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::response::Response;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use rendezvous_core::normalize_token;
use tracing::{debug, info, warn};

use crate::channel::ChannelReceiver;
use crate::claim::ClaimService;
use crate::error::RelayError;
use crate::messages::{SignalFrame, SignalMessage};
use crate::server::AppState;

// GET /ws/serve?claim=
pub async fn ws_serve(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let claim = params
        .get("claim")
        .and_then(|raw| state.options.accept_token(raw));
    info!("Operator connecting from {}", peer_addr);
    ws.on_upgrade(move |socket| serve_operator(socket, peer_addr, claim, state.claims))
}

// GET /ws/connect?id= (or room=)
pub async fn ws_connect(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let room_id = requested_room(&params);
    info!("Participant connecting from {}", peer_addr);
    ws.on_upgrade(move |socket| serve_participant(socket, peer_addr, room_id, state.claims))
}

/// Room named by `id`, falling back to `room`
///
/// Only emptiness is checked. A malformed id is still a lookup that misses.
fn requested_room(params: &HashMap<String, String>) -> Option<String> {
    ["id", "room"]
        .iter()
        .filter_map(|key| params.get(*key))
        .map(|raw| normalize_token(raw))
        .find(|id| !id.is_empty())
}

async fn serve_operator(
    socket: WebSocket,
    peer_addr: SocketAddr,
    claim: Option<String>,
    claims: Arc<ClaimService>,
) {
    let (sink, stream) = socket.split();
    let (handle, outbound) = claims.new_channel();
    let writer = tokio::spawn(write_loop(sink, outbound));

    match claims.open_room(handle.clone(), claim.as_deref()).await {
        Ok(room) => {
            room.run_operator(inbound_frames(stream, peer_addr), claims.rooms())
                .await;
            info!("Operator {} left room {}", peer_addr, room.id());
        }
        Err(e) => {
            warn!("Could not open room for {}: {}", peer_addr, e);
            handle.close();
        }
    }

    let _ = writer.await;
}

async fn serve_participant(
    socket: WebSocket,
    peer_addr: SocketAddr,
    room_id: Option<String>,
    claims: Arc<ClaimService>,
) {
    let (sink, stream) = socket.split();
    let (handle, outbound) = claims.new_channel();
    let writer = tokio::spawn(write_loop(sink, outbound));

    let room = match room_id {
        Some(id) => claims.get_room(&id),
        None => {
            debug!("Participant {} named no room", peer_addr);
            handle.close();
            let _ = writer.await;
            return;
        }
    };

    let admitted = match room {
        Some(room) => match room.new_session(handle.clone()).await {
            Ok(session_id) => Some((room, session_id)),
            Err(RelayError::RoomClosed(_)) => None,
            Err(e) => {
                debug!("Participant {} not admitted: {}", peer_addr, e);
                handle.close();
                let _ = writer.await;
                return;
            }
        },
        None => None,
    };

    match admitted {
        Some((room, session_id)) => {
            room.run_participant(&session_id, inbound_frames(stream, peer_addr))
                .await;
            info!("Participant {} left room {}", peer_addr, room.id());
        }
        None => {
            let _ = handle.send(SignalMessage::room_not_found()).await;
            handle.close();
        }
    }

    let _ = writer.await;
}

/// Drain one outbound queue into its socket, then close the socket
async fn write_loop<S>(mut sink: S, mut outbound: ChannelReceiver)
where
    S: Sink<Message> + Unpin,
{
    while let Some(text) = outbound.recv().await {
        if sink.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

/// Text frames of a WebSocket, ending at close or the first read error
///
/// Frames that are not valid JSON are logged and skipped.
fn inbound_frames<S>(stream: S, peer_addr: SocketAddr) -> impl Stream<Item = SignalFrame> + Unpin
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    stream
        .take_while(|msg| future::ready(matches!(msg, Ok(m) if !matches!(m, Message::Close(_)))))
        .filter_map(move |msg| {
            let frame = match msg {
                Ok(Message::Text(text)) => match SignalFrame::parse(text) {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        warn!("Undecodable frame from {}: {}", peer_addr, e);
                        None
                    }
                },
                _ => None,
            };
            future::ready(frame)
        })
}
