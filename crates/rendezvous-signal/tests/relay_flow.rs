//! End-to-end relay flow over real sockets

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rendezvous_core::Config;
use rendezvous_signal::{SignalMessage, SignalServer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn start_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = SignalServer::new(&Config::default());
    tokio::spawn(async move {
        let _ = server.serve_listener(listener).await;
    });
    addr
}

async fn connect(addr: SocketAddr, path: &str) -> Ws {
    let (ws, _) = connect_async(format!("ws://{}{}", addr, path))
        .await
        .unwrap();
    ws
}

/// Next text frame, skipping control frames; `None` once the socket closes
async fn next_text(ws: &mut Ws) -> Option<String> {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for frame")?;
        match msg {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

async fn next_message(ws: &mut Ws) -> SignalMessage {
    let text = next_text(ws).await.expect("socket closed");
    SignalMessage::from_json(&text).unwrap()
}

async fn http(addr: SocketAddr, request: &str) -> (u16, serde_json::Value) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();

    let text = String::from_utf8(raw).unwrap();
    let (head, body) = text.split_once("\r\n\r\n").unwrap();
    let status = head.split_whitespace().nth(1).unwrap().parse().unwrap();
    (status, serde_json::from_str(body).unwrap())
}

/// Operator plus one admitted participant
async fn open_pair(addr: SocketAddr) -> (Ws, Ws, String, String) {
    let mut operator = connect(addr, "/ws/serve").await;
    let announce = next_message(&mut operator).await;
    assert_eq!(announce.kind, "newRoom");
    let room_id = announce.value;

    let mut participant = connect(addr, &format!("/ws/connect?id={}", room_id)).await;
    let to_operator = next_message(&mut operator).await;
    let to_participant = next_message(&mut participant).await;
    assert_eq!(to_operator.kind, "newSession");
    assert_eq!(to_participant.kind, "newSession");
    assert_eq!(to_operator.session_id, to_participant.session_id);
    assert_eq!(to_operator.value, to_operator.session_id);

    let session_id = to_operator.session_id;
    (operator, participant, room_id, session_id)
}

#[tokio::test]
async fn test_offer_and_answer_relayed_verbatim() {
    let addr = start_server().await;
    let (mut operator, mut participant, _room, session_id) = open_pair(addr).await;

    let offer = format!(
        r#"{{"SessionID":"{}","Type":"gotOffer","Value":"sdp-blob-1"}}"#,
        session_id
    );
    operator.send(Message::Text(offer.clone())).await.unwrap();
    assert_eq!(next_text(&mut participant).await.unwrap(), offer);

    let answer = format!(
        r#"{{"SessionID":"{}","Type":"gotAnswer","Value":"sdp-answer"}}"#,
        session_id
    );
    participant.send(Message::Text(answer.clone())).await.unwrap();
    assert_eq!(next_text(&mut operator).await.unwrap(), answer);
}

#[tokio::test]
async fn test_undecodable_frame_keeps_channel_open() {
    let addr = start_server().await;
    let (mut operator, mut participant, _room, session_id) = open_pair(addr).await;

    operator
        .send(Message::Text("not json".to_string()))
        .await
        .unwrap();

    let candidate = format!(
        r#"{{"SessionID":"{}","Type":"addCallerIceCandidate","Value":"c1"}}"#,
        session_id
    );
    operator.send(Message::Text(candidate.clone())).await.unwrap();
    assert_eq!(next_text(&mut participant).await.unwrap(), candidate);
}

#[tokio::test]
async fn test_operator_leaving_closes_room() {
    let addr = start_server().await;
    let (mut operator, mut participant, room_id, session_id) = open_pair(addr).await;

    operator.close(None).await.unwrap();

    let closed = next_message(&mut participant).await;
    assert_eq!(closed.kind, "roomClosed");
    assert_eq!(closed.session_id, session_id);
    assert!(next_text(&mut participant).await.is_none());

    // The room id no longer resolves
    let mut late = connect(addr, &format!("/ws/connect?id={}", room_id)).await;
    assert_eq!(next_message(&mut late).await.kind, "roomNotFound");
}

#[tokio::test]
async fn test_unknown_room_gets_one_not_found() {
    let addr = start_server().await;
    let mut participant = connect(addr, "/ws/connect?id=00000000").await;

    assert_eq!(next_message(&mut participant).await.kind, "roomNotFound");
    assert!(next_text(&mut participant).await.is_none());
}

#[tokio::test]
async fn test_malformed_room_id_gets_one_not_found() {
    let addr = start_server().await;

    for path in ["/ws/connect?id=abc", "/ws/connect?id=12345", "/ws_connect?room=x-y"] {
        let mut participant = connect(addr, path).await;
        assert_eq!(next_message(&mut participant).await.kind, "roomNotFound");
        assert!(next_text(&mut participant).await.is_none());
    }
}

#[tokio::test]
async fn test_missing_room_id_closes_without_reply() {
    let addr = start_server().await;

    for path in ["/ws/connect", "/ws/connect?id=", "/ws/connect?id=&room="] {
        let mut participant = connect(addr, path).await;
        assert!(next_text(&mut participant).await.is_none());
    }
}

#[tokio::test]
async fn test_created_token_becomes_room_id() {
    let addr = start_server().await;

    let (status, body) = http(
        addr,
        "POST /api/session/create HTTP/1.1\r\nHost: test\r\nConnection: close\r\nContent-Length: 0\r\n\r\n",
    )
    .await;
    assert_eq!(status, 200);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = http(
        addr,
        &format!("GET /api/validate?token={} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n", token),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["roomId"], token.as_str());

    let mut operator = connect(addr, &format!("/ws/serve?claim={}", token)).await;
    let announce = next_message(&mut operator).await;
    assert_eq!(announce.kind, "newRoom");
    assert_eq!(announce.value, token);

    // Pending entry consumed, but the live room keeps the token valid
    let (status, body) = http(addr, "GET /health HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n").await;
    assert_eq!(status, 200);
    assert_eq!(body["pending"], 0);
    assert_eq!(body["rooms"], 1);

    let body = format!("code={}", token);
    let (status, _) = http(
        addr,
        &format!(
            "POST /api/session/validate HTTP/1.1\r\nHost: test\r\nConnection: close\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        ),
    )
    .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let addr = start_server().await;
    let (status, body) = http(
        addr,
        "GET /api/validate?token=12345678 HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "Session not found or expired");
}
