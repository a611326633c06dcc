/// Realtime feed of the hosted backend.
///
/// One websocket speaking the Phoenix channel protocol, joined to a single
/// channel that carries both the row-change feed of `board_cells` and
/// `palette` and the cross-client broadcast messages. Everything received is
/// forwarded to the session as `Inbound`; broadcasts queued on a
/// `RealtimeBroadcaster` go out on the same socket.
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tileboard_core::events::{BroadcastMessage, ChangeEvent, ChangeKind, Inbound, PaletteChange};
use tileboard_core::store::Broadcaster;
use tileboard_core::types::{Cell, PaletteEntry};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

pub const CHANNEL_TOPIC: &str = "realtime:board-sync";
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CELLS_TABLE: &str = "board_cells";
const PALETTE_TABLE: &str = "palette";

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("WS connect failed: {0}")]
    Connect(String),
    #[error("WS send failed: {0}")]
    Send(String),
    #[error("WS read error: {0}")]
    Read(String),
    #[error("Join rejected: {0}")]
    JoinRejected(String),
    #[error("Malformed change: {0}")]
    Malformed(String),
}

/// One Phoenix protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

impl Frame {
    fn new(topic: &str, event: &str, payload: Value, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference.to_string()),
        }
    }

    fn into_message(self) -> Result<Message, RealtimeError> {
        let text = serde_json::to_string(&self).map_err(|e| RealtimeError::Send(e.to_string()))?;
        Ok(Message::Text(text.into()))
    }
}

/// `https://x.supabase.co` -> `wss://x.supabase.co/realtime/v1/websocket?...`
pub fn websocket_url(base_url: &str, api_key: &str) -> String {
    let base = base_url
        .trim_end_matches('/')
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    format!(
        "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
        base,
        percent_encoding::utf8_percent_encode(api_key, percent_encoding::NON_ALPHANUMERIC)
    )
}

fn join_payload(access_token: &str) -> Value {
    json!({
        "config": {
            "broadcast": { "self": false, "ack": false },
            "presence": { "key": "" },
            "postgres_changes": [
                { "event": "*", "schema": "public", "table": CELLS_TABLE },
                { "event": "*", "schema": "public", "table": PALETTE_TABLE },
            ],
        },
        "access_token": access_token,
    })
}

fn broadcast_payload(message: &BroadcastMessage) -> Value {
    let payload = serde_json::to_value(message)
        .ok()
        .and_then(|mut v| v.get_mut("payload").map(Value::take))
        .unwrap_or(Value::Null);
    json!({
        "type": "broadcast",
        "event": message.event_name(),
        "payload": payload,
    })
}

/// Row ids arrive as strings or numbers depending on the column type.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn cell_from_record(record: &Value) -> Result<Cell, RealtimeError> {
    let field = |name: &str| {
        record
            .get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| RealtimeError::Malformed(format!("cell record without {}", name)))
    };
    let coord = |name: &str| {
        field(name).and_then(|v| {
            u32::try_from(v)
                .map_err(|_| RealtimeError::Malformed(format!("cell {} out of range: {}", name, v)))
        })
    };
    Ok(Cell {
        id: field("id")?,
        x: coord("x")?,
        y: coord("y")?,
        palette_id: record.get("palette_id").and_then(id_string),
        palette: None,
    })
}

fn palette_from_record(record: &Value) -> Option<PaletteEntry> {
    Some(PaletteEntry {
        id: record.get("id").and_then(id_string)?,
        name: record.get("name").and_then(Value::as_str).map(str::to_string),
        image_url: record
            .get("image_url")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Turn the `data` object of a `postgres_changes` message into a change
/// event. Tables other than ours yield `None`.
pub fn parse_change(data: &Value) -> Result<Option<ChangeEvent>, RealtimeError> {
    let kind: ChangeKind = data
        .get("type")
        .cloned()
        .ok_or_else(|| RealtimeError::Malformed("change without type".to_string()))
        .and_then(|t| {
            serde_json::from_value(t).map_err(|e| RealtimeError::Malformed(e.to_string()))
        })?;
    let record = data.get("record").filter(|r| r.is_object());
    let old_record = data.get("old_record").filter(|r| r.is_object());

    match data.get("table").and_then(Value::as_str) {
        Some(CELLS_TABLE) => {
            let event = match kind {
                ChangeKind::Insert => {
                    let record = record.ok_or_else(|| {
                        RealtimeError::Malformed("insert without record".to_string())
                    })?;
                    ChangeEvent::CellInserted(cell_from_record(record)?)
                }
                ChangeKind::Update => {
                    let id = record
                        .and_then(|r| r.get("id"))
                        .and_then(Value::as_i64)
                        .ok_or_else(|| RealtimeError::Malformed("update without id".to_string()))?;
                    ChangeEvent::CellUpdated { id }
                }
                ChangeKind::Delete => {
                    let id = old_record
                        .and_then(|r| r.get("id"))
                        .and_then(Value::as_i64)
                        .ok_or_else(|| RealtimeError::Malformed("delete without id".to_string()))?;
                    ChangeEvent::CellDeleted { id }
                }
            };
            Ok(Some(event))
        }
        Some(PALETTE_TABLE) => Ok(Some(ChangeEvent::Palette(PaletteChange {
            kind,
            new: record.and_then(palette_from_record),
            old_id: old_record.and_then(|r| r.get("id")).and_then(id_string),
        }))),
        _ => Ok(None),
    }
}

/// Turn the payload of a `broadcast` message into a known broadcast.
/// Unknown event names yield `None`.
pub fn parse_broadcast(payload: &Value) -> Option<BroadcastMessage> {
    let event = payload.get("event")?.as_str()?;
    let inner = payload.get("payload").cloned().unwrap_or(Value::Null);
    serde_json::from_value(json!({ "event": event, "payload": inner })).ok()
}

fn frame_to_inbound(frame: &Frame) -> Option<Inbound> {
    match frame.event.as_str() {
        "postgres_changes" => {
            let data = frame.payload.get("data")?;
            match parse_change(data) {
                Ok(event) => event.map(Inbound::Change),
                Err(e) => {
                    log::warn!(target: "tileboard.realtime", "Dropping change: {}", e);
                    None
                }
            }
        }
        "broadcast" => {
            let message = parse_broadcast(&frame.payload);
            if message.is_none() {
                log::debug!(target: "tileboard.realtime", "Ignoring broadcast {}", frame.payload);
            }
            message.map(Inbound::Broadcast)
        }
        _ => None,
    }
}

/// Queues broadcasts on the subscription's socket. Cheap to clone.
#[derive(Clone)]
pub struct RealtimeBroadcaster {
    tx: mpsc::UnboundedSender<BroadcastMessage>,
}

impl Broadcaster for RealtimeBroadcaster {
    fn send(&self, message: BroadcastMessage) {
        if self.tx.send(message).is_err() {
            log::debug!(target: "tileboard.realtime", "Broadcast dropped, socket closed");
        }
    }
}

/// Live connection to the realtime channel. Dropping it closes the socket.
pub struct Subscription {
    task: JoinHandle<()>,
    outgoing: mpsc::UnboundedSender<BroadcastMessage>,
}

impl Subscription {
    /// Connect, join the board channel and start forwarding to `inbound`.
    pub async fn connect(
        base_url: &str,
        api_key: &str,
        inbound: mpsc::Sender<Inbound>,
    ) -> Result<Self, RealtimeError> {
        let url = websocket_url(base_url, api_key);
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;
        log::info!(target: "tileboard.realtime", "Connected to {}", base_url);

        let (mut ws_tx, ws_rx) = ws_stream.split();
        let join = Frame::new(CHANNEL_TOPIC, "phx_join", join_payload(api_key), 1);
        ws_tx
            .send(join.into_message()?)
            .await
            .map_err(|e| RealtimeError::Send(e.to_string()))?;

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            if let Err(e) = run_socket(ws_tx, ws_rx, outgoing_rx, inbound).await {
                log::error!(target: "tileboard.realtime", "Subscription ended: {}", e);
            }
        });

        Ok(Self { task, outgoing })
    }

    pub fn broadcaster(&self) -> RealtimeBroadcaster {
        RealtimeBroadcaster {
            tx: self.outgoing.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_socket<Tx, Rx>(
    mut ws_tx: Tx,
    mut ws_rx: Rx,
    mut outgoing: mpsc::UnboundedReceiver<BroadcastMessage>,
    inbound: mpsc::Sender<Inbound>,
) -> Result<(), RealtimeError>
where
    Tx: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    Rx: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut next_ref: u64 = 2;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let frame = Frame::new("phoenix", "heartbeat", json!({}), next_ref);
                next_ref += 1;
                ws_tx
                    .send(frame.into_message()?)
                    .await
                    .map_err(|e| RealtimeError::Send(e.to_string()))?;
            }
            Some(message) = outgoing.recv() => {
                let frame = Frame::new(CHANNEL_TOPIC, "broadcast", broadcast_payload(&message), next_ref);
                next_ref += 1;
                // Broadcasts are best effort; a failed send only loses the hint.
                if let Err(e) = ws_tx.send(frame.into_message()?).await {
                    log::warn!(target: "tileboard.realtime", "Broadcast {} failed: {}", message.event_name(), e);
                }
            }
            received = ws_rx.next() => {
                let Some(received) = received else {
                    log::info!(target: "tileboard.realtime", "Socket closed by server");
                    return Ok(());
                };
                let text = match received.map_err(|e| RealtimeError::Read(e.to_string()))? {
                    Message::Text(t) => t.to_string(),
                    Message::Ping(data) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                        continue;
                    }
                    Message::Close(_) => {
                        log::info!(target: "tileboard.realtime", "Socket closed");
                        return Ok(());
                    }
                    _ => continue,
                };
                let frame: Frame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::warn!(target: "tileboard.realtime", "Unparseable frame: {}", e);
                        continue;
                    }
                };
                if frame.event == "phx_reply" && frame.topic == CHANNEL_TOPIC {
                    check_join_reply(&frame)?;
                    continue;
                }
                if frame.event == "phx_error" || frame.event == "phx_close" {
                    return Err(RealtimeError::JoinRejected(frame.event));
                }
                if let Some(message) = frame_to_inbound(&frame) {
                    if inbound.send(message).await.is_err() {
                        log::info!(target: "tileboard.realtime", "Session gone, closing socket");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Replies on the board channel. Only a failed join (ref 1) is fatal.
fn check_join_reply(frame: &Frame) -> Result<(), RealtimeError> {
    let is_join = frame.reference.as_deref() == Some("1");
    let status = frame.payload.get("status").and_then(Value::as_str);
    if status == Some("ok") {
        if is_join {
            log::info!(target: "tileboard.realtime", "Joined {}", CHANNEL_TOPIC);
        }
        return Ok(());
    }
    let reason = frame
        .payload
        .get("response")
        .map(Value::to_string)
        .unwrap_or_else(|| "no reason given".to_string());
    if is_join {
        return Err(RealtimeError::JoinRejected(reason));
    }
    log::warn!(target: "tileboard.realtime", "Channel reply error: {}", reason);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url() {
        assert_eq!(
            websocket_url("https://x.supabase.co/", "abc"),
            "wss://x.supabase.co/realtime/v1/websocket?apikey=abc&vsn=1.0.0"
        );
        assert!(websocket_url("http://localhost:54321", "k").starts_with("ws://localhost:54321/"));
    }

    #[test]
    fn test_parse_cell_insert() {
        let data = json!({
            "type": "INSERT",
            "table": "board_cells",
            "record": { "id": 7, "x": 2, "y": 3, "palette_id": null },
            "old_record": {}
        });
        let event = parse_change(&data).unwrap();
        assert_eq!(
            event,
            Some(ChangeEvent::CellInserted(Cell {
                id: 7,
                x: 2,
                y: 3,
                palette_id: None,
                palette: None,
            }))
        );
    }

    #[test]
    fn test_parse_cell_update_and_delete() {
        let update = json!({
            "type": "UPDATE",
            "table": "board_cells",
            "record": { "id": 7, "x": 2, "y": 3, "palette_id": 12 }
        });
        assert_eq!(
            parse_change(&update).unwrap(),
            Some(ChangeEvent::CellUpdated { id: 7 })
        );

        let delete = json!({
            "type": "DELETE",
            "table": "board_cells",
            "record": null,
            "old_record": { "id": 7 }
        });
        assert_eq!(
            parse_change(&delete).unwrap(),
            Some(ChangeEvent::CellDeleted { id: 7 })
        );
    }

    #[test]
    fn test_parse_palette_delete_uses_old_id() {
        let data = json!({
            "type": "DELETE",
            "table": "palette",
            "old_record": { "id": "4b2c" }
        });
        let Some(ChangeEvent::Palette(change)) = parse_change(&data).unwrap() else {
            panic!("expected palette change");
        };
        assert_eq!(change.kind, ChangeKind::Delete);
        assert_eq!(change.new, None);
        assert_eq!(change.old_id.as_deref(), Some("4b2c"));
    }

    #[test]
    fn test_parse_palette_update_numeric_id() {
        let data = json!({
            "type": "UPDATE",
            "table": "palette",
            "record": { "id": 9, "name": "cat", "image_url": null }
        });
        let Some(ChangeEvent::Palette(change)) = parse_change(&data).unwrap() else {
            panic!("expected palette change");
        };
        let entry = change.new.unwrap();
        assert_eq!(entry.id, "9");
        assert_eq!(entry.image_url, None);
    }

    #[test]
    fn test_parse_change_other_table_ignored() {
        let data = json!({ "type": "INSERT", "table": "profiles", "record": { "id": 1 } });
        assert_eq!(parse_change(&data).unwrap(), None);
    }

    #[test]
    fn test_parse_change_rejects_bad_coordinates() {
        let data = json!({
            "type": "INSERT",
            "table": "board_cells",
            "record": { "id": 1, "x": -1, "y": 0 }
        });
        assert!(parse_change(&data).is_err());
    }

    #[test]
    fn test_parse_broadcast() {
        let payload = json!({ "type": "broadcast", "event": "cell:update", "payload": { "id": 5 } });
        assert_eq!(
            parse_broadcast(&payload),
            Some(BroadcastMessage::CellUpdate { id: 5 })
        );
        let unknown = json!({ "type": "broadcast", "event": "cursor:move", "payload": {} });
        assert_eq!(parse_broadcast(&unknown), None);
    }

    #[test]
    fn test_broadcast_payload_shape() {
        let payload = broadcast_payload(&BroadcastMessage::PaletteListRefresh { at: 42 });
        assert_eq!(
            payload,
            json!({ "type": "broadcast", "event": "palette:list:refresh", "payload": { "at": 42 } })
        );
        assert_eq!(
            parse_broadcast(&payload),
            Some(BroadcastMessage::PaletteListRefresh { at: 42 })
        );
    }

    #[test]
    fn test_frame_routing() {
        let frame: Frame = serde_json::from_value(json!({
            "topic": CHANNEL_TOPIC,
            "event": "postgres_changes",
            "payload": { "data": { "type": "UPDATE", "table": "board_cells", "record": { "id": 3 } }, "ids": [1] },
            "ref": null
        }))
        .unwrap();
        assert_eq!(
            frame_to_inbound(&frame),
            Some(Inbound::Change(ChangeEvent::CellUpdated { id: 3 }))
        );
    }

    #[test]
    fn test_join_reply_error() {
        let frame = Frame {
            topic: CHANNEL_TOPIC.to_string(),
            event: "phx_reply".to_string(),
            payload: json!({ "status": "error", "response": { "reason": "bad token" } }),
            reference: Some("1".to_string()),
        };
        assert!(check_join_reply(&frame).is_err());
    }
}
