//! ============================================================================
//! Realtime Socket - Row-change subscriptions over WebSocket
//! ============================================================================
//! Each subscription opens its own socket to the platform's realtime
//! endpoint, joins a postgres-changes topic for one table/filter pair and
//! forwards change payloads until the subscriber goes away or the client
//! is torn down. Nothing is shared between subscriptions.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::{ChangeEvent, ChangeKind, RealtimeChannel, RowFilter, Subscription, SUBSCRIPTION_BUFFER};

/// Heartbeat interval expected by the realtime server
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Realtime protocol version sent on connect
const PROTOCOL_VSN: &str = "1.0.0";

/// Realtime channel backed by the hosted WebSocket endpoint
pub struct RealtimeSocket {
    socket_url: Url,
    shutdown: CancellationToken,
}

impl RealtimeSocket {
    pub fn new(api_url: &str, anon_key: &str, shutdown: CancellationToken) -> Result<Self> {
        Ok(Self {
            socket_url: socket_url(api_url, anon_key)?,
            shutdown,
        })
    }
}

/// `https://x` → `wss://x/realtime/v1/websocket?apikey=..&vsn=..`
fn socket_url(api_url: &str, anon_key: &str) -> Result<Url> {
    let mut url = Url::parse(api_url).map_err(|e| anyhow!("Invalid API URL '{}': {}", api_url, e))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(anyhow!("Unsupported API URL scheme '{}'", other)),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("Cannot use scheme {} for {}", scheme, api_url))?;

    let path = format!("{}/realtime/v1/websocket", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", PROTOCOL_VSN);
    Ok(url)
}

/// Topic name for one filtered table subscription
fn topic_for(filter: &RowFilter) -> String {
    format!("realtime:public:{}:{}", filter.table, filter.expression())
}

/// `phx_join` frame subscribing to all change kinds on the filtered table
fn join_message(filter: &RowFilter, msg_ref: u64) -> Value {
    json!({
        "topic": topic_for(filter),
        "event": "phx_join",
        "payload": {
            "config": {
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": filter.table,
                    "filter": filter.expression(),
                }]
            }
        },
        "ref": msg_ref.to_string(),
    })
}

fn heartbeat_message(msg_ref: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string(),
    })
}

/// Extract a change event from a server frame, if it carries one
fn parse_change(frame: &Value) -> Option<ChangeEvent> {
    if frame.get("event").and_then(Value::as_str) != Some("postgres_changes") {
        return None;
    }
    let data = frame.get("payload")?.get("data")?;
    let kind = match data.get("type").and_then(Value::as_str)? {
        "INSERT" => ChangeKind::Insert,
        "UPDATE" => ChangeKind::Update,
        "DELETE" => ChangeKind::Delete,
        _ => return None,
    };
    let record_key = if kind == ChangeKind::Delete { "old_record" } else { "record" };

    Some(ChangeEvent {
        table: data.get("table").and_then(Value::as_str)?.to_string(),
        kind,
        record: data.get(record_key).cloned().unwrap_or(Value::Null),
    })
}

#[async_trait]
impl RealtimeChannel for RealtimeSocket {
    async fn subscribe(&self, filter: RowFilter) -> Result<Subscription> {
        let (mut sink, mut stream) = connect_async(self.socket_url.as_str())
            .await
            .map_err(|e| anyhow!("Failed to connect realtime socket: {}", e))?
            .0
            .split();

        let mut msg_ref: u64 = 1;
        sink.send(Message::Text(join_message(&filter, msg_ref).to_string()))
            .await
            .map_err(|e| anyhow!("Failed to join {}: {}", topic_for(&filter), e))?;

        info!("Realtime subscription joined {}", topic_for(&filter));

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let shutdown = self.shutdown.child_token();

        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Realtime subscription {} cancelled", filter.expression());
                        break;
                    }
                    _ = tx.closed() => {
                        debug!("Realtime subscriber for {} went away", filter.expression());
                        break;
                    }
                    _ = heartbeat.tick() => {
                        msg_ref += 1;
                        if let Err(e) = sink.send(Message::Text(heartbeat_message(msg_ref).to_string())).await {
                            warn!("Realtime heartbeat failed: {}", e);
                            break;
                        }
                    }
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let parsed: Value = match serde_json::from_str(&text) {
                                Ok(v) => v,
                                Err(e) => {
                                    warn!("Ignoring malformed realtime frame: {}", e);
                                    continue;
                                }
                            };
                            if let Some(event) = parse_change(&parsed) {
                                if filter.matches(&event) && tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Realtime socket closed for {}", filter.expression());
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Realtime socket error: {}", e);
                            break;
                        }
                    },
                }
            }

            let _ = sink.send(Message::Close(None)).await;
        });

        Ok(Subscription::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_url() {
        let url = socket_url("https://abc.craven.test", "anon-key").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://abc.craven.test/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0"
        );

        let local = socket_url("http://localhost:54321/", "k").unwrap();
        assert_eq!(local.scheme(), "ws");
        assert_eq!(local.path(), "/realtime/v1/websocket");
    }

    #[test]
    fn test_join_message_topic() {
        let filter = RowFilter::new("driver_profiles", "user_id", "u-1");
        let msg = join_message(&filter, 1);
        assert_eq!(msg["topic"], "realtime:public:driver_profiles:user_id=eq.u-1");
        assert_eq!(msg["payload"]["config"]["postgres_changes"][0]["filter"], "user_id=eq.u-1");
    }

    #[test]
    fn test_parse_change_frames() {
        let update = json!({
            "event": "postgres_changes",
            "payload": { "data": {
                "type": "UPDATE",
                "table": "driver_profiles",
                "record": { "user_id": "u-1", "diamond_points": 55 },
                "old_record": { "user_id": "u-1" }
            }}
        });
        let event = parse_change(&update).unwrap();
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.record["diamond_points"], 55);

        let delete = json!({
            "event": "postgres_changes",
            "payload": { "data": {
                "type": "DELETE",
                "table": "feature_flags",
                "old_record": { "key": "surge" }
            }}
        });
        assert_eq!(parse_change(&delete).unwrap().record["key"], "surge");

        let reply = json!({ "event": "phx_reply", "payload": { "status": "ok" } });
        assert!(parse_change(&reply).is_none());
    }
}
