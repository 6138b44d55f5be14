// src/store/realtime.rs
//! Supabase Realtime insert feed over the Phoenix v1 JSON websocket protocol.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{ChangeFeed, Subscription};

const HEARTBEAT_SECS: u64 = 25;
const JOIN_TIMEOUT_SECS: u64 = 10;
const EVENT_BUFFER: usize = 256;
const JOIN_REF: &str = "1";

pub struct RealtimeFeed {
    socket_url: String,
    api_key: String,
    schema: String,
    table: String,
}

impl RealtimeFeed {
    /// `project_url` is the REST base (`https://<ref>.supabase.co`).
    pub fn new(project_url: &str, api_key: String, table: &str) -> Self {
        Self {
            socket_url: socket_url(project_url, &api_key),
            api_key,
            schema: "public".to_string(),
            table: table.to_string(),
        }
    }

    fn join_message(&self, topic: &str, ticker: &str) -> Value {
        json!({
            "topic": topic,
            "event": "phx_join",
            "payload": {
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [{
                        "event": "INSERT",
                        "schema": self.schema,
                        "table": self.table,
                        "filter": format!("ticker=eq.{ticker}"),
                    }]
                },
                "access_token": self.api_key,
            },
            "ref": JOIN_REF,
            "join_ref": JOIN_REF,
        })
    }
}

pub(crate) fn socket_url(project_url: &str, api_key: &str) -> String {
    let base = project_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/realtime/v1/websocket?apikey={api_key}&vsn=1.0.0")
}

pub(crate) fn channel_topic(ticker: &str) -> String {
    format!("realtime:news-updates-{ticker}")
}

/// What an inbound frame means for the subscription.
#[derive(Debug, PartialEq)]
pub(crate) enum Inbound {
    Row(Value),
    JoinReply { ok: bool, detail: String },
    Closed(String),
    Ignore,
}

pub(crate) fn classify(frame: &Value) -> Inbound {
    let event = frame.get("event").and_then(Value::as_str).unwrap_or_default();
    match event {
        "postgres_changes" => match frame.pointer("/payload/data/record") {
            Some(rec) => Inbound::Row(rec.clone()),
            // Still forwarded so the consumer can count and drop it.
            None => Inbound::Row(Value::Null),
        },
        "phx_reply" if frame.get("ref").and_then(Value::as_str) == Some(JOIN_REF) => {
            let status = frame
                .pointer("/payload/status")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Inbound::JoinReply {
                ok: status == "ok",
                detail: frame
                    .pointer("/payload/response")
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            }
        }
        "phx_error" | "phx_close" => Inbound::Closed(event.to_string()),
        "system" => {
            let status = frame
                .pointer("/payload/status")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if status == "error" {
                Inbound::Closed(
                    frame
                        .pointer("/payload/message")
                        .and_then(Value::as_str)
                        .unwrap_or("system error")
                        .to_string(),
                )
            } else {
                Inbound::Ignore
            }
        }
        _ => Inbound::Ignore,
    }
}

#[async_trait]
impl ChangeFeed for RealtimeFeed {
    async fn subscribe(&self, ticker: &str) -> Result<Subscription> {
        let (ws, _) = connect_async(self.socket_url.as_str())
            .await
            .context("realtime websocket connect")?;
        let (mut write, mut read) = ws.split();

        let topic = channel_topic(ticker);
        write
            .send(Message::Text(self.join_message(&topic, ticker).to_string()))
            .await
            .context("realtime join send")?;

        // Wait for the join ack so a rejected filter surfaces as a subscribe error.
        let joined = tokio::time::timeout(Duration::from_secs(JOIN_TIMEOUT_SECS), async {
            while let Some(msg) = read.next().await {
                let msg = msg.context("realtime read")?;
                let Message::Text(text) = msg else { continue };
                let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                if let Inbound::JoinReply { ok, detail } = classify(&frame) {
                    if ok {
                        return Ok(());
                    }
                    bail!("realtime join rejected: {detail}");
                }
            }
            Err::<(), anyhow::Error>(anyhow!("realtime socket closed before join reply"))
        })
        .await
        .map_err(|_| anyhow!("realtime join timed out after {JOIN_TIMEOUT_SECS}s"))?;
        joined?;
        info!(target: "store", %topic, "realtime channel joined");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let pump = tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_SECS));
            heartbeat.tick().await;
            let mut hb_ref: u64 = 1;
            loop {
                tokio::select! {
                    _ = heartbeat.tick() => {
                        hb_ref += 1;
                        let hb = json!({
                            "topic": "phoenix",
                            "event": "heartbeat",
                            "payload": {},
                            "ref": hb_ref.to_string(),
                        });
                        if let Err(e) = write.send(Message::Text(hb.to_string())).await {
                            warn!(target: "store", error = %e, %topic, "realtime heartbeat failed");
                            break;
                        }
                    }
                    msg = read.next() => {
                        let text = match msg {
                            Some(Ok(Message::Text(t))) => t,
                            Some(Ok(Message::Close(_))) | None => {
                                debug!(target: "store", %topic, "realtime socket closed");
                                break;
                            }
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                warn!(target: "store", error = %e, %topic, "realtime read error");
                                break;
                            }
                        };
                        let frame = match serde_json::from_str::<Value>(&text) {
                            Ok(v) => v,
                            Err(e) => {
                                warn!(target: "store", error = %e, %topic, "unparsable realtime frame");
                                continue;
                            }
                        };
                        match classify(&frame) {
                            Inbound::Row(row) => {
                                if tx.send(row).await.is_err() {
                                    break;
                                }
                            }
                            Inbound::Closed(why) => {
                                warn!(target: "store", %topic, reason = %why, "realtime channel closed");
                                break;
                            }
                            Inbound::JoinReply { .. } | Inbound::Ignore => {}
                        }
                    }
                }
            }
            let _ = write.close().await;
        });

        Ok(Subscription::new(rx, Some(pump)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_switches_scheme() {
        assert_eq!(
            socket_url("https://abc.supabase.co/", "k"),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );
        assert!(socket_url("http://127.0.0.1:54321", "k").starts_with("ws://127.0.0.1:54321/"));
    }

    #[test]
    fn join_filters_inserts_by_ticker() {
        let feed = RealtimeFeed::new("https://abc.supabase.co", "k".into(), "ticker_news");
        let msg = feed.join_message(&channel_topic("AAPL"), "AAPL");
        assert_eq!(msg["topic"], "realtime:news-updates-AAPL");
        let pc = &msg["payload"]["config"]["postgres_changes"][0];
        assert_eq!(pc["event"], "INSERT");
        assert_eq!(pc["table"], "ticker_news");
        assert_eq!(pc["filter"], "ticker=eq.AAPL");
    }

    #[test]
    fn insert_frame_yields_record() {
        let frame = json!({
            "event": "postgres_changes",
            "topic": "realtime:news-updates-AAPL",
            "payload": {"data": {"type": "INSERT", "record": {"id": 5, "ticker": "AAPL"}}}
        });
        assert_eq!(classify(&frame), Inbound::Row(json!({"id": 5, "ticker": "AAPL"})));
    }

    #[test]
    fn join_reply_status_is_read() {
        let ok = json!({"event": "phx_reply", "ref": "1", "payload": {"status": "ok", "response": {}}});
        assert!(matches!(classify(&ok), Inbound::JoinReply { ok: true, .. }));
        let hb = json!({"event": "phx_reply", "ref": "7", "payload": {"status": "ok"}});
        assert_eq!(classify(&hb), Inbound::Ignore);
    }
}
