use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::TodoChange;
use crate::store::{ChangeFeed, Subscription};
use crate::supabase::SupabaseConfig;
use crate::supabase::dto::{PhoenixMessage, PostgresChangesPayload};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const CHANGE_BUFFER: usize = 256;

/// Postgres change feed over the realtime websocket.
pub struct RealtimeFeed {
    config: SupabaseConfig,
    access_token: String,
}

impl RealtimeFeed {
    pub fn new(config: SupabaseConfig, access_token: impl Into<String>) -> Self {
        Self {
            config,
            access_token: access_token.into(),
        }
    }

    pub fn socket_url(&self) -> String {
        let base = if let Some(rest) = self.config.url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.config.url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.config.url.clone()
        };
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            base, self.config.anon_key
        )
    }

    /// Channel for the `public.todos` table. Rows are narrowed to one owner by the join filter.
    pub fn topic() -> &'static str {
        "realtime:public:todos"
    }

    pub fn join_message(&self, user_id: &str) -> PhoenixMessage {
        PhoenixMessage {
            topic: Self::topic().to_string(),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [{
                        "event": "*",
                        "schema": "public",
                        "table": "todos",
                        "filter": format!("user_id=eq.{}", user_id),
                    }],
                },
                "access_token": self.access_token,
            }),
            reference: Some("1".to_string()),
        }
    }
}

pub fn heartbeat_message(reference: u64) -> PhoenixMessage {
    PhoenixMessage {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

/// Maps a socket frame to a row change. Anything else yields `None`.
pub fn parse_change(frame: &str) -> Option<TodoChange> {
    let message: PhoenixMessage = serde_json::from_str(frame).ok()?;
    if message.event != "postgres_changes" {
        debug!("realtime frame skipped: {} on {}", message.event, message.topic);
        return None;
    }

    let payload: PostgresChangesPayload = match serde_json::from_value(message.payload) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("unreadable postgres_changes payload: {}", e);
            return None;
        }
    };

    let change = payload.data;
    match change.kind.as_str() {
        "INSERT" => change.record.map(TodoChange::Inserted),
        "UPDATE" => change.record.map(TodoChange::Updated),
        "DELETE" => change.old_record.map(|old| TodoChange::Deleted { id: old.id }),
        other => {
            debug!("unknown change type {}", other);
            None
        }
    }
}

fn encode(message: &PhoenixMessage) -> Result<Message, AppError> {
    serde_json::to_string(message)
        .map(Message::text)
        .map_err(|e| AppError::Realtime(format!("Failed to encode frame: {}", e)))
}

#[async_trait]
impl ChangeFeed for RealtimeFeed {
    async fn subscribe(&self, user_id: &str) -> Result<Subscription, AppError> {
        let (socket, _) = connect_async(self.socket_url())
            .await
            .map_err(|e| AppError::Realtime(format!("Failed to connect: {}", e)))?;
        let (mut write, mut read) = socket.split();

        write
            .send(encode(&self.join_message(user_id))?)
            .await
            .map_err(|e| AppError::Realtime(format!("Failed to join channel: {}", e)))?;
        info!("subscribed to todo changes for {}", user_id);

        let (tx, rx) = mpsc::channel(CHANGE_BUFFER);
        let task = tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await;
            let mut reference = 1u64;

            loop {
                tokio::select! {
                    _ = heartbeat.tick() => {
                        reference += 1;
                        let Ok(frame) = encode(&heartbeat_message(reference)) else { break };
                        if let Err(e) = write.send(frame).await {
                            warn!("realtime heartbeat failed: {}", e);
                            break;
                        }
                    }
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(change) = parse_change(text.as_str()) {
                                if tx.send(change).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("realtime socket closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("realtime socket error: {}", e);
                            break;
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(rx, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> RealtimeFeed {
        RealtimeFeed::new(SupabaseConfig::new("https://demo.supabase.co", "anon"), "jwt")
    }

    #[test]
    fn socket_url_uses_websocket_scheme() {
        assert_eq!(
            feed().socket_url(),
            "wss://demo.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }

    #[test]
    fn join_filters_on_owner() {
        let join = serde_json::to_value(feed().join_message("u1")).unwrap();
        assert_eq!(join["event"], "phx_join");
        assert_eq!(join["topic"], "realtime:public:todos");
        assert_eq!(join["ref"], "1");
        assert_eq!(
            join["payload"]["config"]["postgres_changes"][0]["filter"],
            "user_id=eq.u1"
        );
        assert_eq!(join["payload"]["access_token"], "jwt");
    }

    #[test]
    fn parses_insert_update_and_delete() {
        let record = r#"{"id":"t1","user_id":"u1","title":"买牛奶","completed":false,"image_url":null,"created_at":"2025-03-01T08:00:00.123456+00:00"}"#;

        let insert = format!(
            r#"{{"topic":"realtime:public:todos","event":"postgres_changes","payload":{{"ids":[1],"data":{{"type":"INSERT","schema":"public","table":"todos","record":{}}}}},"ref":null}}"#,
            record
        );
        match parse_change(&insert) {
            Some(TodoChange::Inserted(todo)) => {
                assert_eq!(todo.id, "t1");
                assert_eq!(todo.title, "买牛奶");
            }
            other => panic!("unexpected {:?}", other),
        }

        let update = insert.replace("INSERT", "UPDATE");
        assert!(matches!(parse_change(&update), Some(TodoChange::Updated(_))));

        let delete = r#"{"topic":"realtime:public:todos","event":"postgres_changes","payload":{"data":{"type":"DELETE","old_record":{"id":"t1"}}},"ref":null}"#;
        assert_eq!(
            parse_change(delete),
            Some(TodoChange::Deleted { id: "t1".to_string() })
        );
    }

    #[test]
    fn ignores_control_frames() {
        let reply = r#"{"topic":"phoenix","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":"2"}"#;
        assert_eq!(parse_change(reply), None);
        assert_eq!(parse_change("not json"), None);
    }
}
