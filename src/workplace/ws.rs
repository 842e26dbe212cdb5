use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::api::SharedState;
use super::gamification::XpAward;
use super::models::{Activity, Message as ChatMessage, StatsView};

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Events pushed to every connected client as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum WsMessage {
    NewMessage { message: ChatMessage },
    StatsUpdate { user_id: i64, stats: StatsView },
    LevelUp { user_id: i64, level: i64 },
    ActivityRecorded { activity: Activity },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    let rx = state.ws_tx.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, rx))
}

async fn handle_socket(socket: WebSocket, rx: broadcast::Receiver<String>) {
    let (sender, receiver) = socket.split();
    tracing::debug!("websocket client connected");
    run_socket_loop(sender, receiver, rx).await;
    tracing::debug!("websocket client disconnected");
}

/// Forward broadcasts to one client and keep the connection alive with
/// ping/pong. The loop ends when the client goes away or stops answering
/// pings for [`PONG_TIMEOUT`].
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<String>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // First tick is immediate.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    tracing::debug!("websocket pong timeout");
                    break;
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "websocket client lagging, dropped events");
                        continue;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

/// Serialize and broadcast to all connected clients. No receivers is fine.
pub fn broadcast_message(tx: &broadcast::Sender<String>, msg: &WsMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize WsMessage");
        }
    }
}

/// Announce an XP award: always `stats_update`, plus `level_up` and the
/// achievement activity when a level boundary was crossed.
pub fn broadcast_award(tx: &broadcast::Sender<String>, award: &XpAward) {
    broadcast_message(
        tx,
        &WsMessage::StatsUpdate {
            user_id: award.user.id,
            stats: StatsView::from(&award.user),
        },
    );
    if award.leveled_up {
        broadcast_message(
            tx,
            &WsMessage::LevelUp {
                user_id: award.user.id,
                level: award.user.level,
            },
        );
    }
    if let Some(activity) = &award.achievement {
        broadcast_message(
            tx,
            &WsMessage::ActivityRecorded {
                activity: activity.clone(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workplace::models::{ActivityType, User, UserStats};

    fn user(level: i64, xp: i64) -> User {
        User {
            id: 7,
            github_id: Some("1".to_string()),
            username: Some("newbie".to_string()),
            avatar_url: None,
            access_token: None,
            xp,
            level,
            stats: UserStats::default(),
        }
    }

    #[test]
    fn test_new_message_frame_shape() {
        let msg = WsMessage::NewMessage {
            message: ChatMessage {
                id: 1,
                channel: "general".to_string(),
                content: "hello".to_string(),
                sender_id: Some(7),
                is_bot: false,
                timestamp: "2024-01-01T00:00:00.000Z".to_string(),
                sender_name: Some("newbie".to_string()),
                sender_avatar: None,
            },
        };
        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(parsed["event"], "new_message");
        assert_eq!(parsed["data"]["message"]["content"], "hello");
    }

    #[test]
    fn test_level_up_frame_shape() {
        let json = serde_json::to_string(&WsMessage::LevelUp {
            user_id: 7,
            level: 3,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"level_up","data":{"user_id":7,"level":3}}"#);
    }

    #[test]
    fn test_stats_update_roundtrip() {
        let msg = WsMessage::StatsUpdate {
            user_id: 7,
            stats: StatsView::from(&user(1, 40)),
        };
        let json = serde_json::to_string(&msg).unwrap();
        match serde_json::from_str::<WsMessage>(&json).unwrap() {
            WsMessage::StatsUpdate { user_id, stats } => {
                assert_eq!(user_id, 7);
                assert_eq!(stats.xp, 40);
                assert_eq!(stats.truthfulness, 50);
            }
            other => panic!("Expected StatsUpdate, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_broadcast_channel_delivers_to_subscribers() {
        let (tx, _) = broadcast::channel::<String>(16);
        let mut rx1 = tx.subscribe();
        let mut rx2 = tx.subscribe();

        broadcast_message(&tx, &WsMessage::LevelUp { user_id: 1, level: 2 });

        let received1 = rx1.recv().await.unwrap();
        let received2 = rx2.recv().await.unwrap();
        assert!(received1.contains("level_up"));
        assert_eq!(received1, received2);
    }

    #[tokio::test]
    async fn test_broadcast_no_receivers_does_not_panic() {
        let (tx, _) = broadcast::channel::<String>(16);
        broadcast_message(&tx, &WsMessage::LevelUp { user_id: 1, level: 2 });
    }

    #[tokio::test]
    async fn test_broadcast_award_without_level_up_sends_stats_only() {
        let (tx, mut rx) = broadcast::channel::<String>(16);
        let award = XpAward {
            user: user(1, 100),
            leveled_up: false,
            achievement: None,
        };
        broadcast_award(&tx, &award);
        assert!(rx.recv().await.unwrap().contains("stats_update"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_award_with_level_up() {
        let (tx, mut rx) = broadcast::channel::<String>(16);
        let award = XpAward {
            user: user(2, 510),
            leveled_up: true,
            achievement: Some(Activity {
                id: 1,
                user_id: 7,
                activity_type: ActivityType::AchievementEarned,
                description: "Reached level 2".to_string(),
                extra_data: None,
                created_at: "2024-01-01T00:00:00.000Z".to_string(),
            }),
        };
        broadcast_award(&tx, &award);
        let events: Vec<String> = (0..3).map(|_| rx.try_recv().unwrap()).collect();
        assert!(events[0].contains("\"event\":\"stats_update\""));
        assert!(events[1].contains("\"event\":\"level_up\""));
        assert!(events[2].contains("ACHIEVEMENT_EARNED"));
    }

    #[test]
    fn test_keepalive_constants() {
        assert!(PONG_TIMEOUT > PING_INTERVAL);
        assert_eq!(PING_INTERVAL, Duration::from_secs(30));
        assert_eq!(PONG_TIMEOUT, Duration::from_secs(60));
    }
}
