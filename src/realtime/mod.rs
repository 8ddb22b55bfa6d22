//! Realtime notification channel.
//!
//! Each authenticated WebSocket connection joins its account's room in the
//! hub. Emits are fire-and-forget: a send failure just drops that session
//! from the room. The server pings every 5s and disconnects clients idle
//! for more than 10s.

use actix_ws::{CloseCode, CloseReason, Message, MessageStream, Session};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time;

use crate::models::NotificationPayload;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-account registry of live WebSocket sessions.
#[derive(Clone, Default)]
pub struct RealtimeHub {
    rooms: Arc<Mutex<HashMap<String, Vec<(u64, Session)>>>>,
    next_handle: Arc<AtomicU64>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to a user's room; the returned handle unregisters it.
    pub fn register(&self, user_id: &str, session: Session) -> u64 {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let mut rooms = self.rooms.lock().unwrap();
        rooms
            .entry(user_id.to_string())
            .or_default()
            .push((handle, session));
        handle
    }

    pub fn unregister(&self, user_id: &str, handle: u64) {
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(sessions) = rooms.get_mut(user_id) {
            sessions.retain(|(h, _)| *h != handle);
            if sessions.is_empty() {
                rooms.remove(user_id);
            }
        }
    }

    pub fn session_count(&self, user_id: &str) -> usize {
        let rooms = self.rooms.lock().unwrap();
        rooms.get(user_id).map(|s| s.len()).unwrap_or(0)
    }

    /// Fire-and-forget emit to every session in the recipient's room.
    /// Sessions whose send fails are dropped from the room.
    pub async fn emit(&self, user_id: &str, payload: &NotificationPayload) {
        let body = serde_json::json!({
            "event": "notification",
            "data": payload,
        })
        .to_string();

        // Clone the sessions out so no await happens under the lock
        let sessions: Vec<(u64, Session)> = {
            let rooms = self.rooms.lock().unwrap();
            match rooms.get(user_id) {
                Some(sessions) => sessions.clone(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for (handle, mut session) in sessions {
            if session.text(body.clone()).await.is_err() {
                dead.push(handle);
            }
        }

        for handle in dead {
            self.unregister(user_id, handle);
        }
    }
}

/// Per-connection loop: heartbeats out, pings/pongs/close in. Application
/// frames flow server-to-client only; inbound text is ignored.
pub async fn run_session(
    hub: RealtimeHub,
    user_id: String,
    mut session: Session,
    mut stream: MessageStream,
) {
    let handle = hub.register(&user_id, session.clone());
    let mut last_heartbeat = Instant::now();
    let mut heartbeat = time::interval(HEARTBEAT_INTERVAL);

    let close_reason = loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if Instant::now().duration_since(last_heartbeat) > CLIENT_TIMEOUT {
                    log::debug!("Realtime heartbeat timeout for user {}", user_id);
                    break Some(CloseReason {
                        code: CloseCode::Normal,
                        description: Some("heartbeat timeout".to_string()),
                    });
                }
                if session.ping(b"").await.is_err() {
                    break None;
                }
            }
            message = stream.recv() => {
                match message {
                    Some(Ok(Message::Ping(payload))) => {
                        last_heartbeat = Instant::now();
                        if session.pong(&payload).await.is_err() {
                            break None;
                        }
                    }
                    Some(Ok(Message::Close(reason))) => break reason,
                    Some(Ok(_)) => {
                        last_heartbeat = Instant::now();
                    }
                    Some(Err(e)) => {
                        log::debug!("Realtime protocol error for user {}: {}", user_id, e);
                        break Some(CloseReason {
                            code: CloseCode::Protocol,
                            description: None,
                        });
                    }
                    None => break None,
                }
            }
        }
    };

    hub.unregister(&user_id, handle);
    let _ = session.close(close_reason).await;
}
