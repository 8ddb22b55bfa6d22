//! Notification fan-out.
//!
//! Flow: qualifying action -> persist notification row -> best-effort
//! delivery on two channels (web push, realtime emit).
//!
//! The row is the source of truth: it is written before either channel runs
//! and channel failures never roll it back. Self-actions (recipient ==
//! sender) are suppressed entirely.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Notification, NotificationKind, NotificationPayload, User};
use crate::push::{PushError, PushService};
use crate::realtime::RealtimeHub;
use crate::store::Store;

pub struct Notifier {
    store: Arc<Store>,
    push: PushService,
    realtime: RealtimeHub,
}

impl Notifier {
    pub fn new(store: Arc<Store>, push: PushService, realtime: RealtimeHub) -> Self {
        Self {
            store,
            push,
            realtime,
        }
    }

    /// Record and deliver one notification. Failures are logged, never
    /// surfaced: the triggering request already succeeded.
    pub async fn dispatch(
        &self,
        recipient_id: &str,
        sender_id: &str,
        kind: NotificationKind,
        reference_id: Option<String>,
    ) {
        if recipient_id == sender_id {
            return;
        }

        let sender = match self.store.get_user(sender_id) {
            Ok(user) => user,
            Err(e) => {
                log::error!("Notification sender lookup failed: {}", e);
                return;
            }
        };

        let payload = build_payload(kind, &sender, reference_id.as_deref());

        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: recipient_id.to_string(),
            sender_id: sender_id.to_string(),
            kind,
            reference_id,
            is_read: false,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.create_notification(&notification) {
            log::error!("Failed to persist notification: {}", e);
            return;
        }

        self.fan_out_push(recipient_id, &payload).await;
        self.realtime.emit(recipient_id, &payload).await;
    }

    async fn fan_out_push(&self, recipient_id: &str, payload: &NotificationPayload) {
        if !self.push.enabled() {
            return;
        }

        let subs = match self.store.list_push_subscriptions(recipient_id) {
            Ok(subs) => subs,
            Err(e) => {
                log::error!("Push subscription lookup failed: {}", e);
                return;
            }
        };

        for sub in subs {
            match self.push.send(&sub, payload).await {
                Ok(()) => {}
                Err(PushError::EndpointGone) => {
                    log::info!("Removing expired push subscription for user {}", recipient_id);
                    if let Err(e) = self.store.delete_push_subscription(&sub.user_id, &sub.endpoint)
                    {
                        log::error!("Failed to remove push subscription: {}", e);
                    }
                }
                Err(e) => {
                    log::warn!("Push delivery failed: {}", e);
                }
            }
        }
    }
}

/// Payload shared by the push and realtime channels.
fn build_payload(
    kind: NotificationKind,
    sender: &User,
    reference_id: Option<&str>,
) -> NotificationPayload {
    let name = if sender.display_name.is_empty() {
        &sender.username
    } else {
        &sender.display_name
    };
    let profile_url = format!("/profile/{}", sender.username);
    let vinyl_url = reference_id
        .map(|id| format!("/vinyl/{}", id))
        .unwrap_or_else(|| "/".to_string());

    match kind {
        NotificationKind::FollowRequest => NotificationPayload {
            title: "New follow request".to_string(),
            body: format!("{} wants to follow you", name),
            url: profile_url,
        },
        NotificationKind::NewFollower => NotificationPayload {
            title: "New follower".to_string(),
            body: format!("{} started following you", name),
            url: profile_url,
        },
        NotificationKind::FollowAccepted => NotificationPayload {
            title: "Follow request accepted".to_string(),
            body: format!("{} accepted your follow request", name),
            url: profile_url,
        },
        NotificationKind::VinylLike => NotificationPayload {
            title: "New like".to_string(),
            body: format!("{} liked your record", name),
            url: vinyl_url,
        },
        NotificationKind::VinylComment => NotificationPayload {
            title: "New comment".to_string(),
            body: format!("{} commented on your record", name),
            url: vinyl_url,
        },
        NotificationKind::CommentLike => NotificationPayload {
            title: "New like".to_string(),
            body: format!("{} liked your comment", name),
            url: vinyl_url,
        },
    }
}
