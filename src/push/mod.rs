//! Web push delivery.
//!
//! Best-effort channel: failures are reported to the caller for logging and,
//! when the provider says the endpoint is gone, for subscription cleanup.
//! Nothing here retries or queues.

use thiserror::Error;
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder, URL_SAFE_NO_PAD,
};

use crate::models::{NotificationPayload, PushSubscription};

#[derive(Error, Debug)]
pub enum PushError {
    /// The provider reported the endpoint expired or invalid; the caller
    /// should drop the stored subscription.
    #[error("subscription endpoint gone")]
    EndpointGone,
    #[error("push delivery failed: {0}")]
    Delivery(WebPushError),
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// VAPID-signed web push sender. Disabled when no private key is configured,
/// in which case the push channel is skipped entirely.
pub struct PushService {
    client: Option<IsahcWebPushClient>,
    vapid_private_key: String,
    vapid_subject: String,
}

impl PushService {
    pub fn new(vapid_private_key: Option<String>, vapid_subject: Option<String>) -> Self {
        let client = match &vapid_private_key {
            Some(_) => match IsahcWebPushClient::new() {
                Ok(c) => Some(c),
                Err(e) => {
                    log::error!("Failed to initialize web push client: {}", e);
                    None
                }
            },
            None => None,
        };

        if client.is_none() {
            log::warn!("VAPID_PRIVATE_KEY not set, web push delivery disabled");
        }

        Self {
            client,
            vapid_private_key: vapid_private_key.unwrap_or_default(),
            vapid_subject: vapid_subject.unwrap_or_else(|| "mailto:admin@localhost".to_string()),
        }
    }

    /// A service that never sends; used in tests and keyless deployments.
    pub fn disabled() -> Self {
        Self {
            client: None,
            vapid_private_key: String::new(),
            vapid_subject: String::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Send one encrypted payload to one subscription endpoint.
    pub async fn send(
        &self,
        sub: &PushSubscription,
        payload: &NotificationPayload,
    ) -> Result<(), PushError> {
        let Some(client) = &self.client else {
            return Ok(());
        };

        let subscription =
            SubscriptionInfo::new(sub.endpoint.clone(), sub.p256dh.clone(), sub.auth.clone());

        let mut sig_builder =
            VapidSignatureBuilder::from_base64(&self.vapid_private_key, URL_SAFE_NO_PAD, &subscription)
                .map_err(map_push_error)?;
        sig_builder.add_claim("sub", self.vapid_subject.as_str());
        let signature = sig_builder.build().map_err(map_push_error)?;

        let body = serde_json::to_vec(payload)?;

        let mut builder = WebPushMessageBuilder::new(&subscription);
        builder.set_vapid_signature(signature);
        builder.set_payload(ContentEncoding::Aes128Gcm, &body);
        let message = builder.build().map_err(map_push_error)?;

        client.send(message).await.map_err(map_push_error)
    }
}

fn map_push_error(e: WebPushError) -> PushError {
    match e {
        WebPushError::EndpointNotValid | WebPushError::EndpointNotFound => PushError::EndpointGone,
        other => PushError::Delivery(other),
    }
}
