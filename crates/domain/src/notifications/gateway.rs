use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use aws_sdk_kinesis::{error::DisplayErrorContext, primitives::Blob};
use chrono::Utc;
use derive_new::new;
use tokio::sync::broadcast;

use super::{Notification, NotificationKind, NotificationStore};
use crate::{accounts::AccountStore, errors::Error};

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), Error>;
}

/// Records outgoing mail in the log; SMTP delivery sits outside this service.
///
/// Bodies carry sign-in codes, so only the envelope is logged.
#[derive(Clone, Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), Error> {
        tracing::info!(to = %to, subject = %subject, body_len = body.len(), "Email queued");
        Ok(())
    }
}

#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<(), Error>;
}

/// In-process realtime channel for local runs and tests.
#[derive(Clone, Debug)]
pub struct BroadcastChannel {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl RealtimeChannel for BroadcastChannel {
    async fn publish(&self, notification: &Notification) -> Result<(), Error> {
        // No subscribers is not a failure.
        let _ = self.sender.send(notification.clone());
        Ok(())
    }
}

/// Publishes notifications to a Kinesis stream, partitioned by recipient.
#[derive(Clone, Debug, new)]
pub struct KinesisChannel {
    client: aws_sdk_kinesis::Client,
    stream_name: String,
}

#[async_trait]
impl RealtimeChannel for KinesisChannel {
    async fn publish(&self, notification: &Notification) -> Result<(), Error> {
        let data = serde_json::to_string(notification)?;
        self.client
            .put_record()
            .stream_name(&self.stream_name)
            .partition_key(&notification.user_id)
            .data(Blob::new(data))
            .send()
            .await
            .map_err(|err| Error::store(DisplayErrorContext(err)))?;
        Ok(())
    }
}

/// One notification to deliver.
#[derive(Clone, Debug, Eq, PartialEq, new)]
pub struct Outgoing {
    pub recipient: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub related_id: Option<String>,
    /// Also email the recipient.
    pub email: bool,
}

pub struct NotificationGateway {
    store: Arc<dyn NotificationStore>,
    realtime: Arc<dyn RealtimeChannel>,
    email: Arc<dyn EmailSender>,
    accounts: Arc<dyn AccountStore>,
    email_timeout: Duration,
}

impl NotificationGateway {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        realtime: Arc<dyn RealtimeChannel>,
        email: Arc<dyn EmailSender>,
        accounts: Arc<dyn AccountStore>,
        email_timeout: Duration,
    ) -> Self {
        Self {
            store,
            realtime,
            email,
            accounts,
            email_timeout,
        }
    }

    /// Best effort: every failure is logged and dropped, nothing is retried.
    pub async fn dispatch(&self, outgoing: Outgoing) {
        let notification = Notification {
            id: ulid::Ulid::new().to_string(),
            user_id: outgoing.recipient.clone(),
            title: outgoing.title.clone(),
            message: outgoing.message.clone(),
            kind: outgoing.kind,
            related_id: outgoing.related_id.clone(),
            read: false,
            created_at: Utc::now(),
        };

        if let Err(err) = self.store.put(&notification).await {
            tracing::error!(user_id = %notification.user_id, "Failed to store notification: {}", err);
        }
        if let Err(err) = self.realtime.publish(&notification).await {
            tracing::error!(user_id = %notification.user_id, "Failed to publish notification: {}", err);
        }
        if outgoing.email {
            self.send_email(&outgoing).await;
        }
    }

    async fn send_email(&self, outgoing: &Outgoing) {
        let account = match self.accounts.get(&outgoing.recipient).await {
            Ok(Some(account)) if !account.email.is_empty() => account,
            Ok(_) => {
                tracing::warn!(user_id = %outgoing.recipient, "No email address for notification");
                return;
            }
            Err(err) => {
                tracing::error!(user_id = %outgoing.recipient, "Failed to load recipient: {}", err);
                return;
            }
        };

        let body = format!("Hello {},\n\n{}", account.name, outgoing.message);
        let send = self.email.send(&account.email, &outgoing.title, &body);
        match tokio::time::timeout(self.email_timeout, send).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(to = %account.email, "Email send failed: {}", err),
            Err(_) => tracing::error!(to = %account.email, "Email send timed out"),
        }
    }
}
