use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{accounts::Identity, errors::Error};

/// Fan-out of one notification to feed, realtime channel and email
pub mod gateway;

/// Workflow events turned into notifications
pub mod query;

pub use gateway::{
    BroadcastChannel, EmailSender, KinesisChannel, LogEmailSender, NotificationGateway, Outgoing,
    RealtimeChannel,
};
pub use query::NotificationQuery;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub related_id: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn put(&self, notification: &Notification) -> Result<(), Error>;
    async fn get(&self, id: &str) -> Result<Option<Notification>, Error>;
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Notification>, Error>;
    async fn delete(&self, id: &str) -> Result<(), Error>;
}

/// The caller's feed, newest first.
pub async fn feed(store: &dyn NotificationStore, actor: &Identity) -> Result<Vec<Notification>, Error> {
    let mut notifications = store.list_for_user(&actor.user_id).await?;
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(notifications)
}

pub async fn unread_count(store: &dyn NotificationStore, actor: &Identity) -> Result<usize, Error> {
    Ok(store
        .list_for_user(&actor.user_id)
        .await?
        .iter()
        .filter(|n| !n.read)
        .count())
}

pub async fn mark_read(
    store: &dyn NotificationStore,
    actor: &Identity,
    id: &str,
) -> Result<Notification, Error> {
    let mut notification = owned(store, actor, id).await?;
    notification.read = true;
    store.put(&notification).await?;
    Ok(notification)
}

pub async fn mark_all_read(store: &dyn NotificationStore, actor: &Identity) -> Result<usize, Error> {
    let mut updated = 0;
    for mut notification in store.list_for_user(&actor.user_id).await? {
        if notification.read {
            continue;
        }
        notification.read = true;
        store.put(&notification).await?;
        updated += 1;
    }
    Ok(updated)
}

pub async fn delete(store: &dyn NotificationStore, actor: &Identity, id: &str) -> Result<(), Error> {
    owned(store, actor, id).await?;
    store.delete(id).await
}

// Someone else's notification reads as missing.
async fn owned(store: &dyn NotificationStore, actor: &Identity, id: &str) -> Result<Notification, Error> {
    store
        .get(id)
        .await?
        .filter(|n| n.user_id == actor.user_id)
        .ok_or_else(|| Error::not_found("Notification", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{accounts::Role, store::memory::MemoryNotificationStore};
    use chrono::Duration;

    fn note(id: &str, user: &str, minutes_ago: i64) -> Notification {
        Notification {
            id: id.to_string(),
            user_id: user.to_string(),
            title: "t".to_string(),
            message: "m".to_string(),
            kind: NotificationKind::Info,
            related_id: None,
            read: false,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn feed_is_per_user_and_newest_first() {
        let store = MemoryNotificationStore::default();
        store.put(&note("a", "u1", 10)).await.unwrap();
        store.put(&note("b", "u1", 1)).await.unwrap();
        store.put(&note("c", "u2", 0)).await.unwrap();

        let me = Identity::new("u1", Role::Patient);
        let ids: Vec<_> = feed(&store, &me).await.unwrap().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(unread_count(&store, &me).await.unwrap(), 2);

        mark_read(&store, &me, "a").await.unwrap();
        assert_eq!(unread_count(&store, &me).await.unwrap(), 1);
        assert_eq!(mark_all_read(&store, &me).await.unwrap(), 1);
        assert_eq!(unread_count(&store, &me).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn other_users_notifications_are_not_found() {
        let store = MemoryNotificationStore::default();
        store.put(&note("c", "u2", 0)).await.unwrap();
        let me = Identity::new("u1", Role::Patient);

        assert!(matches!(
            mark_read(&store, &me, "c").await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(delete(&store, &me, "c").await, Err(Error::NotFound { .. })));
        assert!(store.get("c").await.unwrap().is_some());
    }
}
