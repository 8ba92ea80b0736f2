use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    accounts::{AccountStore, Identity, Profile},
    errors::Error,
    notifications::EmailSender,
};

/// Key-value store whose entries vanish after their TTL.
#[async_trait]
pub trait ExpiringStore: Send + Sync {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error>;
    /// Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;
    async fn remove(&self, key: &str) -> Result<(), Error>;
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestOtpInput {
    pub email: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpInput {
    pub email: String,
    pub otp: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user: Profile,
}

fn otp_key(email: &str) -> String {
    format!("otp#{email}")
}

fn session_key(token: &str) -> String {
    format!("session#{token}")
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Passwordless sign-in: one-time codes by email, opaque bearer sessions.
#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    keys: Arc<dyn ExpiringStore>,
    email: Arc<dyn EmailSender>,
    otp_ttl: Duration,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        keys: Arc<dyn ExpiringStore>,
        email: Arc<dyn EmailSender>,
        otp_ttl: Duration,
        session_ttl: Duration,
    ) -> Self {
        Self {
            accounts,
            keys,
            email,
            otp_ttl,
            session_ttl,
        }
    }

    pub async fn request_otp(&self, input: RequestOtpInput) -> Result<(), Error> {
        let email = normalize(&input.email);
        let account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or_else(|| Error::not_found("Account", email.as_str()))?;

        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        self.keys.put(&otp_key(&email), &code, self.otp_ttl).await?;

        let body = format!(
            "Hello {},\n\nYour MediConnect sign-in code is {code}. It expires in {} minutes.",
            account.name,
            self.otp_ttl.as_secs() / 60
        );
        if let Err(err) = self.email.send(&email, "Your sign-in code", &body).await {
            tracing::error!(email = %email, "Failed to send OTP: {}", err);
            self.keys.remove(&otp_key(&email)).await?;
            return Err(err);
        }

        tracing::info!(account_id = %account.id, "OTP issued");
        Ok(())
    }

    pub async fn verify_otp(&self, input: VerifyOtpInput) -> Result<Session, Error> {
        let email = normalize(&input.email);
        let key = otp_key(&email);
        let stored = self
            .keys
            .get(&key)
            .await?
            .ok_or_else(|| Error::validation("OTP not found or expired"))?;
        if stored != input.otp.trim() {
            return Err(Error::validation("Invalid OTP"));
        }
        self.keys.remove(&key).await?;

        let account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or_else(|| Error::not_found("Account", email.as_str()))?;

        let token = ulid::Ulid::new().to_string();
        let identity = serde_json::to_string(&account.identity())?;
        self.keys
            .put(&session_key(&token), &identity, self.session_ttl)
            .await?;

        tracing::info!(account_id = %account.id, "Session opened");
        Ok(Session {
            token,
            user: account.profile(),
        })
    }

    /// Resolves a bearer token to the caller.
    pub async fn authenticate(&self, token: &str) -> Result<Identity, Error> {
        let raw = self
            .keys
            .get(&session_key(token))
            .await?
            .ok_or(Error::Unauthorized)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn logout(&self, token: &str) -> Result<(), Error> {
        self.keys.remove(&session_key(token)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        accounts::{Account, Role},
        store::memory::{MemoryAccountStore, MemoryExpiringStore},
    };
    use chrono::Utc;
    use tokio::sync::Mutex;

    /// Remembers the last mail so tests can read the code.
    #[derive(Default)]
    struct Inbox {
        last: Mutex<Option<String>>,
    }

    #[async_trait]
    impl EmailSender for Inbox {
        async fn send(&self, _to: &str, _subject: &str, body: &str) -> Result<(), Error> {
            *self.last.lock().await = Some(body.to_string());
            Ok(())
        }
    }

    struct Bounce;

    #[async_trait]
    impl EmailSender for Bounce {
        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), Error> {
            Err(Error::store("mailbox unavailable"))
        }
    }

    async fn service(email: Arc<dyn EmailSender>) -> (AuthService, Arc<MemoryExpiringStore>) {
        let accounts = Arc::new(MemoryAccountStore::default());
        accounts
            .put(&Account {
                id: "u1".to_string(),
                name: "Nila".to_string(),
                email: "nila@example.com".to_string(),
                phone: String::new(),
                role: Role::Doctor,
                address: None,
                specialization: None,
                credential_hash: Some("opaque".to_string()),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let keys = Arc::new(MemoryExpiringStore::default());
        let service = AuthService::new(
            accounts,
            keys.clone(),
            email,
            Duration::from_secs(300),
            Duration::from_secs(3600),
        );
        (service, keys)
    }

    fn code_from(body: &str) -> String {
        body.split_whitespace()
            .find(|w| w.len() == 7 && w.ends_with('.') && w[..6].chars().all(|c| c.is_ascii_digit()))
            .map(|w| w[..6].to_string())
            .unwrap()
    }

    #[tokio::test]
    async fn otp_signs_in_once() {
        let inbox = Arc::new(Inbox::default());
        let (service, _) = service(inbox.clone()).await;

        service
            .request_otp(RequestOtpInput {
                email: " Nila@Example.com ".to_string(),
            })
            .await
            .unwrap();
        let code = code_from(inbox.last.lock().await.as_deref().unwrap());

        let session = service
            .verify_otp(VerifyOtpInput {
                email: "nila@example.com".to_string(),
                otp: code.clone(),
            })
            .await
            .unwrap();
        assert_eq!(session.user.role, Role::Doctor);

        let identity = service.authenticate(&session.token).await.unwrap();
        assert_eq!(identity, Identity::new("u1", Role::Doctor));

        let err = service
            .verify_otp(VerifyOtpInput {
                email: "nila@example.com".to_string(),
                otp: code,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        service.logout(&session.token).await.unwrap();
        assert_eq!(
            service.authenticate(&session.token).await.unwrap_err(),
            Error::Unauthorized
        );
    }

    #[tokio::test]
    async fn wrong_code_is_rejected() {
        let inbox = Arc::new(Inbox::default());
        let (service, _) = service(inbox).await;
        service
            .request_otp(RequestOtpInput {
                email: "nila@example.com".to_string(),
            })
            .await
            .unwrap();
        let err = service
            .verify_otp(VerifyOtpInput {
                email: "nila@example.com".to_string(),
                otp: "not-a-code".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, Error::validation("Invalid OTP"));
    }

    #[tokio::test]
    async fn unknown_email_is_not_found() {
        let (service, _) = service(Arc::new(Inbox::default())).await;
        let err = service
            .request_otp(RequestOtpInput {
                email: "nobody@example.com".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn failed_mail_drops_the_code() {
        let (service, keys) = service(Arc::new(Bounce)).await;
        assert!(service
            .request_otp(RequestOtpInput {
                email: "nila@example.com".to_string(),
            })
            .await
            .is_err());
        assert!(keys.get(&otp_key("nila@example.com")).await.unwrap().is_none());
    }
}
