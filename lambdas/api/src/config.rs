use std::{env, time::Duration};

/// DynamoDB table names, one per store.
#[derive(Clone, Debug)]
pub struct Tables {
    pub event_log: String,
    pub event_snapshots: String,
    pub orders_view: String,
    pub appointments_view: String,
    pub accounts: String,
    pub medicines: String,
    pub relationships: String,
    pub deliveries: String,
    pub notifications: String,
    pub expiring_keys: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub tables: Tables,
    pub prescriptions_bucket: String,
    /// Kinesis stream for realtime notifications; none disables publishing.
    pub realtime_stream: Option<String>,
    pub snapshot_size: usize,
    pub otp_ttl: Duration,
    pub session_ttl: Duration,
    pub upload_url_ttl: Duration,
    pub email_timeout: Duration,
    pub bind_address: String,
}

fn var(name: &str, default: &str) -> String {
    env::var(name).unwrap_or(default.to_string())
}

fn seconds(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

impl Config {
    pub fn from_env() -> Self {
        let tables = Tables {
            event_log: var("DYNAMODB_EVENT_LOG_TABLE", "mediconnect-event-log"),
            event_snapshots: var("DYNAMODB_EVENT_SNAPSHOTS_TABLE", "mediconnect-event-snapshots"),
            orders_view: var("DYNAMODB_ORDERS_VIEW_TABLE", "mediconnect-orders-view"),
            appointments_view: var(
                "DYNAMODB_APPOINTMENTS_VIEW_TABLE",
                "mediconnect-appointments-view",
            ),
            accounts: var("DYNAMODB_ACCOUNTS_TABLE", "mediconnect-accounts"),
            medicines: var("DYNAMODB_MEDICINES_TABLE", "mediconnect-medicines"),
            relationships: var("DYNAMODB_RELATIONSHIPS_TABLE", "mediconnect-relationships"),
            deliveries: var("DYNAMODB_DELIVERIES_TABLE", "mediconnect-deliveries"),
            notifications: var("DYNAMODB_NOTIFICATIONS_TABLE", "mediconnect-notifications"),
            expiring_keys: var("DYNAMODB_EXPIRING_KEYS_TABLE", "mediconnect-expiring-keys"),
        };

        Self {
            tables,
            prescriptions_bucket: var("PRESCRIPTIONS_BUCKET", "mediconnect-prescriptions"),
            realtime_stream: env::var("REALTIME_STREAM_NAME")
                .ok()
                .filter(|s| !s.is_empty()),
            snapshot_size: env::var("SNAPSHOT_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            otp_ttl: seconds("OTP_TTL_SECONDS", 5 * 60),
            session_ttl: seconds("SESSION_TTL_SECONDS", 7 * 24 * 60 * 60),
            upload_url_ttl: seconds("UPLOAD_URL_TTL_SECONDS", 3600),
            email_timeout: seconds("EMAIL_TIMEOUT_SECONDS", 10),
            bind_address: var("BIND_ADDRESS", "127.0.0.1:3000"),
        }
    }

    /// Inside Lambda the runtime API address is always set.
    pub fn in_lambda() -> bool {
        env::var("AWS_LAMBDA_RUNTIME_API").is_ok()
    }
}
