use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Process Configuration
// ============================================================================
//
// Read once at startup from the environment (after `.env`, if present). All
// parsing goes through `AppConfig::from_lookup` so it can be exercised with a
// plain map instead of the real process environment.
//
// ============================================================================

const DEFAULT_BROKER: &str = "127.0.0.1:9092";
const DEFAULT_TOPIC: &str = "orders";
const DEFAULT_SUBSCRIPTION_A: &str = "subscription1";
const DEFAULT_SUBSCRIPTION_B: &str = "subscription2";
const DEFAULT_SCYLLA_NODES: &str = "127.0.0.1:9042";
const DEFAULT_KEYSPACE: &str = "orders_ks";
const DEFAULT_TABLE: &str = "orders";
const DEFAULT_OBJECT_CONTAINER: &str = "orders-container";
const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
const DEFAULT_HTTP_PORT: u16 = 8080;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must not be empty")]
    Empty { key: &'static str },

    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub consumers: ConsumerConfig,
    pub document_store: DocumentStoreConfig,
    pub object_store: ObjectStoreConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Kafka-protocol bootstrap servers
    pub connection: String,
    pub topic: String,
    /// Upper bound on how long a send may sit in the producer queue
    pub send_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Consumer group feeding the document store
    pub document_subscription: String,
    /// Consumer group feeding the object store
    pub object_subscription: String,
    /// Consumer workers per subscription
    pub workers: usize,
    /// Deliveries of one message before it is dead-lettered
    pub max_delivery_attempts: u32,
    pub redelivery_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentBackend {
    Scylla,
    Memory,
}

#[derive(Debug, Clone)]
pub struct DocumentStoreConfig {
    pub backend: DocumentBackend,
    pub nodes: Vec<String>,
    /// Keyspace
    pub database: String,
    /// Table
    pub container: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectBackend {
    Local,
    Memory,
    S3,
    Azure,
}

#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub backend: ObjectBackend,
    /// Root directory (local), endpoint URL (s3) or account name (azure)
    pub connection: Option<String>,
    /// Subdirectory, bucket or container
    pub container: String,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl FromStr for DocumentBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scylla" => Ok(DocumentBackend::Scylla),
            "memory" => Ok(DocumentBackend::Memory),
            other => Err(format!("unsupported document store backend '{}'", other)),
        }
    }
}

impl FromStr for ObjectBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(ObjectBackend::Local),
            "memory" => Ok(ObjectBackend::Memory),
            "s3" | "minio" => Ok(ObjectBackend::S3),
            "azure" => Ok(ObjectBackend::Azure),
            other => Err(format!("unsupported object store backend '{}'", other)),
        }
    }
}

impl AppConfig {
    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "Ignoring unreadable .env file");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let broker = BrokerConfig {
            connection: env.string("BROKER_CONNECTION", DEFAULT_BROKER)?,
            topic: env.string("BROKER_TOPIC_NAME", DEFAULT_TOPIC)?,
            send_timeout: Duration::from_millis(env.parsed("BROKER_SEND_TIMEOUT_MS", 5000)?),
        };

        let consumers = ConsumerConfig {
            document_subscription: env.string("SUBSCRIPTION_A_NAME", DEFAULT_SUBSCRIPTION_A)?,
            object_subscription: env.string("SUBSCRIPTION_B_NAME", DEFAULT_SUBSCRIPTION_B)?,
            workers: env.positive("CONSUMER_WORKERS", 2)?,
            max_delivery_attempts: env.positive("MAX_DELIVERY_ATTEMPTS", 10)?,
            redelivery_delay: Duration::from_millis(env.parsed("REDELIVERY_DELAY_MS", 1000)?),
        };

        let document_store = DocumentStoreConfig {
            backend: env.parsed("DOCUMENT_STORE_BACKEND", DocumentBackend::Scylla)?,
            nodes: env
                .string("DOCUMENT_STORE_CONNECTION", DEFAULT_SCYLLA_NODES)?
                .split(',')
                .map(|node| node.trim().to_string())
                .filter(|node| !node.is_empty())
                .collect(),
            database: env.string("DOCUMENT_STORE_DATABASE", DEFAULT_KEYSPACE)?,
            container: env.string("DOCUMENT_STORE_CONTAINER", DEFAULT_TABLE)?,
        };

        let object_store = ObjectStoreConfig {
            backend: env.parsed("OBJECT_STORE_BACKEND", ObjectBackend::Local)?,
            connection: env.optional("OBJECT_STORE_CONNECTION"),
            container: env.string("OBJECT_STORE_CONTAINER", DEFAULT_OBJECT_CONTAINER)?,
            region: env.optional("OBJECT_STORE_REGION"),
            access_key_id: env.optional("OBJECT_STORE_ACCESS_KEY_ID"),
            secret_access_key: env.optional("OBJECT_STORE_SECRET_ACCESS_KEY"),
        };

        let http = HttpConfig {
            host: env.string("HTTP_HOST", DEFAULT_HTTP_HOST)?,
            port: env.parsed("HTTP_PORT", DEFAULT_HTTP_PORT)?,
        };

        Ok(Self {
            broker,
            consumers,
            document_store,
            object_store,
            http,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unset and blank values count as absent.
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &'static str, default: &str) -> Result<String, ConfigError> {
        match (self.lookup)(key) {
            Some(value) if value.trim().is_empty() => Err(ConfigError::Empty { key }),
            Some(value) => Ok(value.trim().to_string()),
            None => Ok(default.to_string()),
        }
    }

    fn parsed<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value,
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn positive<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default + std::fmt::Display,
        T::Err: std::fmt::Display,
    {
        let value = self.parsed(key, default)?;
        if value > T::default() {
            Ok(value)
        } else {
            Err(ConfigError::Invalid {
                key,
                value: value.to_string(),
                reason: "must be greater than zero".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.broker.connection, DEFAULT_BROKER);
        assert_eq!(config.broker.topic, "orders");
        assert_eq!(config.consumers.document_subscription, "subscription1");
        assert_eq!(config.consumers.object_subscription, "subscription2");
        assert_eq!(config.consumers.max_delivery_attempts, 10);
        assert_eq!(config.document_store.backend, DocumentBackend::Scylla);
        assert_eq!(config.document_store.nodes, vec!["127.0.0.1:9042".to_string()]);
        assert_eq!(config.object_store.backend, ObjectBackend::Local);
        assert_eq!(config.object_store.container, "orders-container");
        assert_eq!(config.http.port, 8080);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("BROKER_TOPIC_NAME", "placed-orders"),
            ("DOCUMENT_STORE_CONNECTION", "10.0.0.1:9042, 10.0.0.2:9042,"),
            ("OBJECT_STORE_BACKEND", "MinIO"),
            ("OBJECT_STORE_CONNECTION", "http://localhost:9000"),
            ("CONSUMER_WORKERS", "4"),
            ("REDELIVERY_DELAY_MS", "250"),
        ])
        .unwrap();

        assert_eq!(config.broker.topic, "placed-orders");
        assert_eq!(config.document_store.nodes, vec!["10.0.0.1:9042", "10.0.0.2:9042"]);
        assert_eq!(config.object_store.backend, ObjectBackend::S3);
        assert_eq!(config.object_store.connection.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.consumers.workers, 4);
        assert_eq!(config.consumers.redelivery_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_blank_required_name_is_rejected() {
        let err = load(&[("BROKER_TOPIC_NAME", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::Empty { key: "BROKER_TOPIC_NAME" }));
    }

    #[test]
    fn test_unparsable_values_are_rejected() {
        let err = load(&[("HTTP_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "HTTP_PORT", .. }));

        let err = load(&[("DOCUMENT_STORE_BACKEND", "cosmos")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DOCUMENT_STORE_BACKEND", .. }));
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let err = load(&[("CONSUMER_WORKERS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CONSUMER_WORKERS", .. }));
    }
}
