use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("Subscription to {0} was rejected by the broker")]
    SubscriptionRejected(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {id} already exists")]
    Conflict { kind: &'static str, id: String },

    #[error("State store is not running")]
    StoreClosed,
}

impl Error {
    pub fn device_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "Device",
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
