use crate::model::MqttConfig;
use crate::mqtt::MqttSettings;
use clap::{ArgAction, Parser};
use std::time::Duration;

/// Smart bin monitoring dashboard
#[derive(Debug, Clone, Parser)]
#[command(name = "dashboard", version)]
pub struct Config {
    /// MQTT broker host
    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    pub mqtt_broker: String,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    /// First topic level, as in `{namespace}/bins/{id}/telemetry`
    #[arg(long, env = "MQTT_NAMESPACE", default_value = "fernhill")]
    pub mqtt_namespace: String,

    /// Retry the broker connection after a transport error
    #[arg(long, env = "MQTT_RECONNECT")]
    pub reconnect: bool,

    #[arg(long, env = "RECONNECT_DELAY_MS", default_value_t = 5000)]
    pub reconnect_delay_ms: u64,

    /// Address for the HTTP API
    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:8080")]
    pub http_addr: String,

    /// Queue depth in front of the state store
    #[arg(long, env = "COMMAND_CAPACITY", default_value_t = 1024)]
    pub command_capacity: usize,

    #[arg(long, env = "TRANSITION_CAPACITY", default_value_t = 500)]
    pub transition_capacity: usize,

    /// Start with the demo roster, users and floor plans
    #[arg(long, env = "SEED_DEMO", default_value_t = true, action = ArgAction::Set)]
    pub seed_demo: bool,
}

impl Config {
    pub fn mqtt_settings(&self, client_id: String) -> MqttSettings {
        MqttSettings {
            broker: self.mqtt_broker.clone(),
            port: self.mqtt_port,
            client_id,
            namespace: self.mqtt_namespace.clone(),
            reconnect: self.reconnect,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }

    /// Broker settings shown on the configuration panel at startup
    pub fn initial_mqtt_config(&self) -> MqttConfig {
        MqttConfig::for_namespace(&self.mqtt_broker, self.mqtt_port, &self.mqtt_namespace)
    }
}
