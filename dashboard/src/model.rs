use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Derived state of a bin, computed from its fill level and thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    Operational,
    Warning,
    Critical,
}

impl DeviceStatus {
    /// Critical is checked first, so inverted thresholds make Warning unreachable.
    pub fn derive(fill_level: i32, warning_level: i32, critical_level: i32) -> Self {
        if fill_level >= critical_level {
            DeviceStatus::Critical
        } else if fill_level >= warning_level {
            DeviceStatus::Warning
        } else {
            DeviceStatus::Operational
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStatus::Operational => "Operational",
            DeviceStatus::Warning => "Warning",
            DeviceStatus::Critical => "Critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Wifi,
    Ethernet,
    Cellular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WasteType {
    Wet,
    Dry,
}

/// A smart bin tracked in the roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub model: String,
    pub firmware_version: String,
    pub location_name: String,
    pub building: String,
    pub floor: String,
    pub zone: String,
    pub connection_type: ConnectionType,
    pub network_name: String,
    pub waste_type: WasteType,
    pub warning_level: i32,
    pub critical_level: i32,
    pub fill_level: i32,
    pub battery_level: i32,
    pub status: DeviceStatus,
    pub last_emptied: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<(f64, f64)>,
}

impl Device {
    pub fn derived_status(&self) -> DeviceStatus {
        DeviceStatus::derive(self.fill_level, self.warning_level, self.critical_level)
    }
}

/// Operator-editable part of a device. Live telemetry fields and status are
/// never taken from the operator.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceInput {
    pub id: String,
    pub model: String,
    #[serde(default)]
    pub firmware_version: String,
    #[serde(default)]
    pub location_name: String,
    #[serde(default)]
    pub building: String,
    #[serde(default)]
    pub floor: String,
    #[serde(default)]
    pub zone: String,
    pub connection_type: ConnectionType,
    #[serde(default)]
    pub network_name: String,
    pub waste_type: WasteType,
    #[serde(default = "default_warning_level")]
    pub warning_level: i32,
    #[serde(default = "default_critical_level")]
    pub critical_level: i32,
    #[serde(default)]
    pub coords: Option<(f64, f64)>,
}

fn default_warning_level() -> i32 {
    70
}

fn default_critical_level() -> i32 {
    85
}

impl DeviceInput {
    /// Build a fresh device: full battery, empty, never emptied.
    pub fn into_new_device(self) -> Device {
        let mut device = Device {
            id: self.id,
            model: self.model,
            firmware_version: self.firmware_version,
            location_name: self.location_name,
            building: self.building,
            floor: self.floor,
            zone: self.zone,
            connection_type: self.connection_type,
            network_name: self.network_name,
            waste_type: self.waste_type,
            warning_level: self.warning_level,
            critical_level: self.critical_level,
            fill_level: 0,
            battery_level: 100,
            status: DeviceStatus::Operational,
            last_emptied: "Never".to_string(),
            coords: self.coords,
        };
        device.status = device.derived_status();
        device
    }

    /// Apply the editable fields onto an existing record, keeping its id,
    /// live levels and last-emptied label.
    pub fn apply_to(self, existing: &Device) -> Device {
        let mut device = Device {
            id: existing.id.clone(),
            model: self.model,
            firmware_version: self.firmware_version,
            location_name: self.location_name,
            building: self.building,
            floor: self.floor,
            zone: self.zone,
            connection_type: self.connection_type,
            network_name: self.network_name,
            waste_type: self.waste_type,
            warning_level: self.warning_level,
            critical_level: self.critical_level,
            fill_level: existing.fill_level,
            battery_level: existing.battery_level,
            status: existing.status,
            last_emptied: existing.last_emptied.clone(),
            coords: self.coords,
        };
        device.status = device.derived_status();
        device
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Critical,
    LowBattery,
}

impl NotificationType {
    /// Suffix used in the notification key `{device_id}-{suffix}`
    pub fn key_suffix(&self) -> &'static str {
        match self {
            NotificationType::Critical => "critical-fill",
            NotificationType::LowBattery => "low-battery",
        }
    }

    pub fn key_for(&self, device_id: &str) -> String {
        format!("{}-{}", device_id, self.key_suffix())
    }
}

/// Operator alert, keyed so each device has at most one per type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub device_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Administrator,
    #[serde(rename = "Facility Manager")]
    FacilityManager,
    #[serde(rename = "Standard User")]
    StandardUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: UserRole,
    pub last_login: String,
    pub status: UserStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: UserRole,
    pub status: UserStatus,
}

/// Pin position on a floor plan, in percent of the image size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorBin {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Floor {
    pub name: String,
    pub image_url: String,
    pub bins: Vec<FloorBin>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PinPosition {
    pub x: f64,
    pub y: f64,
}

/// Broker settings as shown on the configuration panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    #[serde(default)]
    pub username: String,
    pub telemetry_topic: String,
    pub command_topic: String,
}

impl MqttConfig {
    pub fn for_namespace(host: &str, port: u16, namespace: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            use_tls: false,
            username: String::new(),
            telemetry_topic: format!("{}/bins/+/telemetry", namespace),
            command_topic: format!("{}/bins/+/commands", namespace),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Raw message captured by the device log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    pub payload: String,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionKind {
    Telemetry,
    MarkEmptied,
    Created,
    Updated,
    Deleted,
}

/// One recorded change to a device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub kind: TransitionKind,
    pub status: Option<DeviceStatus>,
}
