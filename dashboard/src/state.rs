//! In-memory dashboard state.
//!
//! `DashboardState` is owned by exactly one task (see `store`). The roster and
//! the notification set are replaced wholesale on every change so published
//! snapshots never show a half-applied update.

use crate::errors::{Error, Result};
use crate::history::{BoundedLog, DeviceLog, DeviceLogView};
use crate::model::{
    Device, DeviceInput, Floor, FloorBin, MqttConfig, Notification, PinPosition, Transition,
    TransitionKind, User, UserInput,
};
use crate::reconcile;
use crate::telemetry::TelemetryMessage;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_TRANSITION_CAPACITY: usize = 500;

#[derive(Debug, Clone)]
pub struct DashboardState {
    devices: Arc<Vec<Device>>,
    notifications: Arc<Vec<Notification>>,
    users: Vec<User>,
    floors: Vec<Floor>,
    mqtt_config: MqttConfig,
    device_log: DeviceLog,
    transitions: BoundedLog<Transition>,
}

impl DashboardState {
    pub fn new(mqtt_config: MqttConfig, transition_capacity: usize) -> Self {
        Self {
            devices: Arc::new(Vec::new()),
            notifications: Arc::new(Vec::new()),
            users: Vec::new(),
            floors: Vec::new(),
            mqtt_config,
            device_log: DeviceLog::default(),
            transitions: BoundedLog::new(transition_capacity),
        }
    }

    /// Replace the roster wholesale and raise whatever alerts it implies.
    pub fn with_devices(mut self, devices: Vec<Device>) -> Self {
        let mut notifications = Vec::new();
        for device in &devices {
            notifications = reconcile::reconcile(&notifications, device);
        }
        self.devices = Arc::new(devices);
        self.notifications = Arc::new(notifications);
        self
    }

    pub fn with_users(mut self, users: Vec<User>) -> Self {
        self.users = users;
        self
    }

    pub fn with_floors(mut self, floors: Vec<Floor>) -> Self {
        self.floors = floors;
        self
    }

    pub fn devices(&self) -> Arc<Vec<Device>> {
        Arc::clone(&self.devices)
    }

    pub fn notifications(&self) -> Arc<Vec<Notification>> {
        Arc::clone(&self.notifications)
    }

    pub fn device(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    // --- telemetry ---

    /// Returns the updated device, or `None` when the id is unknown.
    pub fn apply_telemetry(&mut self, msg: &TelemetryMessage) -> Option<Device> {
        let (roster, updated) = reconcile::apply_to_roster(&self.devices, msg)?;
        self.devices = Arc::new(roster);
        self.reconcile_alerts(&updated);
        self.record_transition(&updated.id, TransitionKind::Telemetry, Some(&updated));

        debug!(
            device_id = %updated.id,
            fill_level = updated.fill_level,
            battery_level = updated.battery_level,
            status = %updated.status,
            "telemetry applied"
        );
        Some(updated)
    }

    pub fn record_raw(&mut self, topic: &str, payload: &[u8]) {
        self.device_log.record(topic, payload);
    }

    // --- device CRUD ---

    pub fn create_device(&mut self, input: DeviceInput) -> Result<Device> {
        if self.device(&input.id).is_some() {
            return Err(Error::Conflict {
                kind: "Device",
                id: input.id,
            });
        }
        let device = input.into_new_device();

        let mut roster = self.devices.as_ref().clone();
        roster.push(device.clone());
        self.devices = Arc::new(roster);
        self.reconcile_alerts(&device);
        self.record_transition(&device.id, TransitionKind::Created, Some(&device));

        info!(device_id = %device.id, "device created");
        Ok(device)
    }

    pub fn update_device(&mut self, id: &str, input: DeviceInput) -> Result<Device> {
        let updated = {
            let existing = self.device(id).ok_or_else(|| Error::device_not_found(id))?;
            input.apply_to(existing)
        };
        self.replace_device(updated.clone());
        self.reconcile_alerts(&updated);
        self.record_transition(&updated.id, TransitionKind::Updated, Some(&updated));

        info!(device_id = %updated.id, status = %updated.status, "device updated");
        Ok(updated)
    }

    /// Removes the device together with its alerts and floor pins.
    pub fn delete_device(&mut self, id: &str) -> Result<()> {
        if self.device(id).is_none() {
            return Err(Error::device_not_found(id));
        }
        let roster: Vec<Device> = self
            .devices
            .iter()
            .filter(|d| d.id != id)
            .cloned()
            .collect();
        self.devices = Arc::new(roster);
        self.notifications = Arc::new(reconcile::remove_device_alerts(&self.notifications, id));
        for floor in &mut self.floors {
            floor.bins.retain(|b| b.id != id);
        }
        self.record_transition(id, TransitionKind::Deleted, None);

        info!(device_id = %id, "device deleted");
        Ok(())
    }

    pub fn mark_emptied(&mut self, id: &str, at: DateTime<Utc>) -> Result<Device> {
        let emptied = {
            let existing = self.device(id).ok_or_else(|| Error::device_not_found(id))?;
            reconcile::mark_emptied(existing, emptied_label(at))
        };
        self.replace_device(emptied.clone());
        self.reconcile_alerts(&emptied);
        self.record_transition(&emptied.id, TransitionKind::MarkEmptied, Some(&emptied));

        info!(device_id = %emptied.id, "device marked as emptied");
        Ok(emptied)
    }

    fn replace_device(&mut self, device: Device) {
        let roster: Vec<Device> = self
            .devices
            .iter()
            .map(|d| {
                if d.id == device.id {
                    device.clone()
                } else {
                    d.clone()
                }
            })
            .collect();
        self.devices = Arc::new(roster);
    }

    fn reconcile_alerts(&mut self, device: &Device) {
        let next = reconcile::reconcile(&self.notifications, device);
        if next != *self.notifications {
            self.notifications = Arc::new(next);
        }
    }

    fn record_transition(&mut self, device_id: &str, kind: TransitionKind, device: Option<&Device>) {
        self.transitions.push(Transition {
            timestamp: Utc::now(),
            device_id: device_id.to_string(),
            kind,
            status: device.map(|d| d.status),
        });
    }

    pub fn transitions(&self) -> Vec<Transition> {
        self.transitions.to_vec()
    }

    // --- notifications ---

    pub fn dismiss_notification(&mut self, id: &str) -> Result<()> {
        if !self.notifications.iter().any(|n| n.id == id) {
            return Err(Error::NotFound {
                kind: "Notification",
                id: id.to_string(),
            });
        }
        let remaining: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| n.id != id)
            .cloned()
            .collect();
        self.notifications = Arc::new(remaining);
        debug!(notification_id = %id, "notification dismissed");
        Ok(())
    }

    // --- users ---

    pub fn users(&self) -> Vec<User> {
        self.users.clone()
    }

    pub fn user(&self, id: &str) -> Result<User> {
        self.users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or_else(|| user_not_found(id))
    }

    pub fn create_user(&mut self, input: UserInput) -> Result<User> {
        let user = User {
            id: format!("user-{}", uuid::Uuid::new_v4()),
            first_name: input.first_name,
            last_name: input.last_name,
            email: input.email,
            role: input.role,
            last_login: "Never".to_string(),
            status: input.status,
        };
        self.users.push(user.clone());
        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    pub fn update_user(&mut self, id: &str, input: UserInput) -> Result<User> {
        let user = self
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| user_not_found(id))?;
        user.first_name = input.first_name;
        user.last_name = input.last_name;
        user.email = input.email;
        user.role = input.role;
        user.status = input.status;
        Ok(user.clone())
    }

    pub fn delete_user(&mut self, id: &str) -> Result<()> {
        let before = self.users.len();
        self.users.retain(|u| u.id != id);
        if self.users.len() == before {
            return Err(user_not_found(id));
        }
        info!(user_id = %id, "user deleted");
        Ok(())
    }

    // --- floor maps ---

    pub fn floors(&self) -> Vec<Floor> {
        self.floors.clone()
    }

    /// Place a pin, or move it if the bin is already on this floor. A bin
    /// lives on at most one floor, so any pin elsewhere is removed.
    pub fn place_pin(&mut self, floor_name: &str, device_id: &str, pos: PinPosition) -> Result<Floor> {
        if self.device(device_id).is_none() {
            return Err(Error::device_not_found(device_id));
        }
        if !self.floors.iter().any(|f| f.name == floor_name) {
            return Err(floor_not_found(floor_name));
        }

        for floor in self.floors.iter_mut().filter(|f| f.name != floor_name) {
            floor.bins.retain(|b| b.id != device_id);
        }

        let floor = self
            .floors
            .iter_mut()
            .find(|f| f.name == floor_name)
            .ok_or_else(|| floor_not_found(floor_name))?;
        match floor.bins.iter_mut().find(|b| b.id == device_id) {
            Some(pin) => {
                pin.x = pos.x;
                pin.y = pos.y;
            }
            None => floor.bins.push(FloorBin {
                id: device_id.to_string(),
                x: pos.x,
                y: pos.y,
            }),
        }
        Ok(floor.clone())
    }

    pub fn remove_pin(&mut self, floor_name: &str, device_id: &str) -> Result<Floor> {
        let floor = self
            .floors
            .iter_mut()
            .find(|f| f.name == floor_name)
            .ok_or_else(|| floor_not_found(floor_name))?;
        let before = floor.bins.len();
        floor.bins.retain(|b| b.id != device_id);
        if floor.bins.len() == before {
            return Err(Error::NotFound {
                kind: "Pin",
                id: device_id.to_string(),
            });
        }
        Ok(floor.clone())
    }

    // --- broker settings & device log ---

    pub fn mqtt_config(&self) -> MqttConfig {
        self.mqtt_config.clone()
    }

    pub fn set_mqtt_config(&mut self, config: MqttConfig) -> MqttConfig {
        info!(host = %config.host, port = config.port, "MQTT settings saved");
        self.mqtt_config = config;
        self.mqtt_config.clone()
    }

    pub fn device_log(&self) -> DeviceLogView {
        self.device_log.view()
    }

    pub fn start_logging(&mut self) {
        self.device_log.start();
    }

    pub fn stop_logging(&mut self) {
        self.device_log.stop();
    }

    pub fn clear_log(&mut self) {
        self.device_log.clear();
    }
}

fn emptied_label(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn user_not_found(id: &str) -> Error {
    Error::NotFound {
        kind: "User",
        id: id.to_string(),
    }
}

fn floor_not_found(name: &str) -> Error {
    Error::NotFound {
        kind: "Floor",
        id: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConnectionType, DeviceStatus, NotificationType, UserRole, UserStatus, WasteType};
    use chrono::TimeZone;

    fn input(id: &str, warning: i32, critical: i32) -> DeviceInput {
        DeviceInput {
            id: id.to_string(),
            model: "IoT-Waste-300".to_string(),
            firmware_version: "v3.1.0".to_string(),
            location_name: "Floor 2, West Wing".to_string(),
            building: "Building B".to_string(),
            floor: "2".to_string(),
            zone: "C".to_string(),
            connection_type: ConnectionType::Ethernet,
            network_name: "CorpNet".to_string(),
            waste_type: WasteType::Dry,
            warning_level: warning,
            critical_level: critical,
            coords: None,
        }
    }

    fn telemetry(id: &str, fill: Option<i32>, battery: Option<i32>) -> TelemetryMessage {
        TelemetryMessage {
            device_id: id.to_string(),
            fill_level: fill,
            battery_level: battery,
        }
    }

    fn state() -> DashboardState {
        let mut state = DashboardState::new(
            MqttConfig::for_namespace("localhost", 1883, "fernhill"),
            DEFAULT_TRANSITION_CAPACITY,
        )
        .with_floors(vec![
            Floor {
                name: "Ground Floor".to_string(),
                image_url: "ground.png".to_string(),
                bins: vec![],
            },
            Floor {
                name: "1st Floor".to_string(),
                image_url: "first.png".to_string(),
                bins: vec![],
            },
        ]);
        state.create_device(input("SB-103", 80, 95)).unwrap();
        state
    }

    fn notification_ids(state: &DashboardState) -> Vec<String> {
        state.notifications().iter().map(|n| n.id.clone()).collect()
    }

    #[test]
    fn test_full_cycle_for_sb103() {
        let mut state = state();

        let device = state
            .apply_telemetry(&telemetry("SB-103", Some(96), Some(10)))
            .unwrap();
        assert_eq!(device.status, DeviceStatus::Critical);
        assert_eq!(
            notification_ids(&state),
            vec!["SB-103-critical-fill", "SB-103-low-battery"]
        );

        let device = state
            .apply_telemetry(&telemetry("SB-103", Some(40), Some(60)))
            .unwrap();
        assert_eq!(device.status, DeviceStatus::Operational);
        assert!(state.notifications().is_empty());
    }

    #[test]
    fn test_repeated_message_is_idempotent() {
        let mut state = state();
        let msg = telemetry("SB-103", Some(97), Some(5));
        state.apply_telemetry(&msg);
        let devices = state.devices();
        let notifications = state.notifications();

        state.apply_telemetry(&msg);
        assert_eq!(*state.devices(), *devices);
        assert_eq!(*state.notifications(), *notifications);
    }

    #[test]
    fn test_unknown_device_changes_nothing() {
        let mut state = state();
        let devices = state.devices();
        let notifications = state.notifications();

        assert!(state
            .apply_telemetry(&telemetry("SB-999", Some(99), Some(1)))
            .is_none());
        assert!(Arc::ptr_eq(&devices, &state.devices()));
        assert!(Arc::ptr_eq(&notifications, &state.notifications()));
        assert!(state
            .transitions()
            .iter()
            .all(|t| t.device_id != "SB-999"));
    }

    #[test]
    fn test_snapshot_survives_update() {
        let mut state = state();
        let before = state.devices();
        state.apply_telemetry(&telemetry("SB-103", Some(50), None));
        assert_eq!(before[0].fill_level, 0);
        assert_eq!(state.devices()[0].fill_level, 50);
    }

    #[test]
    fn test_dismissed_alert_returns_after_condition_clears() {
        let mut state = state();
        state.apply_telemetry(&telemetry("SB-103", Some(96), None));
        state.dismiss_notification("SB-103-critical-fill").unwrap();
        assert!(state.notifications().is_empty());

        state.apply_telemetry(&telemetry("SB-103", Some(40), None));
        assert!(state.notifications().is_empty());

        state.apply_telemetry(&telemetry("SB-103", Some(99), None));
        assert_eq!(notification_ids(&state), vec!["SB-103-critical-fill"]);
    }

    #[test]
    fn test_dismiss_unknown_notification() {
        let mut state = state();
        assert!(matches!(
            state.dismiss_notification("nope"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_mark_emptied_clears_critical_alert() {
        let mut state = state();
        state.apply_telemetry(&telemetry("SB-103", Some(99), Some(80)));
        assert_eq!(notification_ids(&state), vec!["SB-103-critical-fill"]);

        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let device = state.mark_emptied("SB-103", at).unwrap();
        assert_eq!(device.fill_level, 5);
        assert_eq!(device.status, DeviceStatus::Operational);
        assert_eq!(device.last_emptied, "2024-05-01 09:30 UTC");
        assert!(state.notifications().is_empty());

        let kinds: Vec<TransitionKind> = state.transitions().iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TransitionKind::Created,
                TransitionKind::Telemetry,
                TransitionKind::MarkEmptied
            ]
        );
    }

    #[test]
    fn test_mark_emptied_unknown_device() {
        let mut state = state();
        assert!(state.mark_emptied("SB-999", Utc::now()).is_err());
    }

    #[test]
    fn test_create_duplicate_device() {
        let mut state = state();
        assert!(matches!(
            state.create_device(input("SB-103", 70, 85)),
            Err(Error::Conflict { .. })
        ));
    }

    #[test]
    fn test_update_thresholds_rederives_and_alerts() {
        let mut state = state();
        state.apply_telemetry(&telemetry("SB-103", Some(85), Some(90)));
        assert_eq!(state.devices()[0].status, DeviceStatus::Warning);

        let updated = state.update_device("SB-103", input("SB-103", 60, 80)).unwrap();
        assert_eq!(updated.status, DeviceStatus::Critical);
        assert_eq!(updated.fill_level, 85);
        assert_eq!(notification_ids(&state), vec!["SB-103-critical-fill"]);
    }

    #[test]
    fn test_delete_device_removes_alerts_and_pins() {
        let mut state = state();
        state.apply_telemetry(&telemetry("SB-103", Some(99), Some(3)));
        state
            .place_pin("Ground Floor", "SB-103", PinPosition { x: 10.0, y: 20.0 })
            .unwrap();

        state.delete_device("SB-103").unwrap();
        assert!(state.devices().is_empty());
        assert!(state.notifications().is_empty());
        assert!(state.floors().iter().all(|f| f.bins.is_empty()));
        assert!(state.delete_device("SB-103").is_err());
    }

    #[test]
    fn test_pin_moves_between_floors() {
        let mut state = state();
        state
            .place_pin("Ground Floor", "SB-103", PinPosition { x: 10.0, y: 20.0 })
            .unwrap();
        let floor = state
            .place_pin("1st Floor", "SB-103", PinPosition { x: 60.0, y: 40.0 })
            .unwrap();
        assert_eq!(floor.bins.len(), 1);
        assert_eq!(floor.bins[0].x, 60.0);

        let floors = state.floors();
        assert!(floors[0].bins.is_empty());

        let floor = state
            .place_pin("1st Floor", "SB-103", PinPosition { x: 61.0, y: 41.0 })
            .unwrap();
        assert_eq!(floor.bins.len(), 1);
        assert_eq!(floor.bins[0].y, 41.0);
    }

    #[test]
    fn test_pin_errors() {
        let mut state = state();
        let pos = PinPosition { x: 1.0, y: 1.0 };
        assert!(state.place_pin("Roof", "SB-103", pos).is_err());
        assert!(state.place_pin("1st Floor", "SB-999", pos).is_err());
        assert!(state.remove_pin("1st Floor", "SB-103").is_err());

        state.place_pin("1st Floor", "SB-103", pos).unwrap();
        let floor = state.remove_pin("1st Floor", "SB-103").unwrap();
        assert!(floor.bins.is_empty());
    }

    #[test]
    fn test_user_crud() {
        let mut state = state();
        let user = state
            .create_user(UserInput {
                first_name: "Manager".to_string(),
                last_name: "User".to_string(),
                email: "manager@example.com".to_string(),
                role: UserRole::FacilityManager,
                status: UserStatus::Active,
            })
            .unwrap();
        assert!(user.id.starts_with("user-"));
        assert_eq!(state.users().len(), 1);

        let updated = state
            .update_user(
                &user.id,
                UserInput {
                    first_name: "Manager".to_string(),
                    last_name: "User".to_string(),
                    email: "manager@example.com".to_string(),
                    role: UserRole::FacilityManager,
                    status: UserStatus::Inactive,
                },
            )
            .unwrap();
        assert_eq!(updated.status, UserStatus::Inactive);
        assert_eq!(state.user(&user.id).unwrap().status, UserStatus::Inactive);

        state.delete_user(&user.id).unwrap();
        assert!(state.users().is_empty());
        assert!(state.delete_user(&user.id).is_err());
    }

    #[test]
    fn test_seeded_roster_raises_alerts() {
        let critical = {
            let mut d = input("SB-1", 70, 85).into_new_device();
            d.fill_level = 95;
            d.battery_level = 15;
            d.status = d.derived_status();
            d
        };
        let state = DashboardState::new(
            MqttConfig::for_namespace("localhost", 1883, "fernhill"),
            10,
        )
        .with_devices(vec![critical]);

        let kinds: Vec<NotificationType> = state.notifications().iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NotificationType::Critical, NotificationType::LowBattery]);
    }

    #[test]
    fn test_transition_log_is_bounded() {
        let mut state = DashboardState::new(
            MqttConfig::for_namespace("localhost", 1883, "fernhill"),
            3,
        );
        state.create_device(input("SB-1", 70, 85)).unwrap();
        for fill in 0..10 {
            state.apply_telemetry(&telemetry("SB-1", Some(fill), None));
        }
        assert_eq!(state.transitions().len(), 3);
    }
}
