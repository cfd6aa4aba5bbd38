//! Telemetry reconciliation.
//!
//! Everything here is pure: functions take the current value and return the
//! next one, leaving the caller to swap it into the store.

use crate::model::{Device, DeviceStatus, Notification, NotificationType};
use crate::telemetry::TelemetryMessage;

/// Battery level at or below which a low-battery alert is raised
pub const LOW_BATTERY_THRESHOLD: i32 = 20;

/// Fill level written by a manual "mark as emptied"
pub const EMPTIED_FILL_LEVEL: i32 = 5;

/// Merge a telemetry message into a device and re-derive its status.
pub fn apply_telemetry(device: &Device, msg: &TelemetryMessage) -> Device {
    let mut updated = device.clone();
    if let Some(fill) = msg.fill_level {
        updated.fill_level = fill;
    }
    if let Some(battery) = msg.battery_level {
        updated.battery_level = battery;
    }
    updated.status = updated.derived_status();
    updated
}

/// Apply a message to the roster. Returns the new roster and the updated
/// device, or `None` when no device has the message's id.
pub fn apply_to_roster(roster: &[Device], msg: &TelemetryMessage) -> Option<(Vec<Device>, Device)> {
    let index = roster.iter().position(|d| d.id == msg.device_id)?;
    let updated = apply_telemetry(&roster[index], msg);

    let mut next = roster.to_vec();
    next[index] = updated.clone();
    Some((next, updated))
}

/// Operator override: bin was emptied on site. Status is forced rather than
/// derived.
pub fn mark_emptied(device: &Device, label: String) -> Device {
    let mut updated = device.clone();
    updated.fill_level = EMPTIED_FILL_LEVEL;
    updated.status = DeviceStatus::Operational;
    updated.last_emptied = label;
    updated
}

/// Bring the alert set in line with one device's current state.
pub fn reconcile(notifications: &[Notification], device: &Device) -> Vec<Notification> {
    let mut next = notifications.to_vec();

    sync_alert(
        &mut next,
        device,
        NotificationType::Critical,
        device.status == DeviceStatus::Critical,
    );
    sync_alert(
        &mut next,
        device,
        NotificationType::LowBattery,
        device.battery_level <= LOW_BATTERY_THRESHOLD,
    );

    next
}

fn sync_alert(
    notifications: &mut Vec<Notification>,
    device: &Device,
    kind: NotificationType,
    active: bool,
) {
    let key = kind.key_for(&device.id);
    let present = notifications.iter().any(|n| n.id == key);

    if active && !present {
        notifications.push(Notification {
            id: key,
            kind,
            device_id: device.id.clone(),
            message: alert_message(kind, device),
        });
    } else if !active && present {
        notifications.retain(|n| n.id != key);
    }
}

fn alert_message(kind: NotificationType, device: &Device) -> String {
    match kind {
        NotificationType::Critical => format!(
            "Bin {} has reached a critical fill level and needs to be emptied.",
            device.id
        ),
        NotificationType::LowBattery => format!(
            "Bin {}'s battery is very low at {}%. Please take action.",
            device.id, device.battery_level
        ),
    }
}

/// Drop every alert belonging to a device
pub fn remove_device_alerts(notifications: &[Notification], device_id: &str) -> Vec<Notification> {
    notifications
        .iter()
        .filter(|n| n.device_id != device_id)
        .cloned()
        .collect()
}
