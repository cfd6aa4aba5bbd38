//! Single-writer actor around `DashboardState`.
//!
//! Telemetry from the MQTT pump and operator commands from the HTTP API are
//! funneled through one channel, so they are applied strictly in arrival
//! order. Roster and notification snapshots are published on watch channels
//! after every command.

use crate::errors::{Error, Result};
use crate::history::DeviceLogView;
use crate::metrics::{
    ACTIVE_NOTIFICATIONS, QUEUE_FULL_TOTAL, ROSTER_SIZE, TELEMETRY_APPLIED_TOTAL,
    UNKNOWN_DEVICE_TOTAL,
};
use crate::model::{
    Device, DeviceInput, Floor, MqttConfig, Notification, PinPosition, Transition, User, UserInput,
};
use crate::state::DashboardState;
use crate::telemetry::TelemetryMessage;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Deferred reply, sent once the new snapshots are visible to readers
type Ack = Box<dyn FnOnce() + Send>;

/// One publish off the subscription: the raw bytes for the device log and,
/// when it parsed, the typed update.
#[derive(Debug)]
pub struct Incoming {
    pub topic: String,
    pub payload: Vec<u8>,
    pub telemetry: Option<TelemetryMessage>,
}

#[derive(Debug)]
enum Command {
    Telemetry(TelemetryMessage),
    Incoming(Incoming),

    CreateDevice(DeviceInput, Reply<Device>),
    UpdateDevice(String, DeviceInput, Reply<Device>),
    DeleteDevice(String, Reply<()>),
    MarkEmptied(String, Reply<Device>),
    DismissNotification(String, Reply<()>),

    ListUsers(Reply<Vec<User>>),
    GetUser(String, Reply<User>),
    CreateUser(UserInput, Reply<User>),
    UpdateUser(String, UserInput, Reply<User>),
    DeleteUser(String, Reply<()>),

    ListFloors(Reply<Vec<Floor>>),
    PlacePin(String, String, PinPosition, Reply<Floor>),
    RemovePin(String, String, Reply<Floor>),

    GetMqttConfig(Reply<MqttConfig>),
    SetMqttConfig(MqttConfig, Reply<MqttConfig>),

    DeviceLog(Reply<DeviceLogView>),
    StartLogging(Reply<()>),
    StopLogging(Reply<()>),
    ClearLog(Reply<()>),
    Transitions(Reply<Vec<Transition>>),
}

/// Cloneable client for the store task
#[derive(Debug, Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<Command>,
    devices: watch::Receiver<Arc<Vec<Device>>>,
    notifications: watch::Receiver<Arc<Vec<Notification>>>,
}

/// Start the store task. It runs until every handle has been dropped.
pub fn spawn_store(state: DashboardState, capacity: usize) -> (StoreHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity);
    let (devices_tx, devices_rx) = watch::channel(state.devices());
    let (notifications_tx, notifications_rx) = watch::channel(state.notifications());

    publish_gauges(&state);

    let handle = StoreHandle {
        tx,
        devices: devices_rx,
        notifications: notifications_rx,
    };
    let task = tokio::spawn(run_store(rx, state, devices_tx, notifications_tx));
    (handle, task)
}

async fn run_store(
    mut rx: mpsc::Receiver<Command>,
    mut state: DashboardState,
    devices_tx: watch::Sender<Arc<Vec<Device>>>,
    notifications_tx: watch::Sender<Arc<Vec<Notification>>>,
) {
    info!("Starting state store");

    while let Some(command) = rx.recv().await {
        let ack = handle_command(&mut state, command);

        let devices = state.devices();
        if !Arc::ptr_eq(&devices, &devices_tx.borrow()) {
            devices_tx.send_replace(devices);
        }
        let notifications = state.notifications();
        if !Arc::ptr_eq(&notifications, &notifications_tx.borrow()) {
            notifications_tx.send_replace(notifications);
        }
        publish_gauges(&state);

        if let Some(ack) = ack {
            ack();
        }
    }

    info!("State store stopped");
}

fn apply_telemetry(state: &mut DashboardState, msg: &TelemetryMessage) {
    match state.apply_telemetry(msg) {
        Some(_) => TELEMETRY_APPLIED_TOTAL.inc(),
        None => {
            UNKNOWN_DEVICE_TOTAL.inc();
            debug!(device_id = %msg.device_id, "telemetry for unknown device discarded");
        }
    }
}

fn handle_command(state: &mut DashboardState, command: Command) -> Option<Ack> {
    match command {
        Command::Telemetry(msg) => {
            apply_telemetry(state, &msg);
            None
        }
        Command::Incoming(incoming) => {
            state.record_raw(&incoming.topic, &incoming.payload);
            if let Some(msg) = &incoming.telemetry {
                apply_telemetry(state, msg);
            }
            None
        }

        Command::CreateDevice(input, reply) => respond(reply, state.create_device(input)),
        Command::UpdateDevice(id, input, reply) => respond(reply, state.update_device(&id, input)),
        Command::DeleteDevice(id, reply) => respond(reply, state.delete_device(&id)),
        Command::MarkEmptied(id, reply) => respond(reply, state.mark_emptied(&id, Utc::now())),
        Command::DismissNotification(id, reply) => {
            respond(reply, state.dismiss_notification(&id))
        }

        Command::ListUsers(reply) => respond(reply, Ok(state.users())),
        Command::GetUser(id, reply) => respond(reply, state.user(&id)),
        Command::CreateUser(input, reply) => respond(reply, state.create_user(input)),
        Command::UpdateUser(id, input, reply) => respond(reply, state.update_user(&id, input)),
        Command::DeleteUser(id, reply) => respond(reply, state.delete_user(&id)),

        Command::ListFloors(reply) => respond(reply, Ok(state.floors())),
        Command::PlacePin(floor, id, pos, reply) => {
            respond(reply, state.place_pin(&floor, &id, pos))
        }
        Command::RemovePin(floor, id, reply) => respond(reply, state.remove_pin(&floor, &id)),

        Command::GetMqttConfig(reply) => respond(reply, Ok(state.mqtt_config())),
        Command::SetMqttConfig(config, reply) => respond(reply, Ok(state.set_mqtt_config(config))),

        Command::DeviceLog(reply) => respond(reply, Ok(state.device_log())),
        Command::StartLogging(reply) => {
            state.start_logging();
            respond(reply, Ok(()))
        }
        Command::StopLogging(reply) => {
            state.stop_logging();
            respond(reply, Ok(()))
        }
        Command::ClearLog(reply) => {
            state.clear_log();
            respond(reply, Ok(()))
        }
        Command::Transitions(reply) => respond(reply, Ok(state.transitions())),
    }
}

fn respond<T: Send + 'static>(reply: Reply<T>, result: Result<T>) -> Option<Ack> {
    Some(Box::new(move || {
        // caller may have gone away; nothing to do then
        let _ = reply.send(result);
    }))
}

fn publish_gauges(state: &DashboardState) {
    ROSTER_SIZE.set(state.devices().len() as f64);
    ACTIVE_NOTIFICATIONS.set(state.notifications().len() as f64);
}

impl StoreHandle {
    /// Latest roster snapshot
    pub fn devices(&self) -> Arc<Vec<Device>> {
        Arc::clone(&self.devices.borrow())
    }

    pub fn device(&self, id: &str) -> Result<Device> {
        self.devices
            .borrow()
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| Error::device_not_found(id))
    }

    /// Latest notification snapshot, in insertion order
    pub fn notifications(&self) -> Arc<Vec<Notification>> {
        Arc::clone(&self.notifications.borrow())
    }

    /// Watch the roster for changes
    pub fn subscribe_devices(&self) -> watch::Receiver<Arc<Vec<Device>>> {
        self.devices.clone()
    }

    /// Queue a telemetry message. No reply: the pump does not wait on the outcome.
    pub async fn submit_telemetry(&self, msg: TelemetryMessage) -> Result<()> {
        self.send(Command::Telemetry(msg)).await
    }

    /// Queue a message from the subscription. When the queue is full this
    /// waits for room rather than dropping telemetry.
    pub async fn ingest(&self, incoming: Incoming) -> Result<()> {
        match self.tx.try_send(Command::Incoming(incoming)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                QUEUE_FULL_TOTAL.inc();
                debug!("Store queue full, waiting for room");
                self.send(command).await
            }
            Err(TrySendError::Closed(_)) => Err(Error::StoreClosed),
        }
    }

    pub async fn create_device(&self, input: DeviceInput) -> Result<Device> {
        self.request(|reply| Command::CreateDevice(input, reply)).await
    }

    pub async fn update_device(&self, id: &str, input: DeviceInput) -> Result<Device> {
        self.request(|reply| Command::UpdateDevice(id.to_string(), input, reply))
            .await
    }

    pub async fn delete_device(&self, id: &str) -> Result<()> {
        self.request(|reply| Command::DeleteDevice(id.to_string(), reply))
            .await
    }

    pub async fn mark_emptied(&self, id: &str) -> Result<Device> {
        self.request(|reply| Command::MarkEmptied(id.to_string(), reply))
            .await
    }

    pub async fn dismiss_notification(&self, id: &str) -> Result<()> {
        self.request(|reply| Command::DismissNotification(id.to_string(), reply))
            .await
    }

    pub async fn users(&self) -> Result<Vec<User>> {
        self.request(Command::ListUsers).await
    }

    pub async fn user(&self, id: &str) -> Result<User> {
        self.request(|reply| Command::GetUser(id.to_string(), reply))
            .await
    }

    pub async fn create_user(&self, input: UserInput) -> Result<User> {
        self.request(|reply| Command::CreateUser(input, reply)).await
    }

    pub async fn update_user(&self, id: &str, input: UserInput) -> Result<User> {
        self.request(|reply| Command::UpdateUser(id.to_string(), input, reply))
            .await
    }

    pub async fn delete_user(&self, id: &str) -> Result<()> {
        self.request(|reply| Command::DeleteUser(id.to_string(), reply))
            .await
    }

    pub async fn floors(&self) -> Result<Vec<Floor>> {
        self.request(Command::ListFloors).await
    }

    pub async fn place_pin(&self, floor: &str, device_id: &str, pos: PinPosition) -> Result<Floor> {
        self.request(|reply| {
            Command::PlacePin(floor.to_string(), device_id.to_string(), pos, reply)
        })
        .await
    }

    pub async fn remove_pin(&self, floor: &str, device_id: &str) -> Result<Floor> {
        self.request(|reply| Command::RemovePin(floor.to_string(), device_id.to_string(), reply))
            .await
    }

    pub async fn mqtt_config(&self) -> Result<MqttConfig> {
        self.request(Command::GetMqttConfig).await
    }

    pub async fn set_mqtt_config(&self, config: MqttConfig) -> Result<MqttConfig> {
        self.request(|reply| Command::SetMqttConfig(config, reply))
            .await
    }

    pub async fn device_log(&self) -> Result<DeviceLogView> {
        self.request(Command::DeviceLog).await
    }

    pub async fn start_logging(&self) -> Result<()> {
        self.request(Command::StartLogging).await
    }

    pub async fn stop_logging(&self) -> Result<()> {
        self.request(Command::StopLogging).await
    }

    pub async fn clear_log(&self) -> Result<()> {
        self.request(Command::ClearLog).await
    }

    pub async fn transitions(&self) -> Result<Vec<Transition>> {
        self.request(Command::Transitions).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).await.map_err(|_| Error::StoreClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await.map_err(|_| Error::StoreClosed)?
    }
}
