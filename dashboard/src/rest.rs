use crate::errors::Error;
use crate::history::DeviceLogView;
use crate::model::{
    ConnectionStatus, Device, DeviceInput, Floor, MqttConfig, Notification, PinPosition,
    Transition, User, UserInput,
};
use crate::store::StoreHandle;
use crate::validate::{validate_device, validate_user};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::watch;
use tracing::error;

#[derive(Debug, Clone)]
struct AppState {
    store: StoreHandle,
    connection: watch::Receiver<ConnectionStatus>,
}

#[derive(Debug, Serialize)]
struct ConnectionResponse {
    status: ConnectionStatus,
}

pub fn create_router(store: StoreHandle, connection: watch::Receiver<ConnectionStatus>) -> Router {
    let state = AppState { store, connection };

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/devices", get(list_devices).post(create_device))
        .route(
            "/api/v1/devices/:id",
            get(get_device).put(update_device).delete(delete_device),
        )
        .route("/api/v1/devices/:id/empty", post(mark_emptied))
        .route("/api/v1/notifications", get(list_notifications))
        .route("/api/v1/notifications/:id", delete(dismiss_notification))
        .route("/api/v1/users", get(list_users).post(create_user))
        .route(
            "/api/v1/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/api/v1/floors", get(list_floors))
        .route(
            "/api/v1/floors/:floor/bins/:id",
            put(place_pin).delete(remove_pin),
        )
        .route(
            "/api/v1/mqtt/config",
            get(get_mqtt_config).put(save_mqtt_config),
        )
        .route("/api/v1/mqtt/status", get(connection_status))
        .route("/api/v1/log", get(device_log).delete(clear_log))
        .route("/api/v1/log/start", post(start_logging))
        .route("/api/v1/log/stop", post(stop_logging))
        .route("/api/v1/transitions", get(list_transitions))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

// --- devices ---

async fn list_devices(State(state): State<AppState>) -> Json<Vec<Device>> {
    Json(state.store.devices().as_ref().clone())
}

async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Device>, AppError> {
    Ok(Json(state.store.device(&id)?))
}

async fn create_device(
    State(state): State<AppState>,
    Json(input): Json<DeviceInput>,
) -> Result<(StatusCode, Json<Device>), AppError> {
    validate_device(&input)?;
    let device = state.store.create_device(input).await?;
    Ok((StatusCode::CREATED, Json(device)))
}

async fn update_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut input): Json<DeviceInput>,
) -> Result<Json<Device>, AppError> {
    input.id = id.clone();
    validate_device(&input)?;
    Ok(Json(state.store.update_device(&id, input).await?))
}

async fn delete_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete_device(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_emptied(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Device>, AppError> {
    Ok(Json(state.store.mark_emptied(&id).await?))
}

// --- notifications ---

async fn list_notifications(State(state): State<AppState>) -> Json<Vec<Notification>> {
    Json(state.store.notifications().as_ref().clone())
}

async fn dismiss_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.dismiss_notification(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- users ---

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.store.users().await?))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.store.user(&id).await?))
}

async fn create_user(
    State(state): State<AppState>,
    Json(input): Json<UserInput>,
) -> Result<(StatusCode, Json<User>), AppError> {
    validate_user(&input)?;
    let user = state.store.create_user(input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UserInput>,
) -> Result<Json<User>, AppError> {
    validate_user(&input)?;
    Ok(Json(state.store.update_user(&id, input).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete_user(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- floor maps ---

async fn list_floors(State(state): State<AppState>) -> Result<Json<Vec<Floor>>, AppError> {
    Ok(Json(state.store.floors().await?))
}

async fn place_pin(
    State(state): State<AppState>,
    Path((floor, id)): Path<(String, String)>,
    Json(pos): Json<PinPosition>,
) -> Result<Json<Floor>, AppError> {
    Ok(Json(state.store.place_pin(&floor, &id, pos).await?))
}

async fn remove_pin(
    State(state): State<AppState>,
    Path((floor, id)): Path<(String, String)>,
) -> Result<Json<Floor>, AppError> {
    Ok(Json(state.store.remove_pin(&floor, &id).await?))
}

// --- broker settings ---

async fn get_mqtt_config(State(state): State<AppState>) -> Result<Json<MqttConfig>, AppError> {
    Ok(Json(state.store.mqtt_config().await?))
}

async fn save_mqtt_config(
    State(state): State<AppState>,
    Json(config): Json<MqttConfig>,
) -> Result<Json<MqttConfig>, AppError> {
    if config.host.trim().is_empty() {
        return Err(Error::Validation("Broker host cannot be empty".to_string()).into());
    }
    Ok(Json(state.store.set_mqtt_config(config).await?))
}

async fn connection_status(State(state): State<AppState>) -> Json<ConnectionResponse> {
    Json(ConnectionResponse {
        status: *state.connection.borrow(),
    })
}

// --- device log ---

async fn device_log(State(state): State<AppState>) -> Result<Json<DeviceLogView>, AppError> {
    Ok(Json(state.store.device_log().await?))
}

async fn clear_log(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.store.clear_log().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_logging(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.store.start_logging().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stop_logging(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.store.stop_logging().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_transitions(
    State(state): State<AppState>,
) -> Result<Json<Vec<Transition>>, AppError> {
    Ok(Json(state.store.transitions().await?))
}

struct AppError(anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<Error>() {
            Some(Error::NotFound { .. }) => StatusCode::NOT_FOUND,
            Some(Error::Conflict { .. }) => StatusCode::CONFLICT,
            Some(Error::Validation(_)) | Some(Error::Json(_)) => StatusCode::BAD_REQUEST,
            Some(Error::StoreClosed) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("API error: {}", self.0);
        }
        (status, self.0.to_string()).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
