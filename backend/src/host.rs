use std::{net::SocketAddr, path::Path as FsPath, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use lampi_common::{
    device_association_topic, device_notification_topic, AssociationStatus, BrokerConfig,
    NotificationKind, NotificationMessage, CLIENT_BACKEND, DEVICE_TYPE_DOORBELL, DEVICE_TYPE_LAMP,
};

use crate::store::{DoorbellLink, Registry, Store, PARKED_OWNER};
use crate::transcribe::{NullTranscriber, Transcriber};

#[derive(Clone)]
struct AppState {
    registry: Arc<Mutex<Registry>>,
    store: Store,
    mqtt: AsyncClient,
    transcriber: Arc<dyn Transcriber>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct DeviceView {
    #[serde(rename = "deviceId")]
    device_id: String,
    name: String,
    owner: String,
    associated: bool,
}

#[derive(Debug, Deserialize)]
struct AssociateRequest {
    code: String,
    username: String,
}

#[derive(Debug, Serialize)]
struct AssociateResponse {
    #[serde(rename = "deviceId")]
    device_id: String,
    #[serde(rename = "deviceType")]
    device_type: String,
}

#[derive(Debug, Deserialize)]
struct LinkUpdate {
    #[serde(rename = "doorbellId")]
    doorbell_id: String,
    #[serde(rename = "lampId")]
    lamp_id: String,
    hue: f32,
    saturation: f32,
    brightness: f32,
    #[serde(rename = "numFlashes")]
    num_flashes: u8,
}

#[derive(Debug, Serialize)]
struct LinkView {
    #[serde(rename = "doorbellId")]
    doorbell_id: String,
    #[serde(rename = "lampId")]
    lamp_id: String,
    hue: f32,
    saturation: f32,
    brightness: f32,
    #[serde(rename = "numFlashes")]
    num_flashes: u8,
    #[serde(rename = "hexColor")]
    hex_color: String,
}

#[derive(Debug, Deserialize)]
struct DoorbellEventRequest {
    recording: String,
}

#[derive(Debug, Serialize)]
struct DoorbellEventResponse {
    transcription: String,
    delivered: usize,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = Store::new();
    let registry = store.load().await.unwrap_or_else(|err| {
        warn!("failed to load registry from store: {err:#}");
        Registry::default()
    });

    let broker = BrokerConfig::from_env();
    let mut options = MqttOptions::new(CLIENT_BACKEND, broker.host.clone(), broker.port);
    options.set_keep_alive(Duration::from_secs(broker.keep_alive_secs));
    if !broker.username.is_empty() {
        options.set_credentials(broker.username.clone(), broker.password.clone());
    }

    let (mqtt, mut eventloop) = AsyncClient::new(options, 64);
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => info!("mqtt connected"),
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    let app_state = AppState {
        registry: Arc::new(Mutex::new(registry)),
        store,
        mqtt,
        transcriber: Arc::new(NullTranscriber),
    };

    let web_root = format!("{}/web", env!("CARGO_MANIFEST_DIR"));
    let app = Router::new()
        .route("/api/lamps", get(handle_list_lamps))
        .route("/api/lamps/{device_id}", post(handle_register_lamp))
        .route(
            "/api/lamps/{device_id}/dissociate",
            post(handle_dissociate_lamp),
        )
        .route("/api/doorbells", get(handle_list_doorbells))
        .route("/api/doorbells/{device_id}", post(handle_register_doorbell))
        .route(
            "/api/doorbells/{device_id}/dissociate",
            post(handle_dissociate_doorbell),
        )
        .route("/api/doorbells/{device_id}/event", post(handle_doorbell_event))
        .route("/api/associate", post(handle_associate))
        .route("/api/links", put(handle_put_link))
        .fallback_service(ServeDir::new(web_root))
        .with_state(app_state);

    let port = std::env::var("LAMPI_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse().unwrap();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind backend server at {addr}"))?;

    info!("backend listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_list_lamps(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.registry.lock().await;
    let lamps: Vec<DeviceView> = registry
        .lamps
        .iter()
        .map(|lamp| DeviceView {
            device_id: lamp.device_id.clone(),
            name: lamp.name.clone(),
            owner: lamp.owner.clone(),
            associated: lamp.owner != PARKED_OWNER,
        })
        .collect();
    Json(lamps)
}

async fn handle_list_doorbells(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.registry.lock().await;
    let doorbells: Vec<DeviceView> = registry
        .doorbells
        .iter()
        .map(|doorbell| DeviceView {
            device_id: doorbell.device_id.clone(),
            name: doorbell.name.clone(),
            owner: doorbell.owner.clone(),
            associated: doorbell.owner != PARKED_OWNER,
        })
        .collect();
    Json(doorbells)
}

/// First contact from a device: create its parked record and (re)publish its
/// retained association status. Replays are harmless, the device de-dups.
async fn handle_register_lamp(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    let status = {
        let mut registry = state.registry.lock().await;
        let record = registry.get_or_create_lamp(&device_id, Utc::now());
        association_status_of(record.owner.as_str(), record.association_code.as_str())
    };

    if let Err(err) = persist(&state).await {
        warn!("failed to persist lamp registration: {err:#}");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to persist registry");
    }

    publish_association(&state.mqtt, &device_id, DEVICE_TYPE_LAMP, &status).await;
    handle_list_lamps(State(state)).await.into_response()
}

async fn handle_register_doorbell(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    let status = {
        let mut registry = state.registry.lock().await;
        let record = registry.get_or_create_doorbell(&device_id, Utc::now());
        association_status_of(record.owner.as_str(), record.association_code.as_str())
    };

    if let Err(err) = persist(&state).await {
        warn!("failed to persist doorbell registration: {err:#}");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to persist registry");
    }

    publish_association(&state.mqtt, &device_id, DEVICE_TYPE_DOORBELL, &status).await;
    handle_list_doorbells(State(state)).await.into_response()
}

async fn handle_dissociate_lamp(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    let status = {
        let mut registry = state.registry.lock().await;
        match registry.dissociate_lamp(&device_id) {
            Some(record) => AssociationStatus::unassociated(record.association_code.clone()),
            None => return error_response(StatusCode::NOT_FOUND, "Unknown lamp"),
        }
    };

    if let Err(err) = persist(&state).await {
        warn!("failed to persist lamp dissociation: {err:#}");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to persist registry");
    }

    publish_association(&state.mqtt, &device_id, DEVICE_TYPE_LAMP, &status).await;
    handle_list_lamps(State(state)).await.into_response()
}

async fn handle_dissociate_doorbell(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    let status = {
        let mut registry = state.registry.lock().await;
        match registry.dissociate_doorbell(&device_id) {
            Some(record) => AssociationStatus::unassociated(record.association_code.clone()),
            None => return error_response(StatusCode::NOT_FOUND, "Unknown doorbell"),
        }
    };

    if let Err(err) = persist(&state).await {
        warn!("failed to persist doorbell dissociation: {err:#}");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to persist registry");
    }

    publish_association(&state.mqtt, &device_id, DEVICE_TYPE_DOORBELL, &status).await;
    handle_list_doorbells(State(state)).await.into_response()
}

/// Claim a parked device by the code shown on it. Lamps and doorbells share
/// one code space from the user's point of view.
async fn handle_associate(
    State(state): State<AppState>,
    Json(request): Json<AssociateRequest>,
) -> impl IntoResponse {
    if request.username.trim().is_empty() || request.username == PARKED_OWNER {
        return error_response(StatusCode::BAD_REQUEST, "Invalid username");
    }
    // Codes are matched by prefix (the device displays a truncated code), so
    // a too-short prefix must not claim an arbitrary device.
    if request.code.len() < 6 {
        return error_response(StatusCode::BAD_REQUEST, "Code must be at least 6 characters");
    }

    let claimed = {
        let mut registry = state.registry.lock().await;
        if let Some(record) = registry.associate_lamp(&request.code, &request.username) {
            Some((record.device_id.clone(), DEVICE_TYPE_LAMP))
        } else {
            registry
                .associate_doorbell(&request.code, &request.username)
                .map(|record| (record.device_id.clone(), DEVICE_TYPE_DOORBELL))
        }
    };

    let Some((device_id, device_type)) = claimed else {
        return error_response(StatusCode::NOT_FOUND, "Invalid association code");
    };

    if let Err(err) = persist(&state).await {
        warn!("failed to persist association: {err:#}");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to persist registry");
    }

    publish_association(
        &state.mqtt,
        &device_id,
        device_type,
        &AssociationStatus::associated(),
    )
    .await;

    Json(AssociateResponse {
        device_id,
        device_type: device_type.to_string(),
    })
    .into_response()
}

async fn handle_put_link(
    State(state): State<AppState>,
    Json(update): Json<LinkUpdate>,
) -> impl IntoResponse {
    if !unit_interval(update.hue) || !unit_interval(update.saturation) || !unit_interval(update.brightness)
    {
        return error_response(
            StatusCode::BAD_REQUEST,
            "hue, saturation, and brightness must be within 0.0-1.0",
        );
    }
    if update.num_flashes == 0 {
        return error_response(StatusCode::BAD_REQUEST, "numFlashes must be at least 1");
    }

    let link = {
        let mut registry = state.registry.lock().await;
        if registry.doorbell(&update.doorbell_id).is_none() {
            return error_response(StatusCode::NOT_FOUND, "Unknown doorbell");
        }
        if registry.lamp(&update.lamp_id).is_none() {
            return error_response(StatusCode::NOT_FOUND, "Unknown lamp");
        }
        let link = DoorbellLink {
            doorbell_id: update.doorbell_id,
            lamp_id: update.lamp_id,
            hue: update.hue,
            saturation: update.saturation,
            brightness: update.brightness,
            num_flashes: update.num_flashes,
        };
        registry.upsert_link(link.clone());
        link
    };

    if let Err(err) = persist(&state).await {
        warn!("failed to persist link update: {err:#}");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to persist registry");
    }

    Json(LinkView {
        hex_color: link.hex_color(),
        doorbell_id: link.doorbell_id,
        lamp_id: link.lamp_id,
        hue: link.hue,
        saturation: link.saturation,
        brightness: link.brightness,
        num_flashes: link.num_flashes,
    })
    .into_response()
}

/// Doorbell ring: transcribe the recording and fan the notification out to
/// every lamp wired to this doorbell, flash settings taken from each link.
async fn handle_doorbell_event(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(request): Json<DoorbellEventRequest>,
) -> impl IntoResponse {
    let targets = {
        let registry = state.registry.lock().await;
        let Some(doorbell) = registry.doorbell(&device_id) else {
            return error_response(StatusCode::NOT_FOUND, "Unknown doorbell");
        };
        let title = doorbell.name.clone();
        registry
            .linked_lamps(&device_id)
            .into_iter()
            .map(|(lamp, link)| (lamp.device_id.clone(), title.clone(), link.clone()))
            .collect::<Vec<_>>()
    };

    let text = state
        .transcriber
        .transcribe(FsPath::new(&request.recording))
        .into_message();

    let mut delivered = 0;
    for (lamp_id, title, link) in &targets {
        let message = NotificationMessage {
            kind: NotificationKind::DoorbellEvent,
            title: title.clone(),
            message: text.clone(),
            hue: link.hue,
            saturation: link.saturation,
            brightness: link.brightness,
            num_flashes: link.num_flashes,
        };
        if publish_notification(&state.mqtt, lamp_id, &message).await {
            delivered += 1;
        }
    }

    if targets.is_empty() {
        info!("doorbell {device_id} rang with no linked lamps");
    }

    Json(DoorbellEventResponse {
        transcription: text,
        delivered,
    })
    .into_response()
}

fn association_status_of(owner: &str, code: &str) -> AssociationStatus {
    if owner == PARKED_OWNER {
        AssociationStatus::unassociated(code)
    } else {
        AssociationStatus::associated()
    }
}

async fn publish_association(
    mqtt: &AsyncClient,
    device_id: &str,
    device_type: &str,
    status: &AssociationStatus,
) {
    match serde_json::to_vec(status) {
        Ok(body) => {
            if let Err(err) = mqtt
                .publish(
                    device_association_topic(device_id, device_type),
                    QoS::ExactlyOnce,
                    true,
                    body,
                )
                .await
            {
                warn!("association publish failed for {device_id}: {err}");
            }
        }
        Err(err) => warn!("association serialization failed: {err}"),
    }
}

async fn publish_notification(
    mqtt: &AsyncClient,
    lamp_id: &str,
    message: &NotificationMessage,
) -> bool {
    match serde_json::to_vec(message) {
        Ok(body) => match mqtt
            .publish(
                device_notification_topic(lamp_id, DEVICE_TYPE_LAMP),
                QoS::ExactlyOnce,
                false,
                body,
            )
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!("notification publish failed for {lamp_id}: {err}");
                false
            }
        },
        Err(err) => {
            warn!("notification serialization failed: {err}");
            false
        }
    }
}

async fn persist(state: &AppState) -> anyhow::Result<()> {
    let registry = state.registry.lock().await.clone();
    state.store.save(&registry).await
}

fn unit_interval(value: f32) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
