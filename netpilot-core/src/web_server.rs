use crate::daemon::{Daemon, SettingsUpdate};
use crate::profile::NetworkProfile;
use crate::status::DaemonEvent;
use crate::types::{ConnectionState, NetworkId};
use crate::Error;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub type WebServerState = State<Arc<AppState>>;

pub struct AppState {
    pub daemon: Arc<Daemon>,
}

/// Builds the RPC router over `daemon`.
pub fn router(daemon: Arc<Daemon>) -> Router {
    let app_state = Arc::new(AppState { daemon });

    Router::new()
        .route("/api/status", get(api_get_status).put(api_set_status))
        .route("/api/events", get(api_events))
        .route("/api/scan", post(api_scan))
        .route("/api/networks", get(api_networks))
        .route("/api/wireless/connect", post(api_connect_wireless))
        .route("/api/wired/connect", post(api_connect_wired))
        .route("/api/disconnect", post(api_disconnect))
        .route("/api/cancel", post(api_cancel))
        .route("/api/autoconnect", post(api_autoconnect))
        .route("/api/suspend", put(api_set_suspend))
        .route("/api/forced-disconnect", put(api_set_forced_disconnect))
        .route("/api/gui-open", put(api_set_gui_open))
        .route("/api/connecting", get(api_connecting))
        .route("/api/backends", get(api_backends))
        .route("/api/backend", put(api_load_backend))
        .route("/api/wireless/hidden-essid", put(api_set_hidden_essid))
        .route("/api/wireless/rfkill", get(api_get_rfkill).post(api_switch_rfkill))
        .route("/api/wireless/profiles/{bssid}", put(api_save_wireless_profile))
        .route("/api/wired/profiles", get(api_list_wired_profiles).post(api_create_wired_profile))
        .route(
            "/api/wired/profiles/{name}",
            get(api_read_wired_profile)
                .put(api_save_wired_profile)
                .delete(api_delete_wired_profile),
        )
        .route("/api/wired/default", put(api_set_default_wired_profile))
        .route("/api/settings", get(api_get_settings).put(api_apply_settings))
        .with_state(app_state)
}

/// Starts the Axum web server.
///
/// # Returns
/// A `JoinHandle` for the server task. It resolves with an error if the
/// address cannot be bound or the server stops unexpectedly.
pub fn start_web_server(
    daemon: Arc<Daemon>,
    addr: SocketAddr,
) -> JoinHandle<Result<(), crate::Error>> {
    let app = router(daemon);
    tracing::info!(%addr, "RPC server listening");

    tokio::spawn(async move {
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, app.into_make_service())
            .await
            .map_err(|e| crate::Error::WebServer(e.into()))
    })
}

fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::StaleScan { .. } => StatusCode::CONFLICT,
        Error::UnknownNetwork(_) | Error::ProfileNotFound(_) | Error::UnknownBackend(_) => {
            StatusCode::NOT_FOUND
        }
        Error::InvalidArgument(_) | Error::InvalidAddress(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: Error) -> Response {
    (status_for(&e), Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

fn ok() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "status": "success" }))).into_response()
}

// --- Request bodies ---

#[derive(Deserialize)]
pub struct StatusRequest {
    state: ConnectionState,
    #[serde(default)]
    info: Vec<String>,
}

#[derive(Deserialize)]
pub struct FlagRequest {
    value: bool,
}

#[derive(Deserialize)]
pub struct WiredConnectRequest {
    #[serde(default)]
    profile: Option<String>,
}

#[derive(Deserialize)]
pub struct AutoConnectRequest {
    #[serde(default = "fresh_default")]
    fresh: bool,
}

fn fresh_default() -> bool {
    true
}

#[derive(Deserialize)]
pub struct BackendRequest {
    name: String,
}

#[derive(Deserialize)]
pub struct HiddenEssidRequest {
    #[serde(default)]
    essid: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateWiredProfileRequest {
    name: String,
    #[serde(default)]
    default: bool,
}

#[derive(Deserialize)]
pub struct NameRequest {
    name: String,
}

// --- Route Handlers ---

async fn api_get_status(State(state): WebServerState) -> impl IntoResponse {
    Json(state.daemon.connection_status())
}

async fn api_set_status(
    State(state): WebServerState,
    Json(payload): Json<StatusRequest>,
) -> impl IntoResponse {
    state.daemon.set_connection_status(payload.state, payload.info);
    Json(state.daemon.connection_status())
}

/// Streams every daemon event as a JSON server-sent event.
async fn api_events(
    State(state): WebServerState,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.daemon.subscribe();
    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => match sse_event(&event) {
                    Some(sse) => return Some((Ok(sse), rx)),
                    None => continue,
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn sse_event(event: &DaemonEvent) -> Option<Event> {
    match Event::default().json_data(event) {
        Ok(sse) => Some(sse),
        Err(e) => {
            tracing::warn!(error = %e, "Could not encode event");
            None
        }
    }
}

async fn api_scan(State(state): WebServerState) -> impl IntoResponse {
    match state.daemon.scan().await {
        Ok(snapshot) => (StatusCode::OK, Json((*snapshot).clone())).into_response(),
        Err(e) => error_response(e),
    }
}

async fn api_networks(State(state): WebServerState) -> impl IntoResponse {
    Json((*state.daemon.snapshot()).clone())
}

async fn api_connect_wireless(
    State(state): WebServerState,
    Json(id): Json<NetworkId>,
) -> impl IntoResponse {
    match state.daemon.connect_wireless(id) {
        Ok(attempt) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "connecting", "target": attempt.target() })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn api_connect_wired(
    State(state): WebServerState,
    Json(payload): Json<WiredConnectRequest>,
) -> impl IntoResponse {
    match state.daemon.connect_wired(payload.profile.as_deref()) {
        Ok(attempt) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "connecting", "target": attempt.target() })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn api_disconnect(State(state): WebServerState) -> impl IntoResponse {
    match state.daemon.disconnect().await {
        Ok(()) => ok(),
        Err(e) => error_response(e),
    }
}

async fn api_cancel(State(state): WebServerState) -> impl IntoResponse {
    state.daemon.cancel_connect().await;
    ok()
}

async fn api_autoconnect(
    State(state): WebServerState,
    Json(payload): Json<AutoConnectRequest>,
) -> impl IntoResponse {
    Json(state.daemon.auto_connect(payload.fresh).await)
}

async fn api_set_suspend(
    State(state): WebServerState,
    Json(payload): Json<FlagRequest>,
) -> impl IntoResponse {
    match state.daemon.set_suspend(payload.value).await {
        Ok(()) => ok(),
        Err(e) => error_response(e),
    }
}

async fn api_set_forced_disconnect(
    State(state): WebServerState,
    Json(payload): Json<FlagRequest>,
) -> impl IntoResponse {
    state.daemon.set_forced_disconnect(payload.value);
    ok()
}

async fn api_set_gui_open(
    State(state): WebServerState,
    Json(payload): Json<FlagRequest>,
) -> impl IntoResponse {
    state.daemon.set_gui_open(payload.value);
    ok()
}

async fn api_connecting(State(state): WebServerState) -> impl IntoResponse {
    Json(state.daemon.connecting_info())
}

async fn api_backends(State(state): WebServerState) -> impl IntoResponse {
    Json(state.daemon.backend_info())
}

async fn api_load_backend(
    State(state): WebServerState,
    Json(payload): Json<BackendRequest>,
) -> impl IntoResponse {
    match state.daemon.load_backend(&payload.name) {
        Ok(()) => Json(state.daemon.backend_info()).into_response(),
        Err(e) => error_response(e),
    }
}

async fn api_set_hidden_essid(
    State(state): WebServerState,
    Json(payload): Json<HiddenEssidRequest>,
) -> impl IntoResponse {
    state.daemon.set_hidden_essid(payload.essid);
    ok()
}

async fn api_get_rfkill(State(state): WebServerState) -> impl IntoResponse {
    Json(serde_json::json!({ "enabled": state.daemon.killswitch_enabled().await }))
}

async fn api_switch_rfkill(State(state): WebServerState) -> impl IntoResponse {
    match state.daemon.switch_rfkill().await {
        Ok(enabled) => Json(serde_json::json!({ "enabled": enabled })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn api_save_wireless_profile(
    State(state): WebServerState,
    Path(bssid): Path<String>,
    Json(profile): Json<NetworkProfile>,
) -> impl IntoResponse {
    match state.daemon.save_wireless_profile(&bssid, profile) {
        Ok(()) => ok(),
        Err(e) => error_response(e),
    }
}

async fn api_list_wired_profiles(State(state): WebServerState) -> impl IntoResponse {
    Json(state.daemon.list_wired_profiles())
}

async fn api_create_wired_profile(
    State(state): WebServerState,
    Json(payload): Json<CreateWiredProfileRequest>,
) -> impl IntoResponse {
    match state.daemon.create_wired_profile(&payload.name, payload.default) {
        Ok(true) => (StatusCode::CREATED, Json(serde_json::json!({ "status": "created" }))).into_response(),
        Ok(false) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": format!("Profile already exists: {}", payload.name) })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn api_read_wired_profile(
    State(state): WebServerState,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.daemon.read_wired_profile(&name) {
        Ok(profile) => Json(profile).into_response(),
        Err(e) => error_response(e),
    }
}

async fn api_save_wired_profile(
    State(state): WebServerState,
    Path(name): Path<String>,
    Json(profile): Json<NetworkProfile>,
) -> impl IntoResponse {
    match state.daemon.save_wired_profile(&name, profile) {
        Ok(()) => ok(),
        Err(e) => error_response(e),
    }
}

async fn api_delete_wired_profile(
    State(state): WebServerState,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.daemon.delete_wired_profile(&name) {
        Ok(()) => ok(),
        Err(e) => error_response(e),
    }
}

async fn api_set_default_wired_profile(
    State(state): WebServerState,
    Json(payload): Json<NameRequest>,
) -> impl IntoResponse {
    match state.daemon.set_default_wired_profile(&payload.name) {
        Ok(()) => ok(),
        Err(e) => error_response(e),
    }
}

async fn api_get_settings(State(state): WebServerState) -> impl IntoResponse {
    Json(state.daemon.runtime_settings())
}

async fn api_apply_settings(
    State(state): WebServerState,
    Json(update): Json<SettingsUpdate>,
) -> impl IntoResponse {
    Json(state.daemon.apply_settings(update))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::tests::mock_daemon;

    fn state(daemon: Arc<Daemon>) -> WebServerState {
        State(Arc::new(AppState { daemon }))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_for(&Error::StaleScan { held: 1, current: 2 }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_for(&Error::UnknownNetwork(9)), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&Error::ProfileNotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&Error::InvalidAddress("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&Error::CommandFailed("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_router_builds() {
        let (daemon, _mock) = mock_daemon();
        let _ = router(daemon);
    }

    #[tokio::test]
    async fn test_scan_then_connect() {
        let (daemon, _mock) = mock_daemon();
        let response = api_scan(state(daemon.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["generation"], 1);
        assert_eq!(body["networks"].as_array().unwrap().len(), 3);

        let id = NetworkId { generation: 1, index: 1 };
        let response = api_connect_wireless(state(daemon.clone()), Json(id))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["target"], "CafeGuest");
    }

    #[tokio::test]
    async fn test_stale_connect_is_conflict() {
        let (daemon, _mock) = mock_daemon();
        daemon.scan().await.unwrap();
        daemon.scan().await.unwrap();
        let id = NetworkId { generation: 1, index: 0 };
        let response = api_connect_wireless(state(daemon), Json(id))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("stale"));
    }

    #[tokio::test]
    async fn test_wired_profile_routes() {
        let (daemon, _mock) = mock_daemon();
        let create = || CreateWiredProfileRequest {
            name: "lab".into(),
            default: false,
        };
        let response = api_create_wired_profile(state(daemon.clone()), Json(create()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = api_create_wired_profile(state(daemon.clone()), Json(create()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = api_read_wired_profile(state(daemon.clone()), Path("nope".into()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = api_list_wired_profiles(state(daemon)).await.into_response();
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_settings_and_flags() {
        let (daemon, _mock) = mock_daemon();
        let update: SettingsUpdate =
            serde_json::from_str(r#"{"auto_reconnect": false, "wired_connect_mode": "last_used"}"#).unwrap();
        let response = api_apply_settings(state(daemon.clone()), Json(update))
            .await
            .into_response();
        let body = body_json(response).await;
        assert_eq!(body["auto_reconnect"], false);
        assert_eq!(body["wired_connect_mode"], "last_used");
        assert_eq!(body["signal_display"], "percent");

        api_set_gui_open(state(daemon.clone()), Json(FlagRequest { value: true })).await;
        assert!(daemon.gui_open());
    }

    #[tokio::test]
    async fn test_unknown_backend_is_not_found() {
        let (daemon, _mock) = mock_daemon();
        let response = api_load_backend(
            state(daemon),
            Json(BackendRequest { name: "networkmanager".into() }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
