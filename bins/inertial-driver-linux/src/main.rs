use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, put},
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc, watch};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inertial_core::TopicRule;
use inertial_driver::{DriverOptions, InertialDriver};
use inertial_protocol::codec::{decode_records, encode_channel_message};
use inertial_protocol::TelemetryRecord;
use inertial_providers::{SimulatedDevice, SyntheticTelemetry};

type Driver = InertialDriver<SimulatedDevice>;

#[derive(Clone)]
struct AppState {
    driver: Arc<Mutex<Driver>>,
    router: Arc<inertial_driver::Router>,
}

struct Args {
    settings: Option<String>,
    replay: Option<String>,
    http_addr: SocketAddr,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        settings: None,
        replay: None,
        http_addr: "0.0.0.0:3001".parse()?,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--replay" => args.replay = it.next(),
            "--listen" => {
                let addr = it.next().ok_or_else(|| anyhow::anyhow!("--listen needs an address"))?;
                args.http_addr = addr.parse()?;
            }
            _ => args.settings = Some(arg),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,inertial_driver=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Inertial driver starting...");
    let args = parse_args()?;

    let settings = match &args.settings {
        Some(path) => {
            let text = tokio::fs::read_to_string(path).await?;
            tracing::info!("Loaded settings from {}", path);
            serde_json::from_str(&text)?
        }
        None => serde_json::json!({}),
    };

    let device = SimulatedDevice::gq7();
    let mut driver = tokio::task::spawn_blocking(move || InertialDriver::connect(device, DriverOptions::default()))
        .await??;

    // Ctrl+C also cancels a configuration pass still talking to the device
    let shutdown = driver.shutdown_handle();
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl+C, shutting down...");
                signal_shutdown.request();
                let _ = stop_tx.send(true);
            }
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });

    let (driver, configured) = tokio::task::spawn_blocking(move || {
        let ok = driver.configure(&settings);
        (driver, ok)
    })
    .await?;
    if shutdown.is_requested() {
        tracing::info!("Shutdown requested during configuration");
        return Ok(());
    }
    if !configured {
        tracing::warn!("Configuration incomplete, continuing with the channels that were installed");
    }

    let router = driver.router().clone();
    let dispatcher = driver.dispatcher();
    let (record_tx, record_rx) = mpsc::channel::<TelemetryRecord>(1024);

    let dispatch_handle = tokio::spawn(dispatcher.run(record_rx));

    let source_handle = match args.replay {
        Some(path) => tokio::spawn(replay(path, record_tx)),
        None => {
            let telemetry = SyntheticTelemetry::new(driver.device());
            tokio::spawn(telemetry.run(record_tx))
        }
    };

    let stats_router = router.clone();
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            stats_router.stats().update_rate();
        }
    });

    let state = AppState {
        driver: Arc::new(Mutex::new(driver)),
        router,
    };
    let http_addr = args.http_addr;
    let http_handle = tokio::spawn(async move {
        if let Err(e) = start_http_server(http_addr, state).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tracing::info!("Inertial driver ready");
    tracing::info!("   Session:    http://localhost:{}/driver", http_addr.port());
    tracing::info!("   Channels:   http://localhost:{}/driver/channels", http_addr.port());
    tracing::info!("   Statistics: http://localhost:{}/driver/statistics", http_addr.port());
    tracing::info!("   Stream:     ws://localhost:{}/driver/stream/imu/data", http_addr.port());

    tokio::select! {
        _ = stop_rx.changed() => {}
        _ = dispatch_handle => {
            tracing::warn!("Dispatcher stopped");
        }
        _ = source_handle => {
            tracing::warn!("Telemetry source stopped");
        }
        _ = http_handle => {
            tracing::warn!("HTTP server stopped");
        }
        _ = stats_handle => {}
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Feed recorded telemetry (JSON lines) into the dispatcher.
async fn replay(path: String, tx: mpsc::Sender<TelemetryRecord>) {
    let records = match tokio::fs::read_to_string(&path).await {
        Ok(text) => match decode_records(&text) {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Failed to decode {}: {}", path, e);
                return;
            }
        },
        Err(e) => {
            tracing::error!("Failed to read {}: {}", path, e);
            return;
        }
    };

    tracing::info!("Replaying {} records from {}", records.len(), path);
    let mut interval = tokio::time::interval(Duration::from_millis(10));
    for record in records {
        interval.tick().await;
        if tx.send(record).await.is_err() {
            tracing::error!("Dispatcher stopped during replay");
            return;
        }
    }
    tracing::info!("Replay finished");
}

/// Start the HTTP API server
async fn start_http_server(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/driver", get(session_handler))
        .route("/driver/channels", get(channels_handler))
        .route("/driver/channels/*name", put(channel_enabled_handler))
        .route("/driver/statistics", get(statistics_handler))
        .route("/driver/publishers", put(publishers_handler))
        .route("/driver/stream/*name", get(stream_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn lock(driver: &Mutex<Driver>) -> std::sync::MutexGuard<'_, Driver> {
    driver.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Session, capabilities and the applied plan
async fn session_handler(State(state): State<AppState>) -> Response {
    let driver = state.driver.clone();
    let result = tokio::task::spawn_blocking(move || session_json(&lock(&driver))).await;

    match result {
        Ok(session) => Json(session).into_response(),
        Err(e) => {
            tracing::error!("Session task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn session_json(driver: &Driver) -> serde_json::Value {
    serde_json::json!({
        "session_id": driver.session_id(),
        "capabilities": driver.capabilities(),
        "settings": driver.settings(),
        "plan": driver.plan(),
        "warnings": driver.resolved().map(|r| r.warnings.clone()).unwrap_or_default(),
        "events": driver
            .events()
            .events()
            .iter()
            .map(|e| serde_json::json!({
                "instance": e.instance,
                "trigger": e.definition.trigger.label(),
                "state": e.state.to_string(),
            }))
            .collect::<Vec<_>>(),
        "armed_events": driver.events().armed(),
    })
}

async fn channels_handler(State(state): State<AppState>) -> Json<Vec<inertial_driver::RouteInfo>> {
    Json(state.router.routes())
}

async fn statistics_handler(State(state): State<AppState>) -> Json<inertial_driver::StatisticsSnapshot> {
    Json(state.router.statistics())
}

#[derive(Deserialize)]
struct EnabledBody {
    enabled: bool,
}

async fn channel_enabled_handler(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<EnabledBody>,
) -> StatusCode {
    let name = name.trim_start_matches('/').to_string();
    let driver = state.driver.clone();
    let result = tokio::task::spawn_blocking(move || lock(&driver).set_channel_enabled(&name, body.enabled)).await;

    match result {
        Ok(true) => StatusCode::NO_CONTENT,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            tracing::error!("Channel toggle task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Replace the topic rules; device commands run off the async runtime
async fn publishers_handler(State(state): State<AppState>, Json(rules): Json<Vec<TopicRule>>) -> Response {
    let driver = state.driver.clone();
    let result = tokio::task::spawn_blocking(move || lock(&driver).reconfigure_publishers(rules)).await;

    match result {
        Ok(Ok(dropped)) => Json(serde_json::json!({ "dropped": dropped })).into_response(),
        Ok(Err(e)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Reconfiguration task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Stream one channel's messages over a WebSocket
async fn stream_handler(
    Path(name): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let name = name.trim_start_matches('/').to_string();
    match state.router.subscribe(&name) {
        Some(rx) => ws.on_upgrade(move |socket| forward_channel(socket, name, rx)),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn forward_channel(
    socket: WebSocket,
    name: String,
    mut rx: broadcast::Receiver<inertial_protocol::ChannelMessage>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    tracing::info!("Client subscribed to {}", name);

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error on {}: {}", name, e);
                        break;
                    }
                    _ => {}
                }
            }
            result = rx.recv() => {
                match result {
                    Ok(message) => {
                        let text = match encode_channel_message(&message) {
                            Ok(text) => text,
                            Err(e) => {
                                tracing::error!("Failed to encode message for {}: {}", name, e);
                                continue;
                            }
                        };
                        if ws_tx.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Client on {} lagged {} messages", name, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Channel {} dropped", name);
                        break;
                    }
                }
            }
        }
    }

    tracing::info!("Client left {}", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn app_state() -> AppState {
        let mut driver = InertialDriver::connect(SimulatedDevice::gq7(), DriverOptions::default()).unwrap();
        assert!(driver.configure(&serde_json::json!({})));
        let router = driver.router().clone();
        AppState {
            driver: Arc::new(Mutex::new(driver)),
            router,
        }
    }

    fn toggle(state: &AppState, name: &str, enabled: bool) -> tokio::task::JoinHandle<StatusCode> {
        tokio::spawn(channel_enabled_handler(
            Path(name.to_string()),
            State(state.clone()),
            Json(EnabledBody { enabled }),
        ))
    }

    #[tokio::test]
    async fn test_channel_toggle_status() {
        let state = app_state();
        assert_eq!(toggle(&state, "/imu/data", false).await.unwrap(), StatusCode::NO_CONTENT);
        assert!(state.router.routes().iter().any(|r| r.name == "imu/data" && !r.enabled));
        assert_eq!(toggle(&state, "no/such", true).await.unwrap(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_toggle_waits_for_driver_off_the_runtime() {
        let state = app_state();
        let held = state.driver.clone();
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            let _guard = lock(&held);
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(200));
        });
        locked_rx.recv().unwrap();

        // single-threaded runtime: a handler blocking on the lock would stall this task
        let pending = toggle(&state, "imu/data", false);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        assert_eq!(pending.await.unwrap(), StatusCode::NO_CONTENT);
        holder.join().unwrap();
    }

    #[tokio::test]
    async fn test_session_lists_armed_events() {
        let state = app_state();
        let response = session_handler(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);

        let session = session_json(&lock(&state.driver));
        assert_eq!(session["armed_events"], serde_json::json!([]));
        assert!(session["plan"].is_object());
    }

    #[tokio::test]
    async fn test_shutdown_before_configure_cancels() {
        let mut driver = InertialDriver::connect(SimulatedDevice::gq7(), DriverOptions::default()).unwrap();
        let shutdown = driver.shutdown_handle();

        let requester = shutdown.clone();
        tokio::spawn(async move { requester.request() }).await.unwrap();

        let (driver, configured) = tokio::task::spawn_blocking(move || {
            let ok = driver.configure(&serde_json::json!({}));
            (driver, ok)
        })
        .await
        .unwrap();
        assert!(!configured);
        assert!(shutdown.is_requested());
        assert!(driver.device().commands().is_empty());
        assert!(driver.plan().is_none());
    }
}
