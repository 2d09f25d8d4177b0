use crate::core::DaemonEvent;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use sedna_core::channels::ChannelId;
use sedna_core::mood::Mood;
use sedna_core::protocol::{ChannelSummary, Command, SessionSnapshot};
use sedna_core::state::StateManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct HttpState {
    pub state_manager: Arc<StateManager>,
    pub event_tx: mpsc::Sender<DaemonEvent>,
}

pub fn router(app_state: HttpState) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/channels", get(get_channels))
        .route("/api/toggle", get(toggle).post(toggle))
        .route("/api/next", get(next).post(next))
        .route("/api/previous", get(previous).post(previous))
        .route("/api/random", get(random).post(random))
        .route("/api/channel/:id", get(select_channel).post(select_channel))
        .route("/api/mood/next", get(mood_next).post(mood_next))
        .route("/api/mood/:mood", get(select_mood).post(select_mood))
        .route(
            "/api/daily-fact/toggle",
            get(daily_fact_toggle).post(daily_fact_toggle),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<DaemonEvent>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(HttpState {
            state_manager,
            event_tx,
        });

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn send(state: &HttpState, cmd: Command) -> StatusCode {
    info!("HTTP API: {:?}", cmd);
    if state
        .event_tx
        .send(DaemonEvent::ClientCommand(cmd))
        .await
        .is_err()
    {
        error!("Failed to forward HTTP command");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

async fn get_state(State(state): State<HttpState>) -> Json<SessionSnapshot> {
    Json(state.state_manager.get_state().await)
}

async fn get_channels(State(state): State<HttpState>) -> Json<Vec<ChannelSummary>> {
    Json(state.state_manager.get_state().await.channels)
}

async fn toggle(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::TogglePause).await
}

async fn next(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::Next).await
}

async fn previous(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::Previous).await
}

async fn random(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::Random).await
}

async fn select_channel(
    State(state): State<HttpState>,
    Path(channel): Path<ChannelId>,
) -> StatusCode {
    send(&state, Command::SelectChannel { channel }).await
}

async fn select_mood(State(state): State<HttpState>, Path(mood): Path<String>) -> StatusCode {
    match mood.parse::<Mood>() {
        Ok(mood) => send(&state, Command::Mood { mood }).await,
        Err(e) => {
            warn!("HTTP API: {}", e);
            StatusCode::BAD_REQUEST
        }
    }
}

async fn mood_next(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::MoodNext).await
}

async fn daily_fact_toggle(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::DailyFactToggle).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use sedna_core::catalog::Catalog;
    use sedna_core::channels::{default_channels, ChannelFilter};
    use sedna_core::session::SessionState;
    use tower::ServiceExt;

    fn app() -> (Router, mpsc::Receiver<DaemonEvent>) {
        let catalog = Catalog::from_urls([
            "https://soundcloud.com/sednafm/sets/morning-drops/morning-drops-1",
            "https://soundcloud.com/sednafm/sedna-fm-episode-1",
        ]);
        let session = SessionState::new(ChannelFilter::new(catalog, default_channels()));
        let (event_tx, event_rx) = mpsc::channel(8);
        let router = router(HttpState {
            state_manager: Arc::new(StateManager::new(&session)),
            event_tx,
        });
        (router, event_rx)
    }

    async fn call(router: Router, method: &str, uri: &str) -> StatusCode {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        router.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_state_endpoint() {
        let (router, _rx) = app();
        let response = router
            .oneshot(Request::get("/api/state").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let snapshot: SessionSnapshot = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(snapshot.catalog_size, 2);
        assert_eq!(snapshot.channels.len(), 4);
    }

    #[tokio::test]
    async fn test_channel_command_forwarded() {
        let (router, mut rx) = app();
        assert_eq!(call(router, "POST", "/api/channel/3").await, StatusCode::OK);
        match rx.recv().await {
            Some(DaemonEvent::ClientCommand(Command::SelectChannel { channel: 3 })) => {}
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mood_is_case_insensitive() {
        let (router, mut rx) = app();
        assert_eq!(call(router, "POST", "/api/mood/calm").await, StatusCode::OK);
        match rx.recv().await {
            Some(DaemonEvent::ClientCommand(Command::Mood { mood: Mood::Calm })) => {}
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mood_next_route_wins_over_mood_param() {
        let (router, mut rx) = app();
        assert_eq!(call(router, "GET", "/api/mood/next").await, StatusCode::OK);
        match rx.recv().await {
            Some(DaemonEvent::ClientCommand(Command::MoodNext)) => {}
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_mood_is_bad_request() {
        let (router, mut rx) = app();
        assert_eq!(
            call(router, "POST", "/api/mood/grumpy").await,
            StatusCode::BAD_REQUEST
        );
        assert!(rx.try_recv().is_err());
    }
}
