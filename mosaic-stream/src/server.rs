//! HTTP and WebSocket surface.
//!
//! | route | |
//! |-------|---|
//! | `GET /ws` | streaming connection, see [`crate::protocol`] |
//! | `POST /demo` | start a session on a WAV or MIDI body |
//! | `POST /wav-to-midi` | transcribe a WAV body to a MIDI file |
//! | `GET /model_names` | selectable ensembles |
//! | `GET /get_current_model` | ensemble in use |
//! | `GET /set_model?name=` | switch ensembles |
//! | `GET /ping` | liveness |

use crate::catalog::ModelCatalog;
use crate::engine::EnsembleEngine;
use crate::error::{CatalogError, Error};
use crate::protocol::{ClientMessage, DemoState, ServerMessage};
use crate::registry::{ConnectionRegistry, Outgoing};
use crate::session::{SessionConfig, SessionControls, SessionState, StreamingSession};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::{SinkExt, StreamExt};
use mosaic_audio::frontend::AudioSource;
use mosaic_audio::spectrogram::{SpectrogramConfig, SpectrogramFrontEnd};
use mosaic_ensemble::ensemble::Ensemble;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

const WAV_TYPES: [&str; 3] = ["audio/wav", "audio/x-wav", "application/octet-stream"];
const MIDI_TYPES: [&str; 2] = ["audio/midi", "audio/x-midi"];

type DemoSession = StreamingSession<SpectrogramFrontEnd, EnsembleEngine>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Body or content type the route cannot take (415)
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The demo session owns the ensemble's sequence memories (409)
    #[error("demo session is {0:?}")]
    SessionBusy(SessionState),

    /// Failure inside the service
    #[error(transparent)]
    Stream(#[from] Error),

    /// Blocking worker task failed
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnsupportedMediaType(_)
            | ApiError::Stream(Error::Audio(_))
            | ApiError::Stream(Error::Catalog(CatalogError::UnknownModel(_))) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ApiError::SessionBusy(_) => StatusCode::CONFLICT,
            ApiError::Stream(_) | ApiError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Shared state for handlers.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<ConnectionRegistry>,
    session: Arc<Mutex<DemoSession>>,
    controls: Arc<Mutex<SessionControls>>,
    engine: Arc<Mutex<EnsembleEngine>>,
    catalog: Arc<Mutex<ModelCatalog>>,
    spectrogram: SpectrogramConfig,
}

/// Front end producing frames the size `ensemble` was built for.
fn frontend_for(ensemble: &Ensemble, base: &SpectrogramConfig) -> SpectrogramFrontEnd {
    let (width, height) = ensemble.config().frame_size();
    SpectrogramFrontEnd::new(SpectrogramConfig {
        width,
        height,
        ..base.clone()
    })
}

impl AppState {
    pub fn new(
        catalog: ModelCatalog,
        ensemble: Ensemble,
        spectrogram: SpectrogramConfig,
        session: SessionConfig,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let frontend = frontend_for(&ensemble, &spectrogram);
        let engine = Arc::new(Mutex::new(EnsembleEngine::new(ensemble)));
        let session = StreamingSession::new(session, Arc::clone(&registry), frontend, Arc::clone(&engine));

        Self {
            controls: Arc::new(Mutex::new(session.controls())),
            registry,
            session: Arc::new(Mutex::new(session)),
            engine,
            catalog: Arc::new(Mutex::new(catalog)),
            spectrogram,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn controls(&self) -> SessionControls {
        lock(&self.controls).clone()
    }

    /// Stop any running session and switch to `ensemble`.
    fn swap_model(&self, ensemble: Ensemble) {
        let mut session = lock(&self.session);
        session.stop();

        let frontend = frontend_for(&ensemble, &self.spectrogram);
        lock(&self.engine).replace(ensemble);

        let config = session.config().clone();
        *session = StreamingSession::new(
            config,
            Arc::clone(&self.registry),
            frontend,
            Arc::clone(&self.engine),
        );
        *lock(&self.controls) = session.controls();
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(stream_ws))
        .route("/demo", post(start_demo))
        .route("/wav-to-midi", post(wav_to_midi))
        .route("/model_names", get(model_names))
        .route("/get_current_model", get(current_model))
        .route("/set_model", get(set_model))
        .route("/ping", get(ping))
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
pub async fn serve(addr: SocketAddr, state: AppState) -> crate::error::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn ping() -> &'static str {
    "pong"
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let essence = value.split(';').next().unwrap_or(value).trim();
    Some(essence.to_ascii_lowercase())
}

/// Pick the source kind from the body's magic bytes, falling back to the
/// declared content type.
fn demo_source(headers: &HeaderMap, body: Bytes) -> Result<AudioSource, ApiError> {
    let declared = content_type(headers);
    if body.starts_with(b"MThd") || declared.as_deref().is_some_and(|t| MIDI_TYPES.contains(&t)) {
        return Ok(AudioSource::Midi(body.to_vec()));
    }
    if body.starts_with(b"RIFF") || declared.as_deref().is_some_and(|t| WAV_TYPES.contains(&t)) {
        return Ok(AudioSource::Wav(body.to_vec()));
    }
    Err(ApiError::UnsupportedMediaType(
        declared.unwrap_or_else(|| "missing content type".into()),
    ))
}

async fn start_demo(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let source = demo_source(&headers, body)?;
    let session = Arc::clone(&state.session);
    tokio::task::spawn_blocking(move || lock(&session).start(source)).await??;
    Ok(Json(json!({ "status": "started" })))
}

async fn wav_to_midi(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    match content_type(&headers) {
        Some(t) if WAV_TYPES.contains(&t.as_str()) => {}
        other => {
            return Err(ApiError::UnsupportedMediaType(
                other.unwrap_or_else(|| "missing content type".into()),
            ));
        }
    }

    let midi = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ApiError> {
        let mut engine = lock(&state.engine);
        // A session started from here on resets the engine after we release it.
        let live = state.controls().state();
        if matches!(live, SessionState::Loading | SessionState::Streaming | SessionState::Paused) {
            return Err(ApiError::SessionBusy(live));
        }

        let mut frontend = frontend_for(engine.ensemble(), &state.spectrogram);
        let registry = &state.registry;

        let mut last = -1;
        let midi = engine.transcribe(&mut frontend, AudioSource::Wav(body.to_vec()), |progress| {
            let percent = progress as i32;
            if percent != last {
                last = percent;
                registry.broadcast(Outgoing::from(ServerMessage::Progress(progress)));
            }
        })?;
        Ok(midi)
    })
    .await??;

    Ok(([(header::CONTENT_TYPE, "audio/midi")], midi))
}

async fn model_names(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(lock(&state.catalog).names()?))
}

async fn current_model(State(state): State<AppState>) -> Json<Option<String>> {
    Json(lock(&state.catalog).current().map(str::to_owned))
}

#[derive(Debug, Deserialize)]
struct ModelQuery {
    name: String,
}

async fn set_model(
    State(state): State<AppState>,
    Query(query): Query<ModelQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let name = query.name;
    let selected = name.clone();
    tokio::task::spawn_blocking(move || -> crate::error::Result<()> {
        let ensemble = lock(&state.catalog).load(&name)?;
        state.swap_model(ensemble);
        lock(&state.catalog).select(&name)?;
        Ok(())
    })
    .await??;

    tracing::info!(name = %selected, "model selected");
    Ok(Json(json!({ "name": selected })))
}

async fn stream_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (id, mut outgoing) = state.registry.register();
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = outgoing.recv().await {
            let message = match message {
                Outgoing::Text(text) => Message::Text(text.into()),
                Outgoing::Binary(bytes) => Message::Binary(bytes.into()),
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_client_text(&state, id, &text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(id, error = %e, "socket error");
                    break;
                }
            },
        }
    }

    state.registry.unregister(id);
    send_task.abort();
}

fn handle_client_text(state: &AppState, id: u64, text: &str) {
    match ClientMessage::parse(text) {
        Ok(ClientMessage::DemoState(DemoState::Continue)) => {
            tracing::trace!(id, "continue received");
            state.controls().resume();
        }
        Ok(message) => tracing::debug!(id, ?message, "ignoring client message"),
        Err(e) => tracing::warn!(id, error = %e, "malformed client message"),
    }
}
