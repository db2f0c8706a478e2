//! One live playthrough of an audio source, paced by its consumers.
//!
//! A [`StreamingSession`] owns at most one background worker. The worker
//! loads the source, sends the whole decoded audio once, then processes the
//! source frame by frame and broadcasts one `avpacket` per frame. After
//! `buffering_packets` packets it pauses and waits until a consumer sends
//! `continue`, the session is cancelled, or every consumer has left.
//!
//! ```text
//! Idle -> Loading -> Streaming <-> Paused
//!                        |
//!                        v
//!                      Ended -> Idle
//! ```

use crate::engine::SessionEngine;
use crate::error::Result;
use crate::flag::{DEFAULT_POLL_INTERVAL, PollingFlag, WaitableFlag};
use crate::protocol::{DemoState, ServerMessage, pcm_bytes};
use crate::registry::{ConnectionRegistry, Outgoing};
use mosaic_audio::frontend::{AcousticFrontEnd, AudioSource};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Default packets sent before waiting for the consumer.
pub const DEFAULT_BUFFERING_PACKETS: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Packets sent before the session pauses for a `continue`
    pub buffering_packets: usize,
    /// Sleep between checks while paused, in milliseconds
    pub poll_interval_ms: u64,
}

impl SessionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffering_packets: DEFAULT_BUFFERING_PACKETS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Loading,
    Streaming,
    Paused,
    Ended,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle for resuming a paused session and reading its state.
#[derive(Clone)]
pub struct SessionControls {
    resume: Arc<dyn WaitableFlag>,
    state: Arc<Mutex<SessionState>>,
}

impl SessionControls {
    /// Let a paused session continue. Ignored unless the session is paused.
    pub fn resume(&self) {
        if self.state() == SessionState::Paused {
            self.resume.set();
        }
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }
}

struct Worker<F, E> {
    config: SessionConfig,
    registry: Arc<ConnectionRegistry>,
    frontend: Mutex<F>,
    engine: Arc<Mutex<E>>,
    state: Arc<Mutex<SessionState>>,
    cancel: Arc<dyn WaitableFlag>,
    resume: Arc<dyn WaitableFlag>,
}

impl<F, E> Worker<F, E>
where
    F: AcousticFrontEnd,
    E: SessionEngine,
{
    fn set_state(&self, state: SessionState) {
        *lock(&self.state) = state;
        tracing::debug!(?state, "session state");
    }

    fn notify(&self, state: DemoState) {
        self.registry
            .broadcast(ServerMessage::DemoState(state).into());
    }

    fn run(&self, source: AudioSource) {
        self.set_state(SessionState::Loading);
        let samples = {
            let mut frontend = lock(&self.frontend);
            frontend
                .load_source(source)
                .map(|()| frontend.samples().to_vec())
        };

        match samples {
            Ok(samples) => {
                lock(&self.engine).reset();
                self.registry.broadcast(Outgoing::Binary(pcm_bytes(&samples)));
                self.set_state(SessionState::Streaming);
                let sent = self.stream();
                tracing::info!(packets = sent, "session finished");
            }
            Err(e) => tracing::warn!(error = %e, "failed to load session source"),
        }

        self.set_state(SessionState::Ended);
        self.notify(DemoState::Ended);
        self.set_state(SessionState::Idle);
    }

    /// Frame loop. Returns the number of packets sent.
    fn stream(&self) -> usize {
        let mut total = 0;
        let mut since_pause = 0;

        loop {
            if self.cancel.is_set() {
                tracing::debug!("session cancelled");
                break;
            }
            if self.registry.is_empty() {
                tracing::info!("no consumers left, stopping session");
                break;
            }

            if since_pause >= self.config.buffering_packets && !lock(&self.frontend).is_finished() {
                since_pause = 0;
                if !self.pause() {
                    break;
                }
            }

            let Some(frame) = lock(&self.frontend).next() else {
                break;
            };

            let packet = match lock(&self.engine).process(&frame) {
                Ok(packet) => packet,
                Err(e) => {
                    tracing::error!(error = %e, ts = frame.timestamp, "frame processing failed");
                    break;
                }
            };

            self.registry
                .broadcast(ServerMessage::Avpacket(packet).into());
            total += 1;
            since_pause += 1;
        }

        total
    }

    /// Wait for a `continue`. Returns `false` when the session should stop instead.
    fn pause(&self) -> bool {
        self.resume.clear();
        self.set_state(SessionState::Paused);
        self.notify(DemoState::Paused);

        let interval = self.config.poll_interval();
        loop {
            if self.cancel.is_set() || self.registry.is_empty() {
                return false;
            }
            if self.resume.wait(interval) {
                self.set_state(SessionState::Streaming);
                return true;
            }
        }
    }
}

/// Drives one source at a time through a [`SessionEngine`] and broadcasts
/// the results.
pub struct StreamingSession<F, E> {
    worker: Arc<Worker<F, E>>,
    handle: Option<JoinHandle<()>>,
}

impl<F, E> StreamingSession<F, E>
where
    F: AcousticFrontEnd + Send + 'static,
    E: SessionEngine + 'static,
{
    pub fn new(
        config: SessionConfig,
        registry: Arc<ConnectionRegistry>,
        frontend: F,
        engine: Arc<Mutex<E>>,
    ) -> Self {
        let interval = config.poll_interval();
        Self::with_flags(
            config,
            registry,
            frontend,
            engine,
            Arc::new(PollingFlag::new(interval)),
            Arc::new(PollingFlag::new(interval)),
        )
    }

    /// Session using the given cancel and resume flags.
    pub fn with_flags(
        config: SessionConfig,
        registry: Arc<ConnectionRegistry>,
        frontend: F,
        engine: Arc<Mutex<E>>,
        cancel: Arc<dyn WaitableFlag>,
        resume: Arc<dyn WaitableFlag>,
    ) -> Self {
        Self {
            worker: Arc::new(Worker {
                config,
                registry,
                frontend: Mutex::new(frontend),
                engine,
                state: Arc::new(Mutex::new(SessionState::Idle)),
                cancel,
                resume,
            }),
            handle: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.worker.config
    }

    pub fn engine(&self) -> &Arc<Mutex<E>> {
        &self.worker.engine
    }

    pub fn controls(&self) -> SessionControls {
        SessionControls {
            resume: Arc::clone(&self.worker.resume),
            state: Arc::clone(&self.worker.state),
        }
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.worker.state)
    }

    /// Start streaming `source`. A session already running is cancelled and
    /// joined first, so its `ended` notification precedes anything from the
    /// new one.
    pub fn start(&mut self, source: AudioSource) -> Result<()> {
        self.stop();
        self.worker.cancel.clear();
        self.worker.resume.clear();

        let worker = Arc::clone(&self.worker);
        let handle = std::thread::Builder::new()
            .name("mosaic-session".into())
            .spawn(move || worker.run(source))?;
        self.handle = Some(handle);
        tracing::info!("session started");
        Ok(())
    }

    /// Cancel the running worker, if any, and wait for it to exit.
    pub fn stop(&mut self) {
        if self.handle.is_some() {
            self.worker.cancel.set();
            self.join();
        }
    }

    /// Wait for the running worker, if any, to finish on its own.
    pub fn wait(&mut self) {
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("session worker panicked");
            *lock(&self.worker.state) = SessionState::Idle;
        }
    }
}

impl<F, E> Drop for StreamingSession<F, E> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.worker.cancel.set();
            let _ = handle.join();
        }
    }
}
